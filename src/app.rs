use ratatui::widgets::ListState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{
    ApiError, BackendClient, HealthStatus, Memory, ModelInfo, Profile, TrainingDataset,
    TrainingStatus, WorkspaceEntry,
};
use crate::config::Config;
use crate::events::{BackendEvent, Refresh};
use crate::stream::{self, StreamSession, GENERIC_FAILURE};
use crate::theme::Theme;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    Profiles,
    Memories,
    Workspace,
    Training,
    Settings,
}

impl Screen {
    pub fn title(&self) -> &'static str {
        match self {
            Screen::Chat => "Chat",
            Screen::Profiles => "Profiles",
            Screen::Memories => "Memories",
            Screen::Workspace => "Workspace",
            Screen::Training => "Training",
            Screen::Settings => "Settings",
        }
    }

    pub fn all() -> [Screen; 6] {
        [
            Screen::Chat,
            Screen::Profiles,
            Screen::Memories,
            Screen::Workspace,
            Screen::Training,
            Screen::Settings,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// Transient banner above the footer. Chat failures render as transcript
/// bubbles instead and never land here.
#[derive(Debug, Clone)]
pub struct StatusLine {
    pub text: String,
    pub error: bool,
}

/// Single-line input popup and what submitting it means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    NewMemory,
    NewDirectory,
    NewFile,
    UploadFile,
    UploadTrainingData,
    DisplayName,
}

impl PromptKind {
    pub fn title(&self) -> &'static str {
        match self {
            PromptKind::NewMemory => "New memory",
            PromptKind::NewDirectory => "New directory",
            PromptKind::NewFile => "New file",
            PromptKind::UploadFile => "Upload file (local path)",
            PromptKind::UploadTrainingData => "Upload training data (local path)",
            PromptKind::DisplayName => "Display name",
        }
    }
}

#[derive(Debug)]
pub struct Prompt {
    pub kind: PromptKind,
    pub value: String,
    pub cursor: usize,
}

impl Prompt {
    pub fn new(kind: PromptKind) -> Self {
        Self {
            kind,
            value: String::new(),
            cursor: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Name,
    Description,
}

/// Create/edit form for a profile. `id` present means edit.
#[derive(Debug)]
pub struct ProfileForm {
    pub id: Option<String>,
    pub name: String,
    pub description: String,
    pub field: ProfileField,
    pub cursor: usize,
}

impl ProfileForm {
    pub fn create() -> Self {
        Self {
            id: None,
            name: String::new(),
            description: String::new(),
            field: ProfileField::Name,
            cursor: 0,
        }
    }

    pub fn edit(profile: &Profile) -> Self {
        Self {
            id: Some(profile.id.clone()),
            name: profile.name.clone(),
            description: profile.description.clone(),
            field: ProfileField::Name,
            cursor: profile.name.chars().count(),
        }
    }

    pub fn active_value(&mut self) -> &mut String {
        match self.field {
            ProfileField::Name => &mut self.name,
            ProfileField::Description => &mut self.description,
        }
    }
}

/// One in-flight chat turn: the reducer plus the task driving it.
/// Aborting the task is how the previous stream is closed before a new one
/// opens, and how teardown closes a dangling one.
pub struct ActiveTurn {
    pub id: u64,
    pub session: StreamSession,
    handle: Option<JoinHandle<()>>,
}

impl ActiveTurn {
    fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

pub struct App {
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    pub client: BackendClient,
    events_tx: mpsc::UnboundedSender<BackendEvent>,

    // Connectivity
    pub backend_online: bool,
    pub backend_version: Option<String>,
    pub status: Option<StatusLine>,

    // Chat
    pub chat_input: String,
    pub chat_cursor: usize,
    pub messages: Vec<ChatMessage>,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub streaming_enabled: bool,
    pub spinner_frame: u8,
    turn_counter: u64,
    pub active_turn: Option<ActiveTurn>,

    // Profiles
    pub profiles: Vec<Profile>,
    pub profile_state: ListState,
    pub profile_form: Option<ProfileForm>,

    // Memories
    pub memories: Vec<Memory>,
    pub memory_state: ListState,

    // Workspace
    pub workspace_path: String,
    pub workspace_entries: Vec<WorkspaceEntry>,
    pub workspace_state: ListState,
    pub file_preview: Option<(String, String)>,

    // Models (Settings screen)
    pub models: Vec<ModelInfo>,
    pub model_state: ListState,

    // Training
    pub datasets: Vec<TrainingDataset>,
    pub dataset_state: ListState,
    pub training_status: Option<TrainingStatus>,
    pub training_log: Vec<String>,

    // Settings
    pub theme: Theme,
    pub display_name: Option<String>,

    pub prompt: Option<Prompt>,
}

impl App {
    pub fn new(
        client: BackendClient,
        config: Config,
        events_tx: mpsc::UnboundedSender<BackendEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            screen: Screen::Chat,
            input_mode: InputMode::Normal,

            client,
            events_tx,

            backend_online: false,
            backend_version: None,
            status: None,

            chat_input: String::new(),
            chat_cursor: 0,
            messages: Vec::new(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            streaming_enabled: true,
            spinner_frame: 0,
            turn_counter: 0,
            active_turn: None,

            profiles: Vec::new(),
            profile_state: ListState::default(),
            profile_form: None,

            memories: Vec::new(),
            memory_state: ListState::default(),

            workspace_path: "/".to_string(),
            workspace_entries: Vec::new(),
            workspace_state: ListState::default(),
            file_preview: None,

            models: Vec::new(),
            model_state: ListState::default(),

            datasets: Vec::new(),
            dataset_state: ListState::default(),
            training_status: None,
            training_log: Vec::new(),

            theme: config.resolved_theme(),
            display_name: config.display_name,

            prompt: None,
        }
    }

    pub fn events_tx(&self) -> mpsc::UnboundedSender<BackendEvent> {
        self.events_tx.clone()
    }

    // Status banner

    pub fn report_error(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            error: true,
        });
    }

    pub fn report_info(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            error: false,
        });
    }

    fn report_api_error(&mut self, context: &str, error: ApiError) {
        self.report_error(format!("{}: {}", context, error));
    }

    // Screen switching

    pub fn set_screen(&mut self, screen: Screen) {
        if self.screen == screen {
            return;
        }

        // Leaving the chat view closes any open stream without committing
        // anything from it.
        if self.screen == Screen::Chat {
            self.abort_active_turn();
        }

        self.screen = screen;
        self.input_mode = InputMode::Normal;
        self.prompt = None;
        self.profile_form = None;

        match screen {
            Screen::Chat => {}
            Screen::Profiles => self.request_refresh(Refresh::Profiles),
            Screen::Memories => self.request_refresh(Refresh::Memories),
            Screen::Workspace => self.request_refresh(Refresh::Workspace),
            Screen::Training => self.request_refresh(Refresh::Training),
            Screen::Settings => self.request_refresh(Refresh::Models),
        }
    }

    // Chat

    /// Validate and send the typed message. Any previous stream is closed
    /// first; exactly one turn is in flight afterwards.
    pub fn send_chat_message(&mut self) {
        let message = self.chat_input.trim().to_string();
        if message.is_empty() {
            return;
        }

        self.chat_input.clear();
        self.chat_cursor = 0;
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: message.clone(),
        });

        self.abort_active_turn();
        self.turn_counter += 1;
        let turn = self.turn_counter;
        debug!(turn, streaming = self.streaming_enabled, "sending chat message");

        let handle = if self.streaming_enabled {
            stream::spawn_stream(self.client.clone(), message, turn, self.events_tx.clone())
        } else {
            let client = self.client.clone();
            let tx = self.events_tx.clone();
            tokio::spawn(async move {
                let result = client.chat(&message).await;
                let _ = tx.send(BackendEvent::ChatReply { turn, result });
            })
        };

        self.active_turn = Some(ActiveTurn {
            id: turn,
            session: StreamSession::new(),
            handle: Some(handle),
        });
        self.scroll_chat_to_bottom();
    }

    pub fn abort_active_turn(&mut self) {
        if let Some(mut turn) = self.active_turn.take() {
            debug!(turn = turn.id, "closing chat stream");
            turn.abort();
        }
    }

    fn commit_assistant_message(&mut self, content: String) {
        self.messages.push(ChatMessage {
            role: ChatRole::Assistant,
            content,
        });
        self.active_turn = None;
        self.scroll_chat_to_bottom();
    }

    pub fn is_waiting(&self) -> bool {
        self.active_turn.is_some()
    }

    /// In-progress assistant text for the current turn, if any.
    pub fn pending_reply(&self) -> Option<&str> {
        self.active_turn
            .as_ref()
            .map(|turn| turn.session.buffer())
            .filter(|buffer| !buffer.is_empty())
    }

    pub fn tick(&mut self) {
        if self.is_waiting() {
            self.spinner_frame = (self.spinner_frame + 1) % 3;
        }
    }

    pub fn scroll_chat_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            60
        };

        let mut total: u16 = 0;
        for msg in &self.messages {
            total += 1; // role line
            for line in msg.content.lines() {
                let chars = line.chars().count();
                total += ((chars / wrap_width) + 1) as u16;
            }
            total += 1; // blank separator
        }
        if self.is_waiting() {
            total += 2;
        }

        let visible = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.chat_scroll = total.saturating_sub(visible);
    }

    // List navigation

    fn nav(state: &mut ListState, len: usize, down: bool) {
        if len == 0 {
            state.select(None);
            return;
        }
        let i = state.selected().unwrap_or(0);
        let next = if down { (i + 1).min(len - 1) } else { i.saturating_sub(1) };
        state.select(Some(next));
    }

    pub fn profiles_nav(&mut self, down: bool) {
        Self::nav(&mut self.profile_state, self.profiles.len(), down);
    }

    pub fn memories_nav(&mut self, down: bool) {
        Self::nav(&mut self.memory_state, self.memories.len(), down);
    }

    pub fn workspace_nav(&mut self, down: bool) {
        Self::nav(&mut self.workspace_state, self.workspace_entries.len(), down);
    }

    pub fn models_nav(&mut self, down: bool) {
        Self::nav(&mut self.model_state, self.models.len(), down);
    }

    pub fn datasets_nav(&mut self, down: bool) {
        Self::nav(&mut self.dataset_state, self.datasets.len(), down);
    }

    pub fn selected_profile(&self) -> Option<&Profile> {
        self.profile_state.selected().and_then(|i| self.profiles.get(i))
    }

    pub fn selected_memory(&self) -> Option<&Memory> {
        self.memory_state.selected().and_then(|i| self.memories.get(i))
    }

    pub fn selected_workspace_entry(&self) -> Option<&WorkspaceEntry> {
        self.workspace_state
            .selected()
            .and_then(|i| self.workspace_entries.get(i))
    }

    pub fn selected_model(&self) -> Option<&ModelInfo> {
        self.model_state.selected().and_then(|i| self.models.get(i))
    }

    pub fn selected_dataset(&self) -> Option<&TrainingDataset> {
        self.dataset_state.selected().and_then(|i| self.datasets.get(i))
    }

    pub fn active_profile_name(&self) -> Option<&str> {
        self.profiles
            .iter()
            .find(|p| p.active)
            .map(|p| p.name.as_str())
    }

    // Workspace path handling

    pub fn enter_workspace_dir(&mut self, path: String) {
        self.workspace_path = path;
        self.workspace_state.select(None);
        self.file_preview = None;
        self.request_refresh(Refresh::Workspace);
    }

    pub fn workspace_parent(&mut self) {
        if self.workspace_path == "/" {
            return;
        }
        let parent = self
            .workspace_path
            .trim_end_matches('/')
            .rsplit_once('/')
            .map(|(head, _)| if head.is_empty() { "/" } else { head })
            .unwrap_or("/");
        self.enter_workspace_dir(parent.to_string());
    }

    pub fn workspace_child_path(&self, name: &str) -> String {
        if self.workspace_path.ends_with('/') {
            format!("{}{}", self.workspace_path, name)
        } else {
            format!("{}/{}", self.workspace_path, name)
        }
    }

    // Async fetches

    /// Spawn the fetch that reloads one screen's data.
    pub fn request_refresh(&self, refresh: Refresh) {
        let client = self.client.clone();
        let tx = self.events_tx.clone();
        let path = self.workspace_path.clone();

        tokio::spawn(async move {
            let event = match refresh {
                Refresh::Profiles => BackendEvent::ProfilesLoaded(client.list_profiles().await),
                Refresh::Memories => BackendEvent::MemoriesLoaded(client.list_memories().await),
                Refresh::Workspace => BackendEvent::WorkspaceLoaded {
                    result: client.list_workspace(&path).await,
                    path,
                },
                Refresh::Models => BackendEvent::ModelsLoaded(client.list_models().await),
                Refresh::TrainingData => {
                    BackendEvent::TrainingDataLoaded(client.list_training_data().await)
                }
                Refresh::Training => {
                    // Dataset list plus current status in one pass.
                    let _ = tx.send(BackendEvent::TrainingDataLoaded(
                        client.list_training_data().await,
                    ));
                    BackendEvent::TrainingStatusLoaded(client.training_status().await)
                }
                Refresh::None => return,
            };
            let _ = tx.send(event);
        });
    }

    fn refresh_training_progress(&self) {
        let client = self.client.clone();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let _ = tx.send(BackendEvent::TrainingStatusLoaded(
                client.training_status().await,
            ));
            let _ = tx.send(BackendEvent::TrainingLogLoaded(client.training_log().await));
        });
    }

    // Backend event application. Every state mutation happens here, on the
    // UI loop.

    pub fn handle_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Health(result) => self.apply_health(result),
            BackendEvent::ProfilesLoaded(result) => match result {
                Ok(profiles) => {
                    self.profiles = profiles;
                    if self.profile_state.selected().is_none() && !self.profiles.is_empty() {
                        self.profile_state.select(Some(0));
                    }
                }
                Err(e) => self.report_api_error("Loading profiles failed", e),
            },
            BackendEvent::MemoriesLoaded(result) => match result {
                Ok(memories) => {
                    self.memories = memories;
                    if self.memory_state.selected().is_none() && !self.memories.is_empty() {
                        self.memory_state.select(Some(0));
                    }
                }
                Err(e) => self.report_api_error("Loading memories failed", e),
            },
            BackendEvent::WorkspaceLoaded { path, result } => match result {
                Ok(entries) => {
                    // A stale listing for a directory we already left is useless.
                    if path == self.workspace_path {
                        self.workspace_entries = entries;
                        if self.workspace_state.selected().is_none()
                            && !self.workspace_entries.is_empty()
                        {
                            self.workspace_state.select(Some(0));
                        }
                    }
                }
                Err(e) => self.report_api_error("Loading workspace failed", e),
            },
            BackendEvent::FilePreviewLoaded { path, result } => match result {
                Ok(content) => self.file_preview = Some((path, content)),
                Err(e) => self.report_api_error("Reading file failed", e),
            },
            BackendEvent::ModelsLoaded(result) => match result {
                Ok(models) => {
                    self.models = models;
                    if self.model_state.selected().is_none() && !self.models.is_empty() {
                        self.model_state.select(Some(0));
                    }
                }
                Err(e) => self.report_api_error("Loading models failed", e),
            },
            BackendEvent::TrainingDataLoaded(result) => match result {
                Ok(datasets) => {
                    self.datasets = datasets;
                    if self.dataset_state.selected().is_none() && !self.datasets.is_empty() {
                        self.dataset_state.select(Some(0));
                    }
                }
                Err(e) => self.report_api_error("Loading training data failed", e),
            },
            BackendEvent::TrainingStatusLoaded(result) => match result {
                Ok(status) => self.training_status = Some(status),
                Err(e) => self.report_api_error("Training status failed", e),
            },
            BackendEvent::TrainingLogLoaded(result) => match result {
                Ok(lines) => self.training_log = lines,
                Err(e) => self.report_api_error("Training log failed", e),
            },
            BackendEvent::MutationDone { refresh, result } => match result {
                Ok(()) => self.request_refresh(refresh),
                Err(e) => {
                    self.report_api_error("Request failed", e);
                    // The optimistic flip (if any) is stale now; reload.
                    self.request_refresh(refresh);
                }
            },
            BackendEvent::ChatReply { turn, result } => self.apply_chat_reply(turn, result),
            BackendEvent::Stream { turn, event } => self.apply_stream_event(turn, event),
            BackendEvent::StreamDropped { turn } => self.apply_stream_dropped(turn),
        }
    }

    fn apply_health(&mut self, result: Result<HealthStatus, ApiError>) {
        match result {
            Ok(health) => {
                self.backend_online = health.status == "ok";
                self.backend_version = health.version;
            }
            Err(_) => {
                self.backend_online = false;
            }
        }

        // Training progress rides the shared poll tick while a job runs.
        if self.screen == Screen::Training
            && self
                .training_status
                .as_ref()
                .is_some_and(|s| s.is_running())
        {
            self.refresh_training_progress();
        }
    }

    fn apply_chat_reply(&mut self, turn: u64, result: Result<String, ApiError>) {
        let Some(active) = self.active_turn.as_ref() else {
            return;
        };
        if active.id != turn {
            return;
        }

        let content = match result {
            Ok(reply) => reply,
            Err(ApiError::Backend { message, .. }) => message,
            Err(ApiError::Transport(_)) => GENERIC_FAILURE.to_string(),
        };
        self.commit_assistant_message(content);
    }

    fn apply_stream_event(&mut self, turn: u64, event: crate::stream::StreamEvent) {
        let Some(active) = self.active_turn.as_mut() else {
            return;
        };
        if active.id != turn {
            return;
        }

        if let Some(committed) = active.session.apply(event) {
            self.commit_assistant_message(committed);
        } else {
            self.scroll_chat_to_bottom();
        }
    }

    fn apply_stream_dropped(&mut self, turn: u64) {
        let Some(active) = self.active_turn.as_mut() else {
            return;
        };
        if active.id != turn {
            return;
        }

        if let Some(committed) = active.session.fail_transport() {
            self.commit_assistant_message(committed);
        } else {
            self.active_turn = None;
        }
    }

    pub fn shutdown(&mut self) {
        self.abort_active_turn();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamEvent;

    fn test_app() -> (App, mpsc::UnboundedReceiver<BackendEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        // Port 9 is discard; nothing listens there in tests and no request
        // is awaited anyway.
        let client = BackendClient::new("http://127.0.0.1:9").unwrap();
        (App::new(client, Config::default(), tx), rx)
    }

    #[tokio::test]
    async fn second_send_supersedes_first_stream() {
        let (mut app, _rx) = test_app();

        app.chat_input = "first".to_string();
        app.send_chat_message();
        let first_turn = app.active_turn.as_ref().unwrap().id;

        app.chat_input = "second".to_string();
        app.send_chat_message();

        let active = app.active_turn.as_ref().unwrap();
        assert_eq!(active.id, first_turn + 1);

        // Events from the superseded turn mutate nothing.
        let before = app.messages.len();
        app.handle_backend_event(BackendEvent::Stream {
            turn: first_turn,
            event: StreamEvent::Finish {
                buffer: Some("stale".to_string()),
            },
        });
        assert_eq!(app.messages.len(), before);
        assert!(app.active_turn.is_some());
    }

    #[tokio::test]
    async fn leaving_chat_closes_stream_and_drops_its_events() {
        let (mut app, _rx) = test_app();

        app.chat_input = "hello".to_string();
        app.send_chat_message();
        let turn = app.active_turn.as_ref().unwrap().id;

        app.set_screen(Screen::Profiles);
        assert!(app.active_turn.is_none());

        let before = app.messages.len();
        app.handle_backend_event(BackendEvent::Stream {
            turn,
            event: StreamEvent::Text("late".to_string()),
        });
        app.handle_backend_event(BackendEvent::StreamDropped { turn });
        assert_eq!(app.messages.len(), before);
    }

    #[tokio::test]
    async fn stream_turn_commits_in_order() {
        let (mut app, _rx) = test_app();

        app.chat_input = "hi".to_string();
        app.send_chat_message();
        let turn = app.active_turn.as_ref().unwrap().id;

        app.handle_backend_event(BackendEvent::Stream {
            turn,
            event: StreamEvent::Text("a".to_string()),
        });
        app.handle_backend_event(BackendEvent::Stream {
            turn,
            event: StreamEvent::Text("b".to_string()),
        });
        assert_eq!(app.pending_reply(), Some("ab"));

        app.handle_backend_event(BackendEvent::Stream {
            turn,
            event: StreamEvent::Finish { buffer: None },
        });
        assert!(app.active_turn.is_none());
        let last = app.messages.last().unwrap();
        assert_eq!(last.role, ChatRole::Assistant);
        assert_eq!(last.content, "ab");
    }

    #[tokio::test]
    async fn transport_drop_after_finish_adds_no_duplicate() {
        let (mut app, _rx) = test_app();

        app.chat_input = "hi".to_string();
        app.send_chat_message();
        let turn = app.active_turn.as_ref().unwrap().id;

        app.handle_backend_event(BackendEvent::Stream {
            turn,
            event: StreamEvent::Finish {
                buffer: Some("done".to_string()),
            },
        });
        let count = app.messages.len();

        app.handle_backend_event(BackendEvent::StreamDropped { turn });
        assert_eq!(app.messages.len(), count);
    }

    #[tokio::test]
    async fn sync_reply_commits_atomically() {
        let (mut app, _rx) = test_app();
        app.streaming_enabled = false;

        app.chat_input = "hi".to_string();
        app.send_chat_message();
        let turn = app.active_turn.as_ref().unwrap().id;

        app.handle_backend_event(BackendEvent::ChatReply {
            turn,
            result: Ok("whole reply".to_string()),
        });
        assert!(app.active_turn.is_none());
        assert_eq!(app.messages.last().unwrap().content, "whole reply");
    }

    #[tokio::test]
    async fn blank_input_is_not_sent() {
        let (mut app, _rx) = test_app();
        app.chat_input = "   ".to_string();
        app.send_chat_message();
        assert!(app.active_turn.is_none());
        assert!(app.messages.is_empty());
    }

    #[tokio::test]
    async fn workspace_paths_join_and_walk_up() {
        let (mut app, _rx) = test_app();

        app.workspace_path = "/notes/drafts".to_string();
        assert_eq!(app.workspace_child_path("a.txt"), "/notes/drafts/a.txt");

        app.workspace_parent();
        assert_eq!(app.workspace_path, "/notes");
        app.workspace_parent();
        assert_eq!(app.workspace_path, "/");
        app.workspace_parent();
        assert_eq!(app.workspace_path, "/");
    }
}
