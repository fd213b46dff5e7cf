use std::future::Future;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};

use crate::api::{ApiResult, NewProfile, ProfilePatch};
use crate::app::{App, InputMode, ProfileField, ProfileForm, Prompt, PromptKind, Screen};
use crate::config::Config;
use crate::events::{BackendEvent, Refresh};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string edits.
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

fn spawn_mutation<F>(app: &App, refresh: Refresh, fut: F)
where
    F: Future<Output = ApiResult<()>> + Send + 'static,
{
    let tx = app.events_tx();
    tokio::spawn(async move {
        let result = fut.await;
        let _ = tx.send(BackendEvent::MutationDone { refresh, result });
    });
}

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => app.tick(),
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    // Popups capture input ahead of the screens.
    if app.prompt.is_some() {
        handle_prompt_key(app, key);
        return;
    }
    if app.profile_form.is_some() {
        handle_profile_form_key(app, key);
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_chat_editing(app, key),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    // Screen switching works from any screen in normal mode.
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('1') => return app.set_screen(Screen::Chat),
        KeyCode::Char('2') => return app.set_screen(Screen::Profiles),
        KeyCode::Char('3') => return app.set_screen(Screen::Memories),
        KeyCode::Char('4') => return app.set_screen(Screen::Workspace),
        KeyCode::Char('5') => return app.set_screen(Screen::Training),
        KeyCode::Char('6') => return app.set_screen(Screen::Settings),
        _ => {}
    }

    match app.screen {
        Screen::Chat => handle_chat_normal(app, key),
        Screen::Profiles => handle_profiles(app, key),
        Screen::Memories => handle_memories(app, key),
        Screen::Workspace => handle_workspace(app, key),
        Screen::Training => handle_training(app, key),
        Screen::Settings => handle_settings(app, key),
    }
}

// Chat

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.chat_cursor = app.chat_input.chars().count();
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.chat_scroll = app.chat_scroll.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.chat_scroll = app.chat_scroll.saturating_sub(1);
        }
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),
        _ => {}
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => {
            app.send_chat_message();
        }
        KeyCode::Backspace => {
            if app.chat_cursor > 0 {
                app.chat_cursor -= 1;
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.chat_input.chars().count();
            if app.chat_cursor < char_count {
                let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
                app.chat_input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.chat_cursor = app.chat_cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.chat_input.chars().count();
            app.chat_cursor = (app.chat_cursor + 1).min(char_count);
        }
        KeyCode::Home => app.chat_cursor = 0,
        KeyCode::End => app.chat_cursor = app.chat_input.chars().count(),
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&app.chat_input, app.chat_cursor);
            app.chat_input.insert(byte_pos, c);
            app.chat_cursor += 1;
        }
        _ => {}
    }
}

// Profiles

fn handle_profiles(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.profiles_nav(true),
        KeyCode::Char('k') | KeyCode::Up => app.profiles_nav(false),
        KeyCode::Enter => {
            if let Some(profile) = app.selected_profile().cloned() {
                // Optimistic flip; the post-mutation refresh reconciles.
                for p in &mut app.profiles {
                    p.active = p.id == profile.id;
                }
                let client = app.client.clone();
                spawn_mutation(app, Refresh::Profiles, async move {
                    client.activate_profile(&profile.id).await
                });
            }
        }
        KeyCode::Char('n') => {
            app.profile_form = Some(ProfileForm::create());
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('e') => {
            if let Some(profile) = app.selected_profile() {
                app.profile_form = Some(ProfileForm::edit(profile));
                app.input_mode = InputMode::Editing;
            }
        }
        KeyCode::Char('d') => {
            if let Some(profile) = app.selected_profile().cloned() {
                let client = app.client.clone();
                spawn_mutation(app, Refresh::Profiles, async move {
                    client.delete_profile(&profile.id).await
                });
            }
        }
        KeyCode::Char('r') => app.request_refresh(Refresh::Profiles),
        _ => {}
    }
}

fn handle_profile_form_key(app: &mut App, key: KeyEvent) {
    let Some(form) = app.profile_form.as_mut() else {
        return;
    };

    match key.code {
        KeyCode::Esc => {
            app.profile_form = None;
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Tab => {
            form.field = match form.field {
                ProfileField::Name => ProfileField::Description,
                ProfileField::Description => ProfileField::Name,
            };
            form.cursor = form.active_value().chars().count();
        }
        KeyCode::Enter => submit_profile_form(app),
        KeyCode::Backspace => {
            if form.cursor > 0 {
                form.cursor -= 1;
                let cursor = form.cursor;
                let value = form.active_value();
                let byte_pos = char_to_byte_index(value, cursor);
                value.remove(byte_pos);
            }
        }
        KeyCode::Left => form.cursor = form.cursor.saturating_sub(1),
        KeyCode::Right => {
            let len = form.active_value().chars().count();
            form.cursor = (form.cursor + 1).min(len);
        }
        KeyCode::Char(c) => {
            let cursor = form.cursor;
            let value = form.active_value();
            let byte_pos = char_to_byte_index(value, cursor);
            value.insert(byte_pos, c);
            form.cursor += 1;
        }
        _ => {}
    }
}

fn submit_profile_form(app: &mut App) {
    let Some(form) = app.profile_form.as_ref() else {
        return;
    };

    let name = form.name.trim().to_string();
    if name.is_empty() {
        app.report_error("Profile name is required");
        return;
    }
    let description = form.description.trim().to_string();
    let id = form.id.clone();

    let client = app.client.clone();
    spawn_mutation(app, Refresh::Profiles, async move {
        match id {
            Some(id) => {
                let patch = ProfilePatch {
                    name: Some(name),
                    description: Some(description),
                    model_path: None,
                };
                client.update_profile(&id, &patch).await.map(|_| ())
            }
            None => {
                let profile = NewProfile {
                    name,
                    description,
                    model_path: None,
                };
                client.create_profile(&profile).await.map(|_| ())
            }
        }
    });

    app.profile_form = None;
    app.input_mode = InputMode::Normal;
}

// Memories

fn handle_memories(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.memories_nav(true),
        KeyCode::Char('k') | KeyCode::Up => app.memories_nav(false),
        KeyCode::Char('n') => {
            app.prompt = Some(Prompt::new(PromptKind::NewMemory));
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('d') => {
            if let Some(memory) = app.selected_memory().cloned() {
                let client = app.client.clone();
                spawn_mutation(app, Refresh::Memories, async move {
                    client.delete_memory(&memory.id).await
                });
            }
        }
        KeyCode::Char('r') => app.request_refresh(Refresh::Memories),
        _ => {}
    }
}

// Workspace

fn handle_workspace(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.file_preview = None,
        KeyCode::Char('j') | KeyCode::Down => app.workspace_nav(true),
        KeyCode::Char('k') | KeyCode::Up => app.workspace_nav(false),
        KeyCode::Enter => {
            if let Some(entry) = app.selected_workspace_entry().cloned() {
                if entry.is_dir {
                    app.enter_workspace_dir(entry.path);
                } else {
                    let client = app.client.clone();
                    let tx = app.events_tx();
                    tokio::spawn(async move {
                        let result = client.read_workspace_file(&entry.path).await;
                        let _ = tx.send(BackendEvent::FilePreviewLoaded {
                            path: entry.path,
                            result,
                        });
                    });
                }
            }
        }
        KeyCode::Char('h') | KeyCode::Backspace => app.workspace_parent(),
        KeyCode::Char('n') => {
            app.prompt = Some(Prompt::new(PromptKind::NewDirectory));
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('a') => {
            app.prompt = Some(Prompt::new(PromptKind::NewFile));
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('u') => {
            app.prompt = Some(Prompt::new(PromptKind::UploadFile));
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('d') => {
            if let Some(entry) = app.selected_workspace_entry().cloned() {
                let client = app.client.clone();
                spawn_mutation(app, Refresh::Workspace, async move {
                    client.delete_workspace_entry(&entry.path).await
                });
            }
        }
        KeyCode::Char('r') => app.request_refresh(Refresh::Workspace),
        _ => {}
    }
}

// Training

fn handle_training(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.datasets_nav(true),
        KeyCode::Char('k') | KeyCode::Up => app.datasets_nav(false),
        KeyCode::Char('u') => {
            app.prompt = Some(Prompt::new(PromptKind::UploadTrainingData));
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('d') => {
            if let Some(dataset) = app.selected_dataset().cloned() {
                let client = app.client.clone();
                spawn_mutation(app, Refresh::TrainingData, async move {
                    client.delete_training_data(&dataset.id).await
                });
            }
        }
        KeyCode::Char('s') => {
            if let Some(dataset) = app.selected_dataset().cloned() {
                let client = app.client.clone();
                spawn_mutation(app, Refresh::Training, async move {
                    client.start_training(&dataset.id).await.map(|_| ())
                });
            } else {
                app.report_error("Select a dataset to train on");
            }
        }
        KeyCode::Char('c') => {
            let client = app.client.clone();
            spawn_mutation(app, Refresh::Training, async move {
                client.cancel_training().await
            });
        }
        KeyCode::Char('r') => app.request_refresh(Refresh::Training),
        _ => {}
    }
}

// Settings

fn handle_settings(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => app.models_nav(true),
        KeyCode::Char('k') | KeyCode::Up => app.models_nav(false),
        KeyCode::Enter => {
            if let Some(model) = app.selected_model().cloned() {
                let client = app.client.clone();
                spawn_mutation(app, Refresh::Models, async move {
                    client.select_model(&model.name).await
                });
            }
        }
        KeyCode::Char('t') => {
            app.theme = app.theme.next();
            if let Err(e) = Config::save_theme(app.theme) {
                app.report_error(format!("Saving theme failed: {}", e));
            }
        }
        KeyCode::Char('S') => {
            app.streaming_enabled = !app.streaming_enabled;
            app.report_info(if app.streaming_enabled {
                "Streaming replies on"
            } else {
                "Streaming replies off"
            });
        }
        KeyCode::Char('n') => {
            let mut prompt = Prompt::new(PromptKind::DisplayName);
            if let Some(name) = &app.display_name {
                prompt.value = name.clone();
                prompt.cursor = prompt.value.chars().count();
            }
            app.prompt = Some(prompt);
            app.input_mode = InputMode::Editing;
        }
        KeyCode::Char('r') => app.request_refresh(Refresh::Models),
        _ => {}
    }
}

// Generic single-line prompt

fn handle_prompt_key(app: &mut App, key: KeyEvent) {
    let Some(prompt) = app.prompt.as_mut() else {
        return;
    };

    match key.code {
        KeyCode::Esc => {
            app.prompt = None;
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => submit_prompt(app),
        KeyCode::Backspace => {
            if prompt.cursor > 0 {
                prompt.cursor -= 1;
                let byte_pos = char_to_byte_index(&prompt.value, prompt.cursor);
                prompt.value.remove(byte_pos);
            }
        }
        KeyCode::Left => prompt.cursor = prompt.cursor.saturating_sub(1),
        KeyCode::Right => {
            let len = prompt.value.chars().count();
            prompt.cursor = (prompt.cursor + 1).min(len);
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(&prompt.value, prompt.cursor);
            prompt.value.insert(byte_pos, c);
            prompt.cursor += 1;
        }
        _ => {}
    }
}

fn submit_prompt(app: &mut App) {
    let Some(prompt) = app.prompt.take() else {
        return;
    };
    app.input_mode = InputMode::Normal;

    let value = prompt.value.trim().to_string();
    if value.is_empty() {
        app.report_error("Nothing entered");
        return;
    }

    match prompt.kind {
        PromptKind::NewMemory => {
            let client = app.client.clone();
            spawn_mutation(app, Refresh::Memories, async move {
                client.create_memory(&value).await.map(|_| ())
            });
        }
        PromptKind::NewDirectory => {
            let path = app.workspace_child_path(&value);
            let client = app.client.clone();
            spawn_mutation(app, Refresh::Workspace, async move {
                client.create_workspace_dir(&path).await
            });
        }
        PromptKind::NewFile => {
            let path = app.workspace_child_path(&value);
            let client = app.client.clone();
            spawn_mutation(app, Refresh::Workspace, async move {
                client.write_workspace_file(&path, "").await
            });
        }
        PromptKind::UploadFile | PromptKind::UploadTrainingData => {
            let bytes = match std::fs::read(&value) {
                Ok(bytes) => bytes,
                Err(e) => {
                    app.report_error(format!("Cannot read {}: {}", value, e));
                    return;
                }
            };
            let filename = value
                .rsplit('/')
                .next()
                .unwrap_or(value.as_str())
                .to_string();
            let client = app.client.clone();
            if prompt.kind == PromptKind::UploadFile {
                spawn_mutation(app, Refresh::Workspace, async move {
                    client.upload_workspace_file(&filename, bytes).await
                });
            } else {
                spawn_mutation(app, Refresh::TrainingData, async move {
                    client.upload_training_data(&filename, bytes).await.map(|_| ())
                });
            }
        }
        PromptKind::DisplayName => {
            if let Err(e) = Config::save_display_name(&value) {
                app.report_error(format!("Saving display name failed: {}", e));
                return;
            }
            app.display_name = Some(value);
        }
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollDown => match app.screen {
            Screen::Chat => app.chat_scroll = app.chat_scroll.saturating_add(3),
            Screen::Profiles => app.profiles_nav(true),
            Screen::Memories => app.memories_nav(true),
            Screen::Workspace => app.workspace_nav(true),
            Screen::Training => app.datasets_nav(true),
            Screen::Settings => app.models_nav(true),
        },
        MouseEventKind::ScrollUp => match app.screen {
            Screen::Chat => app.chat_scroll = app.chat_scroll.saturating_sub(3),
            Screen::Profiles => app.profiles_nav(false),
            Screen::Memories => app.memories_nav(false),
            Screen::Workspace => app.workspace_nav(false),
            Screen::Training => app.datasets_nav(false),
            Screen::Settings => app.models_nav(false),
        },
        _ => {}
    }
}
