use crate::api::{
    ApiResult, HealthStatus, Memory, ModelInfo, Profile, TrainingDataset, TrainingStatus,
    WorkspaceEntry,
};
use crate::stream::StreamEvent;

/// Which list a finished mutation should reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    Profiles,
    Memories,
    Workspace,
    Models,
    TrainingData,
    Training,
    None,
}

/// Results of async backend work, delivered to the UI loop over one channel.
#[derive(Debug)]
pub enum BackendEvent {
    Health(ApiResult<HealthStatus>),
    ProfilesLoaded(ApiResult<Vec<Profile>>),
    MemoriesLoaded(ApiResult<Vec<Memory>>),
    WorkspaceLoaded {
        path: String,
        result: ApiResult<Vec<WorkspaceEntry>>,
    },
    FilePreviewLoaded {
        path: String,
        result: ApiResult<String>,
    },
    ModelsLoaded(ApiResult<Vec<ModelInfo>>),
    TrainingDataLoaded(ApiResult<Vec<TrainingDataset>>),
    TrainingStatusLoaded(ApiResult<TrainingStatus>),
    TrainingLogLoaded(ApiResult<Vec<String>>),
    MutationDone {
        refresh: Refresh,
        result: ApiResult<()>,
    },
    /// Whole reply from the non-streaming chat mode.
    ChatReply {
        turn: u64,
        result: ApiResult<String>,
    },
    /// One decoded event from the active chat stream.
    Stream {
        turn: u64,
        event: StreamEvent,
    },
    /// The stream's connection ended without a terminal payload event.
    StreamDropped {
        turn: u64,
    },
}
