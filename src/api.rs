use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Uniform timeout for every outbound request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend error {status}: {message}")]
    Backend { status: u16, message: String },
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize, Debug, Clone)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub model_path: Option<String>,
    #[serde(default)]
    pub active: bool,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewProfile {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Memory {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Serialize)]
struct NewMemory<'a> {
    content: &'a str,
}

#[derive(Deserialize, Debug, Clone)]
pub struct WorkspaceEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Deserialize)]
struct WorkspaceListing {
    entries: Vec<WorkspaceEntry>,
}

#[derive(Deserialize)]
struct WorkspaceFile {
    content: String,
}

#[derive(Serialize)]
struct WorkspaceWrite<'a> {
    path: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WorkspaceDir<'a> {
    path: &'a str,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub loaded: bool,
}

#[derive(Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Serialize)]
struct ModelSelect<'a> {
    name: &'a str,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TrainingDataset {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Serialize)]
struct TrainingStart<'a> {
    dataset_id: &'a str,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TrainingStatus {
    pub state: String,
    #[serde(default)]
    pub progress: Option<f32>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TrainingStatus {
    pub fn is_running(&self) -> bool {
        matches!(self.state.as_str(), "running" | "starting")
    }
}

#[derive(Deserialize)]
struct TrainingLog {
    #[serde(default)]
    lines: Vec<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct ChatReply {
    response: String,
}

/// Error payload the backend attaches to non-2xx responses.
#[derive(Deserialize)]
struct BackendError {
    #[serde(alias = "detail")]
    error: Option<String>,
}

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success response into `ApiError::Backend`, pulling the
    /// message out of the error payload when one is present.
    async fn check(response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<BackendError>()
            .await
            .ok()
            .and_then(|e| e.error)
            .unwrap_or_else(|| status.to_string());

        Err(ApiError::Backend {
            status: status.as_u16(),
            message,
        })
    }

    // Health

    pub async fn health(&self) -> ApiResult<HealthStatus> {
        let response = self.client.get(self.url("/api/health")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    // Profiles

    pub async fn list_profiles(&self) -> ApiResult<Vec<Profile>> {
        let response = self.client.get(self.url("/api/profiles")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn create_profile(&self, profile: &NewProfile) -> ApiResult<Profile> {
        debug!(name = %profile.name, "creating profile");
        let response = self
            .client
            .post(self.url("/api/profiles"))
            .json(profile)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn activate_profile(&self, id: &str) -> ApiResult<()> {
        let url = self.url(&format!("/api/profiles/{}/activate", id));
        let response = self.client.post(url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn update_profile(&self, id: &str, patch: &ProfilePatch) -> ApiResult<Profile> {
        let url = self.url(&format!("/api/profiles/{}", id));
        let response = self.client.put(url).json(patch).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn delete_profile(&self, id: &str) -> ApiResult<()> {
        let url = self.url(&format!("/api/profiles/{}", id));
        let response = self.client.delete(url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    // Memories

    pub async fn list_memories(&self) -> ApiResult<Vec<Memory>> {
        let response = self.client.get(self.url("/api/memories")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn create_memory(&self, content: &str) -> ApiResult<Memory> {
        let response = self
            .client
            .post(self.url("/api/memories"))
            .json(&NewMemory { content })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn delete_memory(&self, id: &str) -> ApiResult<()> {
        let url = self.url(&format!("/api/memories/{}", id));
        let response = self.client.delete(url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    // Workspace

    pub async fn list_workspace(&self, path: &str) -> ApiResult<Vec<WorkspaceEntry>> {
        let response = self
            .client
            .get(self.url("/api/workspace"))
            .query(&[("path", path)])
            .send()
            .await?;
        let listing: WorkspaceListing = Self::check(response).await?.json().await?;
        Ok(listing.entries)
    }

    pub async fn read_workspace_file(&self, path: &str) -> ApiResult<String> {
        let response = self
            .client
            .get(self.url("/api/workspace/file"))
            .query(&[("path", path)])
            .send()
            .await?;
        let file: WorkspaceFile = Self::check(response).await?.json().await?;
        Ok(file.content)
    }

    pub async fn write_workspace_file(&self, path: &str, content: &str) -> ApiResult<()> {
        let response = self
            .client
            .put(self.url("/api/workspace/file"))
            .json(&WorkspaceWrite { path, content })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn create_workspace_dir(&self, path: &str) -> ApiResult<()> {
        let response = self
            .client
            .post(self.url("/api/workspace/dir"))
            .json(&WorkspaceDir { path })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn delete_workspace_entry(&self, path: &str) -> ApiResult<()> {
        let response = self
            .client
            .delete(self.url("/api/workspace"))
            .query(&[("path", path)])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn upload_workspace_file(&self, filename: &str, bytes: Vec<u8>) -> ApiResult<()> {
        debug!(filename, len = bytes.len(), "uploading workspace file");
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(self.url("/api/workspace/upload"))
            .multipart(form)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    // Models

    pub async fn list_models(&self) -> ApiResult<Vec<ModelInfo>> {
        let response = self.client.get(self.url("/api/models")).send().await?;
        let models: ModelsResponse = Self::check(response).await?.json().await?;
        Ok(models.models)
    }

    pub async fn select_model(&self, name: &str) -> ApiResult<()> {
        let response = self
            .client
            .post(self.url("/api/models/select"))
            .json(&ModelSelect { name })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    // Training

    pub async fn upload_training_data(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> ApiResult<TrainingDataset> {
        debug!(filename, len = bytes.len(), "uploading training data");
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .client
            .post(self.url("/api/training/data"))
            .multipart(form)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn list_training_data(&self) -> ApiResult<Vec<TrainingDataset>> {
        let response = self
            .client
            .get(self.url("/api/training/data"))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn delete_training_data(&self, id: &str) -> ApiResult<()> {
        let url = self.url(&format!("/api/training/data/{}", id));
        let response = self.client.delete(url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn start_training(&self, dataset_id: &str) -> ApiResult<TrainingStatus> {
        let response = self
            .client
            .post(self.url("/api/training/start"))
            .json(&TrainingStart { dataset_id })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn training_status(&self) -> ApiResult<TrainingStatus> {
        let response = self
            .client
            .get(self.url("/api/training/status"))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn training_log(&self) -> ApiResult<Vec<String>> {
        let response = self.client.get(self.url("/api/training/log")).send().await?;
        let log: TrainingLog = Self::check(response).await?.json().await?;
        Ok(log.lines)
    }

    pub async fn cancel_training(&self) -> ApiResult<()> {
        let response = self
            .client
            .post(self.url("/api/training/cancel"))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    // Chat

    /// Synchronous chat mode: one request, whole reply at once.
    pub async fn chat(&self, message: &str) -> ApiResult<String> {
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&ChatRequest { message })
            .send()
            .await?;
        let reply: ChatReply = Self::check(response).await?.json().await?;
        Ok(reply.response)
    }

    /// Open the streaming chat endpoint. The caller owns consuming the body;
    /// dropping the response closes the connection.
    pub async fn open_chat_stream(&self, message: &str) -> ApiResult<Response> {
        let response = self
            .client
            .get(self.url("/api/chat/stream"))
            .query(&[("message", message)])
            .send()
            .await?;
        Self::check(response).await
    }
}
