//! HTTP client for the document analysis backend.
//!
//! The backend extracts structured JSON from uploaded documents (multipart
//! uploads, synchronous or task-based), harmonizes template summaries into a
//! single merged summary, and issues client credentials. Non-2xx responses
//! carry a JSON body with a `detail` string; [`AnalysisClient`] surfaces it
//! through `Error::Analysis`, falling back to a generic message when the body
//! is not parseable.

use std::time::Duration;

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::BackendConfig;
use crate::errors::{Error, Result};
use crate::types::TaskId;

/// Fallback shown when an error response has no parseable `detail`.
pub const GENERIC_ANALYSIS_ERROR: &str = "Failed to upload and analyze document";

/// An uploadable file: name plus raw content.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub name: String,
    pub content: Bytes,
}

impl FilePart {
    pub fn new(name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// File extension, lowercased.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }

    fn mime(&self) -> &'static str {
        match self.extension().as_deref() {
            Some("pdf") => "application/pdf",
            Some("csv") => "text/csv",
            _ => "application/octet-stream",
        }
    }

    fn into_part(self) -> Result<Part> {
        let mime = self.mime();
        Part::bytes(self.content.to_vec())
            .file_name(self.name)
            .mime_str(mime)
            .map_err(Error::from)
    }
}

/// Result of one document extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub nb_pages: u32,
    pub summary: Value,
    #[serde(default)]
    pub template: Option<Value>,
}

/// Aggregate result of a multi-file extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchExtraction {
    pub total_pages: u32,
    pub files_summary: Value,
    pub received_by: Value,
    pub entity_details: Value,
}

/// Issued client credentials. The secret is shown once; the backend keeps
/// only a hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug, Deserialize)]
struct HarmonizeResponse {
    result: Value,
}

/// Makes sure a url has a trailing slash.
///
/// `Url::join` drops the last path segment when the base has no trailing
/// slash ('/api'.join('extract') gives '/extract'), so normalize the base
/// once at construction.
fn ensure_slash(url: &Url) -> Url {
    if url.path().ends_with('/') {
        url.clone()
    } else {
        let mut new_url = url.clone();
        let mut path = new_url.path().to_string();
        path.push('/');
        new_url.set_path(&path);
        new_url
    }
}

/// Client for the analysis backend.
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    client: Client,
    base_url: Url,
}

impl AnalysisClient {
    /// Build a client from config; the timeout applies per request.
    pub fn new(config: &BackendConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: ensure_slash(&config.url),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| Error::Internal {
            operation: format!("construct backend URL for {path}: {e}"),
        })
    }

    /// `POST /extract`: synchronous single-file extraction.
    pub async fn extract(&self, file: FilePart, token: &str) -> Result<Extraction> {
        let url = self.endpoint("extract")?;
        debug!("Uploading {} to {}", file.name, url);

        let form = Form::new().part("file", file.into_part()?);
        let response = self.client.post(url).bearer_auth(token).multipart(form).send().await?;
        Self::parse_json(response).await
    }

    /// `POST /extract-with-template`: synchronous extraction shaped by a
    /// saved template.
    pub async fn extract_with_template(&self, file: FilePart, template_id: &str, token: &str) -> Result<Extraction> {
        let url = self.endpoint("extract-with-template")?;
        debug!("Uploading {} to {} with template {}", file.name, url, template_id);

        let form = Form::new()
            .text("template_id", template_id.to_string())
            .part("file", file.into_part()?);
        let response = self.client.post(url).bearer_auth(token).multipart(form).send().await?;
        Self::parse_json(response).await
    }

    /// `POST /extract-many-with-template/`: extract several files in one
    /// call, aggregated by the backend.
    pub async fn extract_many_with_template(
        &self,
        files: Vec<FilePart>,
        template_id: &str,
        token: &str,
    ) -> Result<BatchExtraction> {
        let url = self.endpoint("extract-many-with-template/")?;
        debug!("Uploading {} files to {} with template {}", files.len(), url, template_id);

        let mut form = Form::new().text("template_id", template_id.to_string());
        for file in files {
            form = form.part("files", file.into_part()?);
        }
        let response = self.client.post(url).bearer_auth(token).multipart(form).send().await?;
        Self::parse_json(response).await
    }

    /// `POST /async-extract[-with-template]`: submit an extraction task.
    ///
    /// # Returns
    /// The opaque task id to poll with [`task_status`](Self::task_status).
    pub async fn async_extract(&self, file: FilePart, template_id: Option<&str>, token: &str) -> Result<TaskId> {
        let (path, form) = match template_id {
            Some(id) => (
                "async-extract-with-template",
                Form::new().text("template_id", id.to_string()),
            ),
            None => ("async-extract", Form::new()),
        };
        let url = self.endpoint(path)?;
        debug!("Submitting {} to {}", file.name, url);

        let form = form.part("file", file.into_part()?);
        let response = self.client.post(url).bearer_auth(token).multipart(form).send().await?;
        Self::parse_json(response).await
    }

    /// `GET /status/{task_id}`: whether an extraction task has finished.
    pub async fn task_status(&self, task_id: &str, token: &str) -> Result<bool> {
        let url = self.endpoint(&format!("status/{task_id}"))?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        Self::parse_json(response).await
    }

    /// `GET /result/{task_id}`: the extraction a finished task produced.
    pub async fn task_result(&self, task_id: &str, token: &str) -> Result<Extraction> {
        let url = self.endpoint(&format!("result/{task_id}"))?;
        let response = self.client.get(url).bearer_auth(token).send().await?;
        Self::parse_json(response).await
    }

    /// `POST /register-client`: provision client credentials for the
    /// authenticated user, creating the user document server-side if needed.
    pub async fn register_client(&self, token: &str) -> Result<ClientCredentials> {
        let url = self.endpoint("register-client")?;
        let response = self.client.post(url).bearer_auth(token).send().await?;
        Self::parse_json(response).await
    }

    /// `POST /regenerate-client-secret`: rotate the secret for a user.
    ///
    /// The backend stores only a hash, so the returned plaintext is shown
    /// once.
    pub async fn regenerate_client_secret(&self, uid: &str) -> Result<ClientCredentials> {
        let url = self.endpoint("regenerate-client-secret")?;
        let response = self
            .client
            .post(url)
            .header("X-User-UID", uid)
            .header("Content-Type", "application/json")
            .send()
            .await?;
        Self::parse_json(response).await
    }

    /// `POST /harmonize-templates`: merge several template summaries into
    /// one. The backend wraps its answer as `{"result": ...}`; this unwraps
    /// it.
    pub async fn harmonize_templates(&self, summaries: &[Value]) -> Result<Value> {
        let url = self.endpoint("harmonize-templates")?;
        debug!("Harmonizing {} summaries via {}", summaries.len(), url);

        let response = self.client.post(url).json(summaries).send().await?;
        let envelope: HarmonizeResponse = Self::parse_json(response).await?;
        Ok(envelope.result)
    }

    /// Check the status, then decode the body. Non-2xx becomes
    /// `Error::Analysis` carrying the backend's `detail` when present.
    async fn parse_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::error_from_body(status.as_u16(), &body));
        }

        let body_text = response.text().await?;
        match serde_json::from_str::<T>(&body_text) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                tracing::error!("Failed to parse analysis backend response as JSON. Error: {}", e);
                tracing::error!("Response body was: {}", body_text);
                Err(e.into())
            }
        }
    }

    fn error_from_body(status: u16, body: &str) -> Error {
        let detail = serde_json::from_str::<ErrorBody>(body)
            .map(|parsed| parsed.detail)
            .unwrap_or_else(|_| GENERIC_ANALYSIS_ERROR.to_string());
        Error::Analysis { status, detail }
    }
}
