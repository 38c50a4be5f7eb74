//! HTTP backend client
//!
//! Talks JSON to the diary API and sends file bytes straight to storage with
//! a presigned multipart POST.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use super::Backend;
use crate::config::BackendConfig;
use crate::error::{BackendError, Result};
use crate::types::{EntryId, FileMetadata, Post, UploadDestination, UploadFile, UploadStatusReport};

/// Body of the upload-status request
#[derive(Debug, Serialize)]
struct StatusRequest<'a> {
    keys: &'a [String],
}

/// Client for the diary backend API
pub struct HttpBackend {
    base_url: String,
    api_key: Option<SecretString>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.api_key.is_some())
            .finish()
    }
}

impl HttpBackend {
    #[instrument(skip(config), fields(base_url = %config.base_url))]
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let timeout = config.timeout()?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Network(format!("Failed to build HTTP client: {}", e)))?;

        tracing::debug!("Creating backend client");
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().map(SecretString::from),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn entry_url(&self, entry_id: EntryId, path: &str) -> String {
        format!("{}/entries/{}/{}", self.base_url, entry_id, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(api_key) => request.bearer_auth(api_key.expose_secret()),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await.map_err(|e| {
            tracing::error!("Request failed: {}", e);
            BackendError::Network(format!("Request failed: {}", e))
        })?;

        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let body = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse response: {}", e);
            BackendError::Decode(format!("Failed to parse response: {}", e))
        })?;
        Ok(body)
    }
}

/// Map non-success statuses onto `BackendError`
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .await
        .ok()
        .filter(|body| !body.trim().is_empty())
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("no reason").to_string());

    tracing::error!("Backend returned error: {}", status);
    Err(status_error(status, message).into())
}

fn status_error(status: StatusCode, message: String) -> BackendError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        BackendError::RateLimit(message)
    } else {
        BackendError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Presigned-POST form: every upload field first, then the file itself
fn transfer_form(destination: &UploadDestination, file: &UploadFile) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in &destination.upload_fields {
        form = form.text(name.clone(), value.clone());
    }

    let mut part = Part::bytes(file.bytes.clone()).file_name(file.name.clone());
    if let Some(mimetype) = file.mime_type() {
        part = part
            .mime_str(mimetype.as_str())
            .map_err(|e| BackendError::Transfer(format!("Invalid content type: {}", e)))?;
    }

    Ok(form.part("file", part))
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(skip(self, metadata), fields(name = %metadata.name, size = metadata.size))]
    async fn request_upload_destination(
        &self,
        entry_id: EntryId,
        metadata: &FileMetadata,
    ) -> Result<UploadDestination> {
        let url = self.entry_url(entry_id, "uploads");
        tracing::debug!("Requesting upload destination at {}", url);

        let destination: UploadDestination = self.send_json(self.client.post(&url).json(metadata)).await?;

        tracing::debug!(key = %destination.key, "Upload destination issued");
        Ok(destination)
    }

    #[instrument(skip(self, destination, file), fields(key = %destination.key, size = file.size()))]
    async fn transfer_file(&self, destination: &UploadDestination, file: &UploadFile) -> Result<()> {
        let form = transfer_form(destination, file)?;

        // Presigned destinations carry their own authorization
        let response = self
            .client
            .post(&destination.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Transfer failed: {}", e);
                BackendError::Network(format!("Transfer failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!("Storage rejected transfer: {}", status);
            return Err(BackendError::Transfer(format!("Storage returned: {}", status)).into());
        }

        tracing::debug!("Transfer complete");
        Ok(())
    }

    #[instrument(skip(self, keys), fields(keys = keys.len()))]
    async fn poll_upload_status(
        &self,
        entry_id: EntryId,
        keys: &[String],
    ) -> Result<Vec<UploadStatusReport>> {
        let url = self.entry_url(entry_id, "uploads/status");
        let body = StatusRequest { keys };

        self.send_json(self.client.post(&url).json(&body)).await
    }

    #[instrument(skip(self))]
    async fn load_posts_for_editing(&self, entry_id: EntryId) -> Result<Vec<Post>> {
        let url = self.entry_url(entry_id, "posts");
        tracing::debug!("Loading posts from {}", url);

        self.send_json(self.client.get(&url)).await
    }

    #[instrument(skip(self, posts), fields(posts = posts.len()))]
    async fn save_posts(&self, entry_id: EntryId, posts: &[Post]) -> Result<()> {
        let url = self.entry_url(entry_id, "posts");
        tracing::debug!("Saving posts to {}", url);

        self.send(self.client.put(&url).json(posts)).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn config(base_url: &str) -> BackendConfig {
        BackendConfig {
            base_url: base_url.to_string(),
            api_key: Some("secret-token".to_string()),
            timeout: "5s".to_string(),
        }
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let backend = HttpBackend::new(&config("https://diary.example.com/api/")).unwrap();
        assert_eq!(backend.base_url(), "https://diary.example.com/api");
    }

    #[test]
    fn test_new_rejects_invalid_timeout() {
        let mut config = config("https://diary.example.com/api");
        config.timeout = "soon".to_string();

        assert!(HttpBackend::new(&config).is_err());
    }

    #[test]
    fn test_entry_urls() {
        let backend = HttpBackend::new(&config("https://diary.example.com/api")).unwrap();
        let entry: EntryId = "67e55044-10b1-426f-9247-bb680e5fe0c8".parse().unwrap();

        assert_eq!(
            backend.entry_url(entry, "uploads/status"),
            "https://diary.example.com/api/entries/67e55044-10b1-426f-9247-bb680e5fe0c8/uploads/status"
        );
    }

    #[test]
    fn test_debug_hides_token() {
        let backend = HttpBackend::new(&config("https://diary.example.com/api")).unwrap();
        let debug = format!("{:?}", backend);

        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("authenticated: true"));
    }

    #[test]
    fn test_status_error_mapping() {
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "slow down".to_string()),
            BackendError::RateLimit("slow down".to_string())
        );

        let error = status_error(StatusCode::BAD_GATEWAY, "upstream".to_string());
        assert!(error.is_transient());

        let error = status_error(StatusCode::UNPROCESSABLE_ENTITY, "too large".to_string());
        assert_eq!(
            error,
            BackendError::Api {
                status: 422,
                message: "too large".to_string()
            }
        );
        assert!(!error.is_transient());
    }

    #[test]
    fn test_transfer_form_builds() {
        let destination = UploadDestination {
            key: "entries/1/a.jpg".to_string(),
            upload_url: "https://storage.example.com".to_string(),
            upload_fields: BTreeMap::from([
                ("key".to_string(), "entries/1/a.jpg".to_string()),
                ("policy".to_string(), "abc".to_string()),
            ]),
        };
        let file = UploadFile::new("a.jpg", None, vec![0xFF, 0xD8, 0xFF]);

        let form = transfer_form(&destination, &file).unwrap();
        assert!(!form.boundary().is_empty());
    }

    #[test]
    fn test_status_request_shape() {
        let keys = vec!["k1".to_string(), "k2".to_string()];
        let json = serde_json::to_value(StatusRequest { keys: &keys }).unwrap();

        assert_eq!(json, serde_json::json!({ "keys": ["k1", "k2"] }));
    }
}
