//! HTTP client wrapper for the external document store.

use crate::config::get_config;
use crate::status::types::{ChunkStatus, StatusPredicate, StatusRecord, StatusStoreError};
use crate::status::StatusStore;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use uuid::Uuid;

/// Lightweight HTTP client for the document store holding status records.
///
/// The store exposes point reads and writes under `documents/{id}`, creation under
/// `documents`, and predicate queries via the `status_eq`/`status_ne` query parameters.
pub struct HttpStatusStore {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl HttpStatusStore {
    /// Construct a new client using configuration derived from the environment.
    pub fn new() -> Result<Self, StatusStoreError> {
        let config = get_config();
        let client = Client::builder().user_agent("paperstream/0.1").build()?;

        let base_url =
            normalize_base_url(&config.status_store_url).map_err(StatusStoreError::InvalidUrl)?;
        tracing::debug!(url = %base_url, "Initialized status store HTTP client");

        Ok(Self {
            client,
            base_url,
            api_key: config.status_store_api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut req = self.client.request(method, format!("{base}/{path}"));
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn read(&self, id: Uuid) -> Result<StatusRecord, StatusStoreError> {
        let response = self
            .request(Method::GET, &format!("documents/{id}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(StatusStoreError::NotFound(id)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StatusStoreError::UnexpectedStatus { status, body })
            }
        }
    }

    async fn ensure_success(
        &self,
        response: reqwest::Response,
    ) -> Result<(), StatusStoreError> {
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StatusStoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Status store request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl StatusStore for HttpStatusStore {
    async fn create(&self, record: StatusRecord) -> Result<(), StatusStoreError> {
        tracing::debug!(id = %record.id, file = %record.file_name, status = %record.status, "Creating status record");
        let response = self
            .request(Method::POST, "documents")
            .json(&record)
            .send()
            .await?;
        self.ensure_success(response).await
    }

    async fn update_status(&self, id: Uuid, status: ChunkStatus) -> Result<(), StatusStoreError> {
        // Read-modify-write with no optimistic concurrency; the store keeps the last writer.
        let mut record = self.read(id).await?;
        record.status = status;

        let response = self
            .request(Method::PUT, &format!("documents/{id}"))
            .json(&record)
            .send()
            .await?;
        self.ensure_success(response).await?;
        tracing::debug!(%id, %status, "Status record updated");
        Ok(())
    }

    async fn query_by_status(
        &self,
        predicate: StatusPredicate,
    ) -> Result<Vec<StatusRecord>, StatusStoreError> {
        let (param, value) = match predicate {
            StatusPredicate::Is(status) => ("status_eq", status.as_str()),
            StatusPredicate::IsNot(status) => ("status_ne", status.as_str()),
        };

        let response = self
            .request(Method::GET, "documents")
            .query(&[(param, value)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StatusStoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Failed to query status records");
            return Err(error);
        }

        let mut records: Vec<StatusRecord> = response.json().await?;
        records.sort_by(|a, b| {
            a.file_name
                .cmp(&b.file_name)
                .then(a.page_number.cmp(&b.page_number))
        });
        Ok(records)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}
