use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ETAG, IF_MATCH};
use reqwest::StatusCode;
use shared::Snapshot;
use tracing::warn;

use crate::error::StoreError;

const LOAD_FAILED: &str = "Falha ao carregar dados do servidor.";
const SAVE_FAILED: &str = "Falha ao salvar dados no servidor.";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-all / replace-all contract the store synchronizes through.
///
/// A revision token travels in both directions: `read_all` reports the
/// revision of the snapshot it returns, and `replace_all` can make the
/// write conditional on one, so a stale writer fails with
/// [`StoreError::Conflict`] instead of silently discarding another
/// session's work.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Fetch the complete snapshot together with the revision the
    /// server reports for it.
    async fn read_all(&self) -> Result<(Snapshot, Option<String>), StoreError>;

    /// Replace the entire stored dataset. With a `base_revision` the
    /// write is refused when the stored snapshot no longer matches it;
    /// with `None` the write is unconditional (last write wins).
    /// Returns the revision of the written snapshot when the server
    /// reports one.
    async fn replace_all(
        &self,
        snapshot: &Snapshot,
        base_revision: Option<&str>,
    ) -> Result<Option<String>, StoreError>;
}

/// HTTP gateway speaking to the backend's `GET`/`POST /api/data`
/// resource.
#[derive(Debug, Clone)]
pub struct HttpPersistenceGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPersistenceGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/data", self.base_url)
    }
}

#[async_trait]
impl PersistenceGateway for HttpPersistenceGateway {
    async fn read_all(&self) -> Result<(Snapshot, Option<String>), StoreError> {
        let response = self
            .client
            .get(self.endpoint())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|err| {
                warn!("GET /api/data failed: {err}");
                StoreError::Transient(LOAD_FAILED.to_string())
            })?;

        if !response.status().is_success() {
            warn!("GET /api/data answered {}", response.status());
            return Err(StoreError::Transient(LOAD_FAILED.to_string()));
        }

        let revision = revision_from_headers(response.headers());
        let snapshot = response.json::<Snapshot>().await.map_err(|err| {
            warn!("GET /api/data returned an unreadable body: {err}");
            StoreError::Transient(LOAD_FAILED.to_string())
        })?;
        Ok((snapshot, revision))
    }

    async fn replace_all(
        &self,
        snapshot: &Snapshot,
        base_revision: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        let mut request = self
            .client
            .post(self.endpoint())
            .timeout(REQUEST_TIMEOUT)
            .json(snapshot);
        if let Some(revision) = base_revision {
            request = request.header(IF_MATCH, revision);
        }

        let response = request.send().await.map_err(|err| {
            warn!("POST /api/data failed: {err}");
            StoreError::Transient(SAVE_FAILED.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(revision_from_headers(response.headers()));
        }

        let message = failure_message(response).await;
        warn!("POST /api/data answered {status}");
        Err(classify_write_failure(status, message))
    }
}

/// The `ETag` header value, with any quoting stripped, matching how the
/// server parses `If-Match`.
fn revision_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(ETAG)?.to_str().ok()?;
    let revision = value.trim().trim_matches('"');
    (!revision.is_empty()).then(|| revision.to_string())
}

/// Pull the `{ "message": ... }` body the server attaches to failures.
async fn failure_message(response: reqwest::Response) -> Option<String> {
    let body: serde_json::Value = response.json().await.ok()?;
    body.get("message")?.as_str().map(str::to_string)
}

fn classify_write_failure(status: StatusCode, message: Option<String>) -> StoreError {
    match status {
        StatusCode::CONFLICT => StoreError::Conflict,
        StatusCode::BAD_REQUEST => {
            StoreError::Rejected(message.unwrap_or_else(|| SAVE_FAILED.to_string()))
        }
        _ => StoreError::Transient(message.unwrap_or_else(|| SAVE_FAILED.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let gateway = HttpPersistenceGateway::new("http://localhost:8000/");
        assert_eq!(gateway.endpoint(), "http://localhost:8000/api/data");

        let gateway = HttpPersistenceGateway::new("http://localhost:8000");
        assert_eq!(gateway.endpoint(), "http://localhost:8000/api/data");
    }

    #[test]
    fn test_revision_from_headers_strips_quotes() {
        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("\"abc123\""));
        assert_eq!(revision_from_headers(&headers), Some("abc123".to_string()));

        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("abc123"));
        assert_eq!(revision_from_headers(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn test_revision_from_headers_ignores_missing_or_empty() {
        assert_eq!(revision_from_headers(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(ETAG, HeaderValue::from_static("\"\""));
        assert_eq!(revision_from_headers(&headers), None);
    }

    #[test]
    fn test_write_failures_map_to_error_kinds() {
        assert!(matches!(
            classify_write_failure(StatusCode::CONFLICT, None),
            StoreError::Conflict
        ));

        let rejected = classify_write_failure(
            StatusCode::BAD_REQUEST,
            Some("Formato de dados inválido.".to_string()),
        );
        assert_eq!(rejected.to_string(), "Formato de dados inválido.");
        assert!(matches!(rejected, StoreError::Rejected(_)));

        let server_error = classify_write_failure(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some("Erro interno do servidor ao salvar dados.".to_string()),
        );
        assert!(server_error.is_transient());
        assert_eq!(
            server_error.to_string(),
            "Erro interno do servidor ao salvar dados."
        );
    }

    #[test]
    fn test_write_failure_without_body_falls_back_to_generic_message() {
        let rejected = classify_write_failure(StatusCode::BAD_REQUEST, None);
        assert_eq!(rejected.to_string(), SAVE_FAILED);

        let transient = classify_write_failure(StatusCode::BAD_GATEWAY, None);
        assert_eq!(transient.to_string(), SAVE_FAILED);
    }
}
