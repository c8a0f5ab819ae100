use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::storage::StoreFailure;

/// Failures surfaced by the data endpoint. Every variant renders as a
/// `{ "message": ... }` JSON body; the messages are the user-facing
/// Portuguese strings the front end displays as notifications.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The POST body is not a snapshot-shaped object, or a record in it
    /// fails to parse. The whole batch is rejected.
    #[error("Formato de dados inválido.")]
    InvalidPayload,

    /// The caller's `If-Match` revision no longer matches the stored
    /// snapshot.
    #[error("Os dados foram alterados por outra sessão. Recarregue a página e tente novamente.")]
    RevisionConflict,

    #[error("Erro interno do servidor ao buscar dados.")]
    ReadFailed(#[source] anyhow::Error),

    #[error("Erro interno do servidor ao salvar dados.")]
    WriteFailed(#[source] anyhow::Error),
}

impl GatewayError {
    fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidPayload => StatusCode::BAD_REQUEST,
            GatewayError::RevisionConflict => StatusCode::CONFLICT,
            GatewayError::ReadFailed(_) | GatewayError::WriteFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreFailure> for GatewayError {
    fn from(failure: StoreFailure) -> Self {
        match failure {
            StoreFailure::RevisionMismatch { .. } => GatewayError::RevisionConflict,
            StoreFailure::Backend(source) => GatewayError::WriteFailed(source),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            GatewayError::ReadFailed(source) | GatewayError::WriteFailed(source) => {
                tracing::error!("storage failure: {source:#}");
            }
            GatewayError::RevisionConflict => {
                tracing::warn!("rejected stale snapshot replace");
            }
            GatewayError::InvalidPayload => {}
        }

        let body = Json(json!({ "message": self.to_string() }));
        (self.status(), body).into_response()
    }
}
