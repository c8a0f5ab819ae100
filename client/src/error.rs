use thiserror::Error;

/// Failures surfaced by the client store. Every variant renders as the
/// user-facing Portuguese message the UI shows as a notification; none
/// of them halt the application, and the in-memory collections stay
/// usable after any of them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The server could not be reached, timed out, or answered with a
    /// server-side failure. Reads may be retried; writes never are.
    #[error("{0}")]
    Transient(String),

    /// The snapshot on the server moved past the revision this session
    /// loaded. The caller must reload and reapply its change.
    #[error("Os dados foram alterados por outra sessão. Recarregue a página e tente novamente.")]
    Conflict,

    /// The gateway refused the payload without applying any of it.
    #[error("{0}")]
    Rejected(String),

    /// The operation needs a logged-in session.
    #[error("Você precisa estar logado para realizar esta ação.")]
    NotAuthenticated,

    /// The logged-in account lacks the required capability.
    #[error("Você não tem permissão para realizar esta ação.")]
    Forbidden,

    /// A validation rule rejected the input before any mutation.
    #[error("{0}")]
    Invalid(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}
