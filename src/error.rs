//! Error taxonomy shared by the segmentation, translation and layout stages.
//!
//! Collaborator adapters (OCR, completion providers, inpainting) report
//! `anyhow::Error`; the orchestration layer wraps those into
//! [`Error::CollaboratorFailure`] so callers can tell a broken dependency apart
//! from a structurally invalid model response.

/// Result alias for request-level operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed image or a degenerate text segment.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A completion response failed structural validation. Retryable.
    #[error("schema violation: {0}")]
    SchemaViolation(String),

    /// A retryable failure persisted past the retry budget.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: usize,
        last: Box<Error>,
    },

    /// An external collaborator call itself failed.
    #[error("{collaborator} failed: {source:#}")]
    CollaboratorFailure {
        collaborator: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Text could not be placed inside the image during grid alignment.
    #[error("layout overflow: {0}")]
    LayoutOverflow(String),
}

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Error::SchemaViolation(message.into())
    }

    pub fn collaborator(collaborator: &'static str, source: anyhow::Error) -> Self {
        Error::CollaboratorFailure {
            collaborator,
            source,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SchemaViolation(_) | Error::CollaboratorFailure { .. }
        )
    }
}
