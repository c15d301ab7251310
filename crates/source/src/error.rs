use analysis::NormalizeError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("chapter `{0}` was not found in any source")]
    NotFound(String),
    #[error("remote source did not answer within {0:?}")]
    RemoteTimeout(Duration),
    #[error("remote source returned {status}: {message}")]
    RemoteError { status: u16, message: String },
    #[error("remote source unreachable: {0}")]
    RemoteUnreachable(String),
    #[error("malformed document: {0}")]
    MalformedDocument(String),
}

impl SourceError {
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::NotFound(_) => "not_found",
            SourceError::RemoteTimeout(_) => "remote_timeout",
            SourceError::RemoteError { .. } => "remote_error",
            SourceError::RemoteUnreachable(_) => "remote_unreachable",
            SourceError::MalformedDocument(_) => "malformed_document",
        }
    }

    /// True when the remote produced an answer, even a useless one.
    /// Feeds the connectivity flag.
    pub fn remote_answered(&self) -> bool {
        !matches!(self, SourceError::RemoteTimeout(_) | SourceError::RemoteUnreachable(_))
    }
}

impl From<NormalizeError> for SourceError {
    fn from(e: NormalizeError) -> Self {
        SourceError::MalformedDocument(e.to_string())
    }
}
