use thiserror::Error;

/// The seven client-facing error kinds from spec §7. No stack traces or
/// internal detail ever cross this boundary; every component error in this
/// workspace is translated down to one of these before it reaches a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Unauthorized,
    NotFound,
    Conflict,
    InvalidInput,
    Timeout,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::InvalidInput => "invalid_input",
            Self::Timeout => "timeout",
            Self::Internal => "internal",
        }
    }
}

/// Implemented by every component error enum so the gateway can translate
/// it into a client-facing code without matching on error internals.
pub trait IntoErrorCode {
    fn code(&self) -> ErrorCode;
}

/// Error surface of the KV/Pub-Sub store collaborator (C1).
#[derive(Debug, Error)]
pub enum KvError {
    #[error("value for key {0} is not the expected shape")]
    MalformedValue(String),
    #[error("compare-and-set conflict on key {0}")]
    CasConflict(String),
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl IntoErrorCode for KvError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::CasConflict(_) => ErrorCode::Conflict,
            _ => ErrorCode::Internal,
        }
    }
}

/// Error surface of the durable Repository collaborator (C2).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{resource}:{identifier} does not exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl IntoErrorCode for RepositoryError {
    fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::Conflict { .. } => ErrorCode::Conflict,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }
}
