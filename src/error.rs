use thiserror::Error;

/// Errors surfaced to registration and unregistration handlers.
#[derive(Debug, Error)]
pub enum EntrigError {
    #[error("SDK not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("an interactive surface is required to request notification permission")]
    PermissionSurfaceUnavailable,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("backend rejected request ({status}): {body}")]
    BackendRejected { status: u16, body: String },

    #[error("no registration found")]
    NotRegistered,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("token store error: {0}")]
    Storage(String),

    #[error("platform error: {0}")]
    Platform(String),
}

impl EntrigError {
    pub fn malformed(status: u16, detail: impl Into<String>) -> Self {
        Self::BackendRejected {
            status,
            body: format!("malformed response: {}", detail.into()),
        }
    }
}

impl From<std::io::Error> for EntrigError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for EntrigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T, E = EntrigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = EntrigError::BackendRejected {
            status: 401,
            body: "bad key".to_string(),
        };
        assert_eq!(err.to_string(), "backend rejected request (401): bad key");

        let err = EntrigError::malformed(200, "missing id");
        assert!(err.to_string().contains("malformed response: missing id"));
        assert_eq!(EntrigError::NotRegistered.to_string(), "no registration found");
    }
}
