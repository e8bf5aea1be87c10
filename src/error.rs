use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Authentication error: {0}")]
    Authentication(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GenError {
    /// Process exit code for the CLI. Zero is never returned.
    pub fn exit_code(&self) -> i32 {
        match self {
            GenError::Configuration(_) => 2,
            GenError::Validation(_) => 3,
            GenError::NotFound(_) => 4,
            GenError::Authentication(_) => 5,
            GenError::Provider(_) => 6,
            GenError::Io(_) => 7,
            GenError::Serialization(_) => 1,
        }
    }
}

impl From<std::io::Error> for GenError {
    fn from(err: std::io::Error) -> Self {
        GenError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GenError {
    fn from(err: serde_json::Error) -> Self {
        GenError::Serialization(err.to_string())
    }
}

/// Every transport failure is a failed remote call.
impl From<reqwest::Error> for GenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenError::Provider(format!("request timed out: {}", err))
        } else if err.is_connect() {
            GenError::Provider(format!("cannot reach provider: {}", err))
        } else {
            GenError::Provider(format!("request failed: {}", err))
        }
    }
}

pub type Result<T> = std::result::Result<T, GenError>;
