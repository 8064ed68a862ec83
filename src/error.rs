use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP {0} for {1}")]
    HttpStatus(u16, String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Store corruption: {0}")]
    StoreCorruption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging error: {0}")]
    Logging(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Csv(err.to_string())
    }
}

impl Error {
    /// Errors worth retrying: the remote side or the disk may recover.
    pub fn is_temporary(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Timeout(_) | Error::Io(_) => true,
            Error::HttpStatus(status, _) => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidUrl(_) | Error::Config(_)
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Transport(_) => "TRANSPORT",
            Error::HttpStatus(..) => "HTTP_STATUS",
            Error::Timeout(_) => "TIMEOUT",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::StoreCorruption(_) => "STORE_CORRUPTION",
            Error::Io(_) => "IO_ERROR",
            Error::Csv(_) => "CSV",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Config(_) => "CONFIG",
            Error::Logging(_) => "LOGGING",
        }
    }
}
