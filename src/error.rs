use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("unsupported file type: {0}")]
    UnsupportedLanguage(String),

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub fn parse(path: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Input(_) => "INVALID_INPUT",
            Self::UnsupportedLanguage(_) => "UNSUPPORTED_FILE_TYPE",
            Self::Parse { .. } => "PARSE_FAILED",
            Self::Persistence(_) => "PERSISTENCE_FAILED",
            Self::Serialization(_) => "SERIALIZATION_FAILED",
            Self::Io(_) => "IO_FAILED",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Input(_) | Self::UnsupportedLanguage(_))
    }
}
