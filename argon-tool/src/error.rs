use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArgError {
    #[error("API key not found. Set GEMINI_API_KEY or configure ~/.config/argon/config.toml")]
    ApiKeyNotFound,

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session error: {0}")]
    Session(#[from] argon_core::SessionError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("{0}")]
    QueryFailed(String),
}
