use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("server error: {0}")]
    Server(String),
    #[error("update command `{command}` failed: {message}")]
    UpdateCommand { command: String, message: String },
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::Server(message.into())
    }
}
