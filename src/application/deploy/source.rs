use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid content URL for `{path}`: {message}")]
    Url { path: String, message: String },
    #[error("request for `{path}` failed: {message}")]
    Transport { path: String, message: String },
    #[error("content API answered {status} for `{path}`: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },
    #[error("content API returned `{encoding}` content for `{path}`")]
    UnsupportedEncoding { path: String, encoding: String },
    #[error("failed to decode content of `{path}`: {message}")]
    Decode { path: String, message: String },
}

/// Where changed files are fetched from during a deploy.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Raw bytes of `path` in `repository` (`owner/name`) at `branch`.
    async fn fetch(
        &self,
        repository: &str,
        path: &str,
        branch: &str,
    ) -> Result<Vec<u8>, FetchError>;
}
