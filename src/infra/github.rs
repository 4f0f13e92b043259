//! Repository contents client used by deploys.

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, header};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::{
    application::deploy::{ContentSource, FetchError},
    config::DeploySettings,
};

use super::error::InfraError;

const USER_AGENT: &str = concat!("pressbox/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

/// Fetches file contents through the repository contents API.
#[derive(Clone)]
pub struct GitHubContents {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GitHubContents {
    pub fn new(settings: &DeploySettings) -> Result<Self, InfraError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            api_base: settings.api_base.clone(),
            token: settings.token.clone(),
        })
    }

    fn contents_url(&self, repository: &str, path: &str, branch: &str) -> Result<Url, FetchError> {
        let url_error = |message: String| FetchError::Url {
            path: path.to_string(),
            message,
        };
        let mut url = Url::parse(&self.api_base).map_err(|err| url_error(err.to_string()))?;
        // Segments are percent-encoded, so `#` and `?` stay part of the file name.
        url.path_segments_mut()
            .map_err(|()| url_error(format!("`{}` cannot be a base URL", self.api_base)))?
            .pop_if_empty()
            .push("repos")
            .extend(repository.split('/'))
            .push("contents")
            .extend(path.split('/'));
        url.query_pairs_mut().append_pair("ref", branch);
        Ok(url)
    }
}

#[async_trait]
impl ContentSource for GitHubContents {
    async fn fetch(
        &self,
        repository: &str,
        path: &str,
        branch: &str,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.contents_url(repository, path, branch)?;
        debug!(%url, "fetching repository contents");

        let mut request = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("token {token}"));
        }

        let transport = |err: reqwest::Error| FetchError::Transport {
            path: path.to_string(),
            message: err.to_string(),
        };

        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let payload: ContentsResponse = response.json().await.map_err(|err| FetchError::Decode {
            path: path.to_string(),
            message: err.to_string(),
        })?;
        decode_content(path, payload)
    }
}

fn decode_content(path: &str, payload: ContentsResponse) -> Result<Vec<u8>, FetchError> {
    match payload.encoding.as_str() {
        "base64" => {
            let compact: String = payload
                .content
                .chars()
                .filter(|ch| !ch.is_ascii_whitespace())
                .collect();
            STANDARD.decode(compact).map_err(|err| FetchError::Decode {
                path: path.to_string(),
                message: err.to_string(),
            })
        }
        "utf-8" | "utf8" => Ok(payload.content.into_bytes()),
        other => Err(FetchError::UnsupportedEncoding {
            path: path.to_string(),
            encoding: other.to_string(),
        }),
    }
}
