//! Authenticated HTTP client for the portal REST API
//!
//! Wraps reqwest::Client with bearer token injection and status checking.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

use crate::auth::TokenStore;
use crate::config::Config;

/// Non-success HTTP status returned by the portal.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("401 Unauthorized for {url}. Token may be invalid -- run 'portal login'.")]
    Unauthorized { url: String },
    #[error("403 Forbidden for {url}: {body}")]
    Forbidden { url: String, body: String },
    #[error("HTTP {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
}

impl HttpError {
    pub fn status(&self) -> u16 {
        match self {
            HttpError::Unauthorized { .. } => 401,
            HttpError::Forbidden { .. } => 403,
            HttpError::Status { status, .. } => *status,
        }
    }
}

/// List endpoints answer with either a bare array or `{ "data": [...] }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListResponse<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListResponse::Bare(items) => items,
            ListResponse::Wrapped { data } => data,
        }
    }
}

/// Authenticated client for the portal backend.
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl PortalClient {
    /// Load config and build client.
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config
            .get_access_token()
            .context("No access token. Run 'portal login' first.")?;
        if token.is_expired() {
            bail!("Access token expired. Run 'portal login'.");
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.base_url()?,
            token: token.token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET request with bearer auth.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        self.get_with_query(path, &[]).await
    }

    /// GET request with bearer auth and query parameters.
    pub async fn get_with_query(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let url = self.url(path);
        tracing::debug!("GET {}", url);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        check_response(resp, &url).await
    }

    /// POST request with bearer auth and a JSON body.
    pub async fn post<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let url = self.url(path);
        tracing::debug!("POST {}", url);

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        check_response(resp, &url).await
    }

    /// DELETE request with bearer auth.
    pub async fn delete(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.url(path);
        tracing::debug!("DELETE {}", url);

        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("DELETE {} failed", url))?;

        check_response(resp, &url).await
    }

    /// GET a JSON value.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        self.get(path)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))
    }

    /// GET a JSON list, accepting either list envelope.
    pub async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<Vec<T>> {
        let body: ListResponse<T> = self
            .get_with_query(path, query)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))?;
        Ok(body.into_vec())
    }
}

/// Percent-encode a single path segment.
pub fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Check HTTP response status code and return a typed error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(HttpError::Unauthorized {
            url: url.to_string(),
        }
        .into());
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let err = if status == reqwest::StatusCode::FORBIDDEN {
            HttpError::Forbidden {
                url: url.to_string(),
                body,
            }
        } else {
            HttpError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            }
        };
        return Err(err.into());
    }
    Ok(resp)
}
