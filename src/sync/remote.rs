use async_trait::async_trait;
use reqwest::header::LAST_MODIFIED;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::error::{Error, Result};

/// Outcome of probing one remote file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Found { last_modified: Option<String> },
    Missing,
}

/// Where web image sets come from
///
/// `head` reports whether a file exists; `get` fetches its bytes. Transport
/// failures are errors, a non-200 HEAD is `Probe::Missing`.
#[async_trait]
pub trait Remote: Send + Sync {
    async fn head(&self, url: &str) -> Result<Probe>;
    async fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// `Remote` over plain HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
}

impl HttpRemote {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tbashow/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(Error::HttpClient)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn head(&self, url: &str) -> Result<Probe> {
        let response = self.client.head(url).send().await.map_err(|source| Error::Http {
            url: url.to_string(),
            source,
        })?;

        if response.status() != StatusCode::OK {
            tracing::debug!(url, status = response.status().as_u16(), "not found");
            return Ok(Probe::Missing);
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(Probe::Found { last_modified })
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await.map_err(|source| Error::Http {
            url: url.to_string(),
            source,
        })?;

        if response.status() != StatusCode::OK {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|source| Error::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}
