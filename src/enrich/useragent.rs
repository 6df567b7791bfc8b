//! User-agent classification capability

use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::normalize::UNKNOWN;

/// Browser, OS and raw device vocabulary for a user-agent string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAgentInfo {
    pub browser: String,
    pub os: String,
    pub device: String,
}

impl UserAgentInfo {
    pub fn new(
        browser: impl Into<String>,
        os: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            browser: browser.into(),
            os: os.into(),
            device: device.into(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN, UNKNOWN)
    }
}

#[async_trait]
pub trait UserAgentLookup: Send + Sync {
    async fn parse(&self, user_agent: &str) -> Result<UserAgentInfo>;
}

#[derive(Serialize)]
struct ParseRequest<'a> {
    user_agent: &'a str,
}

/// Client for a remote classification service exposing `POST /parse`
pub struct HttpUserAgentLookup {
    client: reqwest::Client,
    parse_url: String,
}

impl HttpUserAgentLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build user-agent service client")?;

        Ok(Self {
            client,
            parse_url: format!("{}/parse", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl UserAgentLookup for HttpUserAgentLookup {
    async fn parse(&self, user_agent: &str) -> Result<UserAgentInfo> {
        let info = self
            .client
            .post(&self.parse_url)
            .json(&ParseRequest { user_agent })
            .send()
            .await
            .context("user-agent service request failed")?
            .error_for_status()
            .context("user-agent service returned an error status")?
            .json::<UserAgentInfo>()
            .await
            .context("user-agent service returned an invalid body")?;

        Ok(info)
    }
}

/// Memoizes successful classifications; failures always reach the inner lookup
pub struct CachedUserAgentLookup {
    inner: Arc<dyn UserAgentLookup>,
    cache: Cache<String, UserAgentInfo>,
}

impl CachedUserAgentLookup {
    pub fn new(inner: Arc<dyn UserAgentLookup>, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(3600))
            .build();

        Self { inner, cache }
    }
}

#[async_trait]
impl UserAgentLookup for CachedUserAgentLookup {
    async fn parse(&self, user_agent: &str) -> Result<UserAgentInfo> {
        if let Some(info) = self.cache.get(user_agent).await {
            return Ok(info);
        }

        let info = self.inner.parse(user_agent).await?;
        self.cache
            .insert(user_agent.to_string(), info.clone())
            .await;
        Ok(info)
    }
}
