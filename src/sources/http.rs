// src/sources/http.rs

//! HTTP plumbing shared by the source adapters.

use std::time::Duration;

use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Result;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Timeout / retry settings for one adapter.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub max_attempts: u8,
    pub backoff: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(15),
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Doubling delay before retry number `attempt` (1-based), capped at 64x `base`.
pub fn backoff_delay(base: Duration, attempt: u8) -> Duration {
    let exp = u32::from(attempt.saturating_sub(1)).min(6);
    base.saturating_mul(1 << exp)
}

/// Thin client wrapper: per-request timeout, bounded retries, exponential backoff.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    settings: HttpSettings,
}

impl HttpFetcher {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&settings.user_agent)
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client, settings })
    }

    /// GET and return the body plus the final URL after redirects.
    pub async fn get_text_with_url(&self, url: &str) -> Result<(String, String)> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            match self.get_once(url).await {
                Ok(ok) => return Ok(ok),
                Err(e) if attempt < self.settings.max_attempts.max(1) => {
                    tracing::debug!(%url, attempt, error = %e, "GET failed, retrying");
                    tokio::time::sleep(backoff_delay(self.settings.backoff, attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        Ok(self.get_text_with_url(url).await?.0)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get_text(url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_once(&self, url: &str) -> Result<(String, String)> {
        let rsp = self.client.get(url).send().await?.error_for_status()?;
        let final_url = rsp.url().to_string();
        let body = rsp.text().await?;
        Ok((body, final_url))
    }
}

/// Slug and coupon extracted from a Udemy course link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdemyLink {
    pub url: String,
    pub slug: Option<String>,
    pub coupon_code: Option<String>,
}

/// Parse `https://www.udemy.com/course/<slug>/?couponCode=<code>`.
///
/// Returns `None` for non-Udemy hosts. The slug is the path segment after
/// `course`, or the last segment when there is no `course` segment.
pub fn parse_udemy_link(raw: &str) -> Option<UdemyLink> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    if !(host == "udemy.com" || host.ends_with(".udemy.com")) {
        return None;
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    let slug = match segments.iter().position(|s| *s == "course") {
        Some(idx) => segments.get(idx + 1).map(|s| s.to_string()),
        None => segments.last().map(|s| s.to_string()),
    };

    let coupon_code = url
        .query_pairs()
        .find(|(k, v)| (k == "couponCode" || k == "coupon") && !v.is_empty())
        .map(|(_, v)| v.into_owned());

    Some(UdemyLink {
        url: raw.to_string(),
        slug,
        coupon_code,
    })
}

/// Resolve `href` against `base`, keeping absolute links unchanged.
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(|u| u.to_string())
}

/// Last non-empty path segment of a URL.
pub fn last_path_segment(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let seg = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(seg.to_string())
}
