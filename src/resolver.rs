//! Client for the external AMP resolution service.
//!
//! One GET per batch: `{base}/convert?gac=<bool>&md=<depth>&q=<url1;url2;...>`.
//! The body is a JSON array with one object per recognised input, each
//! carrying `canonicals`. Only canonicals with `is_amp == false` are kept.

use crate::error::{AmputateError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("amputator/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub guess_and_check: bool,
    pub max_depth: i64,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            guess_and_check: true,
            max_depth: 3,
        }
    }
}

/// Resolves AMP URLs to canonical ones.
///
/// The returned list is deduplicated but is not index-aligned with `urls`
/// and may be shorter or longer. An empty list means the service had no
/// answer; it is not an error here.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, urls: &[String], options: &ResolveOptions) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct ResponseObject {
    #[serde(default)]
    canonicals: Vec<Canonical>,
}

#[derive(Debug, Deserialize)]
struct Canonical {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    is_amp: bool,
}

/// Extract unique non-AMP canonical URLs from a service response body.
pub fn parse_canonical_urls(body: &str) -> Result<Vec<String>> {
    let objects: Vec<ResponseObject> = serde_json::from_str(body).map_err(|e| {
        AmputateError::ResolutionFailed(format!("unable to parse resolver response: {}", e))
    })?;

    let mut seen = HashSet::new();
    let urls = objects
        .into_iter()
        .flat_map(|o| o.canonicals)
        .filter(|c| !c.is_amp)
        .filter_map(|c| c.url)
        .filter(|url| !url.is_empty() && seen.insert(url.clone()))
        .collect();
    Ok(urls)
}

pub struct AmputatorClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl AmputatorClient {
    pub fn new(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn query(urls: &[String], options: &ResolveOptions) -> [(&'static str, String); 3] {
        [
            ("gac", options.guess_and_check.to_string()),
            ("md", options.max_depth.to_string()),
            ("q", urls.join(";")),
        ]
    }
}

#[async_trait]
impl Resolver for AmputatorClient {
    async fn resolve(&self, urls: &[String], options: &ResolveOptions) -> Result<Vec<String>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let endpoint = format!("{}/convert", self.base_url);
        debug!("Resolver: requesting {} URL(s) from {}", urls.len(), endpoint);

        let resp = self
            .client
            .get(&endpoint)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(&Self::query(urls, options))
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            warn!("Resolver: status {} body {}", status, body);
            return Err(AmputateError::ResolutionFailed(format!(
                "resolver returned status {}",
                status.as_u16()
            )));
        }

        let canonical = parse_canonical_urls(&body)?;
        debug!("Resolver: received {} canonical URL(s)", canonical.len());
        Ok(canonical)
    }
}
