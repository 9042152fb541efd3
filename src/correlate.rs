//! Assembles one auditable [`ResolutionEvent`] per message.
//!
//! Request records mirror the extracted URLs one-to-one. Response records
//! belong to the event as a whole: the resolver does not promise one
//! canonical URL per request, so no positional pairing is attempted.

use crate::cache::CachedResolution;
use crate::extract::domain_name;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlKind {
    Request,
    Response,
}

impl UrlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlKind::Request => "request",
            UrlKind::Response => "response",
        }
    }
}

/// Who sent the message that triggered a resolution, and where.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageMeta {
    pub author_id: String,
    pub author_name: String,
    pub message_id: String,
    pub channel_id: String,
    /// `None` for direct messages.
    pub server_id: Option<String>,
}

/// A request or response URL owned by a [`ResolutionEvent`].
///
/// The domain is derived from the URL at construction and cannot be set
/// independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    pub id: String,
    pub event_id: String,
    pub kind: UrlKind,
    pub position: usize,
    pub url: String,
    /// Answered from the cache rather than the resolver.
    pub cached: bool,
    domain_name: String,
}

impl UrlRecord {
    fn new(event_id: &str, kind: UrlKind, position: usize, url: &str, cached: bool) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            event_id: event_id.to_string(),
            kind,
            position,
            url: url.to_string(),
            cached,
            domain_name: domain_name(url).unwrap_or_default(),
        }
    }

    pub fn domain_name(&self) -> &str {
        &self.domain_name
    }
}

#[derive(Debug, Clone)]
pub struct ResolutionEvent {
    /// Correlation id shared by every [`UrlRecord`] of this event.
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub meta: MessageMeta,
    pub resolver_called: bool,
    pub requests: Vec<UrlRecord>,
    pub responses: Vec<UrlRecord>,
}

impl ResolutionEvent {
    /// Canonical URLs in reply order.
    pub fn response_urls(&self) -> Vec<String> {
        self.responses.iter().map(|r| r.url.clone()).collect()
    }

    pub fn record_count(&self) -> usize {
        self.requests.len() + self.responses.len()
    }
}

/// Where the canonical URLs of one message came from.
#[derive(Debug, Clone, Default)]
pub struct Resolutions {
    /// Cache hits, in the order their request URLs were extracted.
    pub cached: Vec<CachedResolution>,
    /// Resolver output, in the order the resolver returned it.
    pub fresh: Vec<String>,
    /// Whether the external resolver was called for this message.
    pub resolver_called: bool,
}

/// Build the event for `requested` URLs and their `resolutions`.
///
/// Returns `None` when nothing was requested: a response without a request
/// is never recorded. Response URLs appearing more than once across cache
/// and resolver output are recorded once, at their first position.
pub fn assemble(
    meta: &MessageMeta,
    requested: &[String],
    resolutions: &Resolutions,
) -> Option<ResolutionEvent> {
    if requested.is_empty() {
        return None;
    }

    let id = Uuid::now_v7().to_string();

    let requests = requested
        .iter()
        .enumerate()
        .map(|(i, url)| {
            let hit = resolutions.cached.iter().any(|h| &h.request_url == url);
            UrlRecord::new(&id, UrlKind::Request, i, url, hit)
        })
        .collect();

    let mut seen = HashSet::new();
    let cached = resolutions.cached.iter().map(|hit| (hit.url.as_str(), true));
    let fresh = resolutions.fresh.iter().map(|url| (url.as_str(), false));
    let responses = cached
        .chain(fresh)
        .filter(|(url, _)| !url.is_empty() && seen.insert(*url))
        .enumerate()
        .map(|(i, (url, from_cache))| UrlRecord::new(&id, UrlKind::Response, i, url, from_cache))
        .collect();

    Some(ResolutionEvent {
        id,
        created_at: Utc::now(),
        meta: meta.clone(),
        resolver_called: resolutions.resolver_called,
        requests,
        responses,
    })
}
