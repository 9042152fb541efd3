//! The per-message resolution pipeline.
//!
//! text → extracted URLs → cache lookups → one resolver call for the misses
//! → one correlated event → persistence gate → rendered reply.

use crate::cache::{CacheScope, ResolutionCache};
use crate::correlate::{assemble, MessageMeta, ResolutionEvent, Resolutions};
use crate::db::Database;
use crate::error::{AmputateError, Result};
use crate::extract::extract_urls;
use crate::persist::PersistenceGate;
use crate::reply::{format_amputation, ReplyContent};
use crate::resolver::{ResolveOptions, Resolver};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub enum Outcome {
    /// No URLs in the message; nothing was resolved, recorded or rendered.
    NothingToDo,
    Amputated(Amputation),
}

#[derive(Debug)]
pub struct Amputation {
    pub reply: ReplyContent,
    pub event: ResolutionEvent,
    /// `Err` when the resolver failed or had no answer for the misses.
    pub resolution: Result<()>,
    /// Independent of `resolution`: the reply may be sent either way.
    pub persisted: Result<()>,
}

#[derive(Clone)]
pub struct Amputator {
    cache: ResolutionCache,
    resolver: Arc<dyn Resolver>,
    gate: PersistenceGate,
}

impl Amputator {
    pub fn new(db: Database, scope: CacheScope, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            cache: ResolutionCache::new(db.clone(), scope),
            resolver,
            gate: PersistenceGate::new(db),
        }
    }

    pub async fn amputate(&self, meta: &MessageMeta, text: &str, options: &ResolveOptions) -> Outcome {
        let urls = extract_urls(text);
        if urls.is_empty() {
            debug!("No URLs found in message {}", meta.message_id);
            return Outcome::NothingToDo;
        }
        debug!("URLs parsed from message {}: {}", meta.message_id, urls.join(", "));

        let mut resolutions = Resolutions::default();
        let mut misses: Vec<String> = Vec::new();
        for url in &urls {
            match self.cache.lookup(url, meta.server_id.as_deref()).await {
                Ok(Some(hit)) => resolutions.cached.push(hit),
                Ok(None) => {
                    if !misses.contains(url) {
                        misses.push(url.clone());
                    }
                }
                Err(e) => {
                    warn!("Cache lookup failed for {}, treating as miss: {}", url, e);
                    if !misses.contains(url) {
                        misses.push(url.clone());
                    }
                }
            }
        }

        let resolution = if misses.is_empty() {
            Ok(())
        } else {
            resolutions.resolver_called = true;
            self.resolve_misses(&misses, options, &mut resolutions).await
        };

        let Some(event) = assemble(meta, &urls, &resolutions) else {
            return Outcome::NothingToDo;
        };

        let persisted = self.gate.commit(&event).await;
        let reply = format_amputation(&event.response_urls());

        info!(
            "Amputated {} of {} URL(s) for message {} ({} from cache)",
            event.responses.len(),
            event.requests.len(),
            meta.message_id,
            resolutions.cached.len()
        );

        Outcome::Amputated(Amputation {
            reply,
            event,
            resolution,
            persisted,
        })
    }

    async fn resolve_misses(
        &self,
        misses: &[String],
        options: &ResolveOptions,
        resolutions: &mut Resolutions,
    ) -> Result<()> {
        match self.resolver.resolve(misses, options).await {
            Ok(fresh) if fresh.is_empty() => {
                warn!("Resolver returned no canonical URLs for: {}", misses.join(", "));
                Err(AmputateError::ResolutionEmpty)
            }
            Ok(fresh) => {
                if fresh.len() != misses.len() {
                    debug!(
                        "Resolver returned {} canonical URL(s) for {} request(s)",
                        fresh.len(),
                        misses.len()
                    );
                }
                resolutions.fresh = fresh;
                Ok(())
            }
            Err(e) => {
                error!("Error calling resolver: {}", e);
                Err(e)
            }
        }
    }
}
