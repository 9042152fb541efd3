use crate::db::Database;
use std::str::FromStr;
use tracing::debug;

/// Which prior resolutions may be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    /// Only events recorded in the same server.
    Server,
    /// Events from any server, including direct messages.
    Global,
}

impl FromStr for CacheScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "server" => Ok(CacheScope::Server),
            "global" => Ok(CacheScope::Global),
            other => Err(anyhow::anyhow!(
                "CACHE_SCOPE must be 'server' or 'global', got '{}'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResolution {
    /// The request URL this hit answers.
    pub request_url: String,
    pub url: String,
    pub domain_name: String,
}

/// Reuses canonical URLs recorded by earlier resolution events.
///
/// Keys are literal request URLs: `https://a.com/amp` and `https://a.com/amp/`
/// are different entries.
#[derive(Clone)]
pub struct ResolutionCache {
    db: Database,
    scope: CacheScope,
}

impl ResolutionCache {
    pub fn new(db: Database, scope: CacheScope) -> Self {
        Self { db, scope }
    }

    /// Most recent recorded response for `url`, within scope of `server_id`.
    ///
    /// In server scope a direct message (`server_id == None`) only sees
    /// other direct-message events.
    pub async fn lookup(
        &self,
        url: &str,
        server_id: Option<&str>,
    ) -> anyhow::Result<Option<CachedResolution>> {
        let scope = match self.scope {
            CacheScope::Global => LookupScope::Any,
            CacheScope::Server => LookupScope::Server(server_id.map(str::to_string)),
        };
        let url_owned = url.to_string();
        let hit = self
            .db
            .run_blocking(move |db| db.find_cached_response(&url_owned, &scope))
            .await?;

        match &hit {
            Some(cached) => debug!("Cache hit for {} -> {}", url, cached.url),
            None => debug!("Cache miss for {}", url),
        }
        Ok(hit)
    }
}

/// Filter applied to the owning event of a cached request record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupScope {
    Any,
    Server(Option<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::{assemble, MessageMeta, Resolutions};

    fn meta(server: Option<&str>) -> MessageMeta {
        MessageMeta {
            author_id: "u1".to_string(),
            author_name: "user".to_string(),
            message_id: "m1".to_string(),
            channel_id: "c1".to_string(),
            server_id: server.map(str::to_string),
        }
    }

    fn record(db: &Database, server: Option<&str>, request: &str, responses: &[&str]) {
        let resolutions = Resolutions {
            fresh: responses.iter().map(|s| s.to_string()).collect(),
            resolver_called: true,
            ..Default::default()
        };
        let event = assemble(&meta(server), &[request.to_string()], &resolutions).unwrap();
        assert_eq!(db.insert_resolution_event(&event).unwrap().event_rows, 1);
    }

    fn setup() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("Server".parse::<CacheScope>().unwrap(), CacheScope::Server);
        assert_eq!(" global ".parse::<CacheScope>().unwrap(), CacheScope::Global);
        assert!("".parse::<CacheScope>().is_err());
    }

    #[tokio::test]
    async fn test_exact_match_only() {
        let db = setup();
        record(&db, Some("g1"), "https://a.com/amp/1", &["https://a.com/1"]);
        let cache = ResolutionCache::new(db, CacheScope::Server);

        let hit = cache.lookup("https://a.com/amp/1", Some("g1")).await.unwrap();
        assert_eq!(
            hit,
            Some(CachedResolution {
                request_url: "https://a.com/amp/1".to_string(),
                url: "https://a.com/1".to_string(),
                domain_name: "a.com".to_string(),
            })
        );
        assert!(cache.lookup("https://a.com/amp/1/", Some("g1")).await.unwrap().is_none());
        assert!(cache.lookup("HTTPS://a.com/amp/1", Some("g1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_scope() {
        let db = setup();
        record(&db, Some("g1"), "https://a.com/amp/1", &["https://a.com/1"]);

        let server = ResolutionCache::new(db.clone(), CacheScope::Server);
        assert!(server.lookup("https://a.com/amp/1", Some("g2")).await.unwrap().is_none());
        assert!(server.lookup("https://a.com/amp/1", None).await.unwrap().is_none());

        let global = ResolutionCache::new(db, CacheScope::Global);
        assert!(global.lookup("https://a.com/amp/1", Some("g2")).await.unwrap().is_some());
        assert!(global.lookup("https://a.com/amp/1", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_direct_messages_share_scope() {
        let db = setup();
        record(&db, None, "https://a.com/amp/1", &["https://a.com/1"]);
        let cache = ResolutionCache::new(db, CacheScope::Server);
        assert!(cache.lookup("https://a.com/amp/1", None).await.unwrap().is_some());
        assert!(cache.lookup("https://a.com/amp/1", Some("g1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prefers_most_recent_event() {
        let db = setup();
        record(&db, Some("g1"), "https://a.com/amp/1", &["https://a.com/old"]);
        record(&db, Some("g1"), "https://a.com/amp/1", &["https://a.com/new", "https://a.com/other"]);
        let cache = ResolutionCache::new(db, CacheScope::Server);

        let hit = cache.lookup("https://a.com/amp/1", Some("g1")).await.unwrap().unwrap();
        assert_eq!(hit.url, "https://a.com/new");
    }

    #[tokio::test]
    async fn test_event_without_responses_is_skipped() {
        let db = setup();
        record(&db, Some("g1"), "https://a.com/amp/1", &["https://a.com/1"]);
        record(&db, Some("g1"), "https://a.com/amp/1", &[]);
        let cache = ResolutionCache::new(db, CacheScope::Server);

        let hit = cache.lookup("https://a.com/amp/1", Some("g1")).await.unwrap().unwrap();
        assert_eq!(hit.url, "https://a.com/1");
    }

    #[tokio::test]
    async fn test_hits_are_not_reused_for_other_requests() {
        let db = setup();
        record(&db, Some("g1"), "https://a.com/amp/1", &["https://a.com/1"]);
        let cache = ResolutionCache::new(db.clone(), CacheScope::Server);

        // Second message: a.com is a hit, b.com goes to the resolver.
        let hit = cache.lookup("https://a.com/amp/1", Some("g1")).await.unwrap().unwrap();
        let resolutions = Resolutions {
            cached: vec![hit],
            fresh: vec!["https://b.com/2".to_string()],
            resolver_called: true,
        };
        let requested = ["https://b.com/amp/2".to_string(), "https://a.com/amp/1".to_string()];
        let event = assemble(&meta(Some("g1")), &requested, &resolutions).unwrap();
        db.insert_resolution_event(&event).unwrap();

        let b = cache.lookup("https://b.com/amp/2", Some("g1")).await.unwrap().unwrap();
        assert_eq!(b.url, "https://b.com/2");
        let a = cache.lookup("https://a.com/amp/1", Some("g1")).await.unwrap().unwrap();
        assert_eq!(a.url, "https://a.com/1");
    }
}
