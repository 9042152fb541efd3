pub mod schema;

use crate::cache::{CachedResolution, LookupScope};
use crate::config::Config;
use crate::correlate::ResolutionEvent;
use crate::servers::{ServerConfig, Setting, SettingValue};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// One observed message, as appended to `message_events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub author_id: String,
    pub author_name: String,
    pub message_id: String,
    pub channel_id: String,
    pub server_id: Option<String>,
    /// Empty unless the message was a command.
    pub command: String,
}

/// Rows written by [`Database::insert_resolution_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWrite {
    pub event_rows: usize,
    pub url_rows: usize,
}

impl EventWrite {
    pub fn is_complete(&self, event: &ResolutionEvent) -> bool {
        self.event_rows == 1 && self.url_rows == event.record_count()
    }
}

pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        Self::open(&config.database_url)
    }

    /// Open (or create) the database file, creating its directory if needed.
    pub fn open(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && path != ":memory:" {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("unable to create database directory {}", parent.display())
                })?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("unable to open database {}", path))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database connection mutex poisoned"))
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn()?;
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Run a synchronous database call on the blocking thread pool.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    // --- Message events ---

    pub fn save_message_event(&self, event: &MessageEvent) -> anyhow::Result<()> {
        debug!(
            "Database: Saving message event {} for message {} in channel {}",
            event.id, event.message_id, event.channel_id
        );
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO message_events
                (id, created_at, author_id, author_name, message_id, channel_id, server_id, command)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            (
                &event.id,
                timestamp(&event.created_at),
                &event.author_id,
                &event.author_name,
                &event.message_id,
                &event.channel_id,
                &event.server_id,
                &event.command,
            ),
        )?;
        Ok(())
    }

    // --- Resolution events ---

    /// Insert an event and all of its URL records in one transaction.
    ///
    /// The transaction is only committed when every row landed; otherwise it
    /// is rolled back and the partial counts are returned for the caller to
    /// report.
    pub fn insert_resolution_event(&self, event: &ResolutionEvent) -> anyhow::Result<EventWrite> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let event_rows = tx.execute(
            "INSERT INTO resolution_events
                (id, created_at, author_id, author_name, channel_id, message_id, server_id, resolver_called)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            (
                &event.id,
                timestamp(&event.created_at),
                &event.meta.author_id,
                &event.meta.author_name,
                &event.meta.channel_id,
                &event.meta.message_id,
                &event.meta.server_id,
                event.resolver_called,
            ),
        )?;

        let mut url_rows = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO url_records (id, event_id, kind, position, url, domain_name, cached)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in event.requests.iter().chain(event.responses.iter()) {
                url_rows += stmt.execute((
                    &record.id,
                    &record.event_id,
                    record.kind.as_str(),
                    record.position as i64,
                    &record.url,
                    record.domain_name(),
                    record.cached,
                ))?;
            }
        }

        let write = EventWrite {
            event_rows,
            url_rows,
        };
        if write.is_complete(event) {
            tx.commit()?;
        } else {
            warn!(
                "Database: rolling back resolution event {} ({} event rows, {} url rows)",
                event.id, event_rows, url_rows
            );
        }
        Ok(write)
    }

    /// First non-empty response of the most recent event that sent exactly
    /// `url` to the resolver.
    ///
    /// Records served from the cache are skipped on both sides, so a hit
    /// recorded alongside another URL's fresh answer is never reused for it.
    pub fn find_cached_response(
        &self,
        url: &str,
        scope: &LookupScope,
    ) -> anyhow::Result<Option<CachedResolution>> {
        let (scoped, server_id) = match scope {
            LookupScope::Any => (false, None),
            LookupScope::Server(server_id) => (true, server_id.as_deref()),
        };
        let conn = self.conn()?;
        let hit = conn
            .query_row(
                "SELECT resp.url, resp.domain_name
                 FROM url_records req
                 JOIN resolution_events ev ON ev.id = req.event_id
                 JOIN url_records resp ON resp.event_id = ev.id AND resp.kind = 'response'
                 WHERE req.kind = 'request'
                   AND req.url = ?1
                   AND req.cached = 0
                   AND resp.cached = 0
                   AND resp.url <> ''
                   AND (?2 = 0 OR ev.server_id IS ?3)
                 ORDER BY ev.created_at DESC, ev.rowid DESC, resp.position ASC
                 LIMIT 1",
                (url, scoped, server_id),
                |row| {
                    Ok(CachedResolution {
                        request_url: url.to_string(),
                        url: row.get(0)?,
                        domain_name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(hit)
    }

    // --- Servers ---

    /// Upsert the registration and create a default config if missing.
    /// Returns `true` when the server was not registered before.
    pub fn register_server(&self, server_id: &str, name: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = timestamp(&Utc::now());

        let exists = tx
            .prepare("SELECT 1 FROM server_registrations WHERE server_id = ?1")?
            .exists([server_id])?;

        if exists {
            tx.execute(
                "UPDATE server_registrations SET name = ?2, updated_at = ?3 WHERE server_id = ?1",
                (server_id, name, &now),
            )?;
            tx.execute(
                "UPDATE server_configs SET name = ?2 WHERE server_id = ?1",
                (server_id, name),
            )?;
        } else {
            let rows = tx.execute(
                "INSERT INTO server_registrations (server_id, name, updated_at) VALUES (?1, ?2, ?3)",
                (server_id, name, &now),
            )?;
            if rows != 1 {
                anyhow::bail!(
                    "did not expect {} rows to be affected registering server {}({})",
                    rows,
                    name,
                    server_id
                );
            }
        }

        let defaults = ServerConfig::with_defaults(server_id, name);
        tx.execute(
            "INSERT OR IGNORE INTO server_configs
                (server_id, name, resolution_enabled, reply_to_original, use_embed, guess_and_check, max_depth)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                &defaults.server_id,
                &defaults.name,
                defaults.resolution_enabled,
                defaults.reply_to_original,
                defaults.use_embed,
                defaults.guess_and_check,
                defaults.max_depth,
            ),
        )?;

        tx.commit()?;
        Ok(!exists)
    }

    pub fn get_server_config(&self, server_id: &str) -> anyhow::Result<Option<ServerConfig>> {
        let conn = self.conn()?;
        let config = conn
            .query_row(
                "SELECT server_id, name, resolution_enabled, reply_to_original, use_embed,
                        guess_and_check, max_depth
                 FROM server_configs WHERE server_id = ?1",
                [server_id],
                |row| {
                    Ok(ServerConfig {
                        server_id: row.get(0)?,
                        name: row.get(1)?,
                        resolution_enabled: row.get(2)?,
                        reply_to_original: row.get(3)?,
                        use_embed: row.get(4)?,
                        guess_and_check: row.get(5)?,
                        max_depth: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(config)
    }

    /// Update one column of a server's config. Committed only when exactly
    /// one row changed; the affected row count is returned either way.
    pub fn update_server_setting(
        &self,
        server_id: &str,
        setting: Setting,
        value: SettingValue,
    ) -> anyhow::Result<usize> {
        // Column names come from the static settings table, never from input.
        let sql = format!(
            "UPDATE server_configs SET {} = ?1 WHERE server_id = ?2",
            setting.spec().column
        );
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let rows = match value {
            SettingValue::Flag(on) => tx.execute(&sql, (on, server_id))?,
            SettingValue::Depth(depth) => tx.execute(&sql, (depth, server_id))?,
        };
        if rows == 1 {
            tx.commit()?;
        }
        Ok(rows)
    }

    pub fn count_servers(&self) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row("SELECT COUNT(*) FROM server_registrations", [], |row| row.get(0))?;
        Ok(count)
    }

    // --- Read-side aggregates (server_id = None means all servers) ---

    pub fn count_message_events(&self, server_id: Option<&str>) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM message_events WHERE (?1 IS NULL OR server_id = ?1)",
            [server_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_messages_by_author(&self, author_id: &str, server_id: Option<&str>) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM message_events
             WHERE author_id = ?1 AND (?2 IS NULL OR server_id = ?2)",
            (author_id, server_id),
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_resolver_calls(&self, server_id: Option<&str>) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM resolution_events
             WHERE resolver_called AND (?1 IS NULL OR server_id = ?1)",
            [server_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn count_response_urls(&self, server_id: Option<&str>) -> anyhow::Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM url_records r
             JOIN resolution_events ev ON ev.id = r.event_id
             WHERE r.kind = 'response' AND (?1 IS NULL OR ev.server_id = ?1)",
            [server_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn top_response_domains(
        &self,
        server_id: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<(String, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT r.domain_name, COUNT(*) AS count FROM url_records r
             JOIN resolution_events ev ON ev.id = r.event_id
             WHERE r.kind = 'response' AND r.domain_name <> ''
               AND (?1 IS NULL OR ev.server_id = ?1)
             GROUP BY r.domain_name
             ORDER BY count DESC, r.domain_name ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map((server_id, limit as i64), |row| Ok((row.get(0)?, row.get(1)?)))?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::{assemble, MessageMeta, Resolutions};
    use uuid::Uuid;

    fn setup() -> Database {
        let db = Database::open(":memory:").unwrap();
        db.execute_init().unwrap();
        db
    }

    fn meta(server: Option<&str>) -> MessageMeta {
        MessageMeta {
            author_id: "u1".to_string(),
            author_name: "user".to_string(),
            message_id: "m1".to_string(),
            channel_id: "c1".to_string(),
            server_id: server.map(str::to_string),
        }
    }

    fn message_event(author: &str, server: Option<&str>, command: &str) -> MessageEvent {
        MessageEvent {
            id: Uuid::now_v7().to_string(),
            created_at: Utc::now(),
            author_id: author.to_string(),
            author_name: "name".to_string(),
            message_id: "m".to_string(),
            channel_id: "c".to_string(),
            server_id: server.map(str::to_string),
            command: command.to_string(),
        }
    }

    fn count(db: &Database, sql: &str) -> i64 {
        let conn = db.conn().unwrap();
        conn.query_row(sql, [], |row| row.get(0)).unwrap()
    }

    #[test]
    fn test_open_creates_directory() {
        let root = std::env::temp_dir().join(format!("amputator-{}", Uuid::now_v7()));
        let path = root.join("nested").join("amputator.db");

        let db = Database::open(path.to_str().unwrap()).unwrap();
        db.execute_init().unwrap();
        assert!(path.exists());

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_open_reports_unusable_directory() {
        let root = std::env::temp_dir().join(format!("amputator-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&root).unwrap();
        // A plain file where the parent directory should be.
        let blocker = root.join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let err = Database::open(blocker.join("amputator.db").to_str().unwrap())
            .err()
            .expect("opening under a file should fail");
        assert!(err.to_string().contains("unable to create database directory"));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_init_is_idempotent() {
        let db = setup();
        db.execute_init().unwrap();
    }

    #[test]
    fn test_save_message_event() {
        let db = setup();
        db.save_message_event(&message_event("u1", Some("g1"), "")).unwrap();
        db.save_message_event(&message_event("bot", Some("g1"), "")).unwrap();
        db.save_message_event(&message_event("u1", None, "stats")).unwrap();

        assert_eq!(db.count_message_events(None).unwrap(), 3);
        assert_eq!(db.count_message_events(Some("g1")).unwrap(), 2);
        assert_eq!(db.count_messages_by_author("bot", None).unwrap(), 1);
        assert_eq!(db.count_messages_by_author("bot", Some("g2")).unwrap(), 0);
    }

    #[test]
    fn test_insert_resolution_event() {
        let db = setup();
        let requested = vec!["https://a.com/amp/1".to_string(), "https://b.com/amp/2".to_string()];
        let resolutions = Resolutions {
            fresh: vec!["https://a.com/1".to_string()],
            resolver_called: true,
            ..Default::default()
        };
        let event = assemble(&meta(Some("g1")), &requested, &resolutions).unwrap();

        let write = db.insert_resolution_event(&event).unwrap();
        assert_eq!(write, EventWrite { event_rows: 1, url_rows: 3 });
        assert!(write.is_complete(&event));

        assert_eq!(count(&db, "SELECT COUNT(*) FROM url_records WHERE kind = 'request'"), 2);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM url_records WHERE kind = 'response'"), 1);
        assert_eq!(db.count_resolver_calls(Some("g1")).unwrap(), 1);
        assert_eq!(db.count_response_urls(None).unwrap(), 1);
    }

    #[test]
    fn test_insert_is_all_or_nothing() {
        let db = setup();
        let requested = vec!["https://a.com/amp/1".to_string()];
        let resolutions = Resolutions {
            fresh: vec!["https://a.com/1".to_string()],
            resolver_called: true,
            ..Default::default()
        };
        let event = assemble(&meta(Some("g1")), &requested, &resolutions).unwrap();
        db.insert_resolution_event(&event).unwrap();

        // Same correlation id again: the event insert fails, nothing new lands.
        let mut duplicate = assemble(&meta(Some("g1")), &requested, &resolutions).unwrap();
        duplicate.id = event.id.clone();
        assert!(db.insert_resolution_event(&duplicate).is_err());

        assert_eq!(count(&db, "SELECT COUNT(*) FROM resolution_events"), 1);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM url_records"), 2);
    }

    #[test]
    fn test_top_domains() {
        let db = setup();
        for (server, response) in [
            (Some("g1"), "https://www.a.com/1"),
            (Some("g1"), "https://a.com/2"),
            (Some("g2"), "https://b.com/1"),
        ] {
            let resolutions = Resolutions {
                fresh: vec![response.to_string()],
                resolver_called: true,
                ..Default::default()
            };
            let event = assemble(&meta(server), &["https://x.com/amp".to_string()], &resolutions).unwrap();
            db.insert_resolution_event(&event).unwrap();
        }

        assert_eq!(
            db.top_response_domains(None, 5).unwrap(),
            vec![("a.com".to_string(), 2), ("b.com".to_string(), 1)]
        );
        assert_eq!(
            db.top_response_domains(Some("g2"), 5).unwrap(),
            vec![("b.com".to_string(), 1)]
        );
        assert_eq!(db.top_response_domains(None, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_server_registration_and_config() {
        let db = setup();
        assert!(db.get_server_config("g1").unwrap().is_none());

        assert!(db.register_server("g1", "Guild").unwrap());
        assert!(!db.register_server("g1", "Guild 2").unwrap());
        assert!(db.register_server("g2", "Other").unwrap());
        assert_eq!(db.count_servers().unwrap(), 2);

        let config = db.get_server_config("g1").unwrap().unwrap();
        assert_eq!(config, ServerConfig::with_defaults("g1", "Guild 2"));

        assert_eq!(
            db.update_server_setting("g1", Setting::Guess, SettingValue::Flag(false)).unwrap(),
            1
        );
        assert_eq!(
            db.update_server_setting("missing", Setting::Guess, SettingValue::Flag(false)).unwrap(),
            0
        );
        assert!(!db.get_server_config("g1").unwrap().unwrap().guess_and_check);
        assert!(db.get_server_config("g2").unwrap().unwrap().guess_and_check);
    }
}
