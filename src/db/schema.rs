/// Idempotent schema. Primary keys are UUIDv7 strings so rows created by
/// separate processes can be merged without collisions.
pub const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    -- Append-only log of messages the bot acted on or sent
    CREATE TABLE IF NOT EXISTS message_events (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        author_id TEXT NOT NULL,
        author_name TEXT NOT NULL,
        message_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        server_id TEXT,
        command TEXT NOT NULL DEFAULT ''
    );
    CREATE INDEX IF NOT EXISTS idx_message_events_server ON message_events (server_id, author_id);

    -- One row per batch of URLs resolved for a single message
    CREATE TABLE IF NOT EXISTS resolution_events (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        author_id TEXT NOT NULL,
        author_name TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        message_id TEXT NOT NULL,
        server_id TEXT,
        resolver_called BOOLEAN NOT NULL DEFAULT FALSE
    );
    CREATE INDEX IF NOT EXISTS idx_resolution_events_server ON resolution_events (server_id, created_at);

    CREATE TABLE IF NOT EXISTS url_records (
        id TEXT PRIMARY KEY,
        event_id TEXT NOT NULL REFERENCES resolution_events (id),
        kind TEXT NOT NULL CHECK (kind IN ('request', 'response')),
        position INTEGER NOT NULL,
        url TEXT NOT NULL,
        domain_name TEXT NOT NULL,
        cached BOOLEAN NOT NULL DEFAULT FALSE
    );
    CREATE INDEX IF NOT EXISTS idx_url_records_lookup ON url_records (kind, url);
    CREATE INDEX IF NOT EXISTS idx_url_records_event ON url_records (event_id, kind, position);

    CREATE TABLE IF NOT EXISTS server_registrations (
        server_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS server_configs (
        server_id TEXT PRIMARY KEY REFERENCES server_registrations (server_id),
        name TEXT NOT NULL,
        resolution_enabled BOOLEAN NOT NULL,
        reply_to_original BOOLEAN NOT NULL,
        use_embed BOOLEAN NOT NULL,
        guess_and_check BOOLEAN NOT NULL,
        max_depth INTEGER NOT NULL
    );
";
