//! SQL schemas for world databases and the system database.
//!
//! Both are executed every time a connection is opened; `IF NOT EXISTS`
//! keeps them idempotent. Migrations will be gated on `PRAGMA user_version`.

/// Per-world database: the quad rows plus the search chunks derived from
/// them.
pub const WORLD_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per quad. Absent columns hold '' so the UNIQUE constraint
-- (NULLs never compare equal) enforces set semantics.
CREATE TABLE IF NOT EXISTS quads (
    subject          TEXT NOT NULL,   -- IRI, or '_:' + blank node id
    predicate        TEXT NOT NULL,
    object           TEXT NOT NULL,   -- IRI, '_:' + id, or literal lexical form
    graph            TEXT NOT NULL DEFAULT '',   -- '' = default graph
    term_type        TEXT NOT NULL,   -- 'uri' | 'bnode' | 'literal'
    object_language  TEXT NOT NULL DEFAULT '',
    object_datatype  TEXT NOT NULL DEFAULT '',
    UNIQUE (subject, predicate, object, graph, term_type, object_language, object_datatype)
);

CREATE INDEX IF NOT EXISTS quads_subject_idx   ON quads(subject);
CREATE INDEX IF NOT EXISTS quads_predicate_idx ON quads(predicate);

-- Derived from literal-bearing quads; rebuildable at any time.
CREATE TABLE IF NOT EXISTS chunks (
    chunk_id   TEXT PRIMARY KEY,
    quad_id    TEXT NOT NULL,
    subject    TEXT NOT NULL,
    predicate  TEXT NOT NULL,
    text       TEXT NOT NULL,
    embedding  BLOB              -- little-endian f32s, or NULL
);

CREATE INDEX IF NOT EXISTS chunks_quad_idx ON chunks(quad_id);

PRAGMA user_version = 1;
";

/// Process-wide system database.
pub const SYSTEM_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS worlds (
    world_id     TEXT PRIMARY KEY,
    description  TEXT,
    created_by   TEXT NOT NULL,
    created_at   TEXT NOT NULL,   -- RFC 3339 UTC, fixed width
    updated_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS worlds_owner_idx ON worlds(created_by);

-- Written only through compare-and-swap on `version`.
CREATE TABLE IF NOT EXISTS rate_limit_buckets (
    world_id        TEXT NOT NULL,
    kind            TEXT NOT NULL,
    tokens          REAL NOT NULL,
    last_refill_at  INTEGER NOT NULL,   -- unix milliseconds
    version         INTEGER NOT NULL,
    PRIMARY KEY (world_id, kind)
);

-- Append-only.
CREATE TABLE IF NOT EXISTS usage_events (
    event_id     TEXT PRIMARY KEY,
    principal    TEXT NOT NULL,
    world_id     TEXT,
    kind         TEXT NOT NULL,
    quantity     INTEGER NOT NULL,
    recorded_at  TEXT NOT NULL,
    metadata     TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS usage_principal_idx ON usage_events(principal, recorded_at);

PRAGMA user_version = 1;
";
