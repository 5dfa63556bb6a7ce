mod repository;

pub use repository::*;

/// Initial schema: account records with a version stamp for optimistic
/// concurrency, and the append-only operation log. The CHECK constraints are
/// a storage-level backstop; the service validates balances before commit.
pub const MIGRATION_001_INITIAL: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    username TEXT PRIMARY KEY,
    credential_hash TEXT NOT NULL,
    funds INTEGER NOT NULL DEFAULT 0 CHECK (funds >= 0),
    debt INTEGER NOT NULL DEFAULT 0 CHECK (debt >= 0),
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    kind TEXT NOT NULL,
    amount INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_operations_username ON operations(username);
"#;
