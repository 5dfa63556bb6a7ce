use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::Row;

use crate::domain::{Account, Cents, Operation, OperationKind};

use super::MIGRATION_001_INITIAL;

/// An account row together with the version stamp it was read at. The stamp
/// is what a later conditional update is checked against.
#[derive(Debug, Clone)]
pub struct StoredAccount {
    pub account: Account,
    pub version: i64,
}

/// One guarded balance update: applied only if the row's version still
/// matches `expected_version`, bumping it on success.
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    pub username: String,
    pub expected_version: i64,
    pub funds: Cents,
    pub debt: Cents,
}

/// Result of attempting to commit a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// All updates and log appends committed.
    Applied,
    /// A version guard failed or the store was contended; nothing was
    /// applied. The caller re-reads and retries.
    Conflict,
}

/// Repository over the SQLite account store. Provides the two atomic
/// primitives the ledger relies on: insert-if-absent for registration and
/// version-guarded multi-row commit for everything else.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    /// WAL mode keeps readers unblocked during commits; the busy timeout
    /// bounds how long a writer waits before surfacing contention.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Account operations
    // ========================

    /// Atomically create an account and its initial log entry.
    /// Returns false without side effects if the username is already taken;
    /// of two concurrent registrations for one name, exactly one sees true.
    pub async fn create_account(&self, account: &Account, init: &Operation) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin registration transaction")?;

        let done = sqlx::query(
            r#"
            INSERT INTO accounts (username, credential_hash, funds, debt, version, created_at)
            VALUES (?, ?, ?, ?, 0, ?)
            ON CONFLICT(username) DO NOTHING
            "#,
        )
        .bind(&account.username)
        .bind(&account.credential_hash)
        .bind(account.funds)
        .bind(account.debt)
        .bind(account.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to insert account")?;

        if done.rows_affected() == 0 {
            tx.rollback()
                .await
                .context("Failed to roll back duplicate registration")?;
            return Ok(false);
        }

        Self::append_operation(&mut tx, init).await?;

        tx.commit()
            .await
            .context("Failed to commit registration")?;
        Ok(true)
    }

    /// Fetch an account with its current version stamp. A single row read,
    /// so funds and debt always come from one consistent snapshot.
    pub async fn get_account(&self, username: &str) -> Result<Option<StoredAccount>> {
        let row = sqlx::query(
            r#"
            SELECT username, credential_hash, funds, debt, version, created_at
            FROM accounts
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    /// List all accounts, ordered by username.
    pub async fn list_accounts(&self) -> Result<Vec<StoredAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT username, credential_hash, funds, debt, version, created_at
            FROM accounts
            ORDER BY username
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    /// Remove an account record, guarded by the version it was read at, so
    /// a deletion decision never races a concurrent balance change. The
    /// account's log entries are retained. Returns false if the row was
    /// gone or had moved on; the caller re-reads and retries.
    pub async fn delete_account_versioned(&self, username: &str, expected_version: i64) -> Result<bool> {
        let done = sqlx::query("DELETE FROM accounts WHERE username = ? AND version = ?")
            .bind(username)
            .bind(expected_version)
            .execute(&self.pool)
            .await
            .context("Failed to delete account")?;
        Ok(done.rows_affected() > 0)
    }

    // ========================
    // Mutation commit
    // ========================

    /// Apply a set of version-guarded balance updates plus their log entries
    /// as one transaction. Updates are applied in lexicographic username
    /// order so overlapping operations always lock rows in the same order.
    ///
    /// Any guard that matches zero rows aborts the whole transaction and
    /// reports `Conflict`: a concurrent commit won the race and the caller
    /// must re-read. Store contention (busy/locked) reports `Conflict` the
    /// same way, since nothing was applied either.
    pub async fn commit_mutation(
        &self,
        updates: &[AccountUpdate],
        entries: &[Operation],
    ) -> Result<CommitOutcome> {
        let mut ordered: Vec<&AccountUpdate> = updates.iter().collect();
        ordered.sort_by(|a, b| a.username.cmp(&b.username));

        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) if is_contention(&e) => return Ok(CommitOutcome::Conflict),
            Err(e) => return Err(e).context("Failed to begin mutation transaction"),
        };

        for update in ordered {
            let result = sqlx::query(
                r#"
                UPDATE accounts
                SET funds = ?, debt = ?, version = version + 1
                WHERE username = ? AND version = ?
                "#,
            )
            .bind(update.funds)
            .bind(update.debt)
            .bind(&update.username)
            .bind(update.expected_version)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(done) if done.rows_affected() == 1 => {}
                Ok(_) => {
                    tx.rollback()
                        .await
                        .context("Failed to roll back conflicting mutation")?;
                    return Ok(CommitOutcome::Conflict);
                }
                Err(e) if is_contention(&e) => {
                    tx.rollback()
                        .await
                        .context("Failed to roll back contended mutation")?;
                    return Ok(CommitOutcome::Conflict);
                }
                Err(e) => return Err(e).context("Failed to apply account update"),
            }
        }

        for entry in entries {
            Self::append_operation(&mut tx, entry).await?;
        }

        match tx.commit().await {
            Ok(()) => Ok(CommitOutcome::Applied),
            Err(e) if is_contention(&e) => Ok(CommitOutcome::Conflict),
            Err(e) => Err(e).context("Failed to commit mutation"),
        }
    }

    // ========================
    // Operation log
    // ========================

    async fn append_operation(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        entry: &Operation,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO operations (username, timestamp, kind, amount)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&entry.username)
        .bind(entry.timestamp.to_rfc3339())
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .execute(&mut **tx)
        .await
        .context("Failed to append operation log entry")?;
        Ok(())
    }

    /// List an account's log entries, oldest first (append order).
    pub async fn list_operations(&self, username: &str) -> Result<Vec<Operation>> {
        let rows = sqlx::query(
            r#"
            SELECT username, timestamp, kind, amount
            FROM operations
            WHERE username = ?
            ORDER BY id
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list operations")?;

        rows.iter().map(Self::row_to_operation).collect()
    }

    // ========================
    // Row mappers
    // ========================

    fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<StoredAccount> {
        let created_at_str: String = row.get("created_at");

        Ok(StoredAccount {
            account: Account {
                username: row.get("username"),
                credential_hash: row.get("credential_hash"),
                funds: row.get("funds"),
                debt: row.get("debt"),
                created_at: DateTime::parse_from_rfc3339(&created_at_str)
                    .context("Invalid created_at timestamp")?
                    .with_timezone(&Utc),
            },
            version: row.get("version"),
        })
    }

    fn row_to_operation(row: &sqlx::sqlite::SqliteRow) -> Result<Operation> {
        let timestamp_str: String = row.get("timestamp");
        let kind_str: String = row.get("kind");

        Ok(Operation {
            username: row.get("username"),
            timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                .context("Invalid operation timestamp")?
                .with_timezone(&Utc),
            kind: OperationKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid operation kind: {}", kind_str))?,
            amount: row.get("amount"),
        })
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6) mean another writer held the store
/// past the busy timeout. Nothing was applied, so the operation is safely
/// retryable.
fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("5") | Some("6"))
        }
        _ => false,
    }
}
