//! SQLite memory store.
//!
//! Uses a single SQLite database file with three tables:
//! - `short_term_memory`: one row per turn, ordered by `(timestamp, iid)`
//! - `long_term_memory`: one row per factual/semantic value or episode
//! - `memory_updates`: append-only audit log
//!
//! Every statement is scoped by `user_id`. Compound writes (a mutation plus
//! its audit record) run in one transaction.

use crate::clock::MonotonicClock;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use memoria_core::error::MemoryError;
use memoria_core::memory::{
    turn_added_description, Episode, FactualKey, LongTermMemory, MemoryStats, MemoryStore,
    SemanticKey, Turn, UpdateKind, UpdateRecord, UserId,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

const FACTUAL: &str = "factual";
const EPISODIC: &str = "episodic";
const SEMANTIC: &str = "semantic";

/// A durable SQLite-backed [`MemoryStore`].
pub struct SqliteStore {
    pool: SqlitePool,
    location: String,
    clock: MonotonicClock,
}

impl SqliteStore {
    /// Create a new store from a connection string.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(url: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?;
        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        Self::connect(options, in_memory, url.to_string()).await
    }

    /// Open (or create) a database file, creating parent directories.
    pub async fn open(path: &Path) -> Result<Self, MemoryError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let options = SqliteConnectOptions::new().filename(path);
        Self::connect(options, false, path.display().to_string()).await
    }

    async fn connect(
        options: SqliteConnectOptions,
        in_memory: bool,
        location: String,
    ) -> Result<Self, MemoryError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // An in-memory database dies with its last connection: pin exactly one.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self {
            pool,
            location,
            clock: MonotonicClock::new(),
        };
        store.run_migrations().await?;
        info!("SQLite memory store initialized at {}", store.location);
        Ok(store)
    }

    /// Run schema migrations: creates the three tables and their indexes.
    async fn run_migrations(&self) -> Result<(), MemoryError> {
        let statements: [(&str, &str); 6] = [
            (
                "short_term_memory table",
                r#"
                CREATE TABLE IF NOT EXISTS short_term_memory (
                    iid        INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id    TEXT NOT NULL,
                    user_text  TEXT NOT NULL,
                    agent_text TEXT NOT NULL,
                    timestamp  TEXT NOT NULL
                )
                "#,
            ),
            (
                "long_term_memory table",
                r#"
                CREATE TABLE IF NOT EXISTS long_term_memory (
                    iid          INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id      TEXT NOT NULL,
                    category     TEXT NOT NULL CHECK (category IN ('factual', 'episodic', 'semantic')),
                    memory_key   TEXT,
                    memory_value TEXT,
                    memory_data  TEXT,
                    created_at   TEXT NOT NULL
                )
                "#,
            ),
            (
                "memory_updates table",
                r#"
                CREATE TABLE IF NOT EXISTS memory_updates (
                    iid         INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id     TEXT NOT NULL,
                    update_type TEXT NOT NULL,
                    description TEXT NOT NULL,
                    item_count  INTEGER NOT NULL DEFAULT 0,
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "short_term index",
                "CREATE INDEX IF NOT EXISTS idx_short_term_user ON short_term_memory(user_id, timestamp)",
            ),
            (
                "long_term index",
                "CREATE INDEX IF NOT EXISTS idx_long_term_user ON long_term_memory(user_id, category)",
            ),
            (
                "memory_updates index",
                "CREATE INDEX IF NOT EXISTS idx_memory_updates_user ON memory_updates(user_id, created_at DESC)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MemoryError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Newest stored turn timestamp for the user, used as the clock floor.
    async fn latest_turn_timestamp(
        conn: &mut SqliteConnection,
        user: &UserId,
    ) -> Result<Option<DateTime<Utc>>, MemoryError> {
        let row = sqlx::query("SELECT MAX(timestamp) AS latest FROM short_term_memory WHERE user_id = ?1")
            .bind(user.as_str())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("latest turn: {e}")))?;
        let latest: Option<String> = row
            .try_get("latest")
            .map_err(|e| MemoryError::QueryFailed(format!("latest column: {e}")))?;
        latest.as_deref().map(parse_timestamp).transpose()
    }

    async fn count_turns(conn: &mut SqliteConnection, user: &UserId) -> Result<usize, MemoryError> {
        count(conn, "SELECT COUNT(*) AS cnt FROM short_term_memory WHERE user_id = ?1", user).await
    }

    async fn count_long_term(conn: &mut SqliteConnection, user: &UserId) -> Result<usize, MemoryError> {
        count(conn, "SELECT COUNT(*) AS cnt FROM long_term_memory WHERE user_id = ?1", user).await
    }

    /// Parse a `Turn` from a SQLite row.
    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, MemoryError> {
        let user_text: String = row
            .try_get("user_text")
            .map_err(|e| MemoryError::QueryFailed(format!("user_text column: {e}")))?;
        let agent_text: String = row
            .try_get("agent_text")
            .map_err(|e| MemoryError::QueryFailed(format!("agent_text column: {e}")))?;
        let timestamp: String = row
            .try_get("timestamp")
            .map_err(|e| MemoryError::QueryFailed(format!("timestamp column: {e}")))?;

        Ok(Turn {
            user_text,
            agent_text,
            timestamp: parse_timestamp(&timestamp)?,
        })
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, MemoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| MemoryError::QueryFailed(format!("bad timestamp '{s}': {e}")))
}

async fn count(conn: &mut SqliteConnection, sql: &str, user: &UserId) -> Result<usize, MemoryError> {
    let row = sqlx::query(sql)
        .bind(user.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("COUNT: {e}")))?;
    let cnt: i64 = row
        .try_get("cnt")
        .map_err(|e| MemoryError::QueryFailed(format!("cnt column: {e}")))?;
    Ok(cnt as usize)
}

/// Append an audit record on the given connection (usually a transaction).
async fn record_update(
    conn: &mut SqliteConnection,
    user: &UserId,
    kind: UpdateKind,
    description: &str,
    item_count: usize,
) -> Result<(), MemoryError> {
    sqlx::query(
        "INSERT INTO memory_updates (user_id, update_type, description, item_count, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(user.as_str())
    .bind(kind.as_str())
    .bind(description)
    .bind(item_count as i64)
    .bind(format_timestamp(&Utc::now()))
    .execute(&mut *conn)
    .await
    .map_err(|e| MemoryError::Storage(format!("audit INSERT failed: {e}")))?;
    Ok(())
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    /// The database file path or connection string.
    fn location(&self) -> Option<&str> {
        Some(&self.location)
    }

    async fn append_turn(&self, user: &UserId, user_text: &str, agent_text: &str) -> Result<Turn, MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        let floor = Self::latest_turn_timestamp(&mut *tx, user).await?;
        let timestamp = self.clock.tick_after(floor);

        sqlx::query(
            "INSERT INTO short_term_memory (user_id, user_text, agent_text, timestamp) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(user.as_str())
        .bind(user_text)
        .bind(agent_text)
        .bind(format_timestamp(&timestamp))
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("turn INSERT failed: {e}")))?;

        record_update(&mut *tx, user, UpdateKind::ShortTermAdd, &turn_added_description(user_text), 1).await?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(user = %user, "Appended turn");
        Ok(Turn {
            user_text: user_text.to_string(),
            agent_text: agent_text.to_string(),
            timestamp,
        })
    }

    async fn read_turns(&self, user: &UserId, limit: Option<usize>) -> Result<Vec<Turn>, MemoryError> {
        // LIMIT -1 means "no limit" in SQLite
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            r#"
            SELECT user_text, agent_text, timestamp FROM (
                SELECT iid, user_text, agent_text, timestamp
                FROM short_term_memory
                WHERE user_id = ?1
                ORDER BY timestamp DESC, iid DESC
                LIMIT ?2
            )
            ORDER BY timestamp ASC, iid ASC
            "#,
        )
        .bind(user.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("read turns: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn clear_turns(&self, user: &UserId) -> Result<usize, MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        let removed = Self::count_turns(&mut *tx, user).await?;
        sqlx::query("DELETE FROM short_term_memory WHERE user_id = ?1")
            .bind(user.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("turn DELETE failed: {e}")))?;

        record_update(
            &mut *tx,
            user,
            UpdateKind::ShortTermClear,
            &format!("cleared {removed} short-term turns"),
            removed,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(user = %user, removed, "Cleared short-term memory");
        Ok(removed)
    }

    async fn retain_recent_turns(&self, user: &UserId, keep: usize) -> Result<usize, MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        let result = sqlx::query(
            r#"
            DELETE FROM short_term_memory
            WHERE user_id = ?1 AND iid NOT IN (
                SELECT iid FROM short_term_memory
                WHERE user_id = ?1
                ORDER BY timestamp DESC, iid DESC
                LIMIT ?2
            )
            "#,
        )
        .bind(user.as_str())
        .bind(keep as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("trim DELETE failed: {e}")))?;

        let removed = result.rows_affected() as usize;
        if removed > 0 {
            record_update(
                &mut *tx,
                user,
                UpdateKind::ShortTermTrim,
                &format!("trimmed {removed} oldest turns, kept {keep}"),
                removed,
            )
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        Ok(removed)
    }

    async fn read_long_term(&self, user: &UserId) -> Result<LongTermMemory, MemoryError> {
        let rows = sqlx::query(
            "SELECT category, memory_key, memory_value, memory_data FROM long_term_memory WHERE user_id = ?1 ORDER BY iid",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("read long-term: {e}")))?;

        let mut memory = LongTermMemory::default();
        for row in &rows {
            let category: String = row
                .try_get("category")
                .map_err(|e| MemoryError::QueryFailed(format!("category column: {e}")))?;
            let key: Option<String> = row
                .try_get("memory_key")
                .map_err(|e| MemoryError::QueryFailed(format!("memory_key column: {e}")))?;
            let value: Option<String> = row
                .try_get("memory_value")
                .map_err(|e| MemoryError::QueryFailed(format!("memory_value column: {e}")))?;
            let data: Option<String> = row
                .try_get("memory_data")
                .map_err(|e| MemoryError::QueryFailed(format!("memory_data column: {e}")))?;

            match category.as_str() {
                FACTUAL => match key.as_deref().and_then(FactualKey::parse) {
                    Some(k) => {
                        memory.factual.insert(k, value.unwrap_or_default());
                    }
                    None => warn!(user = %user, key = ?key, "Skipping unknown factual key"),
                },
                SEMANTIC => match key.as_deref().and_then(SemanticKey::parse) {
                    Some(k) => {
                        memory.semantic.insert(k, value.unwrap_or_default());
                    }
                    None => warn!(user = %user, key = ?key, "Skipping unknown semantic key"),
                },
                EPISODIC => match data.as_deref().map(serde_json::from_str::<Episode>) {
                    Some(Ok(episode)) => memory.episodic.push(episode),
                    Some(Err(e)) => warn!(user = %user, "Skipping malformed episode: {e}"),
                    None => warn!(user = %user, "Skipping episode row without data"),
                },
                other => warn!(user = %user, category = other, "Skipping unknown memory category"),
            }
        }

        Ok(memory)
    }

    async fn write_long_term(&self, user: &UserId, memory: &LongTermMemory) -> Result<(), MemoryError> {
        let sparse = memory.sparse();
        let now = format_timestamp(&Utc::now());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        sqlx::query("DELETE FROM long_term_memory WHERE user_id = ?1")
            .bind(user.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("long-term DELETE failed: {e}")))?;

        let keyed = sparse
            .factual
            .iter()
            .map(|(k, v)| (FACTUAL, k.as_str(), v))
            .chain(sparse.semantic.iter().map(|(k, v)| (SEMANTIC, k.as_str(), v)));
        for (category, key, value) in keyed {
            sqlx::query(
                "INSERT INTO long_term_memory (user_id, category, memory_key, memory_value, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(user.as_str())
            .bind(category)
            .bind(key)
            .bind(value)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("{category} INSERT failed: {e}")))?;
        }

        for episode in &sparse.episodic {
            let data = serde_json::to_string(episode)?;
            sqlx::query(
                "INSERT INTO long_term_memory (user_id, category, memory_data, created_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(user.as_str())
            .bind(EPISODIC)
            .bind(data)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("episode INSERT failed: {e}")))?;
        }

        let items = sparse.item_count();
        record_update(
            &mut *tx,
            user,
            UpdateKind::LongTermUpdate,
            &format!(
                "long-term memory replaced: {} facts, {} episodes, {} semantic",
                sparse.factual.len(),
                sparse.episodic.len(),
                sparse.semantic.len()
            ),
            items,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(user = %user, items, "Wrote long-term memory");
        Ok(())
    }

    async fn stats(&self, user: &UserId) -> Result<MemoryStats, MemoryError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM short_term_memory WHERE user_id = ?1) AS short_term,
                (SELECT COUNT(*) FROM long_term_memory WHERE user_id = ?1 AND category = 'factual') AS factual,
                (SELECT COUNT(*) FROM long_term_memory WHERE user_id = ?1 AND category = 'episodic') AS episodic,
                (SELECT COUNT(*) FROM long_term_memory WHERE user_id = ?1 AND category = 'semantic') AS semantic
            "#,
        )
        .bind(user.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("stats: {e}")))?;

        let get = |col: &str| -> Result<usize, MemoryError> {
            let n: i64 = row
                .try_get(col)
                .map_err(|e| MemoryError::QueryFailed(format!("{col} column: {e}")))?;
            Ok(n as usize)
        };

        Ok(MemoryStats {
            short_term_count: get("short_term")?,
            factual_count: get("factual")?,
            episodic_count: get("episodic")?,
            semantic_count: get("semantic")?,
        })
    }

    async fn clear_all(&self, user: &UserId) -> Result<usize, MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        let removed = Self::count_turns(&mut *tx, user).await? + Self::count_long_term(&mut *tx, user).await?;

        for table in ["short_term_memory", "long_term_memory"] {
            sqlx::query(&format!("DELETE FROM {table} WHERE user_id = ?1"))
                .bind(user.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| MemoryError::Storage(format!("{table} DELETE failed: {e}")))?;
        }

        record_update(
            &mut *tx,
            user,
            UpdateKind::MemoryClearAll,
            &format!("cleared all memory ({removed} items)"),
            removed,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))?;

        info!(user = %user, removed, "Cleared all memory");
        Ok(removed)
    }

    async fn update_history(&self, user: &UserId, limit: usize) -> Result<Vec<UpdateRecord>, MemoryError> {
        let rows = sqlx::query(
            r#"
            SELECT update_type, description, item_count, created_at
            FROM memory_updates
            WHERE user_id = ?1
            ORDER BY created_at DESC, iid DESC
            LIMIT ?2
            "#,
        )
        .bind(user.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MemoryError::QueryFailed(format!("update history: {e}")))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let kind: String = row
                .try_get("update_type")
                .map_err(|e| MemoryError::QueryFailed(format!("update_type column: {e}")))?;
            let Some(kind) = UpdateKind::parse(&kind) else {
                warn!(user = %user, kind = %kind, "Skipping unknown update type");
                continue;
            };
            let description: String = row
                .try_get("description")
                .map_err(|e| MemoryError::QueryFailed(format!("description column: {e}")))?;
            let item_count: i64 = row
                .try_get("item_count")
                .map_err(|e| MemoryError::QueryFailed(format!("item_count column: {e}")))?;
            let created_at: String = row
                .try_get("created_at")
                .map_err(|e| MemoryError::QueryFailed(format!("created_at column: {e}")))?;

            records.push(UpdateRecord {
                kind,
                description,
                item_count: item_count as usize,
                created_at: parse_timestamp(&created_at)?,
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn ming() -> UserId {
        UserId::from("ming")
    }

    #[tokio::test]
    async fn append_and_read_turns_in_order() {
        let store = test_store().await;
        let user = ming();
        for i in 1..=5 {
            store.append_turn(&user, &format!("u{i}"), &format!("a{i}")).await.unwrap();
        }

        let turns = store.read_turns(&user, None).await.unwrap();
        let texts: Vec<_> = turns.iter().map(|t| t.user_text.as_str()).collect();
        assert_eq!(texts, vec!["u1", "u2", "u3", "u4", "u5"]);
        assert!(turns.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn read_turns_with_limit_returns_newest_oldest_first() {
        let store = test_store().await;
        let user = ming();
        for i in 1..=5 {
            store.append_turn(&user, &format!("u{i}"), "a").await.unwrap();
        }

        let turns = store.read_turns(&user, Some(2)).await.unwrap();
        let texts: Vec<_> = turns.iter().map(|t| t.user_text.as_str()).collect();
        assert_eq!(texts, vec!["u4", "u5"]);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let store = test_store().await;
        let a = UserId::from("a");
        let b = UserId::from("b");
        store.append_turn(&a, "hello from a", "hi a").await.unwrap();
        store.append_turn(&b, "hello from b", "hi b").await.unwrap();
        store.clear_turns(&a).await.unwrap();

        assert!(store.read_turns(&a, None).await.unwrap().is_empty());
        assert_eq!(store.read_turns(&b, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_turns_returns_count_and_audits() {
        let store = test_store().await;
        let user = ming();
        store.append_turn(&user, "one", "1").await.unwrap();
        store.append_turn(&user, "two", "2").await.unwrap();

        assert_eq!(store.clear_turns(&user).await.unwrap(), 2);

        let history = store.update_history(&user, 10).await.unwrap();
        assert_eq!(history[0].kind, UpdateKind::ShortTermClear);
        assert_eq!(history[0].item_count, 2);
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn retain_recent_turns_keeps_newest() {
        let store = test_store().await;
        let user = ming();
        for i in 1..=5 {
            store.append_turn(&user, &format!("T{i}"), "a").await.unwrap();
        }

        assert_eq!(store.retain_recent_turns(&user, 3).await.unwrap(), 2);
        let texts: Vec<_> = store
            .read_turns(&user, None)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.user_text)
            .collect();
        assert_eq!(texts, vec!["T3", "T4", "T5"]);

        // Nothing to trim: no audit record
        assert_eq!(store.retain_recent_turns(&user, 3).await.unwrap(), 0);
        let history = store.update_history(&user, 1).await.unwrap();
        assert_eq!(history[0].kind, UpdateKind::ShortTermTrim);
        assert_eq!(history[0].item_count, 2);
    }

    #[tokio::test]
    async fn long_term_defaults_to_empty() {
        let store = test_store().await;
        let memory = store.read_long_term(&ming()).await.unwrap();
        assert_eq!(memory, LongTermMemory::default());
    }

    #[tokio::test]
    async fn write_long_term_replaces_and_drops_blanks() {
        let store = test_store().await;
        let user = ming();

        let mut first = LongTermMemory::default();
        first
            .set_fact(FactualKey::Identity, "Ming")
            .set_fact(FactualKey::Taboos, "")
            .set_semantic(SemanticKey::Goals, "visit every planet");
        first.episodic.push(Episode::new("event", "tamed a fox").with_timestamp("yesterday"));
        first.episodic.push(Episode::new("event", "  "));
        store.write_long_term(&user, &first).await.unwrap();

        let stored = store.read_long_term(&user).await.unwrap();
        assert_eq!(stored.fact(FactualKey::Identity), "Ming");
        assert!(!stored.factual.contains_key(&FactualKey::Taboos));
        assert_eq!(stored.episodic.len(), 1);
        assert_eq!(stored.episodic[0].timestamp, "yesterday");

        let mut second = LongTermMemory::default();
        second.set_fact(FactualKey::Interests, "stars");
        store.write_long_term(&user, &second).await.unwrap();

        let stored = store.read_long_term(&user).await.unwrap();
        assert_eq!(stored.fact(FactualKey::Identity), "");
        assert_eq!(stored.fact(FactualKey::Interests), "stars");
        assert!(stored.episodic.is_empty());
    }

    #[tokio::test]
    async fn episodes_keep_insertion_order() {
        let store = test_store().await;
        let user = ming();
        let mut memory = LongTermMemory::default();
        for i in 0..4 {
            memory.episodic.push(Episode::new("event", format!("episode {i}")));
        }
        store.write_long_term(&user, &memory).await.unwrap();

        let stored = store.read_long_term(&user).await.unwrap();
        assert_eq!(stored.episodic, memory.episodic);
    }

    #[tokio::test]
    async fn stats_count_each_tier() {
        let store = test_store().await;
        let user = ming();
        store.append_turn(&user, "hi", "hello").await.unwrap();

        let mut memory = LongTermMemory::default();
        memory
            .set_fact(FactualKey::Identity, "Ming")
            .set_fact(FactualKey::Interests, "stars")
            .set_semantic(SemanticKey::Values, "friendship");
        memory.episodic.push(Episode::new("event", "sunset"));
        store.write_long_term(&user, &memory).await.unwrap();

        let stats = store.stats(&user).await.unwrap();
        assert_eq!(
            stats,
            MemoryStats {
                short_term_count: 1,
                factual_count: 2,
                episodic_count: 1,
                semantic_count: 1,
            }
        );
    }

    #[tokio::test]
    async fn clear_all_wipes_both_tiers() {
        let store = test_store().await;
        let user = ming();
        store.append_turn(&user, "hi", "hello").await.unwrap();
        let mut memory = LongTermMemory::default();
        memory.set_fact(FactualKey::Identity, "Ming");
        store.write_long_term(&user, &memory).await.unwrap();

        assert_eq!(store.clear_all(&user).await.unwrap(), 2);
        assert_eq!(store.stats(&user).await.unwrap(), MemoryStats::default());

        let history = store.update_history(&user, 10).await.unwrap();
        assert_eq!(history[0].kind, UpdateKind::MemoryClearAll);
        assert_eq!(history[0].item_count, 2);
    }

    #[tokio::test]
    async fn update_history_is_newest_first_and_limited() {
        let store = test_store().await;
        let user = ming();
        for i in 0..5 {
            store.append_turn(&user, &format!("message {i}"), "ok").await.unwrap();
        }

        let history = store.update_history(&user, 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|r| r.kind == UpdateKind::ShortTermAdd));
        assert!(history[0].description.contains("message 4"));
        assert!(history[2].description.contains("message 2"));
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memory.sqlite");
        let user = ming();

        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.append_turn(&user, "remember me", "I will").await.unwrap();
            let mut memory = LongTermMemory::default();
            memory.set_fact(FactualKey::Identity, "Ming");
            store.write_long_term(&user, &memory).await.unwrap();
        }

        let store = SqliteStore::open(&path).await.unwrap();
        assert_eq!(store.read_turns(&user, None).await.unwrap()[0].user_text, "remember me");
        assert_eq!(store.read_long_term(&user).await.unwrap().fact(FactualKey::Identity), "Ming");

        // New turns sort after the persisted ones
        store.append_turn(&user, "second", "ok").await.unwrap();
        let turns = store.read_turns(&user, None).await.unwrap();
        assert_eq!(turns.last().unwrap().user_text, "second");
    }
}
