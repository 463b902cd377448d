use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::sync::OnceCell;

const TRANSCRIPT_SELECT: &str = r#"
    SELECT
        b.uuid,
        b.parent_uuid,
        b.session_id,
        b.timestamp,
        b.message_type,
        b.cwd,
        b.original_cwd,
        b.user_type,
        b.version,
        b.isSidechain AS is_sidechain,
        COALESCE(u.message, a.message) AS content,
        a.cost_usd,
        a.duration_ms,
        a.model,
        u.tool_use_result,
        CASE WHEN u.uuid IS NOT NULL THEN 'user' ELSE 'assistant' END AS role
    FROM base_messages b
    LEFT JOIN user_messages u ON b.uuid = u.uuid
    LEFT JOIN assistant_messages a ON b.uuid = a.uuid
"#;

/// Read-only view of the assistant's message log.
#[derive(Clone)]
pub struct MessageStore {
    pool: Arc<SqlitePool>,
}

impl MessageStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path_buf)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open message store {}", path_buf.display()))?;

        tracing::debug!(path = %path_buf.display(), "opened message store");
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub async fn recent_sessions(&self, limit: usize) -> Vec<SessionSummary> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        or_empty("recent_sessions", self.fetch_sessions(limit).await)
    }

    pub async fn all_sessions(&self) -> Vec<SessionSummary> {
        // SQLite treats a negative LIMIT as unbounded.
        or_empty("all_sessions", self.fetch_sessions(-1).await)
    }

    pub async fn session_messages(&self, session_id: &str) -> Vec<FullMessage> {
        let sql = format!("{TRANSCRIPT_SELECT} WHERE b.session_id = ? ORDER BY b.timestamp ASC");
        let result = sqlx::query(&sql)
            .bind(session_id)
            .fetch_all(&*self.pool)
            .await
            .with_context(|| "failed to load session transcript")
            .map(|rows| rows.iter().map(FullMessage::from_row).collect());
        or_empty("session_messages", result)
    }

    pub async fn messages_by_project(&self, project_path: &str) -> Vec<FullMessage> {
        let sql = format!("{TRANSCRIPT_SELECT} WHERE b.cwd LIKE ? ORDER BY b.timestamp DESC");
        let result = sqlx::query(&sql)
            .bind(format!("%{project_path}%"))
            .fetch_all(&*self.pool)
            .await
            .with_context(|| "failed to load project messages")
            .map(|rows| rows.iter().map(FullMessage::from_row).collect());
        or_empty("messages_by_project", result)
    }

    pub async fn search_messages(&self, query: &str, limit: usize) -> Vec<FullMessage> {
        let sql = format!(
            "{TRANSCRIPT_SELECT} WHERE u.message LIKE ?1 OR a.message LIKE ?1 ORDER BY b.timestamp DESC LIMIT ?2"
        );
        let result = sqlx::query(&sql)
            .bind(format!("%{query}%"))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await
            .with_context(|| "failed to search messages")
            .map(|rows| rows.iter().map(FullMessage::from_row).collect());
        or_empty("search_messages", result)
    }

    pub async fn session_stats(&self) -> StoreStats {
        or_empty("session_stats", self.fetch_session_stats().await)
    }

    pub async fn conversation_summaries(&self) -> Vec<ConversationSummary> {
        or_empty(
            "conversation_summaries",
            self.fetch_conversation_summaries().await,
        )
    }

    async fn fetch_sessions(&self, limit: i64) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT
                b.session_id,
                MIN(b.timestamp) AS start_time,
                MAX(b.timestamp) AS end_time,
                COUNT(*) AS message_count,
                b.cwd AS project_path,
                TOTAL(a.cost_usd) AS total_cost
            FROM base_messages b
            LEFT JOIN assistant_messages a ON b.uuid = a.uuid
            GROUP BY b.session_id
            ORDER BY MAX(b.timestamp) DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .with_context(|| "failed to load session roster")?;

        let mut sessions = Vec::with_capacity(rows.len());
        for row in rows {
            let start_time = int_column(&row, "start_time");
            let end_time = int_column(&row, "end_time");
            let project_path = row
                .try_get::<Option<String>, _>("project_path")
                .unwrap_or(None);
            sessions.push(SessionSummary {
                session_id: row.try_get("session_id")?,
                start_time,
                end_time,
                duration_ms: end_time.saturating_sub(start_time).max(0),
                message_count: int_column(&row, "message_count").max(0) as u64,
                project_name: session_project_name(project_path.as_deref()),
                project_path,
                total_cost: float_column(&row, "total_cost"),
            });
        }
        Ok(sessions)
    }

    async fn fetch_session_stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(DISTINCT b.session_id) AS total_sessions,
                COUNT(*) AS total_messages,
                TOTAL(a.cost_usd) AS total_cost,
                COALESCE(AVG(a.duration_ms), 0.0) AS avg_response_time
            FROM base_messages b
            LEFT JOIN assistant_messages a ON b.uuid = a.uuid
            "#,
        )
        .fetch_one(&*self.pool)
        .await
        .with_context(|| "failed to load message store totals")?;

        Ok(StoreStats {
            total_sessions: int_column(&row, "total_sessions").max(0) as u64,
            total_messages: int_column(&row, "total_messages").max(0) as u64,
            total_cost: float_column(&row, "total_cost"),
            avg_response_time: float_column(&row, "avg_response_time"),
        })
    }

    async fn fetch_conversation_summaries(&self) -> Result<Vec<ConversationSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT leaf_uuid, summary, updated_at
            FROM conversation_summaries
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .with_context(|| "failed to load conversation summaries")?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            summaries.push(ConversationSummary {
                leaf_uuid: row.try_get("leaf_uuid")?,
                summary: row
                    .try_get::<Option<String>, _>("summary")
                    .unwrap_or(None)
                    .unwrap_or_default(),
                updated_at: int_column(&row, "updated_at"),
            });
        }
        Ok(summaries)
    }
}

fn or_empty<T: Default>(query: &'static str, result: Result<T>) -> T {
    result.unwrap_or_else(|err| {
        tracing::warn!(error = %format!("{err:#}"), query, "message store query failed");
        T::default()
    })
}

// The log stores numbers with loose affinity; read whichever storage class
// the column actually holds.
fn int_column(row: &SqliteRow, name: &str) -> i64 {
    row.try_get::<i64, _>(name)
        .or_else(|_| row.try_get::<f64, _>(name).map(|value| value as i64))
        .unwrap_or(0)
}

fn float_column(row: &SqliteRow, name: &str) -> f64 {
    row.try_get::<f64, _>(name)
        .or_else(|_| row.try_get::<i64, _>(name).map(|value| value as f64))
        .unwrap_or(0.0)
}

fn opt_float_column(row: &SqliteRow, name: &str) -> Option<f64> {
    row.try_get::<Option<f64>, _>(name)
        .or_else(|_| {
            row.try_get::<Option<i64>, _>(name)
                .map(|value| value.map(|v| v as f64))
        })
        .unwrap_or(None)
}

fn opt_string_column(row: &SqliteRow, name: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(name).unwrap_or(None)
}

/// Lazily opened, shared message store.
///
/// The first successful open is kept for the life of the process and
/// concurrent callers wait on the same open. A failed open is not cached, so
/// a store that appears later is picked up on the next request.
#[derive(Clone)]
pub struct StoreHandle {
    path: PathBuf,
    store: Arc<OnceCell<MessageStore>>,
}

impl StoreHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            store: Arc::new(OnceCell::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self) -> Option<&MessageStore> {
        if let Some(store) = self.store.get() {
            return Some(store);
        }
        if !self.path.exists() {
            tracing::debug!(path = %self.path.display(), "message store not found");
            return None;
        }
        match self
            .store
            .get_or_try_init(|| MessageStore::open(&self.path))
            .await
        {
            Ok(store) => Some(store),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "message store unavailable");
                None
            }
        }
    }

    pub async fn recent_sessions(&self, limit: usize) -> Vec<SessionSummary> {
        match self.get().await {
            Some(store) => store.recent_sessions(limit).await,
            None => Vec::new(),
        }
    }

    pub async fn all_sessions(&self) -> Vec<SessionSummary> {
        match self.get().await {
            Some(store) => store.all_sessions().await,
            None => Vec::new(),
        }
    }

    pub async fn session_messages(&self, session_id: &str) -> Vec<FullMessage> {
        match self.get().await {
            Some(store) => store.session_messages(session_id).await,
            None => Vec::new(),
        }
    }

    pub async fn messages_by_project(&self, project_path: &str) -> Vec<FullMessage> {
        match self.get().await {
            Some(store) => store.messages_by_project(project_path).await,
            None => Vec::new(),
        }
    }

    pub async fn search_messages(&self, query: &str, limit: usize) -> Vec<FullMessage> {
        match self.get().await {
            Some(store) => store.search_messages(query, limit).await,
            None => Vec::new(),
        }
    }

    pub async fn session_stats(&self) -> StoreStats {
        match self.get().await {
            Some(store) => store.session_stats().await,
            None => StoreStats::default(),
        }
    }

    pub async fn conversation_summaries(&self) -> Vec<ConversationSummary> {
        match self.get().await {
            Some(store) => store.conversation_summaries().await,
            None => Vec::new(),
        }
    }
}

/// One row of the session roster. Timestamps are epoch milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub start_time: i64,
    pub end_time: i64,
    pub duration_ms: i64,
    pub message_count: u64,
    pub project_path: Option<String>,
    /// Last path segment of `project_path`, or `Unknown`.
    pub project_name: String,
    pub total_cost: f64,
}

fn session_project_name(project_path: Option<&str>) -> String {
    project_path
        .and_then(|path| path.rsplit('/').next())
        .filter(|name| !name.is_empty())
        .unwrap_or("Unknown")
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A transcript row: the base message joined with its user or assistant
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullMessage {
    pub uuid: String,
    pub parent_uuid: Option<String>,
    pub session_id: String,
    pub timestamp: i64,
    pub message_type: Option<String>,
    pub cwd: Option<String>,
    pub original_cwd: Option<String>,
    pub user_type: Option<String>,
    pub version: Option<String>,
    pub is_sidechain: bool,
    pub content: String,
    pub cost_usd: Option<f64>,
    pub duration_ms: Option<f64>,
    pub model: Option<String>,
    pub tool_use_result: Option<String>,
    pub role: MessageRole,
}

impl FullMessage {
    fn from_row(row: &SqliteRow) -> Self {
        let role = match opt_string_column(row, "role").as_deref() {
            Some("user") => MessageRole::User,
            _ => MessageRole::Assistant,
        };
        Self {
            uuid: opt_string_column(row, "uuid").unwrap_or_default(),
            parent_uuid: opt_string_column(row, "parent_uuid"),
            session_id: opt_string_column(row, "session_id").unwrap_or_default(),
            timestamp: int_column(row, "timestamp"),
            message_type: opt_string_column(row, "message_type"),
            cwd: opt_string_column(row, "cwd"),
            original_cwd: opt_string_column(row, "original_cwd"),
            user_type: opt_string_column(row, "user_type"),
            version: opt_string_column(row, "version"),
            is_sidechain: int_column(row, "is_sidechain") != 0,
            content: opt_string_column(row, "content").unwrap_or_default(),
            cost_usd: opt_float_column(row, "cost_usd"),
            duration_ms: opt_float_column(row, "duration_ms"),
            model: opt_string_column(row, "model"),
            tool_use_result: opt_string_column(row, "tool_use_result"),
            role,
        }
    }
}

/// Totals computed by the message store, independent of the usage snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_sessions: u64,
    pub total_messages: u64,
    pub total_cost: f64,
    /// Mean assistant response time in milliseconds.
    pub avg_response_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub leaf_uuid: String,
    pub summary: String,
    pub updated_at: i64,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const SCHEMA: &[&str] = &[
        r#"CREATE TABLE base_messages (
            uuid TEXT PRIMARY KEY,
            parent_uuid TEXT,
            session_id TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            message_type TEXT NOT NULL,
            cwd TEXT NOT NULL,
            original_cwd TEXT NOT NULL,
            user_type TEXT NOT NULL,
            version TEXT NOT NULL,
            isSidechain INTEGER NOT NULL
        )"#,
        r#"CREATE TABLE user_messages (
            uuid TEXT PRIMARY KEY,
            message TEXT NOT NULL,
            tool_use_result TEXT,
            timestamp INTEGER NOT NULL,
            is_at_mention_read INTEGER,
            is_meta INTEGER
        )"#,
        r#"CREATE TABLE assistant_messages (
            uuid TEXT PRIMARY KEY,
            cost_usd REAL,
            duration_ms INTEGER,
            message TEXT NOT NULL,
            is_api_error_message INTEGER NOT NULL DEFAULT 0,
            timestamp INTEGER NOT NULL,
            model TEXT
        )"#,
    ];

    pub struct Seed<'a> {
        pub uuid: &'a str,
        pub session_id: &'a str,
        pub timestamp: i64,
        pub cwd: &'a str,
        pub text: &'a str,
        /// `None` for a user message, `Some((cost, duration, model))` for an
        /// assistant reply.
        pub assistant: Option<(f64, i64, &'a str)>,
    }

    /// Builds a populated message log at `path` using a writable connection.
    pub async fn seed_store(path: &Path, rows: &[Seed<'_>], with_summaries: bool) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await.unwrap();
        }
        if with_summaries {
            sqlx::query(
                "CREATE TABLE conversation_summaries (leaf_uuid TEXT PRIMARY KEY, summary TEXT NOT NULL, updated_at INTEGER NOT NULL)",
            )
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query(
                "INSERT INTO conversation_summaries VALUES ('leaf-1', 'Older summary', 100), ('leaf-2', 'Newer summary', 200)",
            )
            .execute(&pool)
            .await
            .unwrap();
        }

        for seed in rows {
            sqlx::query(
                "INSERT INTO base_messages VALUES (?, NULL, ?, ?, ?, ?, ?, 'external', '1.0.0', 0)",
            )
            .bind(seed.uuid)
            .bind(seed.session_id)
            .bind(seed.timestamp)
            .bind(if seed.assistant.is_some() { "assistant" } else { "user" })
            .bind(seed.cwd)
            .bind(seed.cwd)
            .execute(&pool)
            .await
            .unwrap();

            match seed.assistant {
                Some((cost, duration, model)) => {
                    sqlx::query(
                        "INSERT INTO assistant_messages (uuid, cost_usd, duration_ms, message, timestamp, model) VALUES (?, ?, ?, ?, ?, ?)",
                    )
                    .bind(seed.uuid)
                    .bind(cost)
                    .bind(duration)
                    .bind(seed.text)
                    .bind(seed.timestamp)
                    .bind(model)
                    .execute(&pool)
                    .await
                    .unwrap();
                }
                None => {
                    sqlx::query(
                        "INSERT INTO user_messages (uuid, message, tool_use_result, timestamp) VALUES (?, ?, NULL, ?)",
                    )
                    .bind(seed.uuid)
                    .bind(seed.text)
                    .bind(seed.timestamp)
                    .execute(&pool)
                    .await
                    .unwrap();
                }
            }
        }

        pool.close().await;
    }

    pub fn sample_rows() -> Vec<Seed<'static>> {
        vec![
            Seed {
                uuid: "a1",
                session_id: "session-a",
                timestamp: 1_700_000_000_000,
                cwd: "/home/dev/alpha",
                text: "How do I parse JSON?",
                assistant: None,
            },
            Seed {
                uuid: "a2",
                session_id: "session-a",
                timestamp: 1_700_000_060_000,
                cwd: "/home/dev/alpha",
                text: "Use serde_json.",
                assistant: Some((0.25, 3000, "claude-sonnet-4-5")),
            },
            Seed {
                uuid: "b1",
                session_id: "session-b",
                timestamp: 1_700_000_600_000,
                cwd: "/home/dev/beta",
                text: "Refactor the parser",
                assistant: None,
            },
            Seed {
                uuid: "b2",
                session_id: "session-b",
                timestamp: 1_700_000_660_000,
                cwd: "/home/dev/beta",
                text: "Done, the parser now streams.",
                assistant: Some((1.5, 5000, "claude-opus-4-5-20251101")),
            },
        ]
    }
}
