use serde::Serialize;
use serde_json::{Map, Value};
use std::{collections::BTreeMap, fs, io, path::Path};
use thiserror::Error;

/// Cumulative token usage for one model, as recorded in the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_input_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub web_search_requests: u64,
    /// Cost reported by the assistant itself. Informational only.
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
}

impl TokenUsage {
    fn from_value(value: &Value) -> Self {
        Self {
            input_tokens: count_field(value, "inputTokens"),
            output_tokens: count_field(value, "outputTokens"),
            cache_read_input_tokens: count_field(value, "cacheReadInputTokens"),
            cache_creation_input_tokens: count_field(value, "cacheCreationInputTokens"),
            web_search_requests: count_field(value, "webSearchRequests"),
            cost_usd: value
                .get("costUSD")
                .and_then(Value::as_f64)
                .filter(|cost| cost.is_finite())
                .unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyActivity {
    pub date: String,
    pub message_count: u64,
    pub session_count: u64,
    pub tool_call_count: u64,
}

impl DailyActivity {
    // Every entry is kept, even a damaged one, so that day windows stay a
    // plain tail of the recorded series.
    fn from_value(value: &Value) -> Self {
        Self {
            date: string_field(value, "date").unwrap_or_default(),
            message_count: count_field(value, "messageCount"),
            session_count: count_field(value, "sessionCount"),
            tool_call_count: count_field(value, "toolCallCount"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyModelTokens {
    pub date: String,
    pub tokens_by_model: BTreeMap<String, u64>,
}

impl DailyModelTokens {
    fn from_value(value: &Value) -> Option<Self> {
        let date = value.get("date")?.as_str()?.to_string();
        let tokens_by_model = value
            .get("tokensByModel")
            .and_then(Value::as_object)
            .map(|models| {
                models
                    .iter()
                    .map(|(model, tokens)| (model.clone(), as_count(tokens)))
                    .collect()
            })
            .unwrap_or_default();
        Some(Self {
            date,
            tokens_by_model,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LongestSession {
    pub session_id: String,
    pub duration: u64,
    pub message_count: u64,
    pub timestamp: Option<String>,
}

impl LongestSession {
    fn from_value(value: &Value) -> Option<Self> {
        Some(Self {
            session_id: value.get("sessionId")?.as_str()?.to_string(),
            duration: count_field(value, "duration"),
            message_count: count_field(value, "messageCount"),
            timestamp: string_field(value, "timestamp"),
        })
    }
}

/// The usage snapshot document written by the assistant.
///
/// Every field is read independently: a field that is missing or has the
/// wrong shape takes its empty value without affecting the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCacheSnapshot {
    pub version: Option<u64>,
    pub last_computed_date: Option<String>,
    pub daily_activity: Vec<DailyActivity>,
    pub daily_model_tokens: Vec<DailyModelTokens>,
    pub model_usage: BTreeMap<String, TokenUsage>,
    /// Sparse hour-of-day histogram keyed by the document's string keys.
    pub hour_counts: BTreeMap<String, u64>,
    pub total_sessions: u64,
    pub total_messages: u64,
    pub first_session_date: Option<String>,
    pub longest_session: Option<LongestSession>,
}

impl UsageCacheSnapshot {
    fn from_object(root: &Map<String, Value>) -> Self {
        Self {
            version: root.get("version").and_then(Value::as_u64),
            last_computed_date: root
                .get("lastComputedDate")
                .and_then(Value::as_str)
                .map(str::to_string),
            daily_activity: array_of(root.get("dailyActivity"), |entry| {
                Some(DailyActivity::from_value(entry))
            }),
            daily_model_tokens: array_of(
                root.get("dailyModelTokens"),
                DailyModelTokens::from_value,
            ),
            model_usage: root
                .get("modelUsage")
                .and_then(Value::as_object)
                .map(|models| {
                    models
                        .iter()
                        .filter(|(_, usage)| usage.is_object())
                        .map(|(model, usage)| (model.clone(), TokenUsage::from_value(usage)))
                        .collect()
                })
                .unwrap_or_default(),
            hour_counts: root
                .get("hourCounts")
                .and_then(Value::as_object)
                .map(|hours| {
                    hours
                        .iter()
                        .map(|(hour, count)| (hour.clone(), as_count(count)))
                        .collect()
                })
                .unwrap_or_default(),
            total_sessions: root.get("totalSessions").map(as_count).unwrap_or(0),
            total_messages: root.get("totalMessages").map(as_count).unwrap_or(0),
            first_session_date: root
                .get("firstSessionDate")
                .and_then(Value::as_str)
                .filter(|date| !date.is_empty())
                .map(str::to_string),
            longest_session: root.get("longestSession").and_then(LongestSession::from_value),
        }
    }
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot: {0}")]
    Read(#[from] io::Error),
    #[error("snapshot is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("snapshot root is not a JSON object")]
    NotAnObject,
}

/// Loads the snapshot at `path`.
///
/// A missing file is the normal state for a fresh install and returns
/// `None` quietly. Unreadable or corrupt documents are logged and also
/// return `None`; callers cannot tell the two apart.
pub fn load_snapshot(path: &Path) -> Option<UsageCacheSnapshot> {
    match read_snapshot(path) {
        Ok(snapshot) => Some(snapshot),
        Err(SnapshotError::Read(err)) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "usage snapshot not found");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, path = %path.display(), "failed to load usage snapshot");
            None
        }
    }
}

pub fn read_snapshot(path: &Path) -> Result<UsageCacheSnapshot, SnapshotError> {
    let contents = fs::read_to_string(path)?;
    parse_snapshot(&contents)
}

pub fn parse_snapshot(contents: &str) -> Result<UsageCacheSnapshot, SnapshotError> {
    let value: Value = serde_json::from_str(contents)?;
    let root = value.as_object().ok_or(SnapshotError::NotAnObject)?;
    Ok(UsageCacheSnapshot::from_object(root))
}

fn array_of<T>(value: Option<&Value>, parse: impl Fn(&Value) -> Option<T>) -> Vec<T> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse).collect())
        .unwrap_or_default()
}

fn count_field(value: &Value, key: &str) -> u64 {
    value.get(key).map(as_count).unwrap_or(0)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

// Counts are written as integers, but tolerate float encodings; anything
// negative or non-numeric reads as zero.
fn as_count(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|number| number.is_finite() && *number >= 0.0)
                .map(|number| number as u64)
        })
        .unwrap_or(0)
}
