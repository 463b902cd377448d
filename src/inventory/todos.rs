use super::{absorb, modified_at, parse_json, read_text, string_field, text_field};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::{fs, path::Path};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    #[default]
    Unknown,
}

impl TodoStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "in_progress" => Self::InProgress,
            "completed" => Self::Completed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_form: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl TodoItem {
    /// Non-object entries are not todos. Within an object, numeric `priority`
    /// and `id` values are kept as text and other odd values read as absent.
    fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        Some(Self {
            content: string_field(value, "content").unwrap_or_default(),
            status: value
                .get("status")
                .and_then(Value::as_str)
                .map(TodoStatus::parse)
                .unwrap_or_default(),
            active_form: string_field(value, "activeForm"),
            priority: text_field(value, "priority"),
            id: text_field(value, "id"),
        })
    }
}

/// One todo list file, named `<session>-agent-<agent>.json` on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoFile {
    pub id: String,
    pub filename: String,
    pub items: Vec<TodoItem>,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoStats {
    pub total: u64,
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub todo_files: u64,
}

/// Loads every non-empty todo list in `dir`, ordered by filename.
pub fn load(dir: &Path) -> Vec<TodoFile> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            tracing::debug!(path = %dir.display(), error = %err, "todo directory unavailable");
            return Vec::new();
        }
    };

    let mut files: Vec<TodoFile> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let filename = entry.file_name().to_str()?.to_string();
            let stem = filename.strip_suffix(".json")?;
            let id = stem.split("-agent-").next().unwrap_or(stem).to_string();
            let items = read_items(&entry.path())?;
            if items.is_empty() {
                return None;
            }
            Some(TodoFile {
                id,
                items,
                modified_at: modified_at(&entry.path()),
                filename,
            })
        })
        .collect();

    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    files
}

fn read_items(path: &Path) -> Option<Vec<TodoItem>> {
    let parsed = read_text(path).and_then(|text| match text {
        Some(text) => parse_json(path, &text).map(Some),
        None => Ok(None),
    });
    let value = absorb("todo list", parsed)?;

    // Anything other than an array holds no todos.
    let items = match value {
        Value::Array(items) => items,
        _ => return Some(Vec::new()),
    };
    Some(
        items
            .iter()
            .filter_map(TodoItem::from_value)
            .collect(),
    )
}

pub fn todo_stats(files: &[TodoFile]) -> TodoStats {
    let mut stats = TodoStats {
        todo_files: files.len() as u64,
        ..TodoStats::default()
    };

    for item in files.iter().flat_map(|file| &file.items) {
        match item.status {
            TodoStatus::Pending => stats.pending += 1,
            TodoStatus::InProgress => stats.in_progress += 1,
            TodoStatus::Completed => stats.completed += 1,
            TodoStatus::Unknown => {}
        }
    }
    stats.total = stats.pending + stats.in_progress + stats.completed;
    stats
}

/// Most recently modified lists first.
pub fn recent_todos(mut files: Vec<TodoFile>, limit: usize) -> Vec<TodoFile> {
    files.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    files.truncate(limit);
    files
}
