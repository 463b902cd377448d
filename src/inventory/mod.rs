//! Readers for the assistant's configuration and state files.
//!
//! Every reader treats a missing file as "nothing there" and a damaged file as
//! a logged warning followed by the empty result. Nothing here writes to disk.

pub mod projects;
pub mod settings;
pub mod todos;

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads a JSON document, returning `Ok(None)` when the file does not exist.
pub(crate) fn read_json(path: &Path) -> Result<Option<serde_json::Value>, InventoryError> {
    let text = match read_text(path)? {
        Some(text) => text,
        None => return Ok(None),
    };
    parse_json(path, &text).map(Some)
}

pub(crate) fn read_text(path: &Path) -> Result<Option<String>, InventoryError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(InventoryError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub(crate) fn parse_json(path: &Path, text: &str) -> Result<serde_json::Value, InventoryError> {
    serde_json::from_str(text).map_err(|source| InventoryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Logs a reader failure and collapses it into "absent".
pub(crate) fn absorb<T>(document: &'static str, result: Result<Option<T>, InventoryError>) -> Option<T> {
    match result {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, document, "ignoring unreadable document");
            None
        }
    }
}

// Field readers for hand-edited documents. A field of the wrong type reads as
// its empty value and never affects its neighbours.

pub(crate) fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Accepts a string or a number, rendering numbers as text.
pub(crate) fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// String entries of an array field; other entries are skipped.
pub(crate) fn string_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn count_field(value: &Value, key: &str) -> u64 {
    let Some(field) = value.get(key) else {
        return 0;
    };
    field
        .as_u64()
        .or_else(|| {
            field
                .as_f64()
                .filter(|n| n.is_finite() && *n >= 0.0)
                .map(|n| n as u64)
        })
        .unwrap_or(0)
}

pub(crate) fn number_field(value: &Value, key: &str) -> f64 {
    value
        .get(key)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

pub(crate) fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
    Some(DateTime::<Utc>::from(modified))
}
