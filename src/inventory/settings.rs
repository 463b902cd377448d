use super::{absorb, count_field, parse_json, read_text, string_field, string_list};
use serde::Serialize;
use serde_json::Value;
use std::{collections::BTreeMap, path::Path};

/// The user's settings document. Fields are read independently; a value of
/// an unexpected type reads as empty and leaves the rest intact.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub cleanup_period_days: Option<u64>,
    /// Values are kept as written; numbers and booleans are common here.
    pub env: BTreeMap<String, Value>,
    pub permissions: Option<Permissions>,
    pub status_line: Option<Value>,
    pub thinking_mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Permissions {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl Permissions {
    fn from_value(value: &Value) -> Option<Self> {
        value.is_object().then(|| Self {
            allow: string_list(value, "allow"),
            deny: string_list(value, "deny"),
        })
    }
}

impl Settings {
    fn from_object(root: &Value) -> Self {
        Self {
            schema: string_field(root, "$schema"),
            cleanup_period_days: root
                .get("cleanupPeriodDays")
                .map(|_| count_field(root, "cleanupPeriodDays")),
            env: root
                .get("env")
                .and_then(Value::as_object)
                .map(|vars| {
                    vars.iter()
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            permissions: root.get("permissions").and_then(Permissions::from_value),
            status_line: root.get("statusLine").filter(|v| !v.is_null()).cloned(),
            thinking_mode: string_field(root, "thinkingMode"),
        }
    }

    pub fn permissions(&self) -> Permissions {
        self.permissions.clone().unwrap_or_default()
    }
}

/// Reads the settings document, tolerating `//` comment lines and trailing
/// commas.
pub fn load(path: &Path) -> Option<Settings> {
    let parsed = read_text(path).and_then(|text| match text {
        Some(text) => parse_json(path, &strip_json_comments(&text)).map(Some),
        None => Ok(None),
    });
    let value = absorb("settings", parsed)?;

    if !value.is_object() {
        tracing::warn!(path = %path.display(), "settings root is not a JSON object");
        return None;
    }
    Some(Settings::from_object(&value))
}

pub fn load_permissions(path: &Path) -> Permissions {
    load(path)
        .map(|settings| settings.permissions())
        .unwrap_or_default()
}

/// Drops whole-line `//` comments and commas that directly precede a closing
/// bracket. Commas inside string literals are left alone.
pub fn strip_json_comments(text: &str) -> String {
    let without_comments: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect();
    let joined = without_comments.join("\n");

    let chars: Vec<char> = joined.chars().collect();
    let mut out = String::with_capacity(joined.len());
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[idx + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}
