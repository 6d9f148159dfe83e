use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;

/// Canonical speaker of a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    /// Map a source role label onto a canonical role.
    ///
    /// Returns `None` for labels no source is known to use; callers fall back
    /// to [`Role::Assistant`] and record a warning.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "user" | "human" => Some(Self::User),
            "assistant" | "model" | "ai" | "bot" => Some(Self::Assistant),
            "system" | "developer" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
            Self::System => "System",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: Option<DateTime<Utc>>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Schema-independent form of one conversation, built by an adapter and
/// consumed by the renderer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalRecord {
    pub turns: Vec<Turn>,
    /// Conversation-level facts (title, model, ids, times), in source order.
    pub metadata: IndexMap<String, Value>,
    /// Generation parameters as exported by the source.
    pub run_settings: IndexMap<String, Value>,
    pub source_file: PathBuf,
    /// Non-fatal oddities noticed while normalizing, e.g. unmapped roles.
    pub warnings: Vec<String>,
}

impl CanonicalRecord {
    pub fn new(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            ..Self::default()
        }
    }

    /// Append a turn whose role comes from a source label.
    ///
    /// Unrecognized labels become `assistant` turns plus a warning, so no
    /// content is silently dropped.
    pub fn push_labeled(&mut self, label: &str, content: String, timestamp: Option<DateTime<Utc>>) {
        let role = match Role::from_label(label) {
            Some(role) => role,
            None => {
                let msg = format!("unrecognized role {label:?} treated as assistant");
                tracing::warn!(source = %self.source_file.display(), "{msg}");
                self.warnings.push(msg);
                Role::Assistant
            }
        };
        self.turns.push(Turn::new(role, content).at(timestamp));
    }

    /// Insert a metadata entry, skipping absent and empty values.
    pub fn set_meta(&mut self, key: &str, value: Option<impl Into<Value>>) {
        let Some(value) = value.map(Into::into) else {
            return;
        };
        let empty = match &value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        if !empty {
            self.metadata.insert(key.to_string(), value);
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.get("title").and_then(Value::as_str)
    }
}

/// Interpret a source timestamp.
///
/// Numbers are Unix epoch seconds (milliseconds when implausibly large),
/// strings are RFC 3339. Anything else is ignored.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let secs = n.as_f64()?;
            let millis = if secs.abs() > 1e11 { secs } else { secs * 1000.0 };
            Utc.timestamp_millis_opt(millis.round() as i64).single()
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| s.trim().parse::<f64>().ok().and_then(|f| parse_timestamp(&Value::from(f)))),
        _ => None,
    }
}

/// Render a timestamp the way it appears in output documents.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_known_labels() {
        assert_eq!(Role::from_label("Human"), Some(Role::User));
        assert_eq!(Role::from_label("model"), Some(Role::Assistant));
        assert_eq!(Role::from_label("system"), Some(Role::System));
        assert_eq!(Role::from_label("tool"), None);
    }

    #[test]
    fn unknown_label_becomes_assistant_with_warning() {
        let mut record = CanonicalRecord::new("x.json");
        record.push_labeled("tool", "output".into(), None);
        assert_eq!(record.turns[0].role, Role::Assistant);
        assert_eq!(record.turns[0].content, "output");
        assert_eq!(record.warnings.len(), 1);
    }

    #[test]
    fn set_meta_skips_missing_and_blank() {
        let mut record = CanonicalRecord::new("x.json");
        record.set_meta("model", None::<String>);
        record.set_meta("title", Some("  "));
        record.set_meta("temperature", Some(0.7));
        assert_eq!(record.metadata.len(), 1);
        assert_eq!(record.metadata["temperature"], json!(0.7));
    }

    #[test]
    fn parses_epoch_seconds_and_rfc3339() {
        let a = parse_timestamp(&json!(1_700_000_000.5)).unwrap();
        let b = parse_timestamp(&json!("2023-11-14T22:13:20.500Z")).unwrap();
        assert_eq!(a, b);
        assert_eq!(format_timestamp(&a), "2023-11-14T22:13:20Z");
        assert!(parse_timestamp(&json!(true)).is_none());
    }

    #[test]
    fn parses_epoch_milliseconds() {
        let ts = parse_timestamp(&json!(1_700_000_000_000_i64)).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }
}
