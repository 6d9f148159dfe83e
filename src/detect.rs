//! Export format detection.
//!
//! Classification looks only at the structure of the parsed document, never
//! at the file name. Predicates are checked in a fixed order and each one
//! excludes the signatures of the predicates before it, so at most one can
//! match any document.

use crate::error::ConvertError;
use crate::importer::RawDocument;
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceSchema {
    AiStudio,
    ChatGpt,
    Claude,
    Unknown,
}

impl SourceSchema {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AiStudio => "aistudio",
            Self::ChatGpt => "chatgpt",
            Self::Claude => "claude",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SourceSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const AISTUDIO_KEYS: &[&str] = &["chunkedPrompt", "runSettings", "run_settings", "systemInstruction"];

type Predicate = fn(&Map<String, Value>) -> bool;

/// Detection order. The first matching predicate wins.
const PREDICATES: &[(SourceSchema, Predicate)] = &[
    (SourceSchema::AiStudio, is_aistudio),
    (SourceSchema::ChatGpt, is_chatgpt),
    (SourceSchema::Claude, is_claude),
];

fn has_aistudio_signature(obj: &Map<String, Value>) -> bool {
    AISTUDIO_KEYS.iter().any(|k| obj.contains_key(*k)) || has_gemini_contents(obj)
}

// Raw Gemini API shape: `contents: [{ role, parts: [...] }]`.
fn has_gemini_contents(obj: &Map<String, Value>) -> bool {
    obj.get("contents")
        .and_then(Value::as_array)
        .is_some_and(|items| {
            items
                .iter()
                .any(|item| item.get("parts").is_some_and(Value::is_array))
        })
}

// Every node is an object, and unless the tree is empty at least one of
// them carries a message with an author role.
fn has_chatgpt_signature(obj: &Map<String, Value>) -> bool {
    let Some(mapping) = obj.get("mapping").and_then(Value::as_object) else {
        return false;
    };
    if !mapping.values().all(Value::is_object) {
        return false;
    }
    mapping.is_empty()
        || mapping.values().any(|node| {
            node.pointer("/message/author/role")
                .is_some_and(Value::is_string)
        })
}

fn has_claude_signature(obj: &Map<String, Value>) -> bool {
    if obj.get("chat_messages").is_some_and(Value::is_array) {
        return true;
    }
    // Older Claude exports: a flat `messages` list with chat roles.
    obj.get("messages")
        .and_then(Value::as_array)
        .is_some_and(|msgs| {
            msgs.iter().any(|m| {
                matches!(
                    m.get("role").and_then(Value::as_str),
                    Some("user" | "assistant")
                )
            })
        })
}

fn is_aistudio(obj: &Map<String, Value>) -> bool {
    has_aistudio_signature(obj)
}

fn is_chatgpt(obj: &Map<String, Value>) -> bool {
    has_chatgpt_signature(obj) && !has_aistudio_signature(obj)
}

fn is_claude(obj: &Map<String, Value>) -> bool {
    has_claude_signature(obj) && !has_chatgpt_signature(obj) && !has_aistudio_signature(obj)
}

/// Every schema whose predicate matches `raw`.
///
/// Used to check predicate exclusivity; normal callers want [`detect`].
pub fn matching_schemas(raw: &RawDocument) -> Vec<SourceSchema> {
    let Some(obj) = raw.value().as_object() else {
        return Vec::new();
    };
    PREDICATES
        .iter()
        .filter(|(_, pred)| pred(obj))
        .map(|(schema, _)| *schema)
        .collect()
}

/// Classify a document. Never fails: anything unrecognizable is
/// [`SourceSchema::Unknown`].
pub fn detect(raw: &RawDocument) -> SourceSchema {
    let Some(obj) = raw.value().as_object() else {
        return SourceSchema::Unknown;
    };
    PREDICATES
        .iter()
        .find(|(_, pred)| pred(obj))
        .map_or(SourceSchema::Unknown, |(schema, _)| *schema)
}

/// Like [`detect`], but treats overlapping predicates as an internal
/// consistency failure instead of trusting the order.
pub fn classify(raw: &RawDocument) -> Result<SourceSchema, ConvertError> {
    let candidates = matching_schemas(raw);
    match candidates.as_slice() {
        [] => Ok(SourceSchema::Unknown),
        [schema] => Ok(*schema),
        _ => {
            tracing::error!(
                path = %raw.path().display(),
                ?candidates,
                "detection predicates overlap"
            );
            Err(ConvertError::DetectionAmbiguous { candidates })
        }
    }
}
