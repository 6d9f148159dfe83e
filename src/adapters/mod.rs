//! Source adapters: one per known export schema, each turning a
//! [`RawDocument`] into a [`CanonicalRecord`].
//!
//! The schema set is closed, so dispatch is a plain `match` on
//! [`SourceSchema`] rather than a trait object registry.

mod aistudio;
mod chatgpt;
mod claude;

use crate::config::AdapterOptions;
use crate::detect::SourceSchema;
use crate::error::ConvertError;
use crate::importer::{Content, Part, RawDocument};
use crate::record::CanonicalRecord;
use serde::de::DeserializeOwned;

/// Normalize a document of a known schema.
///
/// Fails with [`ConvertError::Normalization`] when the document has the
/// schema's signature but not its shape, or yields no turns at all.
///
/// # Panics
///
/// Panics when `schema` is [`SourceSchema::Unknown`]; unrecognized
/// documents must be filtered out before normalization.
pub fn normalize(
    raw: &RawDocument,
    schema: SourceSchema,
    opts: &AdapterOptions,
) -> Result<CanonicalRecord, ConvertError> {
    let record = match schema {
        SourceSchema::AiStudio => aistudio::normalize(raw, opts)?,
        SourceSchema::ChatGpt => chatgpt::normalize(raw, opts)?,
        SourceSchema::Claude => claude::normalize(raw, opts)?,
        SourceSchema::Unknown => panic!(
            "normalize called on {} with an unknown schema",
            raw.path().display()
        ),
    };

    if record.turns.is_empty() {
        return Err(ConvertError::normalization(schema, "conversation has no turns"));
    }
    tracing::debug!(
        path = %raw.path().display(),
        %schema,
        turns = record.turns.len(),
        "normalized"
    );
    Ok(record)
}

fn deserialize<T: DeserializeOwned>(raw: &RawDocument, schema: SourceSchema) -> Result<T, ConvertError> {
    T::deserialize(raw.value())
        .map_err(|e| ConvertError::normalization(schema, format!("unexpected structure: {e}")))
}

fn is_reasoning_kind(kind: Option<&str>) -> bool {
    matches!(kind, Some("thinking" | "redacted_thinking"))
}

/// Join the textual parts of a content list, one part per line.
///
/// Reasoning parts are kept verbatim unless `exclude_thoughts` is set.
/// Non-text blocks (tool calls, attachments without a MIME type) are ignored.
fn flatten_parts(parts: &[Part], exclude_thoughts: bool) -> String {
    let mut pieces: Vec<String> = Vec::new();
    for part in parts {
        match part {
            Part::Text(text) => pieces.push(text.clone()),
            Part::Block(block) => {
                let kind = block.kind.as_deref();
                let reasoning = block.thought || is_reasoning_kind(kind);
                if reasoning && exclude_thoughts {
                    continue;
                }
                if !matches!(kind, None | Some("text")) && !reasoning {
                    continue;
                }
                if let Some(text) = block.text.as_ref().or(block.thinking.as_ref()) {
                    pieces.push(text.clone());
                } else if let Some(data) = &block.inline_data {
                    let mime = data.mime_type.as_deref().unwrap_or("unknown");
                    pieces.push(format!("[inline data: {mime}]"));
                }
            }
        }
    }
    pieces.retain(|p| !p.trim().is_empty());
    pieces.join("\n")
}

fn content_text(content: &Content, exclude_thoughts: bool) -> String {
    match content {
        Content::Text(text) => text.clone(),
        Content::Parts(parts) => flatten_parts(parts, exclude_thoughts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::PartBlock;
    use crate::record::Role;
    use serde_json::json;

    fn block(kind: Option<&str>, text: &str, thought: bool) -> Part {
        Part::Block(PartBlock {
            kind: kind.map(str::to_string),
            text: Some(text.to_string()),
            thought,
            ..PartBlock::default()
        })
    }

    #[test]
    fn flatten_filters_reasoning() {
        let parts = vec![
            block(None, "visible", false),
            block(None, "hidden", true),
            Part::Text("plain".into()),
            block(Some("tool_use"), "ignored", false),
        ];
        assert_eq!(flatten_parts(&parts, true), "visible\nplain");
        assert_eq!(flatten_parts(&parts, false), "visible\nhidden\nplain");
    }

    #[test]
    fn dispatches_by_schema() {
        let raw = RawDocument::from_value(
            "c.json",
            json!({ "chat_messages": [{ "sender": "human", "text": "hi" }] }),
        );
        let record = normalize(&raw, SourceSchema::Claude, &AdapterOptions::default()).unwrap();
        assert_eq!(record.turns[0].role, Role::User);
    }

    #[test]
    fn shape_mismatch_is_normalization_error() {
        let raw = RawDocument::from_value("c.json", json!({ "chat_messages": [42] }));
        let err = normalize(&raw, SourceSchema::Claude, &AdapterOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Normalization { .. }));
    }

    #[test]
    #[should_panic(expected = "unknown schema")]
    fn unknown_schema_is_a_caller_bug() {
        let raw = RawDocument::from_value("x.json", json!({}));
        let _ = normalize(&raw, SourceSchema::Unknown, &AdapterOptions::default());
    }
}
