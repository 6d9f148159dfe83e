use super::{content_text, deserialize, flatten_parts};
use crate::config::AdapterOptions;
use crate::detect::SourceSchema;
use crate::error::ConvertError;
use crate::importer::{ClaudeExport, RawDocument};
use crate::record::{CanonicalRecord, format_timestamp, parse_timestamp};

pub(super) fn normalize(
    raw: &RawDocument,
    opts: &AdapterOptions,
) -> Result<CanonicalRecord, ConvertError> {
    let export: ClaudeExport = deserialize(raw, SourceSchema::Claude)?;
    let mut record = CanonicalRecord::new(raw.path());
    record.set_meta("title", export.name.clone());
    record.set_meta("conversation_id", export.uuid.clone());
    record.set_meta("model", export.model.clone());
    record.set_meta("summary", export.summary.clone());
    for (key, value) in [("created_at", &export.created_at), ("updated_at", &export.updated_at)] {
        let formatted = value.as_ref().and_then(parse_timestamp).map(|ts| format_timestamp(&ts));
        record.set_meta(key, formatted);
    }

    if let Some(messages) = &export.chat_messages {
        for msg in messages {
            let text = if msg.content.is_empty() {
                msg.text.clone().unwrap_or_default()
            } else {
                flatten_parts(&msg.content, opts.exclude_thoughts)
            };
            if text.trim().is_empty() {
                continue;
            }
            let ts = msg.created_at.as_ref().and_then(parse_timestamp);
            record.push_labeled(msg.sender.as_deref().unwrap_or("assistant"), text, ts);
        }
    } else if let Some(messages) = &export.messages {
        for msg in messages {
            let Some(content) = &msg.content else {
                continue;
            };
            let text = content_text(content, opts.exclude_thoughts);
            if text.trim().is_empty() {
                continue;
            }
            let ts = msg.timestamp.as_ref().and_then(parse_timestamp);
            record.push_labeled(msg.role.as_deref().unwrap_or("assistant"), text, ts);
        }
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Role;
    use serde_json::{Value, json};

    fn run(value: Value, exclude_thoughts: bool) -> CanonicalRecord {
        let opts = AdapterOptions {
            exclude_thoughts,
            ..AdapterOptions::default()
        };
        normalize(&RawDocument::from_value("claude.json", value), &opts).unwrap()
    }

    fn official() -> Value {
        json!({
            "uuid": "5f1c",
            "name": "Say hello",
            "created_at": "2025-03-01T10:00:00.000000Z",
            "chat_messages": [
                {
                    "sender": "human",
                    "text": "Hi Claude",
                    "content": [{ "type": "text", "text": "Hi Claude" }],
                    "created_at": "2025-03-01T10:00:00Z"
                },
                {
                    "sender": "assistant",
                    "content": [
                        { "type": "thinking", "thinking": "They greeted me." },
                        { "type": "text", "text": "Hello human" }
                    ]
                }
            ]
        })
    }

    #[test]
    fn maps_senders_and_metadata() {
        let record = run(official(), true);
        assert_eq!(record.turns.len(), 2);
        assert_eq!(record.turns[0].role, Role::User);
        assert_eq!(record.turns[1].content, "Hello human");
        assert_eq!(record.title(), Some("Say hello"));
        assert_eq!(record.metadata["created_at"], json!("2025-03-01T10:00:00Z"));
        assert!(record.turns[0].timestamp.is_some());
        assert!(record.turns[1].timestamp.is_none());
    }

    #[test]
    fn thinking_blocks_kept_when_filter_disabled() {
        let record = run(official(), false);
        assert_eq!(record.turns[1].content, "They greeted me.\nHello human");
    }

    #[test]
    fn legacy_messages_shape() {
        let record = run(
            json!({ "messages": [
                { "role": "user", "content": "Hi Claude" },
                { "role": "assistant", "content": [{ "text": "Hello human" }], "timestamp": "t" }
            ]}),
            true,
        );
        assert_eq!(record.turns.len(), 2);
        assert_eq!(record.turns[1].role, Role::Assistant);
        assert!(record.turns[1].timestamp.is_none());
    }
}
