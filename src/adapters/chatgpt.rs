use super::deserialize;
use crate::config::AdapterOptions;
use crate::detect::SourceSchema;
use crate::error::ConvertError;
use crate::importer::{ChatGptExport, ChatGptMessage, ChatGptNode, RawDocument};
use crate::record::{CanonicalRecord, format_timestamp, parse_timestamp};
use serde_json::Value;
use std::collections::HashSet;

pub(super) fn normalize(
    raw: &RawDocument,
    opts: &AdapterOptions,
) -> Result<CanonicalRecord, ConvertError> {
    let export: ChatGptExport = deserialize(raw, SourceSchema::ChatGpt)?;
    if export.mapping.is_empty() {
        return Err(ConvertError::normalization(
            SourceSchema::ChatGpt,
            "mapping contains no nodes",
        ));
    }

    let mut record = CanonicalRecord::new(raw.path());
    record.set_meta("title", export.title.clone());
    record.set_meta(
        "conversation_id",
        export.conversation_id.clone().or_else(|| export.id.clone()),
    );

    let mut last_model: Option<String> = None;
    for node in visible_branch(&export) {
        let Some(msg) = &node.message else {
            continue;
        };
        if let Some(slug) = msg
            .metadata
            .as_ref()
            .and_then(|m| m.get("model_slug"))
            .and_then(Value::as_str)
        {
            last_model = Some(slug.to_string());
        }
        let Some(text) = message_text(msg, opts.exclude_thoughts) else {
            continue;
        };
        let label = msg.author.role.as_deref().unwrap_or("assistant");
        let ts = msg.create_time.as_ref().and_then(parse_timestamp);
        record.push_labeled(label, text, ts);
    }

    record.set_meta("model", export.default_model_slug.clone().or(last_model));
    for (key, value) in [("create_time", &export.create_time), ("update_time", &export.update_time)] {
        let formatted = value.as_ref().and_then(parse_timestamp).map(|ts| format_timestamp(&ts));
        record.set_meta(key, formatted);
    }
    Ok(record)
}

/// Nodes of the branch the user last saw, root first.
///
/// Follows `current_node` up through `parent` links; exports without it are
/// walked down from the root, taking the newest child at every fork.
fn visible_branch(export: &ChatGptExport) -> Vec<&ChatGptNode> {
    let mapping = &export.mapping;
    let mut seen: HashSet<&str> = HashSet::new();
    let mut branch = Vec::new();

    if let Some(leaf) = export.current_node.as_deref().filter(|id| mapping.contains_key(*id)) {
        let mut cursor = Some(leaf);
        while let Some(id) = cursor {
            if !seen.insert(id) {
                break;
            }
            let Some(node) = mapping.get(id) else {
                break;
            };
            branch.push(node);
            cursor = node.parent.as_deref();
        }
        branch.reverse();
        return branch;
    }

    let root = mapping.iter().find(|(_, node)| {
        node.parent
            .as_deref()
            .is_none_or(|p| !mapping.contains_key(p))
    });
    let mut cursor = root.map(|(id, _)| id.as_str());
    while let Some(id) = cursor {
        if !seen.insert(id) {
            break;
        }
        let Some(node) = mapping.get(id) else {
            break;
        };
        branch.push(node);
        cursor = node
            .children
            .iter()
            .rev()
            .map(String::as_str)
            .find(|c| mapping.contains_key(*c));
    }
    branch
}

fn message_text(msg: &ChatGptMessage, exclude_thoughts: bool) -> Option<String> {
    let content = msg.content.as_ref()?;
    let text = match content.content_type.as_deref() {
        Some("thoughts") => {
            if exclude_thoughts {
                return None;
            }
            content
                .thoughts
                .iter()
                .flat_map(|t| [t.summary.as_deref(), t.content.as_deref()])
                .flatten()
                .collect::<Vec<_>>()
                .join("\n\n")
        }
        Some("reasoning_recap") => {
            if exclude_thoughts {
                return None;
            }
            content.content.clone().unwrap_or_default()
        }
        _ => {
            let parts: Vec<&str> = content.parts.iter().filter_map(Value::as_str).collect();
            if parts.is_empty() {
                content.text.clone().unwrap_or_default()
            } else {
                parts.join("\n")
            }
        }
    };
    (!text.trim().is_empty()).then_some(text)
}
