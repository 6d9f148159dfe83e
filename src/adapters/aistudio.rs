use super::{content_text, deserialize, flatten_parts};
use crate::config::AdapterOptions;
use crate::detect::SourceSchema;
use crate::error::ConvertError;
use crate::importer::{AiStudioExport, Chunk, RawDocument, SystemInstruction};
use crate::record::{CanonicalRecord, Role, Turn, parse_timestamp};

/// Run settings promoted into conversation metadata, as (source key, metadata key).
const PROMOTED_SETTINGS: &[(&str, &str)] = &[
    ("model", "model"),
    ("temperature", "temperature"),
    ("topP", "top_p"),
    ("topK", "top_k"),
    ("maxOutputTokens", "max_output_tokens"),
];

pub(super) fn normalize(
    raw: &RawDocument,
    opts: &AdapterOptions,
) -> Result<CanonicalRecord, ConvertError> {
    let export: AiStudioExport = deserialize(raw, SourceSchema::AiStudio)?;
    let mut record = CanonicalRecord::new(raw.path());

    if let Some(settings) = &export.run_settings {
        for (src, dst) in PROMOTED_SETTINGS {
            record.set_meta(dst, settings.get(*src).cloned());
        }
        record.run_settings = settings.clone();
    }

    if opts.include_system_prompt
        && let Some(instruction) = &export.system_instruction
    {
        let text = match instruction {
            SystemInstruction::Text(text) => text.clone(),
            SystemInstruction::Block { text: Some(text), .. } => text.clone(),
            SystemInstruction::Block { text: None, parts } => {
                flatten_parts(parts, opts.exclude_thoughts)
            }
        };
        if !text.trim().is_empty() {
            record.turns.push(Turn::new(Role::System, text));
        }
    }

    if let Some(prompt) = &export.chunked_prompt {
        for chunk in prompt.chunks() {
            push_chunk(&mut record, chunk, opts);
        }
    } else if let Some(contents) = &export.contents {
        for entry in contents {
            push_chunk(&mut record, entry, opts);
        }
    } else if let Some(messages) = &export.messages {
        for msg in messages {
            let text = msg
                .content
                .as_ref()
                .map(|c| content_text(c, opts.exclude_thoughts))
                .or_else(|| msg.text.clone())
                .unwrap_or_default();
            if text.trim().is_empty() {
                continue;
            }
            let ts = msg.timestamp.as_ref().and_then(parse_timestamp);
            record.push_labeled(msg.role.as_deref().unwrap_or("user"), text, ts);
        }
    } else {
        return Err(ConvertError::normalization(
            SourceSchema::AiStudio,
            "none of chunkedPrompt, contents or messages present",
        ));
    }

    Ok(record)
}

fn push_chunk(record: &mut CanonicalRecord, chunk: &Chunk, opts: &AdapterOptions) {
    if chunk.is_thought && opts.exclude_thoughts {
        return;
    }
    let text = match &chunk.text {
        Some(text) if !text.is_empty() => text.clone(),
        _ => flatten_parts(&chunk.parts, opts.exclude_thoughts),
    };
    if text.trim().is_empty() {
        return;
    }
    let ts = chunk.create_time.as_ref().and_then(parse_timestamp);
    // AI Studio omits the role on continuation chunks of model output.
    record.push_labeled(chunk.role.as_deref().unwrap_or("model"), text, ts);
}
