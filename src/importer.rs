//! Loading of export files and lenient type definitions for every supported
//! export schema.
//!
//! Exports are produced by three different products that change their formats
//! without notice, so every field here is optional and unknown fields are
//! ignored. The shapes are only deserialized after [`crate::detect`] has
//! picked the schema; a document that matches a schema's signature but not
//! these shapes becomes a normalization error, not a panic.
//!
//! Formats:
//! - **AI Studio** (Google): a prompt file with `runSettings`,
//!   `systemInstruction` and `chunkedPrompt.chunks`, where model turns may be
//!   flagged `isThought`.
//! - **ChatGPT** (OpenAI): one conversation from `conversations.json`, a tree
//!   of nodes keyed by id under `mapping`, with `current_node` pointing at
//!   the leaf of the visible branch.
//! - **Claude** (Anthropic): one conversation with `chat_messages`, each
//!   carrying `sender` and typed `content` blocks (`text`, `thinking`).

use crate::error::ConvertError;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

// ---------------------------------------------------------------------------
// Raw document
// ---------------------------------------------------------------------------

/// A parsed export file, before its schema is known.
///
/// Files that are not valid JSON still load: their value is `null`, which
/// the detector classifies as unknown.
#[derive(Debug, Clone)]
pub struct RawDocument {
    path: PathBuf,
    size: u64,
    value: Value,
}

impl RawDocument {
    pub fn load(path: &Path) -> Result<Self, ConvertError> {
        let bytes = fs::read(path).map_err(|source| ConvertError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(path, &bytes))
    }

    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        let path = path.into();
        let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let value = match serde_json::from_slice::<Value>(body) {
            Ok(v) => v,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "not valid JSON");
                Value::Null
            }
        };
        Self {
            path,
            size: bytes.len() as u64,
            value,
        }
    }

    pub fn from_value(path: impl Into<PathBuf>, value: Value) -> Self {
        let size = serde_json::to_vec(&value).map_or(0, |v| v.len() as u64);
        Self {
            path: path.into(),
            size,
            value,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

// ---------------------------------------------------------------------------
// Shared content shapes
// ---------------------------------------------------------------------------

/// Message content that is either a plain string or a list of parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<Part>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text(String),
    Block(PartBlock),
}

/// One element of a content list.
///
/// Covers AI Studio parts (`text`, `thought` or `isThought`, `inlineData`) and Claude
/// content blocks (`type`, `text`, `thinking`) with a single shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartBlock {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub text: Option<String>,
    pub thinking: Option<String>,
    #[serde(alias = "isThought")]
    pub thought: bool,
    pub inline_data: Option<InlineData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InlineData {
    pub mime_type: Option<String>,
}

// ---------------------------------------------------------------------------
// AI Studio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiStudioExport {
    #[serde(alias = "run_settings")]
    pub run_settings: Option<IndexMap<String, Value>>,
    pub system_instruction: Option<SystemInstruction>,
    pub chunked_prompt: Option<ChunkedPrompt>,
    /// Gemini API request shape: `{ role, parts }` entries.
    pub contents: Option<Vec<Chunk>>,
    pub messages: Option<Vec<AiStudioMessage>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SystemInstruction {
    Text(String),
    Block {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        parts: Vec<Part>,
    },
}

/// `chunkedPrompt` is normally `{ "chunks": [...] }`, but hand-edited files
/// sometimes hold the chunk list directly.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChunkedPrompt {
    Chunks(Vec<Chunk>),
    Wrapped {
        #[serde(default)]
        chunks: Vec<Chunk>,
    },
}

impl ChunkedPrompt {
    pub fn chunks(&self) -> &[Chunk] {
        match self {
            Self::Chunks(c) | Self::Wrapped { chunks: c } => c,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Chunk {
    pub role: Option<String>,
    pub text: Option<String>,
    pub parts: Vec<Part>,
    pub is_thought: bool,
    #[serde(alias = "timestamp", alias = "time")]
    pub create_time: Option<Value>,
    pub token_count: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AiStudioMessage {
    pub role: Option<String>,
    pub content: Option<Content>,
    pub text: Option<String>,
    #[serde(alias = "time")]
    pub timestamp: Option<Value>,
}

// ---------------------------------------------------------------------------
// ChatGPT
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatGptExport {
    pub title: Option<String>,
    pub id: Option<String>,
    pub conversation_id: Option<String>,
    pub create_time: Option<Value>,
    pub update_time: Option<Value>,
    pub default_model_slug: Option<String>,
    pub mapping: IndexMap<String, ChatGptNode>,
    pub current_node: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatGptNode {
    pub id: Option<String>,
    pub message: Option<ChatGptMessage>,
    pub parent: Option<String>,
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatGptMessage {
    pub author: ChatGptAuthor,
    pub create_time: Option<Value>,
    pub content: Option<ChatGptContent>,
    pub metadata: Option<IndexMap<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatGptAuthor {
    pub role: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatGptContent {
    pub content_type: Option<String>,
    /// Strings for text, objects for image pointers and other attachments.
    pub parts: Vec<Value>,
    pub text: Option<String>,
    /// Set on `reasoning_recap` messages ("Thought for 5 seconds").
    pub content: Option<String>,
    /// Reasoning summaries (`content_type: "thoughts"`).
    pub thoughts: Vec<ChatGptThought>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChatGptThought {
    pub summary: Option<String>,
    pub content: Option<String>,
}

// ---------------------------------------------------------------------------
// Claude
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClaudeExport {
    pub uuid: Option<String>,
    pub name: Option<String>,
    pub summary: Option<String>,
    pub model: Option<String>,
    pub created_at: Option<Value>,
    pub updated_at: Option<Value>,
    pub chat_messages: Option<Vec<ClaudeChatMessage>>,
    pub messages: Option<Vec<ClaudeLegacyMessage>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClaudeChatMessage {
    pub uuid: Option<String>,
    pub sender: Option<String>,
    pub text: Option<String>,
    pub content: Vec<Part>,
    pub created_at: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClaudeLegacyMessage {
    pub role: Option<String>,
    pub content: Option<Content>,
    #[serde(alias = "created_at")]
    pub timestamp: Option<Value>,
}
