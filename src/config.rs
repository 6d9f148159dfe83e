use crate::detect::SourceSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Which documents to produce per input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "md")]
    Markdown,
    Html,
    Both,
}

/// A single concrete document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocFormat {
    Markdown,
    Html,
}

impl DocFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for DocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl OutputFormat {
    pub fn formats(self) -> &'static [DocFormat] {
        match self {
            Self::Markdown => &[DocFormat::Markdown],
            Self::Html => &[DocFormat::Html],
            Self::Both => &[DocFormat::Markdown, DocFormat::Html],
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md" | "markdown" => Ok(Self::Markdown),
            "html" => Ok(Self::Html),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown format {other:?} (expected md, html or both)")),
        }
    }
}

/// Which schema to read inputs as. `Auto` runs the format detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    Auto,
    AiStudio,
    ChatGpt,
    Claude,
}

impl SourceFormat {
    /// The schema every input is forced to, if any.
    pub fn forced(self) -> Option<SourceSchema> {
        match self {
            Self::Auto => None,
            Self::AiStudio => Some(SourceSchema::AiStudio),
            Self::ChatGpt => Some(SourceSchema::ChatGpt),
            Self::Claude => Some(SourceSchema::Claude),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "aistudio" => Ok(Self::AiStudio),
            "chatgpt" => Ok(Self::ChatGpt),
            "claude" => Ok(Self::Claude),
            other => Err(format!(
                "unknown source format {other:?} (expected auto, aistudio, chatgpt or claude)"
            )),
        }
    }
}

/// Options consumed by the renderer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub include_yaml_front_matter: bool,
    pub include_timestamps: bool,
    pub include_run_settings: bool,
    /// Markdown template; the built-in one is used when `None`.
    pub template_path: Option<PathBuf>,
    /// HTML template; the built-in one is used when `None`.
    pub html_template_path: Option<PathBuf>,
    pub output_format: OutputFormat,
}

impl RenderOptions {
    pub fn template_for(&self, format: DocFormat) -> Option<&PathBuf> {
        match format {
            DocFormat::Markdown => self.template_path.as_ref(),
            DocFormat::Html => self.html_template_path.as_ref(),
        }
    }
}

/// Options consumed by the source adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterOptions {
    /// Drop turns and spans the source marks as internal reasoning.
    pub exclude_thoughts: bool,
    /// Keep the AI Studio system instruction as a leading system turn.
    pub include_system_prompt: bool,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            exclude_thoughts: true,
            include_system_prompt: true,
        }
    }
}

/// Configuration required to run a batch conversion.
/// This decouples the pipeline from how the options were gathered
/// (CLI, config file, watcher).
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Inputs are mirrored relative to the deepest of these that contains them.
    pub source_roots: Vec<PathBuf>,
    pub source_format: SourceFormat,
    pub dest_dir: PathBuf,
    pub render: RenderOptions,
    pub adapter: AdapterOptions,
    pub workers: usize,
    pub overwrite: bool,
    pub mirror_subfolders: bool,
    pub dry_run: bool,
    /// Treat unrecognized documents as failures instead of skips.
    pub strict: bool,
}

impl ConvertConfig {
    pub fn new(source_root: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_roots: vec![source_root.into()],
            source_format: SourceFormat::Auto,
            dest_dir: dest_dir.into(),
            render: RenderOptions::default(),
            adapter: AdapterOptions::default(),
            workers: default_workers(),
            overwrite: false,
            mirror_subfolders: true,
            dry_run: false,
            strict: false,
        }
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Settings persisted between runs. Every field is optional; unset fields
/// fall back to CLI defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub source_dir: Option<PathBuf>,
    pub dest_dir: Option<PathBuf>,
    pub format: Option<OutputFormat>,
    pub yaml_front_matter: Option<bool>,
    pub include_timestamps: Option<bool>,
    pub include_run_settings: Option<bool>,
    pub include_system_prompt: Option<bool>,
    pub exclude_thoughts: Option<bool>,
    pub template: Option<PathBuf>,
    pub html_template: Option<PathBuf>,
    pub workers: Option<usize>,
    pub overwrite: Option<bool>,
    pub create_subfolders: Option<bool>,
    pub recursive: Option<bool>,
    pub source_format: Option<SourceFormat>,
    /// Glob patterns relative to the source directory.
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}
