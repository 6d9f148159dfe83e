//! # chat-export-convert
//!
//! Converts chat exports from Google AI Studio, ChatGPT and Claude into
//! Markdown and/or HTML documents.
//!
//! ## Pipeline
//!
//! Every input file goes through the same steps, all within one worker:
//!
//! 1. [`importer`] reads the file into a [`RawDocument`](importer::RawDocument).
//!    Unparsable JSON becomes a `null` document rather than an error.
//! 2. [`detect`] classifies it by structure alone (never by file name) as
//!    one of the known [`SourceSchema`](detect::SourceSchema)s, or `Unknown`.
//! 3. [`adapters`] normalize it into a [`CanonicalRecord`](record::CanonicalRecord):
//!    ordered user/assistant/system turns plus ordered metadata.
//! 4. [`renderer`] fills a template per output format, optionally with YAML
//!    front matter and a run settings section.
//! 5. [`output`] writes each document atomically under the destination,
//!    mirroring the source subfolders.
//!
//! [`parallel::run`] drives a batch of files through this on a bounded
//! worker pool. Per-file problems become `failed` results; they never stop
//! the other files.
//!
//! ## Usage
//!
//! ```sh
//! # Markdown with front matter for every export under ~/Downloads/exports
//! chat-export-convert ~/Downloads/exports --dest ~/notes/chats --yaml
//!
//! # Both formats, custom template, preview only
//! chat-export-convert exports/ --format both --template chat.md --dry-run
//! ```
//!
//! Preferences can be persisted in `~/.config/chat-export-convert/config.toml`.
//!
//! ## Templates
//!
//! See [`template`] for the placeholder syntax. The built-in templates live
//! in `templates/` and are compiled into the binary.

pub mod adapters;
pub mod archive;
pub mod config;
pub mod detect;
pub mod error;
pub mod importer;
pub mod output;
pub mod parallel;
pub mod record;
pub mod renderer;
pub mod scan;
pub mod template;
