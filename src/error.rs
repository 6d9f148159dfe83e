use crate::detect::SourceSchema;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while converting a single input file.
///
/// These never escape the orchestrator: each one is folded into a
/// `failed` [`ConversionResult`](crate::parallel::ConversionResult).
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("document matches more than one schema: {candidates:?}")]
    DetectionAmbiguous { candidates: Vec<SourceSchema> },

    #[error("{schema} export is missing required data: {reason}")]
    Normalization {
        schema: SourceSchema,
        reason: String,
    },

    #[error("template {}: {reason}", path.display())]
    Template { path: PathBuf, reason: String },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("rendered {format} output is malformed: {reason}")]
    Validation { format: String, reason: String },

    #[error("unrecognized export format")]
    UnknownSchema,
}

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Read { .. } => ErrorKind::Read,
            Self::DetectionAmbiguous { .. } => ErrorKind::DetectionAmbiguous,
            Self::Normalization { .. } => ErrorKind::Normalization,
            Self::Template { .. } => ErrorKind::Template,
            Self::Write { .. } => ErrorKind::Write,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::UnknownSchema => ErrorKind::UnknownSchema,
        }
    }

    pub(crate) fn normalization(schema: SourceSchema, reason: impl Into<String>) -> Self {
        Self::Normalization {
            schema,
            reason: reason.into(),
        }
    }

    pub(crate) fn template(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::Template {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Coarse classification of a [`ConvertError`], stable enough to show in logs
/// and summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Read,
    DetectionAmbiguous,
    Normalization,
    Template,
    Write,
    Validation,
    UnknownSchema,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "ReadError",
            Self::DetectionAmbiguous => "DetectionAmbiguous",
            Self::Normalization => "NormalizationError",
            Self::Template => "TemplateError",
            Self::Write => "WriteError",
            Self::Validation => "ValidationError",
            Self::UnknownSchema => "UnknownSchema",
        };
        f.write_str(name)
    }
}

/// The part of a [`ConvertError`] that outlives the conversion: its kind and
/// rendered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ConvertError> for ErrorDescriptor {
    fn from(err: &ConvertError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}
