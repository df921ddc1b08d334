//! Universe Error Taxonomy
//!
//! Only structural failures surface as `Err`. Row-level problems are counted in
//! the per-operation stats objects and consistency findings are reported, so
//! neither appears here.

use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, UniverseError>;

#[derive(Debug, thiserror::Error)]
pub enum UniverseError {
    /// A source artifact the operation cannot run without is absent.
    #[error("missing_{kind}:{}", path.display())]
    MissingInput { kind: &'static str, path: PathBuf },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid json in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt gzip stream in {}: {source}", path.display())]
    Decompress {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to publish {}: {source}", path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    /// Document parsed but does not carry the structure the operation needs.
    #[error("unexpected document shape in {}: {reason}", path.display())]
    Shape { path: PathBuf, reason: String },
}

impl UniverseError {
    /// Stable machine-readable code for the CLI error line.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingInput { .. } => "MISSING_INPUT",
            Self::Io { .. } => "IO",
            Self::Json { .. } => "JSON",
            Self::Decompress { .. } => "DECOMPRESS",
            Self::Publish { .. } => "PUBLISH",
            Self::Config { .. } => "CONFIG",
            Self::Shape { .. } => "SHAPE",
        }
    }

    pub fn missing(kind: &'static str, path: impl AsRef<Path>) -> Self {
        Self::MissingInput {
            kind,
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn publish(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Publish {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn shape(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Shape {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }
}
