use crate::assets::MediaKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error on {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every hook has already been used. This is a stop signal, not a defect.
    #[error("No unused hooks available")]
    Exhausted,

    #[error("No {kind} assets available")]
    EmptyPool { kind: MediaKind },

    #[error("Probe failed for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },

    #[error("Narration failed: {0}")]
    Narration(String),

    #[error("Render failed for {output}: {reason}")]
    Render { output: PathBuf, reason: String },

    #[error("Cannot plan composition: {0}")]
    Plan(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl ReelError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }
}

pub type Result<T> = std::result::Result<T, ReelError>;
