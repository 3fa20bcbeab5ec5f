//! Error taxonomy.
//!
//! Mirrors the `SolcError` shape: a flat `thiserror` enum with
//! `#[error(transparent)]` wrappers around the two foreign error types we
//! actually see (`io`, `serde_json`), plus one variant per named failure
//! kind. `MetaCorrupt`/`MetaAbsent` are constructed, but callers are
//! expected to treat them as "stale, rebuild" rather than propagate them as
//! fatal.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CpplError>;

#[derive(Debug, thiserror::Error)]
pub enum CpplError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error("argument error: {0}")]
    ArgumentError(String),

    #[error("source file missing: {0}")]
    SourceMissing(PathBuf),

    #[error("dependency graph has a cycle among declaration nodes (not cut by a bodydep edge)")]
    GraphCycle,

    #[error("unknown import target `{0}` referenced from `{1}`")]
    UnknownImport(String, String),

    #[error("child process `{phase}` for unit `{unit}` exited with status {status}: {message}")]
    ChildFailure { phase: &'static str, unit: String, status: i32, message: String },

    #[error("metadata file is corrupt: {0}")]
    MetaCorrupt(PathBuf),

    #[error("metadata file is absent: {0}")]
    MetaAbsent(PathBuf),

    #[error("walk aborted: a dependency of `{0}` failed to build")]
    WalkAborted(String),

    #[error("task manager could not spawn a worker thread: {0}")]
    SpawnFailed(String),

    #[error("{0}")]
    Message(String),
}

impl CpplError {
    pub fn msg(msg: impl std::fmt::Display) -> Self {
        CpplError::Message(msg.to_string())
    }

    /// Failures that must be treated as "stale, rebuild" rather than fatal.
    pub fn is_recoverable_as_stale(&self) -> bool {
        matches!(self, CpplError::MetaCorrupt(_) | CpplError::MetaAbsent(_))
    }
}
