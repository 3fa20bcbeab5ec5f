//! The unit data model.
//!
//! A [`Unit`] is a compilable source: a stable identifier, its source path,
//! and whether it belongs to the project (linked) or a library root
//! (declaration-only, never linked).

use crate::paths::{self, ArtifactKind};
use std::path::{Path, PathBuf};

/// Whether a unit's object participates in linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Belongs to the project; its object (if any) is linked.
    Project,
    /// Belongs to a library root (`+I<path>`); declaration-only.
    External,
}

#[derive(Debug, Clone)]
pub struct Unit {
    /// Stable, interned-friendly identifier, e.g. `pkg::UnitA`.
    pub id: String,
    /// Path to the source file. Project-local for project units, kept
    /// absolute for external units.
    pub source_path: PathBuf,
    /// Path of the source file relative to its owning root, used to derive
    /// artifact paths.
    pub relative_path: PathBuf,
    pub kind: UnitKind,
}

impl Unit {
    pub fn new_project(relative_path: PathBuf, project_root: &Path) -> Self {
        let id = paths::unit_id_from_relative(&relative_path);
        Self { id, source_path: project_root.join(&relative_path), relative_path, kind: UnitKind::Project }
    }

    pub fn new_external(source_path: PathBuf, relative_path: PathBuf) -> Self {
        let id = paths::unit_id_from_relative(&relative_path);
        Self { id, source_path, relative_path, kind: UnitKind::External }
    }

    pub fn is_external(&self) -> bool {
        matches!(self.kind, UnitKind::External)
    }

    /// Every unit has exactly one Declaration node; a unit contributes a
    /// Definition node iff it is not external.
    pub fn has_definition(&self) -> bool {
        !self.is_external()
    }

    pub fn artifact_path(
        &self,
        build_root: &Path,
        kind: ArtifactKind,
        libs_subdir: Option<&str>,
    ) -> PathBuf {
        let subdir = if self.is_external() { libs_subdir } else { None };
        paths::artifact_path(build_root, &self.relative_path, kind, subdir)
    }
}
