//! Paths & identifiers.
//!
//! Derives stable unit identifiers from project-relative source paths and
//! maps a unit onto its family of build-root-relative artifact paths. The
//! teacher crate does the analogous relative/absolute/artifact-path bookkeeping
//! in `ProjectPathsConfig` / `utils::source_name`; here the extra twist is the
//! identifier's `::`-joined shape and the "one unit, many extensions" artifact
//! family.

use path_slash::PathExt as _;
use std::path::{Path, PathBuf};

/// Extension of a `cppl` source file.
pub const SOURCE_EXT: &str = "cppl";

/// The fixed set of artifact kinds derivable from a unit's relative path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Object,
    DeclAst,
    DeclAstMeta,
    ObjectMeta,
    ParsedDeps,
    ParsedDepsMeta,
    GeneratedHeader,
    GeneratedDeclSurrogate,
}

impl ArtifactKind {
    fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Object => "o",
            ArtifactKind::DeclAst => "decl-ast",
            ArtifactKind::DeclAstMeta => "decl-ast.meta",
            ArtifactKind::ObjectMeta => "o.meta",
            ArtifactKind::ParsedDeps => "ldeps",
            ArtifactKind::ParsedDepsMeta => "ldeps.meta",
            ArtifactKind::GeneratedHeader => "h",
            ArtifactKind::GeneratedDeclSurrogate => "decl.h",
        }
    }
}

/// Derives a unit identifier (`pkg::UnitA`) from a project-root-relative
/// source path. The source extension is stripped and path separators are
/// replaced with `::`. Stable across runs for the same relative path;
/// distinct relative paths never collide.
pub fn unit_id_from_relative(relative: &Path) -> String {
    let without_ext = relative.with_extension("");
    // `to_slash` normalizes separators before we split, so this is stable across platforms.
    let slash = without_ext.to_slash_lossy();
    slash.replace('/', "::")
}

/// Computes the path of `source` relative to `root`. Both are expected to
/// already be canonicalized/absolute by the caller (source discovery); this
/// function does no filesystem access.
pub fn relative_to(root: &Path, source: &Path) -> Option<PathBuf> {
    source.strip_prefix(root).ok().map(Path::to_path_buf)
}

/// Derives the build-root-relative artifact path for a unit, given its
/// relative source path, by substituting the extension for the artifact kind.
///
/// External (library) units place their artifacts under `libs_subdir`
/// instead of directly under the build root.
pub fn artifact_path(
    build_root: &Path,
    relative_source: &Path,
    kind: ArtifactKind,
    libs_subdir: Option<&str>,
) -> PathBuf {
    let mut base = build_root.to_path_buf();
    if let Some(subdir) = libs_subdir {
        base.push(subdir);
    }
    let mut path = base.join(relative_source);
    path.set_extension(kind.extension());
    path
}
