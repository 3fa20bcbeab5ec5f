//! Header / declaration-surrogate generator, run from the coordinator's
//! per-node codegen step once a public declaration's decl compile finishes.
//!
//! Takes a public declaration's source text plus the fragment-skip list its
//! decl compile produced, and emits either an include-style header or an
//! import-style declaration surrogate. Built on the same `artifact_output`
//! string-splicing shape (byte-range cut-and-paste over a `&str`),
//! generalized to the eight fragment actions a decl compile can produce.

use crate::meta::{Fragment, FragmentAction};
use std::path::Path;

/// Which of the two output flavors to produce; the only difference is how
/// `SkipInHeaderOnly` and the unit-scope markers are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Header,
    DeclSurrogate,
}

/// A dependency to reference in the emitted output, distinct from the
/// "include the preamble instead" fallback when a unit has none.
#[derive(Debug, Clone)]
pub struct DependencyRef {
    /// Header mode: path relative to the output root, e.g. `pkg/UnitA.h`.
    /// Surrogate mode: the unit identifier, e.g. `pkg::UnitA`.
    pub relative_header_path: String,
    pub unit_id: String,
}

/// Applies `fragments` to `source` and returns the transformed text. Byte
/// ranges are assumed already validated (`fragments_well_formed`);
/// out-of-bounds ranges are clamped to the source length rather than
/// panicking, since a front-end bug here must not crash the coordinator.
pub fn apply_fragments(source: &str, fragments: &[Fragment], mode: OutputMode, unit_id: &str) -> String {
    let bytes = source.as_bytes();
    let len = bytes.len() as u32;
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0u32;

    for fragment in fragments {
        let start = fragment.start.min(len);
        let end = fragment.end.min(len).max(start);
        if start > cursor {
            push_slice(&mut out, bytes, cursor, start);
        }
        apply_one(&mut out, bytes, start, end, fragment.action, mode, unit_id);
        cursor = cursor.max(end);
    }
    if cursor < len {
        push_slice(&mut out, bytes, cursor, len);
    }
    out
}

fn push_slice(out: &mut String, bytes: &[u8], start: u32, end: u32) {
    if let Ok(text) = std::str::from_utf8(&bytes[start as usize..end as usize]) {
        out.push_str(text);
    }
}

fn apply_one(out: &mut String, bytes: &[u8], start: u32, end: u32, action: FragmentAction, mode: OutputMode, unit_id: &str) {
    match action {
        FragmentAction::Skip => {}
        FragmentAction::SkipInHeaderOnly => {
            if mode == OutputMode::DeclSurrogate {
                push_slice(out, bytes, start, end);
            }
        }
        FragmentAction::ReplaceWithSemicolon => out.push(';'),
        // Zero-width by construction; an independent anchor that does not
        // interact with any enclosing skip range.
        FragmentAction::PutExtern => out.push_str("extern "),
        FragmentAction::StartUnit | FragmentAction::StartUnitFirstDecl => {
            out.push_str(&unit_scope_open(mode, unit_id));
        }
        FragmentAction::EndUnit | FragmentAction::EndUnitEOF => {
            out.push_str(&unit_scope_close(mode));
        }
    }
}

// Header mode wraps in an include-guard-free extern "C++" style namespace block
// named after the unit; surrogate mode wraps in an import-style scope comment
// pair, since surrogates never get compiled standalone.
fn unit_scope_open(mode: OutputMode, unit_id: &str) -> String {
    match mode {
        OutputMode::Header => format!("namespace {unit_id} {{\n"),
        OutputMode::DeclSurrogate => format!("// unit {unit_id}\n"),
    }
}

fn unit_scope_close(mode: OutputMode) -> String {
    match mode {
        OutputMode::Header => "}\n".to_string(),
        OutputMode::DeclSurrogate => String::new(),
    }
}

/// Builds the leading dependency-reference block: `#include` lines in
/// header mode, `#import` lines in surrogate mode. If `dependencies` is
/// empty, references `preamble_relative_path` directly instead.
pub fn dependency_block(
    dependencies: &[DependencyRef],
    preamble_relative_path: Option<&str>,
    mode: OutputMode,
) -> String {
    let mut block = String::new();
    if dependencies.is_empty() {
        if let Some(preamble) = preamble_relative_path {
            block.push_str(&include_line(preamble, mode));
        }
        return block;
    }
    for dep in dependencies {
        match mode {
            OutputMode::Header => block.push_str(&include_line(&dep.relative_header_path, mode)),
            OutputMode::DeclSurrogate => {
                block.push_str(&format!("#import {}\n", dep.unit_id));
            }
        }
    }
    block
}

fn include_line(relative_path: &str, mode: OutputMode) -> String {
    match mode {
        OutputMode::Header => format!("#include \"{relative_path}\"\n"),
        OutputMode::DeclSurrogate => format!("#include \"{relative_path}\"\n"),
    }
}

/// Renders the full output file for a public declaration: the dependency
/// block followed by the fragment-transformed source.
pub fn render(
    source: &str,
    fragments: &[Fragment],
    dependencies: &[DependencyRef],
    preamble_relative_path: Option<&str>,
    mode: OutputMode,
    unit_id: &str,
) -> String {
    let mut out = dependency_block(dependencies, preamble_relative_path, mode);
    out.push_str(&apply_fragments(source, fragments, mode, unit_id));
    out
}

/// Writes `content` to `path`, creating parent directories as needed —
/// the same "ensure parent, then write" shape as `Meta::write`/
/// `ParsedImports::write`.
pub fn write_output(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(start: u32, end: u32, action: FragmentAction) -> Fragment {
        Fragment { start, end, action }
    }

    #[test]
    fn skip_removes_the_range() {
        let source = "int f() { return 1; }";
        let fragments = vec![frag(10, 21, FragmentAction::Skip)];
        let out = apply_fragments(source, &fragments, OutputMode::Header, "pkg::U");
        assert_eq!(out, "int f() }");
    }

    #[test]
    fn skip_in_header_only_is_kept_in_surrogate_mode() {
        let source = "body-text";
        let fragments = vec![frag(0, 9, FragmentAction::SkipInHeaderOnly)];
        assert_eq!(apply_fragments(source, &fragments, OutputMode::Header, "pkg::U"), "");
        assert_eq!(apply_fragments(source, &fragments, OutputMode::DeclSurrogate, "pkg::U"), "body-text");
    }

    #[test]
    fn replace_with_semicolon_collapses_the_range() {
        let source = "void f() { big body here }";
        let fragments = vec![frag(9, 27, FragmentAction::ReplaceWithSemicolon)];
        let out = apply_fragments(source, &fragments, OutputMode::Header, "pkg::U");
        assert_eq!(out, "void f();");
    }

    #[test]
    fn put_extern_is_a_zero_width_insertion() {
        let source = "int x;";
        let fragments = vec![frag(0, 0, FragmentAction::PutExtern)];
        let out = apply_fragments(source, &fragments, OutputMode::Header, "pkg::U");
        assert_eq!(out, "extern int x;");
    }

    #[test]
    fn out_of_bounds_ranges_are_clamped_not_panicking() {
        let source = "short";
        let fragments = vec![frag(3, 9999, FragmentAction::Skip)];
        let out = apply_fragments(source, &fragments, OutputMode::Header, "pkg::U");
        assert_eq!(out, "sho");
    }

    #[test]
    fn dependency_block_falls_back_to_preamble_when_no_dependencies() {
        let block = dependency_block(&[], Some("preamble.h"), OutputMode::Header);
        assert_eq!(block, "#include \"preamble.h\"\n");
    }

    #[test]
    fn dependency_block_lists_each_dependency() {
        let deps = vec![
            DependencyRef { relative_header_path: "pkg/A.h".into(), unit_id: "pkg::A".into() },
            DependencyRef { relative_header_path: "pkg/B.h".into(), unit_id: "pkg::B".into() },
        ];
        let block = dependency_block(&deps, Some("preamble.h"), OutputMode::Header);
        assert_eq!(block, "#include \"pkg/A.h\"\n#include \"pkg/B.h\"\n");
    }

    #[test]
    fn surrogate_mode_uses_import_lines() {
        let deps = vec![DependencyRef { relative_header_path: "pkg/A.h".into(), unit_id: "pkg::A".into() }];
        let block = dependency_block(&deps, None, OutputMode::DeclSurrogate);
        assert_eq!(block, "#import pkg::A\n");
    }

    #[test]
    fn render_combines_dependency_block_and_transformed_source() {
        let source = "int f() { return 1; }";
        let fragments = vec![frag(10, 21, FragmentAction::Skip)];
        let deps = vec![DependencyRef { relative_header_path: "pkg/A.h".into(), unit_id: "pkg::A".into() }];
        let out = render(source, &fragments, &deps, None, OutputMode::Header, "pkg::U");
        assert_eq!(out, "#include \"pkg/A.h\"\nint f() }");
    }

    #[test]
    fn unit_scope_markers_wrap_header_output_in_a_namespace() {
        let source = "int x;";
        let fragments = vec![frag(0, 0, FragmentAction::StartUnit), frag(6, 6, FragmentAction::EndUnit)];
        let out = apply_fragments(source, &fragments, OutputMode::Header, "pkg::A");
        assert_eq!(out, "namespace pkg::A {\nint x;}\n");
    }

    #[test]
    fn unit_scope_markers_emit_a_comment_in_surrogate_mode() {
        let source = "int x;";
        let fragments = vec![frag(0, 0, FragmentAction::StartUnitFirstDecl), frag(6, 6, FragmentAction::EndUnitEOF)];
        let out = apply_fragments(source, &fragments, OutputMode::DeclSurrogate, "pkg::A");
        assert_eq!(out, "// unit pkg::A\nint x;");
    }
}
