//! Child-process command builder.
//!
//! The front-end and linker are opaque subprocesses: the coordinator never
//! inspects their internals, only their argv contract and exit status. This
//! module assembles the fixed argv template per phase and, separately,
//! tokenizes the `-FH/-FP/-FC/-FL` extra-args strings the CLI accepts.
//! Process spawning follows the `Solc::configure_cmd`/`compile_output`
//! pattern (`src/compile/mod.rs`): build a `Command`, pipe stdio, capture
//! `Output`.

use crate::error::{CpplError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Which front-end phase a child invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrontEndPhase {
    Preamble,
    ParseImport,
    Decl,
    Obj,
}

impl FrontEndPhase {
    fn flag(self) -> &'static str {
        match self {
            FrontEndPhase::Preamble => "-cppl-preamble",
            FrontEndPhase::ParseImport => "-cppl-import",
            FrontEndPhase::Decl => "-cppl-decl",
            FrontEndPhase::Obj => "-cppl-obj",
        }
    }

    fn name(self) -> &'static str {
        match self {
            FrontEndPhase::Preamble => "preamble",
            FrontEndPhase::ParseImport => "parse-import",
            FrontEndPhase::Decl => "build-decl",
            FrontEndPhase::Obj => "build-obj",
        }
    }
}

/// A single front-end invocation's inputs, enough to assemble its argv.
#[derive(Debug, Clone)]
pub struct FrontEndInvocation {
    pub phase: FrontEndPhase,
    pub src_root: PathBuf,
    pub unit_id: String,
    pub meta_path: PathBuf,
    pub output_path: PathBuf,
    pub includes: Vec<PathBuf>,
    pub stdlib: Option<String>,
    /// Declaration artifacts of this node's dependencies; only meaningful
    /// for `Decl`/`Obj` phases.
    pub include_dependencies: Vec<PathBuf>,
    /// Only meaningful for `Decl`/`Obj` phases.
    pub preamble_path: Option<PathBuf>,
    /// Suppresses diagnostics on a decl compile that will be redone for the
    /// unit's definition too.
    pub suppress_warnings: bool,
    pub extra_args: Vec<String>,
}

impl FrontEndInvocation {
    pub fn build_argv(&self) -> Vec<String> {
        let mut argv = vec![self.phase.flag().to_string()];
        argv.push(format!("-cppl-src-root={}", self.src_root.display()));
        argv.push(format!("-cppl-unit-id={}", self.unit_id));
        argv.push(format!("-cppl-meta={}", self.meta_path.display()));

        for include in &self.includes {
            argv.push(format!("-I{}", include.display()));
        }
        if let Some(stdlib) = &self.stdlib {
            argv.push(format!("-stdlib={stdlib}"));
        }

        if matches!(self.phase, FrontEndPhase::Decl | FrontEndPhase::Obj) {
            for dep in &self.include_dependencies {
                argv.push(format!("-cppl-include-dependency={}", dep.display()));
            }
            if let Some(preamble) = &self.preamble_path {
                argv.push(format!("-cppl-include-preamble={}", preamble.display()));
            }
            if self.suppress_warnings && matches!(self.phase, FrontEndPhase::Decl) {
                argv.push("-cppl-suppress-decl-warnings".to_string());
            }
        }

        for extra in &self.extra_args {
            argv.push(unquote(extra));
        }

        argv.push("-o".to_string());
        argv.push(self.output_path.display().to_string());
        argv
    }
}

/// Assembles the linker's argv: object paths, extra args, then output path.
#[derive(Debug, Clone)]
pub struct LinkInvocation {
    pub objects: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub extra_args: Vec<String>,
}

impl LinkInvocation {
    pub fn build_argv(&self) -> Vec<String> {
        let mut argv: Vec<String> = self.objects.iter().map(|p| p.display().to_string()).collect();
        argv.extend(self.extra_args.iter().map(|a| unquote(a)));
        argv.push("-o".to_string());
        argv.push(self.output_path.display().to_string());
        argv
    }
}

/// The observable result of running a child process: an opaque black box
/// returning an exit code and producing files on disk.
#[derive(Debug, Clone)]
pub struct ChildOutcome {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Abstracts "run this executable with this argv" so the coordinator can be
/// tested without spawning real subprocesses, the same way `solc`/`vyper`
/// invocation sits behind the `Compiler` trait (`compilers/mod.rs`) rather
/// than hardcoding `Command::new`.
pub trait ChildRunner: Send + Sync {
    fn run(&self, executable: &Path, argv: &[String]) -> Result<ChildOutcome>;
}

/// The real implementation: spawns `executable` with `argv` and captures
/// its output, exactly as `Solc::configure_cmd`/`compile_output` do.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ChildRunner for ProcessRunner {
    fn run(&self, executable: &Path, argv: &[String]) -> Result<ChildOutcome> {
        let mut cmd = Command::new(executable);
        cmd.args(argv).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
        tracing::trace!(?cmd, "spawning child process");
        let output = cmd.output().map_err(CpplError::from)?;
        let outcome = ChildOutcome {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::trace!(success = outcome.success, exit_code = outcome.exit_code, "child process finished");
        Ok(outcome)
    }
}

/// `-###`: prints the argv that would be executed and reports success
/// without spawning anything.
#[derive(Debug, Default)]
pub struct DryRunRunner;

impl ChildRunner for DryRunRunner {
    fn run(&self, executable: &Path, argv: &[String]) -> Result<ChildOutcome> {
        println!("{} {}", executable.display(), argv.join(" "));
        Ok(ChildOutcome { success: true, exit_code: 0, stdout: String::new(), stderr: String::new() })
    }
}

/// Runs a front-end invocation and converts a non-zero exit into a
/// `ChildFailure`. A zero exit with non-empty stderr is logged as a warning
/// but otherwise treated as success.
pub fn invoke_front_end(
    runner: &dyn ChildRunner,
    executable: &Path,
    invocation: &FrontEndInvocation,
) -> Result<()> {
    let argv = invocation.build_argv();
    let outcome = runner.run(executable, &argv)?;
    if !outcome.stderr.trim().is_empty() && outcome.success {
        tracing::warn!(unit = %invocation.unit_id, phase = invocation.phase.name(), "{}", outcome.stderr.trim());
    }
    if !outcome.success {
        return Err(CpplError::ChildFailure {
            phase: invocation.phase.name(),
            unit: invocation.unit_id.clone(),
            status: outcome.exit_code,
            message: if outcome.stderr.trim().is_empty() {
                outcome.stdout.trim().to_string()
            } else {
                outcome.stderr.trim().to_string()
            },
        });
    }
    Ok(())
}

pub fn invoke_linker(
    runner: &dyn ChildRunner,
    executable: &Path,
    invocation: &LinkInvocation,
) -> Result<()> {
    let argv = invocation.build_argv();
    let outcome = runner.run(executable, &argv)?;
    if !outcome.success {
        return Err(CpplError::ChildFailure {
            phase: "link",
            unit: invocation.output_path.display().to_string(),
            status: outcome.exit_code,
            message: if outcome.stderr.trim().is_empty() {
                outcome.stdout.trim().to_string()
            } else {
                outcome.stderr.trim().to_string()
            },
        });
    }
    Ok(())
}

/// Tokenizes an extra-args string from the CLI (`-FH`/`-FP`/`-FC`/`-FL`):
/// spaces split tokens, single/double quotes group a run of characters
/// (quote characters are kept in the returned token, for display/roundtrip
/// purposes), and a backslash escapes the following character. See
/// [`unquote`] for the exec-time form.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut has_content = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                has_content = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '\'' | '"' if quote.is_none() => {
                quote = Some(c);
                current.push(c);
                has_content = true;
            }
            c2 if Some(c2) == quote => {
                current.push(c2);
                quote = None;
            }
            c2 if (c2 == ' ' || c2 == '\t') && quote.is_none() => {
                if has_content {
                    tokens.push(std::mem::take(&mut current));
                    has_content = false;
                }
            }
            c2 => {
                current.push(c2);
                has_content = true;
            }
        }
    }
    if has_content {
        tokens.push(current);
    }
    tokens
}

/// Strips quote characters and resolves backslash escapes in a token
/// produced by [`tokenize`], producing the value actually handed to the
/// exec primitive.
pub fn unquote(token: &str) -> String {
    let mut out = String::new();
    let mut quote: Option<char> = None;
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '\'' | '"' if quote.is_none() => quote = Some(c),
            c2 if Some(c2) == quote => quote = None,
            c2 => out.push(c2),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_spaces() {
        assert_eq!(tokenize("-Wall -O2"), vec!["-Wall", "-O2"]);
    }

    #[test]
    fn tokenize_collapses_runs_of_whitespace() {
        assert_eq!(tokenize("  -Wall   -O2  "), vec!["-Wall", "-O2"]);
    }

    #[test]
    fn tokenize_groups_double_quoted_spaces() {
        let tokens = tokenize(r#"-D"hello world""#);
        assert_eq!(tokens, vec![r#"-D"hello world""#]);
        assert_eq!(unquote(&tokens[0]), "-Dhello world");
    }

    #[test]
    fn tokenize_groups_single_quoted_spaces() {
        let tokens = tokenize(r#"--name='a b c'"#);
        assert_eq!(unquote(&tokens[0]), "--name=a b c");
    }

    #[test]
    fn tokenize_honors_backslash_escape() {
        let tokens = tokenize(r#"a\ b c"#);
        assert_eq!(tokens, vec![r#"a\ b"#, "c"]);
        assert_eq!(unquote(&tokens[0]), "a b");
    }

    #[test]
    fn tokenize_keeps_quote_characters_in_the_raw_token() {
        let tokens = tokenize(r#""quoted""#);
        assert_eq!(tokens[0], r#""quoted""#);
        assert_eq!(unquote(&tokens[0]), "quoted");
    }

    #[test]
    fn empty_input_tokenizes_to_nothing() {
        assert!(tokenize("   ").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn decl_argv_includes_dependencies_and_preamble() {
        let inv = FrontEndInvocation {
            phase: FrontEndPhase::Decl,
            src_root: PathBuf::from("/proj"),
            unit_id: "pkg::UnitA".into(),
            meta_path: PathBuf::from("build/pkg/UnitA.decl-ast.meta"),
            output_path: PathBuf::from("build/pkg/UnitA.decl-ast"),
            includes: vec![PathBuf::from("/proj/include")],
            stdlib: Some("cppl-std".into()),
            include_dependencies: vec![PathBuf::from("build/pkg/UnitB.decl-ast")],
            preamble_path: Some(PathBuf::from("build/preamble.pch")),
            suppress_warnings: true,
            extra_args: vec![],
        };
        let argv = inv.build_argv();
        assert_eq!(argv[0], "-cppl-decl");
        assert!(argv.contains(&"-cppl-include-dependency=build/pkg/UnitB.decl-ast".to_string()));
        assert!(argv.contains(&"-cppl-include-preamble=build/preamble.pch".to_string()));
        assert!(argv.contains(&"-cppl-suppress-decl-warnings".to_string()));
        assert_eq!(argv.last(), Some(&"build/pkg/UnitA.decl-ast".to_string()));
    }

    #[test]
    fn parse_import_argv_omits_dependency_flags() {
        let inv = FrontEndInvocation {
            phase: FrontEndPhase::ParseImport,
            src_root: PathBuf::from("/proj"),
            unit_id: "pkg::UnitA".into(),
            meta_path: PathBuf::from("build/pkg/UnitA.ldeps.meta"),
            output_path: PathBuf::from("build/pkg/UnitA.ldeps"),
            includes: vec![],
            stdlib: None,
            include_dependencies: vec![PathBuf::from("unused")],
            preamble_path: None,
            suppress_warnings: false,
            extra_args: vec![],
        };
        let argv = inv.build_argv();
        assert!(!argv.iter().any(|a| a.starts_with("-cppl-include-dependency")));
    }

    #[test]
    fn link_argv_orders_objects_then_output() {
        let inv = LinkInvocation {
            objects: vec![PathBuf::from("a.o"), PathBuf::from("b.o")],
            output_path: PathBuf::from("a.out"),
            extra_args: vec![],
        };
        let argv = inv.build_argv();
        assert_eq!(argv, vec!["a.o", "b.o", "-o", "a.out"]);
    }

    struct FixedRunner(ChildOutcome);
    impl ChildRunner for FixedRunner {
        fn run(&self, _executable: &Path, _argv: &[String]) -> Result<ChildOutcome> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn invoke_front_end_maps_nonzero_exit_to_child_failure() {
        let runner = FixedRunner(ChildOutcome {
            success: false,
            exit_code: 1,
            stdout: String::new(),
            stderr: "boom".into(),
        });
        let inv = FrontEndInvocation {
            phase: FrontEndPhase::Obj,
            src_root: PathBuf::from("/proj"),
            unit_id: "pkg::UnitA".into(),
            meta_path: PathBuf::from("m"),
            output_path: PathBuf::from("o"),
            includes: vec![],
            stdlib: None,
            include_dependencies: vec![],
            preamble_path: None,
            suppress_warnings: false,
            extra_args: vec![],
        };
        let err = invoke_front_end(&runner, Path::new("cppl-front"), &inv).unwrap_err();
        assert!(matches!(err, CpplError::ChildFailure { status: 1, .. }));
    }

    #[test]
    fn invoke_front_end_succeeds_despite_stderr_on_zero_exit() {
        let runner = FixedRunner(ChildOutcome {
            success: true,
            exit_code: 0,
            stdout: String::new(),
            stderr: "just a warning".into(),
        });
        let inv = FrontEndInvocation {
            phase: FrontEndPhase::Obj,
            src_root: PathBuf::from("/proj"),
            unit_id: "pkg::UnitA".into(),
            meta_path: PathBuf::from("m"),
            output_path: PathBuf::from("o"),
            includes: vec![],
            stdlib: None,
            include_dependencies: vec![],
            preamble_path: None,
            suppress_warnings: false,
            extra_args: vec![],
        };
        assert!(invoke_front_end(&runner, Path::new("cppl-front"), &inv).is_ok());
    }
}
