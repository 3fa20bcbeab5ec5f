//! CLI option parsing.
//!
//! A hand-rolled parser rather than a `clap` derive: the flag grammar mixes
//! `-flag=value`, `-flag <value>`, and bare prefix flags (`+I<path>`,
//! `-j<N>`) in ways that don't map cleanly onto a declarative builder, and
//! the set of flags is small and fixed. This mirrors the
//! `ProjectPathsConfig`/`Solc` builders in spirit (a plain struct with
//! sensible defaults, validated incrementally) rather than any literal
//! argument-parsing code, since that ecosystem's build-coordination crate
//! is a library, not a CLI.

use crate::error::{CpplError, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub project_root: PathBuf,
    pub build_root: PathBuf,
    pub preamble_source: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub link_disabled: bool,
    pub header_out: Option<PathBuf>,
    pub decl_surrogate_out: Option<PathBuf>,
    pub jobs: usize,
    pub stdlib: Option<String>,
    pub library_roots: Vec<PathBuf>,
    pub include_paths: Vec<PathBuf>,
    pub preamble_extra_args: Vec<String>,
    pub parse_extra_args: Vec<String>,
    pub codegen_extra_args: Vec<String>,
    pub link_extra_args: Vec<String>,
    pub verbose: bool,
    pub trace: bool,
    /// `-###`: print the commands that would run without running them.
    pub dry_run: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            build_root: PathBuf::from("./build"),
            preamble_source: None,
            output: None,
            link_disabled: false,
            header_out: None,
            decl_surrogate_out: None,
            jobs: num_cpus::get().max(1),
            stdlib: None,
            library_roots: Vec::new(),
            include_paths: Vec::new(),
            preamble_extra_args: Vec::new(),
            parse_extra_args: Vec::new(),
            codegen_extra_args: Vec::new(),
            link_extra_args: Vec::new(),
            verbose: false,
            trace: false,
            dry_run: false,
        }
    }
}

impl BuildConfig {
    /// Link is enabled unless `-c` was given.
    pub fn link_enabled(&self) -> bool {
        !self.link_disabled
    }

    pub fn headers_enabled(&self) -> bool {
        self.header_out.is_some()
    }

    pub fn decl_surrogates_enabled(&self) -> bool {
        self.decl_surrogate_out.is_some()
    }

    pub fn preamble_enabled(&self) -> bool {
        self.preamble_source.is_some()
    }
}

/// Parses `args` (excluding `argv[0]`). Returns `ArgumentError` on an
/// unrecognized flag or a flag missing its required value — the caller
/// maps that to exit code 1.
pub fn parse_args<I, S>(args: I) -> Result<BuildConfig>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut config = BuildConfig::default();
    let mut iter = args.into_iter().map(|s| s.as_ref().to_string()).peekable();

    while let Some(arg) = iter.next() {
        if let Some(rest) = arg.strip_prefix("-root=") {
            config.project_root = PathBuf::from(rest);
        } else if let Some(rest) = arg.strip_prefix("-buildRoot=") {
            config.build_root = PathBuf::from(rest);
        } else if let Some(rest) = arg.strip_prefix("-preamble=") {
            config.preamble_source = Some(PathBuf::from(rest));
        } else if arg == "-o" {
            let value = take_value(&mut iter, "-o")?;
            config.output = Some(PathBuf::from(value));
        } else if arg == "-c" {
            config.link_disabled = true;
        } else if let Some(rest) = arg.strip_prefix("-h=") {
            config.header_out = Some(PathBuf::from(rest));
        } else if let Some(rest) = arg.strip_prefix("-decl-out=") {
            config.decl_surrogate_out = Some(PathBuf::from(rest));
        } else if let Some(rest) = arg.strip_prefix("-j") {
            if rest.is_empty() {
                return Err(CpplError::ArgumentError("-j requires a job count, e.g. -j4".into()));
            }
            config.jobs = rest
                .parse::<usize>()
                .map_err(|_| CpplError::ArgumentError(format!("invalid job count: {rest}")))?
                .max(1);
        } else if let Some(rest) = arg.strip_prefix("-stdlib=") {
            config.stdlib = Some(rest.to_string());
        } else if let Some(rest) = arg.strip_prefix("+I") {
            if rest.is_empty() {
                return Err(CpplError::ArgumentError("+I requires a path, e.g. +Ivendor/".into()));
            }
            config.library_roots.push(PathBuf::from(rest));
        } else if let Some(rest) = arg.strip_prefix("-I") {
            if rest.is_empty() {
                return Err(CpplError::ArgumentError("-I requires a path, e.g. -Iinclude/".into()));
            }
            config.include_paths.push(PathBuf::from(rest));
        } else if arg == "-FH" {
            config.preamble_extra_args.push(take_value(&mut iter, "-FH")?);
        } else if arg == "-FP" {
            config.parse_extra_args.push(take_value(&mut iter, "-FP")?);
        } else if arg == "-FC" {
            config.codegen_extra_args.push(take_value(&mut iter, "-FC")?);
        } else if arg == "-FL" {
            config.link_extra_args.push(take_value(&mut iter, "-FL")?);
        } else if arg == "--verbose" {
            config.verbose = true;
        } else if arg == "--trace" {
            config.trace = true;
        } else if arg == "-###" {
            config.dry_run = true;
        } else {
            return Err(CpplError::ArgumentError(format!("unrecognized option: {arg}")));
        }
    }

    Ok(config)
}

fn take_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    iter.next().ok_or_else(|| CpplError::ArgumentError(format!("{flag} requires a value")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_link_and_disable_headers() {
        let config = BuildConfig::default();
        assert!(config.link_enabled());
        assert!(!config.headers_enabled());
        assert!(!config.preamble_enabled());
    }

    #[test]
    fn parses_roots_and_output() {
        let config = parse_args(["-root=src", "-buildRoot=out", "-o", "a.out"]).unwrap();
        assert_eq!(config.project_root, PathBuf::from("src"));
        assert_eq!(config.build_root, PathBuf::from("out"));
        assert_eq!(config.output, Some(PathBuf::from("a.out")));
    }

    #[test]
    fn dash_c_disables_link() {
        let config = parse_args(["-c"]).unwrap();
        assert!(!config.link_enabled());
    }

    #[test]
    fn parses_job_count() {
        let config = parse_args(["-j4"]).unwrap();
        assert_eq!(config.jobs, 4);
    }

    #[test]
    fn rejects_non_numeric_job_count() {
        assert!(parse_args(["-jfour"]).is_err());
    }

    #[test]
    fn repeatable_include_and_library_roots_accumulate() {
        let config = parse_args(["+Ivendor", "+Ilibs/extra", "-Iinclude", "-Iother"]).unwrap();
        assert_eq!(config.library_roots, vec![PathBuf::from("vendor"), PathBuf::from("libs/extra")]);
        assert_eq!(config.include_paths, vec![PathBuf::from("include"), PathBuf::from("other")]);
    }

    #[test]
    fn extra_args_flags_collect_their_value() {
        let config = parse_args(["-FC", "-Wall -O2"]).unwrap();
        assert_eq!(config.codegen_extra_args, vec!["-Wall -O2".to_string()]);
    }

    #[test]
    fn unrecognized_flag_is_an_argument_error() {
        let err = parse_args(["--bogus"]).unwrap_err();
        assert!(matches!(err, CpplError::ArgumentError(_)));
    }

    #[test]
    fn missing_value_for_o_is_an_argument_error() {
        let err = parse_args(["-o"]).unwrap_err();
        assert!(matches!(err, CpplError::ArgumentError(_)));
    }

    #[test]
    fn diagnostics_flags_set_expected_booleans() {
        let config = parse_args(["--verbose", "--trace", "-###"]).unwrap();
        assert!(config.verbose);
        assert!(config.trace);
        assert!(config.dry_run);
    }

    #[test]
    fn header_and_decl_out_enable_their_generators() {
        let config = parse_args(["-h=out/inc", "-decl-out=out/surrogates"]).unwrap();
        assert!(config.headers_enabled());
        assert!(config.decl_surrogates_enabled());
    }
}
