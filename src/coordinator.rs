//! Build coordinator.
//!
//! Orchestrates the six phases — collect, preamble, parse-imports, solve,
//! codegen walk, link/finish — wiring together every other module. This is
//! the one piece with no direct single-file analogue elsewhere in the
//! codebase; it plays the role `Project::compile`/`compile_parallel`
//! (`compile/project.rs`) plays for a flat compile, generalized to a
//! dependency-ordered incremental walk.

use crate::childproc::{
    invoke_front_end, invoke_linker, ChildRunner, FrontEndInvocation, FrontEndPhase, LinkInvocation,
    ProcessRunner,
};
use crate::config::BuildConfig;
use crate::error::{CpplError, Result};
use crate::graph::{Graph, NodeId, NodeKind};
use crate::hash;
use crate::headergen::{self, DependencyRef, OutputMode};
use crate::incremental::{is_up_to_date, read_meta_if_present, BuildState};
use crate::meta::Meta;
use crate::paths::{self, ArtifactKind};
use crate::pool::StringPool;
use crate::record::ParsedImports;
use crate::solver;
use crate::task::TaskManager;
use crate::unit::{Unit, UnitKind};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const LIBS_SUBDIR: &str = "libs";

/// Coordinates a single build. Front-end/linker executables are injected
/// (rather than hardcoded) so tests can substitute a [`ChildRunner`] double
/// without spawning real processes — both are opaque sub-processes.
pub struct Coordinator {
    config: BuildConfig,
    pool: Arc<StringPool>,
    runner: Arc<dyn ChildRunner>,
    front_end: PathBuf,
    linker: PathBuf,
}

impl Coordinator {
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            pool: Arc::new(StringPool::new()),
            runner: Arc::new(ProcessRunner),
            front_end: PathBuf::from("cppl-front"),
            linker: PathBuf::from("cc"),
        }
    }

    pub fn with_executables(mut self, front_end: impl Into<PathBuf>, linker: impl Into<PathBuf>) -> Self {
        self.front_end = front_end.into();
        self.linker = linker.into();
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn ChildRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Runs the full build. `Ok(())` means success (exit 0); `Err`
    /// surfaces as a build failure (exit 2) to the caller. Argument-level
    /// validation is expected to have already happened during config
    /// parsing (exit 1).
    pub fn run(&self) -> Result<()> {
        let state = Arc::new(BuildState::new());
        let tm = Arc::new(TaskManager::new(self.config.jobs)?);

        let units = self.collect_sources()?;
        tracing::debug!(count = units.len(), "collected source units");

        self.build_preamble(&state)?;

        let records = self.parse_imports(&units, &tm, &state.clone())?;
        if state.has_failed() {
            return Err(CpplError::msg(state.messages().join("; ")));
        }

        let graph = Arc::new(Graph::build(&records, &self.pool)?);
        let units_by_id: Arc<HashMap<String, Unit>> =
            Arc::new(units.iter().map(|u| (u.id.clone(), u.clone())).collect());

        let graph_for_walk = graph.clone();
        let units_for_walk = units_by_id.clone();
        let config = self.config.clone();
        let runner = self.runner.clone();
        let front_end = self.front_end.clone();
        let state_for_walk = state.clone();
        let pool_for_walk = self.pool.clone();

        let ok = solver::dfs_jobs(graph.clone(), tm.clone(), move |node_id| {
            process_node(
                &graph_for_walk,
                &units_for_walk,
                &config,
                runner.as_ref(),
                &front_end,
                &state_for_walk,
                &pool_for_walk,
                node_id,
            )
        });

        if !ok || state.has_failed() {
            let message = state.messages().join("; ");
            return Err(CpplError::msg(if message.is_empty() { "build failed".to_string() } else { message }));
        }

        if !state.objects_updated() && !state.preamble_updated() {
            tracing::info!("Nothing to build.");
        }

        self.link_or_finish(&units, &state)?;
        Ok(())
    }

    /// Phase 1: walk the project root and each library root for source
    /// files.
    fn collect_sources(&self) -> Result<Vec<Unit>> {
        let project_root = canonical_or_self(&self.config.project_root);
        let build_root = canonical_or_self(&self.config.build_root);
        let mut units = Vec::new();

        for entry in walkdir::WalkDir::new(&project_root)
            .into_iter()
            .filter_entry(|e| e.path() != build_root.as_path() && !e.path().starts_with(&build_root))
        {
            let entry = entry.map_err(|e| CpplError::msg(e))?;
            if !is_source_file(entry.path()) {
                continue;
            }
            let relative = paths::relative_to(&project_root, entry.path())
                .ok_or_else(|| CpplError::msg(format!("{} is outside the project root", entry.path().display())))?;
            units.push(Unit::new_project(relative, &project_root));
        }

        for library_root in &self.config.library_roots {
            let library_root = canonical_or_self(library_root);
            for entry in walkdir::WalkDir::new(&library_root) {
                let entry = entry.map_err(|e| CpplError::msg(e))?;
                if !is_source_file(entry.path()) {
                    continue;
                }
                let relative = paths::relative_to(&library_root, entry.path())
                    .ok_or_else(|| CpplError::msg(format!("{} is outside its library root", entry.path().display())))?;
                units.push(Unit::new_external(entry.path().to_path_buf(), relative));
            }
        }

        Ok(units)
    }

    /// Phase 2: build the precompiled preamble if requested.
    fn build_preamble(&self, state: &BuildState) -> Result<()> {
        let Some(preamble_source) = self.config.preamble_source.clone() else { return Ok(()) };
        let artifact = self.config.build_root.join("preamble.pch");
        let meta_path = self.config.build_root.join("preamble.pch.meta");

        let current_hash = hash::hash_file(&preamble_source).map_err(|_| CpplError::SourceMissing(preamble_source.clone()))?;
        let up_to_date = artifact.exists()
            && read_meta_if_present(&meta_path).map(|m| m.source_hash == current_hash).unwrap_or(false);
        if up_to_date {
            return Ok(());
        }

        let invocation = FrontEndInvocation {
            phase: FrontEndPhase::Preamble,
            src_root: self.config.project_root.clone(),
            unit_id: "preamble".to_string(),
            meta_path,
            output_path: artifact,
            includes: self.config.include_paths.clone(),
            stdlib: self.config.stdlib.clone(),
            include_dependencies: vec![],
            preamble_path: None,
            suppress_warnings: false,
            extra_args: self.config.preamble_extra_args.clone(),
        };
        invoke_front_end(self.runner.as_ref(), &self.front_end, &invocation)?;
        state.mark_preamble_updated();
        Ok(())
    }

    /// Phase 3: extract each unit's import edges in parallel.
    fn parse_imports(
        &self,
        units: &[Unit],
        tm: &TaskManager,
        state: &Arc<BuildState>,
    ) -> Result<HashMap<String, ParsedImports>> {
        let records: Arc<Mutex<HashMap<String, ParsedImports>>> = Arc::new(Mutex::new(HashMap::new()));
        let ctx = Arc::new(ParseImportsCtx {
            front_end: self.front_end.clone(),
            runner: self.runner.clone(),
            project_root: self.config.project_root.clone(),
            build_root: self.config.build_root.clone(),
            includes: self.config.include_paths.clone(),
            stdlib: self.config.stdlib.clone(),
            extra_args: self.config.parse_extra_args.clone(),
        });

        for unit in units {
            let unit = unit.clone();
            let ctx = ctx.clone();
            let records = records.clone();
            let state = state.clone();
            tm.add_task(move |task_ctx| {
                match parse_one_unit(&ctx, &unit) {
                    Ok(record) => {
                        records.lock().unwrap().insert(unit.id.clone(), record);
                    }
                    Err(e) => {
                        state.record_failure(format!("parse-imports for `{}`: {e}", unit.id));
                        task_ctx.successful = false;
                    }
                }
            });
        }
        tm.wait_for_all();

        let records = Arc::try_unwrap(records).map(|m| m.into_inner().unwrap()).unwrap_or_default();
        Ok(records)
    }

    /// Phase 6: link or, for a library build, simply stop (headers and
    /// surrogates already landed during phase 5).
    fn link_or_finish(&self, units: &[Unit], state: &BuildState) -> Result<()> {
        if !self.config.link_enabled() {
            return Ok(());
        }
        let output = self
            .config
            .output
            .clone()
            .ok_or_else(|| CpplError::ArgumentError("-o <path> is required when linking".into()))?;

        if !state.objects_updated() && output.exists() {
            return Ok(());
        }

        let objects: Vec<PathBuf> = units
            .iter()
            .filter(|u| matches!(u.kind, UnitKind::Project))
            .map(|u| u.artifact_path(&self.config.build_root, ArtifactKind::Object, None))
            .collect();

        let invocation = LinkInvocation { objects, output_path: output, extra_args: self.config.link_extra_args.clone() };
        invoke_linker(self.runner.as_ref(), &self.linker, &invocation)
    }
}

struct ParseImportsCtx {
    front_end: PathBuf,
    runner: Arc<dyn ChildRunner>,
    project_root: PathBuf,
    build_root: PathBuf,
    includes: Vec<PathBuf>,
    stdlib: Option<String>,
    extra_args: Vec<String>,
}

fn parse_one_unit(ctx: &ParseImportsCtx, unit: &Unit) -> Result<ParsedImports> {
    let ldeps_path = unit.artifact_path(&ctx.build_root, ArtifactKind::ParsedDeps, Some(LIBS_SUBDIR));
    let ldeps_meta_path = unit.artifact_path(&ctx.build_root, ArtifactKind::ParsedDepsMeta, Some(LIBS_SUBDIR));

    let current_hash = hash::hash_file(&unit.source_path).map_err(|_| CpplError::SourceMissing(unit.source_path.clone()))?;
    let up_to_date = ldeps_path.exists()
        && read_meta_if_present(&ldeps_meta_path).map(|m| m.source_hash == current_hash).unwrap_or(false);

    if up_to_date {
        if let Ok(record) = ParsedImports::read(&ldeps_path) {
            return Ok(record);
        }
    }

    let invocation = FrontEndInvocation {
        phase: FrontEndPhase::ParseImport,
        src_root: ctx.project_root.clone(),
        unit_id: unit.id.clone(),
        meta_path: ldeps_meta_path,
        output_path: ldeps_path.clone(),
        includes: ctx.includes.clone(),
        stdlib: ctx.stdlib.clone(),
        include_dependencies: vec![],
        preamble_path: None,
        suppress_warnings: false,
        extra_args: ctx.extra_args.clone(),
    };
    invoke_front_end(ctx.runner.as_ref(), &ctx.front_end, &invocation)?;
    ParsedImports::read(&ldeps_path)
}

/// Per-node codegen step run from inside the DFS walk.
fn process_node(
    graph: &Graph,
    units_by_id: &HashMap<String, Unit>,
    config: &BuildConfig,
    runner: &dyn ChildRunner,
    front_end: &Path,
    state: &BuildState,
    pool: &StringPool,
    node_id: NodeId,
) -> bool {
    let Some(node) = graph.node(node_id) else { return true };
    let Some(unit) = units_by_id.get(&node.unit_id) else { return true };

    let (artifact_kind, meta_kind) = match node.kind {
        NodeKind::Declaration => (ArtifactKind::DeclAst, ArtifactKind::DeclAstMeta),
        NodeKind::Definition => (ArtifactKind::Object, ArtifactKind::ObjectMeta),
    };
    let artifact_path = unit.artifact_path(&config.build_root, artifact_kind, Some(LIBS_SUBDIR));
    let meta_path = unit.artifact_path(&config.build_root, meta_kind, Some(LIBS_SUBDIR));

    if is_up_to_date(graph, node_id, &unit.source_path, &artifact_path, &meta_path, state) {
        return true;
    }

    let previous_meta = read_meta_if_present(&meta_path);

    let dep_artifact_paths: Vec<PathBuf> = solver::transitive_deps(graph, node_id)
        .into_iter()
        .filter_map(|dep_id| {
            let dep_node = graph.node(dep_id)?;
            let dep_unit = units_by_id.get(&dep_node.unit_id)?;
            Some(dep_unit.artifact_path(&config.build_root, ArtifactKind::DeclAst, Some(LIBS_SUBDIR)))
        })
        .collect();

    let preamble_path = config.preamble_enabled().then(|| config.build_root.join("preamble.pch"));

    match node.kind {
        NodeKind::Definition => {
            let invocation = FrontEndInvocation {
                phase: FrontEndPhase::Obj,
                src_root: config.project_root.clone(),
                unit_id: unit.id.clone(),
                meta_path,
                output_path: artifact_path,
                includes: config.include_paths.clone(),
                stdlib: config.stdlib.clone(),
                include_dependencies: dep_artifact_paths,
                preamble_path,
                suppress_warnings: false,
                extra_args: config.codegen_extra_args.clone(),
            };
            match invoke_front_end(runner, front_end, &invocation) {
                Ok(()) => {
                    state.mark_objects_updated();
                    true
                }
                Err(e) => {
                    state.record_failure(format!("build-obj for `{}`: {e}", unit.id));
                    false
                }
            }
        }
        NodeKind::Declaration => {
            let invocation = FrontEndInvocation {
                phase: FrontEndPhase::Decl,
                src_root: config.project_root.clone(),
                unit_id: unit.id.clone(),
                meta_path: meta_path.clone(),
                output_path: artifact_path,
                includes: config.include_paths.clone(),
                stdlib: config.stdlib.clone(),
                include_dependencies: dep_artifact_paths,
                preamble_path,
                suppress_warnings: unit.has_definition(),
                extra_args: config.codegen_extra_args.clone(),
            };
            if let Err(e) = invoke_front_end(runner, front_end, &invocation) {
                state.record_failure(format!("build-decl for `{}`: {e}", unit.id));
                return false;
            }

            let Ok(new_meta) = Meta::read(&meta_path) else {
                state.record_failure(format!("build-decl for `{}` produced no readable meta", unit.id));
                return false;
            };
            state.record_if_changed(node_id, previous_meta.as_ref().map(|m| m.artifact_hash), new_meta.artifact_hash);

            if graph.public_nodes.contains(&node_id) {
                if let Err(e) = emit_generated_outputs(graph, units_by_id, config, unit, &new_meta, pool) {
                    state.record_failure(format!("header/surrogate generation for `{}`: {e}", unit.id));
                    return false;
                }
            }
            true
        }
    }
}

fn emit_generated_outputs(
    graph: &Graph,
    units_by_id: &HashMap<String, Unit>,
    config: &BuildConfig,
    unit: &Unit,
    meta: &Meta,
    pool: &StringPool,
) -> Result<()> {
    let direct_deps: Vec<DependencyRef> = direct_dependencies(graph, unit, units_by_id, pool);
    let source = std::fs::read_to_string(&unit.source_path)?;
    let preamble_relative = config.preamble_source.as_ref().map(|_| "preamble.pch");

    if let Some(header_out) = &config.header_out {
        let rendered =
            headergen::render(&source, &meta.fragments, &direct_deps, preamble_relative, OutputMode::Header, &unit.id);
        let path = paths::artifact_path(header_out, &unit.relative_path, ArtifactKind::GeneratedHeader, None);
        headergen::write_output(&path, &rendered)?;
    }
    if unit.has_definition() {
        if let Some(decl_out) = &config.decl_surrogate_out {
            let rendered = headergen::render(
                &source,
                &meta.fragments,
                &direct_deps,
                preamble_relative,
                OutputMode::DeclSurrogate,
                &unit.id,
            );
            let path = paths::artifact_path(decl_out, &unit.relative_path, ArtifactKind::GeneratedDeclSurrogate, None);
            headergen::write_output(&path, &rendered)?;
        }
    }
    Ok(())
}

fn direct_dependencies(
    graph: &Graph,
    unit: &Unit,
    units_by_id: &HashMap<String, Unit>,
    pool: &StringPool,
) -> Vec<DependencyRef> {
    let decl_id = graph.decl_id(pool, &unit.id);
    let Some(node) = graph.node(decl_id) else { return vec![] };
    node.outgoing
        .iter()
        .filter_map(|dep_id| {
            let dep_node = graph.node(*dep_id)?;
            let dep_unit = units_by_id.get(&dep_node.unit_id)?;
            let relative_header_path = dep_unit.relative_path.with_extension("h").to_string_lossy().into_owned();
            Some(DependencyRef { relative_header_path, unit_id: dep_unit.id.clone() })
        })
        .collect()
}

fn canonical_or_self(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn is_source_file(path: &Path) -> bool {
    path.is_file() && path.extension().map(|ext| ext == paths::SOURCE_EXT).unwrap_or(false)
}
