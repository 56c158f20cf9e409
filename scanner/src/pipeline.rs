// pipeline.rs — Analysis run orchestration
//
// Scans every input file on a worker pool, merges the results into one
// `DeclPool` behind a barrier, then runs resolve → align → aggregate →
// conflicts over the complete pool and assembles the report. Shader files
// are expanded once per configured stage variant; a declaration seen by
// several passes is kept once and remembers every stage that saw it.
//
// Preconditions: `config` is valid (checked again by `run`).
// Postconditions: identical inputs produce identical reports, whatever the
//                 completion order of scan workers.
// Failure modes: an `AnalysisError` only for run-level failures (no input,
//                unreadable input list, bad config, no declarations at all).
//                Per-file failures become diagnostics.
// Side effects: reads source files; logs through `tracing`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::aggregate::{aggregate, aggregate_implicit, EntryPoint};
use crate::align::Aligner;
use crate::config::{AnalysisConfig, ConfigError};
use crate::conflict::Detector;
use crate::decl::{DeclDraft, DeclPool, Dialect, Stage};
use crate::diag::{codes, DiagKind, Diagnostic};
use crate::extract::{extract, OffsetAssert};
use crate::id::IdAllocator;
use crate::report::{build_rows, AnalysisReport, RunStats};
use crate::resolve::resolve;
use crate::source::{IncludeExpander, Location, Passthrough, PreprocessError, Preprocessor};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("no input files")]
    NoInput,
    #[error("no declarations were extracted from any input file")]
    NoDeclarations,
    #[error("cannot read input list {}: {source}", .path.display())]
    InputList {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot start worker pool: {0}")]
    ThreadPool(String),
}

/// Read a file list: one path per line; blank lines and `#` comments are
/// ignored.
pub fn read_file_list(path: &Path) -> Result<Vec<PathBuf>, AnalysisError> {
    let text = std::fs::read_to_string(path).map_err(|e| AnalysisError::InputList {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}

// ── Cancellation ────────────────────────────────────────────────────────────

/// Cooperative cancellation, checked before each file starts scanning.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Inputs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub shader_files: Vec<PathBuf>,
    pub host_files: Vec<PathBuf>,
    /// Entry-point enumerator data; `None` derives liveness from the stage
    /// variants each declaration was seen under.
    pub entries: Option<Vec<EntryPoint>>,
}

impl AnalysisInput {
    pub fn new(shader_files: Vec<PathBuf>, host_files: Vec<PathBuf>) -> Self {
        AnalysisInput {
            shader_files,
            host_files,
            entries: None,
        }
    }
}

/// Everything one file contributed, merged over its stage passes.
struct UnitScan {
    drafts: Vec<(DeclDraft, BTreeSet<Stage>)>,
    offset_asserts: Vec<OffsetAssert>,
    diagnostics: Vec<Diagnostic>,
}

impl UnitScan {
    fn new() -> Self {
        UnitScan {
            drafts: Vec::new(),
            offset_asserts: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Diagnostics repeat across passes over one file; keep the first.
    fn note(&mut self, seen: &mut HashSet<String>, diags: Vec<Diagnostic>) {
        for d in diags {
            if seen.insert(d.to_string()) {
                self.diagnostics.push(d);
            }
        }
    }
}

enum FileOutcome {
    Scanned(UnitScan),
    Failed(Diagnostic),
    Skipped,
}

struct FileScan {
    dialect: Dialect,
    path: PathBuf,
    outcome: FileOutcome,
}

fn log_phase(phase: &str, start: Instant) {
    debug!(
        "{} complete, {:.1}ms",
        phase,
        start.elapsed().as_secs_f64() * 1000.0
    );
}

// ── Analyzer ────────────────────────────────────────────────────────────────

pub struct Analyzer {
    config: AnalysisConfig,
    shader_preprocessor: Box<dyn Preprocessor>,
    host_preprocessor: Box<dyn Preprocessor>,
    cancel: CancelToken,
}

impl Analyzer {
    /// Shader files go through `IncludeExpander` with no include dirs or
    /// defines; host files are scanned raw.
    pub fn new(config: AnalysisConfig) -> Self {
        Analyzer {
            config,
            shader_preprocessor: Box::new(IncludeExpander::new()),
            host_preprocessor: Box::new(Passthrough),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_shader_preprocessor(mut self, p: Box<dyn Preprocessor>) -> Self {
        self.shader_preprocessor = p;
        self
    }

    pub fn with_host_preprocessor(mut self, p: Box<dyn Preprocessor>) -> Self {
        self.host_preprocessor = p;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn scan_file(&self, dialect: Dialect, path: &Path) -> FileScan {
        let outcome = if self.cancel.is_cancelled() {
            FileOutcome::Skipped
        } else {
            debug!("scanning {}", path.display());
            let scanned = match dialect {
                Dialect::ShaderSide => self.scan_shader(path),
                Dialect::HostSide => self.scan_host(path),
            };
            match scanned {
                Ok(unit) => {
                    debug!("{}: {} declarations", path.display(), unit.drafts.len());
                    FileOutcome::Scanned(unit)
                }
                Err(e) => {
                    warn!("{}", e);
                    FileOutcome::Failed(
                        Diagnostic::error(DiagKind::PreprocessFailure, e.to_string())
                            .with_code(codes::PREPROCESS_FAILURE)
                            .at(Location::new(path, 1)),
                    )
                }
            }
        };
        FileScan {
            dialect,
            path: path.to_path_buf(),
            outcome,
        }
    }

    /// One pass per stage variant. Drafts are identified by name and original
    /// location; the first pass that sees one supplies its body.
    fn scan_shader(&self, path: &Path) -> Result<UnitScan, PreprocessError> {
        let mut unit = UnitScan::new();
        let mut seen_diags = HashSet::new();
        let mut index: HashMap<(Location, String), usize> = HashMap::new();
        for variant in &self.config.variants {
            let src = self
                .shader_preprocessor
                .expand_with_defines(path, &variant.defines)?;
            let ex = extract(&src, Dialect::ShaderSide, &self.config.extract);
            trace!("{} [{}]: {} drafts", path.display(), variant, ex.drafts.len());
            unit.note(&mut seen_diags, src.diagnostics);
            unit.note(&mut seen_diags, ex.diagnostics);
            for draft in ex.drafts {
                let key = (draft.location.clone(), draft.name.clone());
                match index.get(&key) {
                    Some(&k) => {
                        unit.drafts[k].1.insert(variant.stage);
                    }
                    None => {
                        index.insert(key, unit.drafts.len());
                        unit.drafts.push((draft, BTreeSet::from([variant.stage])));
                    }
                }
            }
        }
        Ok(unit)
    }

    fn scan_host(&self, path: &Path) -> Result<UnitScan, PreprocessError> {
        let src = self.host_preprocessor.expand(path)?;
        let ex = extract(&src, Dialect::HostSide, &self.config.extract);
        let mut unit = UnitScan::new();
        let mut seen_diags = HashSet::new();
        unit.note(&mut seen_diags, src.diagnostics);
        unit.note(&mut seen_diags, ex.diagnostics);
        unit.offset_asserts = ex.offset_asserts;
        unit.drafts = ex.drafts.into_iter().map(|d| (d, BTreeSet::new())).collect();
        Ok(unit)
    }

    pub fn run(&self, input: &AnalysisInput) -> Result<AnalysisReport, AnalysisError> {
        self.config.validate()?;
        if input.shader_files.is_empty() && input.host_files.is_empty() {
            return Err(AnalysisError::NoInput);
        }

        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs.unwrap_or(0))
            .build()
            .map_err(|e| AnalysisError::ThreadPool(e.to_string()))?;

        // ── Scan (parallel) ──
        let start = Instant::now();
        let jobs: Vec<(Dialect, &PathBuf)> = input
            .shader_files
            .iter()
            .map(|p| (Dialect::ShaderSide, p))
            .chain(input.host_files.iter().map(|p| (Dialect::HostSide, p)))
            .collect();
        let mut scans: Vec<FileScan> = workers.install(|| {
            jobs.par_iter()
                .map(|(dialect, path)| self.scan_file(*dialect, path))
                .collect()
        });
        log_phase("scan", start);

        // ── Barrier: merge into one pool ──
        scans.sort_by(|a, b| (a.dialect, &a.path).cmp(&(b.dialect, &b.path)));
        let mut stats = RunStats::default();
        let mut diagnostics = Vec::new();
        let mut units: Vec<(PathBuf, Vec<(DeclDraft, BTreeSet<Stage>)>)> = Vec::new();
        let mut asserts: Vec<OffsetAssert> = Vec::new();
        let mut skipped = 0usize;
        for scan in scans {
            match scan.outcome {
                FileOutcome::Scanned(ex) => {
                    stats.files_scanned += 1;
                    diagnostics.extend(ex.diagnostics);
                    asserts.extend(ex.offset_asserts);
                    units.push((scan.path, ex.drafts));
                }
                FileOutcome::Failed(diag) => {
                    stats.files_failed += 1;
                    diagnostics.push(diag);
                }
                FileOutcome::Skipped => skipped += 1,
            }
        }
        let cancelled = self.cancel.is_cancelled();
        if skipped > 0 {
            info!("cancelled: {} files not scanned", skipped);
        }

        let pool = build_pool(units, &asserts);
        stats.shader_declarations = pool.of_dialect(Dialect::ShaderSide).count();
        stats.host_declarations = pool.of_dialect(Dialect::HostSide).count();

        if cancelled {
            return Ok(AnalysisReport {
                rows: Vec::new(),
                diagnostics,
                stats,
                cancelled: true,
            });
        }
        if pool.is_empty() {
            return Err(AnalysisError::NoDeclarations);
        }

        // ── Resolve ──
        let start = Instant::now();
        let resolution = resolve(&pool);
        diagnostics.extend(resolution.diagnostics.iter().cloned());
        log_phase("resolve", start);

        // ── Align ──
        let start = Instant::now();
        let aligner = Aligner::new(&self.config.align);
        let alignments = workers.install(|| aligner.align_all(&pool, &resolution));
        log_phase("align", start);

        // ── Aggregate ──
        let start = Instant::now();
        let aggregation = match &input.entries {
            Some(entries) => aggregate(&pool, entries),
            None => aggregate_implicit(&pool),
        };
        diagnostics.extend(aggregation.diagnostics);
        stats.register_uses = aggregation.registry.len();
        log_phase("aggregate", start);

        // ── Conflicts ──
        let start = Instant::now();
        let confident: HashMap<_, _> = alignments
            .iter()
            .filter_map(|a| a.outcome.confident_host().map(|h| (a.shader, h)))
            .collect();
        let conflicts = Detector::new(&pool, &resolution, &confident).detect(&aggregation.registry);
        log_phase("conflicts", start);

        info!(
            "{} alignments, {} conflicts, {} diagnostics",
            alignments.len(),
            conflicts.len(),
            diagnostics.len()
        );

        Ok(AnalysisReport {
            rows: build_rows(&pool, &resolution, &alignments, &conflicts),
            diagnostics,
            stats,
            cancelled: false,
        })
    }
}

/// Allocate ids in (dialect, path, source order) and apply host offset
/// assertions to the fields they name.
fn build_pool(
    units: Vec<(PathBuf, Vec<(DeclDraft, BTreeSet<Stage>)>)>,
    asserts: &[OffsetAssert],
) -> DeclPool {
    let offsets: HashMap<(&str, &str), u32> = asserts
        .iter()
        .map(|a| ((a.type_name.as_str(), a.field.as_str()), a.offset))
        .collect();
    let mut ids = IdAllocator::new();
    let mut decls = Vec::new();
    for (unit, drafts) in units {
        for (mut draft, stages) in drafts {
            if draft.dialect == Dialect::HostSide {
                for field in &mut draft.fields {
                    if let Some(off) = offsets.get(&(draft.name.as_str(), field.name.as_str())) {
                        field.explicit_offset.get_or_insert(*off);
                    }
                }
            }
            let mut decl = draft.into_declaration(ids.alloc_decl(), unit.clone());
            decl.stages = stages;
            decls.push(decl);
        }
    }
    DeclPool::new(decls)
}
