//! Multi-file draws assembly.
//!
//! [`read`] drives a whole run: upfront path validation, per-file header
//! extraction and consistency checks against the first file, one column
//! selection for every file, row decoding, and per-method accumulation into
//! a [`RunBuilder`] that is finalised once.
//!
//! Per-file work is independent and may run on the rayon pool; results are
//! reduced in input order so errors and chain order match a sequential read.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use sc_core::{Error, Method, Result};
use serde::{Deserialize, Serialize};

use crate::consistency::{Consistency, MatchPolicy, check_metadata};
use crate::draws::{DrawMatrix, Draws};
use crate::header::{FileHeader, InvMetric, Timing, parse_header};
use crate::metadata::{LOG_G, LOG_P, LP, LP_APPROX, RunMetadata};
use crate::rows::{RowBlock, decode_rows};
use crate::selection::{ColumnKind, ColumnSelection, Filter, resolve};

/// Options for [`read`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Variables to decode.
    pub variables: Filter,
    /// Sampler diagnostics to decode.
    pub sampler_diagnostics: Filter,
    /// Settings compared softly across files.
    pub policy: MatchPolicy,
    /// Scan files on the rayon pool.
    pub parallel: bool,
}

impl ReadOptions {
    /// Set the variable filter.
    pub fn with_variables(mut self, filter: Filter) -> Self {
        self.variables = filter;
        self
    }

    /// Set the sampler diagnostic filter.
    pub fn with_sampler_diagnostics(mut self, filter: Filter) -> Self {
        self.sampler_diagnostics = filter;
        self
    }

    /// Set the soft-mismatch policy.
    pub fn with_policy(mut self, policy: MatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable or disable per-file parallel scanning.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Decoded sampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResult {
    /// Run metadata.
    pub metadata: RunMetadata,
    /// One timing record per chain.
    pub timing: Vec<Timing>,
    /// Adapted inverse metric per chain id.
    pub inv_metric: BTreeMap<u64, InvMetric>,
    /// Adapted step size per chain id.
    pub step_size: BTreeMap<u64, f64>,
    /// Warmup parameter draws (only when warmup was saved).
    pub warmup_draws: Option<Draws>,
    /// Post-warmup parameter draws.
    pub post_warmup_draws: Draws,
    /// Warmup sampler diagnostics (only when warmup was saved).
    pub warmup_sampler_diagnostics: Option<Draws>,
    /// Post-warmup sampler diagnostics.
    pub post_warmup_sampler_diagnostics: Draws,
    /// Soft settings that differ between files.
    pub mismatched_settings: Vec<String>,
}

/// Decoded optimization run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizeResult {
    /// Run metadata.
    pub metadata: RunMetadata,
    /// One row per file holding its point estimate.
    pub point_estimates: DrawMatrix,
    /// Soft settings that differ between files.
    pub mismatched_settings: Vec<String>,
}

/// Decoded variational run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationalResult {
    /// Run metadata.
    pub metadata: RunMetadata,
    /// Approximate posterior draws (mean row removed).
    pub draws: DrawMatrix,
    /// Soft settings that differ between files.
    pub mismatched_settings: Vec<String>,
}

/// Decoded standalone generated quantities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GqResult {
    /// Run metadata.
    pub metadata: RunMetadata,
    /// Generated quantities, one chain per file.
    pub generated_quantities: Draws,
    /// Soft settings that differ between files.
    pub mismatched_settings: Vec<String>,
}

/// Result of [`read`], tagged by method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum RunResult {
    /// `method = sample`.
    Sample(SampleResult),
    /// `method = optimize`.
    Optimize(OptimizeResult),
    /// `method = variational`.
    Variational(VariationalResult),
    /// `method = generate_quantities`.
    GenerateQuantities(GqResult),
}

impl RunResult {
    /// Run metadata.
    pub fn metadata(&self) -> &RunMetadata {
        match self {
            RunResult::Sample(r) => &r.metadata,
            RunResult::Optimize(r) => &r.metadata,
            RunResult::Variational(r) => &r.metadata,
            RunResult::GenerateQuantities(r) => &r.metadata,
        }
    }

    /// Soft settings that differ between files.
    pub fn mismatched_settings(&self) -> &[String] {
        match self {
            RunResult::Sample(r) => &r.mismatched_settings,
            RunResult::Optimize(r) => &r.mismatched_settings,
            RunResult::Variational(r) => &r.mismatched_settings,
            RunResult::GenerateQuantities(r) => &r.mismatched_settings,
        }
    }

    /// Method of the run.
    pub fn method(&self) -> Method {
        self.metadata().method
    }
}

/// Validate every path before any parsing starts.
fn validate_paths<P: AsRef<Path>>(files: &[P]) -> Result<Vec<PathBuf>> {
    if files.is_empty() {
        return Err(Error::access(PathBuf::new(), "no CSV files supplied"));
    }
    files
        .iter()
        .map(|p| {
            let path = p.as_ref();
            let meta = std::fs::metadata(path).map_err(|e| Error::access(path, e.to_string()))?;
            if !meta.is_file() {
                return Err(Error::access(path, "not a regular file"));
            }
            let is_csv = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
            if !is_csv {
                return Err(Error::access(path, "expected a .csv extension"));
            }
            std::fs::File::open(path).map_err(|e| Error::access(path, e.to_string()))?;
            Ok(path.to_path_buf())
        })
        .collect()
}

/// One file read into memory with its header parsed.
struct ScannedFile {
    text: String,
    header: FileHeader,
}

fn scan_file(ordinal: usize, path: &Path) -> Result<ScannedFile> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData => Error::corrupt(path, "file is not valid UTF-8"),
        _ => Error::access(path, e.to_string()),
    })?;
    let header = parse_header(&text, path, ordinal as u64 + 1)?;
    Ok(ScannedFile { text, header })
}

/// Run `f` over `items`, in parallel when asked, yielding results in input order.
///
/// The sequential path is lazy so the first error stops further work.
fn map_ordered<'a, T, R, F>(
    items: &'a [T],
    parallel: bool,
    f: F,
) -> Box<dyn Iterator<Item = Result<R>> + 'a>
where
    T: Sync,
    R: Send + 'a,
    F: Fn(usize, &T) -> Result<R> + Sync + Send + 'a,
{
    if parallel {
        let out: Vec<Result<R>> = items.par_iter().enumerate().map(|(i, t)| f(i, t)).collect();
        Box::new(out.into_iter())
    } else {
        Box::new(items.iter().enumerate().map(move |(i, t)| f(i, t)))
    }
}

/// First file's schema plus everything reconciled from the later files.
struct Reconciled {
    files: Vec<ScannedFile>,
    metadata: RunMetadata,
    mismatched: Vec<String>,
    selection: Option<ColumnSelection>,
}

/// Scan and reconcile every file's header, in input order.
///
/// When `filters` is given the column selection is resolved right after the
/// first file, so a bad request fails before later files are compared.
fn reconcile(
    paths: &[PathBuf],
    options: &ReadOptions,
    filters: Option<(&Filter, &Filter)>,
) -> Result<Reconciled> {
    let mut files: Vec<ScannedFile> = Vec::with_capacity(paths.len());
    let mut mismatched: Vec<String> = Vec::new();
    let mut selection = None;
    let mut seen_ids = HashSet::new();
    let mut ids = Vec::with_capacity(paths.len());

    for scanned in map_ordered(paths, options.parallel, |i, p| scan_file(i, p)) {
        let mut scanned = scanned?;
        let header = &scanned.header;
        match files.first() {
            None => {
                if let Some((vars, diags)) = filters {
                    selection = Some(resolve(&header.metadata, &header.columns, vars, diags)?);
                }
            }
            Some(first) => {
                match check_metadata(&first.header.metadata, &header.metadata, &options.policy) {
                    Consistency::Incompatible(msg) => {
                        return Err(Error::IncompatibleFiles(format!(
                            "{msg} ({} vs {})",
                            first.header.path.display(),
                            header.path.display()
                        )));
                    }
                    Consistency::Compatible { not_matching } => {
                        for name in not_matching {
                            if !mismatched.contains(&name) {
                                mismatched.push(name);
                            }
                        }
                    }
                }
                if first.header.columns != header.columns {
                    return Err(Error::IncompatibleFiles(format!(
                        "column order differs between {} and {}",
                        first.header.path.display(),
                        header.path.display()
                    )));
                }
            }
        }
        let mut id = scanned.header.id();
        if seen_ids.contains(&id) {
            // Separate invocations all write the default id; fall back to position.
            let position = files.len() as u64 + 1;
            let fallback = if seen_ids.contains(&position) {
                seen_ids.iter().max().map_or(1, |m| m + 1)
            } else {
                position
            };
            log::debug!(
                "{}: chain id {id} already used, using {fallback}",
                scanned.header.path.display()
            );
            id = fallback;
            scanned.header.set_id(id);
        }
        seen_ids.insert(id);
        ids.push(id);
        files.push(scanned);
    }

    let Some(first) = files.first() else {
        return Err(Error::access(PathBuf::new(), "no CSV files supplied"));
    };
    let mut metadata = first.header.metadata.clone();
    metadata.ids = ids;

    if !mismatched.is_empty() {
        log::warn!(
            "Supplied CSV files do not match in the following arguments: {}",
            mismatched.join(", ")
        );
    }

    Ok(Reconciled { files, metadata, mismatched, selection })
}

/// Read and reconcile only the metadata of a run.
pub fn read_metadata<P: AsRef<Path>>(files: &[P], options: &ReadOptions) -> Result<RunMetadata> {
    let paths = validate_paths(files)?;
    Ok(reconcile(&paths, options, None)?.metadata)
}

/// Read one run from one or more CSV files.
///
/// Files must come from the same model, method and configuration; the first
/// file fixes the schema. Soft setting differences are returned in the
/// result's `mismatched_settings` and logged once.
pub fn read<P: AsRef<Path>>(files: &[P], options: &ReadOptions) -> Result<RunResult> {
    let paths = validate_paths(files)?;
    let Reconciled { files, metadata, mismatched, selection } =
        reconcile(&paths, options, Some((&options.variables, &options.sampler_diagnostics)))?;
    let selection = selection.unwrap_or_default();

    let blocks: Vec<RowBlock> =
        map_ordered(&files, options.parallel, |_, f| decode_rows(&f.text, &f.header, &selection))
            .collect::<Result<_>>()?;

    let mut builder = RunBuilder::new(metadata, selection);
    for (file, block) in files.into_iter().zip(blocks) {
        builder.push(file.header, block);
    }
    builder.finish(mismatched)
}

/// Expected per-file row layout, fixed by the first file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowLayout {
    Sample { warmup: usize, post_warmup: usize },
    Variational { draws: usize },
    Optimize,
    GenerateQuantities,
}

impl RowLayout {
    fn for_metadata(meta: &RunMetadata) -> Self {
        match meta.method {
            Method::Sample => RowLayout::Sample {
                warmup: meta.num_warmup_draws(),
                post_warmup: meta.num_post_warmup_draws(),
            },
            Method::Variational => {
                RowLayout::Variational { draws: meta.output_samples.unwrap_or(0) as usize }
            }
            Method::Optimize => RowLayout::Optimize,
            Method::GenerateQuantities => RowLayout::GenerateQuantities,
        }
    }
}

/// Decoded rows of one replicate, split by phase.
#[derive(Debug, Default)]
struct ReplicateSlot {
    id: u64,
    /// Row range of warmup draws within `rows`.
    warmup: std::ops::Range<usize>,
    /// Row range of the draws kept for the main container.
    main: std::ops::Range<usize>,
    rows: RowBlock,
    inv_metric: Option<InvMetric>,
    step_size: Option<f64>,
    timing: Option<Timing>,
}

/// Owns one slot per replicate and builds the aggregate containers once.
struct RunBuilder {
    metadata: RunMetadata,
    selection: ColumnSelection,
    layout: RowLayout,
    slots: Vec<ReplicateSlot>,
}

impl RunBuilder {
    fn new(metadata: RunMetadata, selection: ColumnSelection) -> Self {
        let layout = RowLayout::for_metadata(&metadata);
        let slots = Vec::with_capacity(metadata.ids.len());
        Self { metadata, selection, layout, slots }
    }

    fn push(&mut self, header: FileHeader, rows: RowBlock) {
        let n = rows.n_rows();
        let path = header.path.display();

        let (warmup, main) = match self.layout {
            RowLayout::Sample { warmup, post_warmup } => {
                let w = warmup.min(n);
                if n > 0 && n - w != post_warmup {
                    log::warn!("{path}: expected {post_warmup} post-warmup draws, found {}", n - w);
                }
                (0..w, w..n)
            }
            RowLayout::Variational { draws } => {
                let start = 1.min(n);
                if n > 0 && n - start != draws {
                    log::warn!("{path}: expected {draws} variational draws, found {}", n - start);
                }
                (0..0, start..n)
            }
            RowLayout::Optimize => (0..0, n.saturating_sub(1)..n),
            RowLayout::GenerateQuantities => (0..0, 0..n),
        };

        self.slots.push(ReplicateSlot {
            id: header.id(),
            warmup,
            main,
            rows,
            inv_metric: header.inv_metric,
            step_size: header.step_size,
            timing: header.timing,
        });
    }

    /// Bind one kind of column across slots, taking `range(slot)` rows from each.
    fn bind(
        &self,
        kind: ColumnKind,
        range: impl Fn(&ReplicateSlot) -> std::ops::Range<usize>,
    ) -> Result<Draws> {
        let positions = self.selection.positions(kind);
        let names = self.selection.names_of(kind);
        let parts = self
            .slots
            .iter()
            .map(|s| {
                let r = range(s);
                let n = r.len();
                Draws::single_chain(names.clone(), n, s.rows.project(r, &positions))
            })
            .collect::<Result<Vec<_>>>()?;
        if parts.is_empty() {
            return Ok(Draws::empty(names));
        }
        Draws::bind_chains(parts)
    }

    /// Stack `main` rows of every slot into one matrix.
    fn stack(&self) -> Result<DrawMatrix> {
        let all: Vec<usize> = (0..self.selection.len()).collect();
        let names: Vec<String> = self.selection.names().into_iter().map(String::from).collect();
        let mut values = Vec::new();
        let mut n = 0;
        for s in &self.slots {
            n += s.main.len();
            values.extend(s.rows.project(s.main.clone(), &all));
        }
        DrawMatrix::new(names, n, values)
    }

    fn finish(self, mismatched_settings: Vec<String>) -> Result<RunResult> {
        match self.metadata.method {
            Method::Sample => self.finish_sample(mismatched_settings),
            Method::Optimize => Ok(RunResult::Optimize(OptimizeResult {
                point_estimates: self.stack()?,
                metadata: self.metadata,
                mismatched_settings,
            })),
            Method::Variational => {
                let draws = variational_columns(self.stack()?)?;
                Ok(RunResult::Variational(VariationalResult {
                    metadata: self.metadata,
                    draws,
                    mismatched_settings,
                }))
            }
            Method::GenerateQuantities => {
                let generated_quantities =
                    self.bind(ColumnKind::Parameter, |s| s.main.clone())?;
                Ok(RunResult::GenerateQuantities(GqResult {
                    metadata: self.metadata,
                    generated_quantities,
                    mismatched_settings,
                }))
            }
        }
    }

    fn finish_sample(self, mismatched_settings: Vec<String>) -> Result<RunResult> {
        let save_warmup = self.metadata.save_warmup;
        let post_warmup_draws = self.bind(ColumnKind::Parameter, |s| s.main.clone())?;
        let post_warmup_sampler_diagnostics =
            self.bind(ColumnKind::Diagnostic, |s| s.main.clone())?;
        let (warmup_draws, warmup_sampler_diagnostics) = if save_warmup {
            (
                Some(self.bind(ColumnKind::Parameter, |s| s.warmup.clone())?),
                Some(self.bind(ColumnKind::Diagnostic, |s| s.warmup.clone())?),
            )
        } else {
            (None, None)
        };

        let mut timing = Vec::with_capacity(self.slots.len());
        let mut inv_metric = BTreeMap::new();
        let mut step_size = BTreeMap::new();
        for slot in self.slots {
            timing.extend(slot.timing);
            if let Some(m) = slot.inv_metric {
                inv_metric.insert(slot.id, m);
            }
            if let Some(s) = slot.step_size {
                step_size.insert(slot.id, s);
            }
        }

        Ok(RunResult::Sample(SampleResult {
            metadata: self.metadata,
            timing,
            inv_metric,
            step_size,
            warmup_draws,
            post_warmup_draws,
            warmup_sampler_diagnostics,
            post_warmup_sampler_diagnostics,
            mismatched_settings,
        }))
    }
}

/// Drop the all-zero `lp__` column and rename the density aliases.
fn variational_columns(m: DrawMatrix) -> Result<DrawMatrix> {
    let keep: Vec<usize> =
        m.variables().iter().enumerate().filter(|(_, v)| *v != LP).map(|(i, _)| i).collect();
    let names = keep
        .iter()
        .map(|&i| match m.variables()[i].as_str() {
            LOG_P => LP.to_string(),
            LOG_G => LP_APPROX.to_string(),
            other => other.to_string(),
        })
        .collect();
    let width = m.variables().len();
    let values = m
        .values()
        .chunks(width.max(1))
        .take(m.n_draws())
        .flat_map(|row| keep.iter().map(move |&i| row[i]))
        .collect();
    DrawMatrix::new(names, m.n_draws(), values)
}
