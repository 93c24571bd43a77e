//! Header metadata extraction for a single CSV file.
//!
//! A file mixes three kinds of lines:
//! - `#` comments carrying `key = value` settings, timing, and the adapted
//!   inverse metric,
//! - one column header line (the first non-comment line),
//! - numeric data rows.
//!
//! Extraction is a two-phase scan: every line is classified first, then
//! comments feed a small state machine that separates inverse-metric rows
//! from settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use nalgebra::DMatrix;
use sc_core::{Error, MetaValue, Method, Result};
use serde::{Deserialize, Serialize};

use crate::metadata::{RESERVED_PARAMS, RunMetadata};

const DIAGONAL_METRIC_MARKER: &str = "Diagonal elements of inverse mass matrix:";
const DENSE_METRIC_MARKER: &str = "Elements of inverse mass matrix:";
const DEFAULT_SUFFIX: &str = "(Default)";

/// Legacy key -> current key.
const RENAMED_KEYS: &[(&str, &str)] = &[
    ("engaged", "adapt_engaged"),
    ("delta", "adapt_delta"),
    ("max_depth", "max_treedepth"),
    ("stepsize", "step_size"),
    ("num_warmup", "iter_warmup"),
    ("num_samples", "iter_sampling"),
    ("model", "model_name"),
];

/// Path-valued keys; not portable between machines.
const DROPPED_KEYS: &[&str] =
    &["file", "diagnostic_file", "metric_file", "profile_file", "output_file", "fitted_params"];

/// Adapted inverse metric of one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvMetric {
    /// Diagonal metric (`diag_e`, `unit_e`).
    Diagonal(Vec<f64>),
    /// Dense metric (`dense_e`).
    Dense(DMatrix<f64>),
}

impl InvMetric {
    /// Number of parameters the metric covers.
    pub fn dim(&self) -> usize {
        match self {
            InvMetric::Diagonal(v) => v.len(),
            InvMetric::Dense(m) => m.nrows(),
        }
    }
}

/// Wall-clock breakdown of one sampling run, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// Replicate id.
    pub id: u64,
    /// Warmup phase.
    pub warmup: Option<f64>,
    /// Sampling phase.
    pub sampling: Option<f64>,
    /// Total.
    pub total: Option<f64>,
}

/// Everything extracted from one file's comments and header line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Source path.
    pub path: PathBuf,
    /// Typed metadata for this file alone (`ids` has one entry).
    pub metadata: RunMetadata,
    /// Every column of the header line, flattened names, file order.
    pub columns: Vec<String>,
    /// Adapted inverse metric, when the file records one.
    pub inv_metric: Option<InvMetric>,
    /// Adapted step size (`# Step size = ...`).
    pub step_size: Option<f64>,
    /// Timing record (sampling runs only).
    pub timing: Option<Timing>,
    /// 1-based line number of the column header line.
    #[serde(skip)]
    pub header_line: usize,
    /// Byte offset of the first line after the column header.
    #[serde(skip)]
    pub data_offset: usize,
}

impl FileHeader {
    /// Replicate id of this file.
    pub fn id(&self) -> u64 {
        self.metadata.ids.first().copied().unwrap_or(1)
    }

    /// Replace the replicate id, keeping the timing record in step.
    pub(crate) fn set_id(&mut self, id: u64) {
        self.metadata.ids = vec![id];
        if let Some(t) = &mut self.timing {
            t.id = id;
        }
    }
}

enum Line<'a> {
    Comment(&'a str),
    /// Column header with its 1-based line number and the byte offset just past it.
    Header { text: &'a str, line: usize, end: usize },
    Data,
}

/// Classify lines: comments, the first non-comment line as header, data after it.
///
/// Blank and whitespace-only lines are skipped everywhere.
fn classify(text: &str) -> impl Iterator<Item = Line<'_>> {
    let mut seen_header = false;
    let mut offset = 0usize;
    text.split_inclusive('\n').enumerate().filter_map(move |(i, raw)| {
        offset += raw.len();
        let l = raw.trim_end_matches(['\n', '\r']);
        if l.trim().is_empty() {
            return None;
        }
        Some(if l.starts_with('#') {
            Line::Comment(l)
        } else if !seen_header {
            seen_header = true;
            Line::Header { text: l.trim(), line: i + 1, end: offset }
        } else {
            Line::Data
        })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MetricState {
    Normal,
    ExpectDiagonal,
    /// `None` until the first row fixes the width.
    ExpectDense { remaining: Option<usize> },
}

#[derive(Default)]
struct Timings {
    warmup: Option<f64>,
    sampling: Option<f64>,
    total: Option<f64>,
}

fn strip_comment(line: &str) -> &str {
    line.trim_start_matches('#').trim()
}

fn parse_metric_row(line: &str, path: &Path) -> Result<Vec<f64>> {
    strip_comment(line)
        .split(',')
        .map(|s| {
            s.trim().parse::<f64>().map_err(|_| {
                Error::corrupt(path, format!("inverse metric entry '{}' is not a number", s.trim()))
            })
        })
        .collect()
}

/// Seconds value of an `Elapsed Time` line, e.g. `0.015 seconds (Total)`.
fn parse_seconds(body: &str, suffix: &str) -> Option<f64> {
    body.replace("Elapsed Time:", "").replace(suffix, "").trim().parse().ok()
}

/// Split `key = value (Default)` into a key and an optional value.
fn parse_key_value(body: &str) -> Option<(String, Option<MetaValue>)> {
    let body = body.replace(DEFAULT_SUFFIX, "");
    let (key, value) = body.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let key = if key == "Step size" { "step_size_adaptation" } else { key };
    Some((key.to_string(), MetaValue::parse(value)))
}

/// Parse the comment and header lines of a CSV file held in memory.
///
/// `fallback_id` is used when the file carries no `id` setting.
pub fn parse_header(text: &str, path: &Path, fallback_id: u64) -> Result<FileHeader> {
    let mut pairs: BTreeMap<String, MetaValue> = BTreeMap::new();
    let mut columns: Option<Vec<String>> = None;
    let mut header_line = 0usize;
    let mut data_offset = text.len();
    let mut n_comments = 0usize;

    let mut state = MetricState::Normal;
    let mut metric_buf: Vec<f64> = Vec::new();
    let mut metric_width = 0usize;
    let mut metric_seen = false;
    let mut timings = Timings::default();

    for line in classify(text) {
        let comment = match line {
            Line::Comment(c) => c,
            Line::Header { text: h, line, end } => {
                columns = Some(h.split(',').map(|c| c.trim().to_string()).collect());
                header_line = line;
                data_offset = end;
                continue;
            }
            Line::Data => continue,
        };
        n_comments += 1;
        let body = strip_comment(comment);

        match state {
            MetricState::ExpectDiagonal => {
                metric_buf.extend(parse_metric_row(body, path)?);
                state = MetricState::Normal;
                continue;
            }
            MetricState::ExpectDense { remaining } => {
                let row = parse_metric_row(body, path)?;
                let left = match remaining {
                    None => {
                        metric_width = row.len();
                        row.len().saturating_sub(1)
                    }
                    Some(n) => n.saturating_sub(1),
                };
                metric_buf.extend(row);
                state = if left == 0 {
                    MetricState::Normal
                } else {
                    MetricState::ExpectDense { remaining: Some(left) }
                };
                continue;
            }
            MetricState::Normal => {}
        }

        if body.contains(DIAGONAL_METRIC_MARKER) {
            metric_seen = true;
            state = MetricState::ExpectDiagonal;
        } else if body.contains(DENSE_METRIC_MARKER) {
            metric_seen = true;
            state = MetricState::ExpectDense { remaining: None };
        } else if let Some((key, value)) = parse_key_value(body) {
            if let Some(value) = value {
                pairs.insert(key, value);
            }
        } else if body.ends_with("(Warm-up)") {
            timings.warmup = parse_seconds(body, "seconds (Warm-up)");
        } else if body.ends_with("(Sampling)") {
            timings.sampling = parse_seconds(body, "seconds (Sampling)");
        } else if body.ends_with("(Total)") {
            timings.total = parse_seconds(body, "seconds (Total)");
        }
    }

    let Some(columns) = columns else {
        let reason = if n_comments == 0 {
            "no comment or header lines found"
        } else {
            "no column header line found"
        };
        return Err(Error::corrupt(path, reason));
    };

    let method_name = pairs
        .get("method")
        .and_then(MetaValue::as_str)
        .ok_or_else(|| Error::corrupt(path, "no 'method' setting in header comments"))?;
    let method: Method = method_name.parse()?;

    rename_keys(&mut pairs, method);
    let id = pairs.get("id").and_then(MetaValue::as_u64).unwrap_or(fallback_id);

    let fixed_param = pairs.get("algorithm").and_then(MetaValue::as_str) == Some("fixed_param");
    let (model_params, sampler_diagnostics) = classify_columns(&columns, fixed_param);
    if model_params.is_empty() && sampler_diagnostics.is_empty() {
        return Err(Error::NoVariables(path.to_path_buf()));
    }

    let inv_metric = if metric_seen && !metric_buf.is_empty() {
        let dense = pairs.get("metric").and_then(MetaValue::as_str) == Some("dense_e");
        Some(build_inv_metric(metric_buf, metric_width, dense, path)?)
    } else {
        None
    };
    let step_size = pairs.get("step_size_adaptation").and_then(MetaValue::as_f64);

    let metadata =
        RunMetadata::from_pairs(method, &pairs, model_params, sampler_diagnostics, id)?;

    let timing = (method == Method::Sample).then_some(Timing {
        id,
        warmup: timings.warmup,
        sampling: timings.sampling,
        total: timings.total,
    });

    log::debug!(
        "{}: method={} id={} columns={}",
        path.display(),
        method,
        id,
        columns.len()
    );

    Ok(FileHeader {
        path: path.to_path_buf(),
        metadata,
        columns,
        inv_metric,
        step_size,
        timing,
        header_line,
        data_offset,
    })
}

/// Read a file from disk and parse its header.
pub fn read_header(path: impl AsRef<Path>) -> Result<FileHeader> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    parse_header(&text, path, 1)
}

fn rename_keys(pairs: &mut BTreeMap<String, MetaValue>, method: Method) {
    for (old, new) in RENAMED_KEYS {
        if let Some(v) = pairs.remove(*old) {
            pairs.insert(new.to_string(), v);
        }
    }
    if let Some(v) = pairs.remove("num_threads") {
        let key = if method == Method::Sample { "threads_per_chain" } else { "threads" };
        pairs.insert(key.to_string(), v);
    }
    for key in DROPPED_KEYS {
        pairs.remove(*key);
    }
}

/// Split header columns into model parameters and sampler diagnostics.
fn classify_columns(columns: &[String], fixed_param: bool) -> (Vec<String>, Vec<String>) {
    let is_diag = |c: &str| c.ends_with("__") && !RESERVED_PARAMS.contains(&c);
    let named = || columns.iter().filter(|c| !c.is_empty());
    let params = named().filter(|c| !is_diag(c)).cloned().collect();
    let diagnostics = if fixed_param {
        Vec::new()
    } else {
        named().filter(|c| is_diag(c)).cloned().collect()
    };
    (params, diagnostics)
}

fn build_inv_metric(buf: Vec<f64>, width: usize, dense: bool, path: &Path) -> Result<InvMetric> {
    if !dense {
        return Ok(InvMetric::Diagonal(buf));
    }
    if width == 0 || width * width != buf.len() {
        return Err(Error::corrupt(
            path,
            format!("dense inverse metric has {} entries, expected {width}x{width}", buf.len()),
        ));
    }
    Ok(InvMetric::Dense(DMatrix::from_row_slice(width, width, &buf)))
}
