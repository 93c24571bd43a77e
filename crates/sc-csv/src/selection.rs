//! Resolve user variable/diagnostic filters into the concrete columns to decode.

use std::collections::HashMap;

use sc_core::{Error, Method, Result};
use serde::{Deserialize, Serialize};

use crate::metadata::{LP, RunMetadata};
use crate::names::repair_name;

/// Name filter for variables or sampler diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Every column.
    #[default]
    All,
    /// No columns.
    Nothing,
    /// Exact element names (`beta[1]`) or base names (`beta`).
    Names(Vec<String>),
}

impl Filter {
    /// Map the optional-list convention: `None` selects all, a list of empty
    /// strings selects nothing.
    pub fn from_option(names: Option<Vec<String>>) -> Self {
        match names {
            None => Filter::All,
            Some(v) if v.iter().all(|s| s.is_empty()) => Filter::Nothing,
            Some(v) => Filter::Names(v.into_iter().filter(|s| !s.is_empty()).collect()),
        }
    }

    /// Filter from a list of names.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::from_option(Some(names.into_iter().map(Into::into).collect()))
    }
}

/// Routing of a selected column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Model parameter (including the log density).
    Parameter,
    /// Sampler diagnostic.
    Diagnostic,
}

/// One column to decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedColumn {
    /// Bracketed name used as the variable label.
    pub name: String,
    /// Position in the file's header line.
    pub index: usize,
    /// Parameter or diagnostic.
    pub kind: ColumnKind,
}

/// Ordered set of columns to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSelection {
    columns: Vec<SelectedColumn>,
}

impl ColumnSelection {
    /// All selected columns, in decode order.
    pub fn columns(&self) -> &[SelectedColumn] {
        &self.columns
    }

    /// Labels of all selected columns.
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Header indices of all selected columns.
    pub fn indices(&self) -> Vec<usize> {
        self.columns.iter().map(|c| c.index).collect()
    }

    /// Positions (within the selection) of columns of one kind.
    pub fn positions(&self, kind: ColumnKind) -> Vec<usize> {
        self.columns.iter().enumerate().filter(|(_, c)| c.kind == kind).map(|(i, _)| i).collect()
    }

    /// Labels of columns of one kind.
    pub fn names_of(&self, kind: ColumnKind) -> Vec<String> {
        self.columns.iter().filter(|c| c.kind == kind).map(|c| c.name.clone()).collect()
    }

    /// Number of selected columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// True when nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Match requested names against `(flat, repaired)` candidates.
///
/// Returns the matched flat names in request order (deduplicated) and the
/// requests that matched nothing.
fn match_names<'a>(
    candidates: &'a [(String, String)],
    filter: &Filter,
) -> (Vec<&'a (String, String)>, Vec<String>) {
    let requests = match filter {
        Filter::All => return (candidates.iter().collect(), Vec::new()),
        Filter::Nothing => return (Vec::new(), Vec::new()),
        Filter::Names(n) => n,
    };
    let mut selected: Vec<&(String, String)> = Vec::new();
    let mut missing = Vec::new();
    for request in requests {
        let request = repair_name(request);
        let prefix = format!("{request}[");
        let mut found = false;
        for cand in candidates {
            if cand.1 == request || cand.1.starts_with(&prefix) {
                found = true;
                if !selected.iter().any(|s| s.0 == cand.0) {
                    selected.push(cand);
                }
            }
        }
        if !found {
            missing.push(request);
        }
    }
    (selected, missing)
}

/// Resolve the column set for a run from the first file's metadata and header.
///
/// The log-density column comes first (except for generated quantities), then
/// the requested parameters, then the requested diagnostics. Unmatched names
/// of both kinds are reported together.
pub fn resolve(
    meta: &RunMetadata,
    header: &[String],
    variables: &Filter,
    diagnostics: &Filter,
) -> Result<ColumnSelection> {
    let index: HashMap<&str, usize> =
        header.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();
    let pair = |flat: &String| (flat.clone(), repair_name(flat));
    let params: Vec<(String, String)> = meta.model_params.iter().map(pair).collect();
    let diags: Vec<(String, String)> = meta.sampler_diagnostics.iter().map(pair).collect();

    let (selected_params, missing_vars) = match_names(&params, variables);
    let (selected_diags, missing_diags) = if meta.is_fixed_param() {
        (Vec::new(), Vec::new())
    } else {
        match_names(&diags, diagnostics)
    };

    if !missing_vars.is_empty() || !missing_diags.is_empty() {
        return Err(Error::Selection { variables: missing_vars, diagnostics: missing_diags });
    }

    let mut columns = Vec::with_capacity(selected_params.len() + selected_diags.len() + 1);
    let mut push = |(flat, repaired): &(String, String), kind| {
        if let Some(&i) = index.get(flat.as_str()) {
            columns.push(SelectedColumn { name: repaired.clone(), index: i, kind });
        }
    };

    let lead_lp = meta.method != Method::GenerateQuantities
        && *variables != Filter::Nothing
        && meta.model_params.iter().any(|p| p == LP);
    if lead_lp {
        push(&(LP.to_string(), LP.to_string()), ColumnKind::Parameter);
    }
    for p in selected_params {
        if !(lead_lp && p.0 == LP) {
            push(p, ColumnKind::Parameter);
        }
    }
    for d in selected_diags {
        push(d, ColumnKind::Diagnostic);
    }

    Ok(ColumnSelection { columns })
}
