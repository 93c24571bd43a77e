//! Cross-file consistency checks for files of one run.
//!
//! Some differences make files impossible to combine (different model,
//! method, columns, or draw counts). Others are worth reporting but harmless;
//! which settings fall in that group is a [`MatchPolicy`] value rather than
//! code.

use sc_core::Method;
use serde::{Deserialize, Serialize};

use crate::metadata::RunMetadata;

/// Settings compared softly between files of one run.
const DEFAULT_SOFT_FIELDS: &[&str] = &[
    "stan_version_major",
    "stan_version_minor",
    "stan_version_patch",
    "gamma",
    "kappa",
    "t0",
    "init_buffer",
    "term_buffer",
    "window",
    "algorithm",
    "engine",
    "max_treedepth",
    "metric",
    "stepsize_jitter",
    "adapt_engaged",
    "adapt_delta",
    "iter_warmup",
];

/// Table of settings whose differences are reported but tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    /// Header keys compared between files.
    pub soft_fields: Vec<String>,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self { soft_fields: DEFAULT_SOFT_FIELDS.iter().map(|s| s.to_string()).collect() }
    }
}

impl MatchPolicy {
    /// A policy that compares nothing softly.
    pub fn empty() -> Self {
        Self { soft_fields: Vec::new() }
    }

    /// Parse a policy table such as `{"soft_fields": ["adapt_delta"]}`.
    ///
    /// A missing `soft_fields` key yields the default list.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Add a key to the soft comparison list.
    pub fn with_field(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.soft_fields.contains(&key) {
            self.soft_fields.push(key);
        }
        self
    }
}

/// Outcome of comparing two files' metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum Consistency {
    /// The files cannot be combined.
    Incompatible(String),
    /// The files can be combined; listed settings differ.
    Compatible {
        /// Soft settings whose values differ.
        not_matching: Vec<String>,
    },
}

/// Compare `b` against the reference metadata `a`.
pub fn check_metadata(a: &RunMetadata, b: &RunMetadata, policy: &MatchPolicy) -> Consistency {
    if a.model_name != b.model_name {
        return Consistency::Incompatible(
            "Supplied CSV files were not generated with the same model!".to_string(),
        );
    }
    if a.method != b.method {
        return Consistency::Incompatible(
            "Supplied CSV files were produced by different methods and need to be read in \
             separately!"
                .to_string(),
        );
    }
    if a.model_params != b.model_params || a.sampler_diagnostics != b.sampler_diagnostics {
        return Consistency::Incompatible(
            "Supplied CSV files have samples for different parameters!".to_string(),
        );
    }

    let counts_differ = match a.method {
        Method::Sample => {
            a.iter_sampling != b.iter_sampling
                || a.thin != b.thin
                || a.save_warmup != b.save_warmup
                || (a.save_warmup && a.iter_warmup != b.iter_warmup)
        }
        Method::Variational => a.output_samples != b.output_samples,
        Method::Optimize | Method::GenerateQuantities => false,
    };
    if counts_differ {
        return Consistency::Incompatible(
            "Supplied CSV files do not match in the number of output samples!".to_string(),
        );
    }

    let not_matching = policy
        .soft_fields
        .iter()
        .filter(|key| match a.field(key) {
            Some(va) => b.field(key).as_ref() != Some(&va),
            None => false,
        })
        .cloned()
        .collect();
    Consistency::Compatible { not_matching }
}
