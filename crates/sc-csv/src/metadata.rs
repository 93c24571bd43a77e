//! Typed run metadata built from the `key = value` header comments.

use std::collections::BTreeMap;

use sc_core::{MetaValue, Method, Result, StanVersion};
use serde::{Deserialize, Serialize};

use crate::names::{VariableShape, repair_names, variable_shapes};

/// Log-density column name.
pub const LP: &str = "lp__";
/// Variational log joint density alias.
pub const LOG_P: &str = "log_p__";
/// Variational log approximate density alias.
pub const LOG_G: &str = "log_g__";
/// Canonical name of `log_g__` after variational decoding.
pub const LP_APPROX: &str = "lp_approx__";

/// Names ending in `__` that are nevertheless model-parameter columns.
pub const RESERVED_PARAMS: [&str; 3] = [LP, LOG_P, LOG_G];

/// Keys that are read into typed fields rather than [`RunMetadata::extra`].
const TYPED_KEYS: &[&str] = &[
    "method",
    "model_name",
    "stan_version_major",
    "stan_version_minor",
    "stan_version_patch",
    "algorithm",
    "engine",
    "metric",
    "iter_warmup",
    "iter_sampling",
    "thin",
    "save_warmup",
    "adapt_engaged",
    "adapt_delta",
    "max_treedepth",
    "output_samples",
    "threads",
    "threads_per_chain",
    "seed",
    "id",
];

/// Metadata for one run (one or more files sharing configuration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Inference method.
    pub method: Method,
    /// Model name.
    pub model_name: String,
    /// Stan library version.
    pub stan_version: StanVersion,
    /// Algorithm (`hmc`, `fixed_param`, `lbfgs`, `meanfield`, ...).
    pub algorithm: Option<String>,
    /// HMC engine (`nuts`, `static`).
    pub engine: Option<String>,
    /// Metric kind (`diag_e`, `dense_e`, `unit_e`).
    pub metric: Option<String>,
    /// Warmup iterations.
    pub iter_warmup: Option<u64>,
    /// Sampling iterations (or optimizer/ADVI iterations for other methods).
    pub iter_sampling: Option<u64>,
    /// Thinning period.
    pub thin: u64,
    /// Whether warmup draws are written to the file.
    pub save_warmup: bool,
    /// Whether adaptation ran.
    pub adapt_engaged: Option<bool>,
    /// Target acceptance statistic.
    pub adapt_delta: Option<f64>,
    /// NUTS tree depth limit.
    pub max_treedepth: Option<u64>,
    /// Number of approximate posterior draws (variational).
    pub output_samples: Option<u64>,
    /// Threads per chain (sample).
    pub threads_per_chain: Option<u64>,
    /// Threads (non-sampling methods).
    pub threads: Option<u64>,
    /// Random seed.
    pub seed: Option<u64>,
    /// Flattened model parameter column names, in file order.
    pub model_params: Vec<String>,
    /// Flattened sampler diagnostic column names, in file order.
    pub sampler_diagnostics: Vec<String>,
    /// Replicate (chain) id of every merged file, in input order.
    pub ids: Vec<u64>,
    /// Shapes of the model variables.
    pub variable_sizes: VariableShape,
    /// Every other header key.
    pub extra: BTreeMap<String, MetaValue>,
}

impl RunMetadata {
    /// Build typed metadata from a renamed key/value bag and classified columns.
    pub(crate) fn from_pairs(
        method: Method,
        pairs: &BTreeMap<String, MetaValue>,
        model_params: Vec<String>,
        sampler_diagnostics: Vec<String>,
        id: u64,
    ) -> Result<Self> {
        let text = |k: &str| pairs.get(k).map(|v| v.to_string());
        let count = |k: &str| pairs.get(k).and_then(MetaValue::as_u64);
        let version = |k: &str| count(k).unwrap_or(0) as u32;

        let variable_sizes = variable_shapes(&repair_names(&model_params))?;

        let extra = pairs
            .iter()
            .filter(|(k, _)| !TYPED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            method,
            model_name: text("model_name").unwrap_or_default(),
            stan_version: StanVersion {
                major: version("stan_version_major"),
                minor: version("stan_version_minor"),
                patch: version("stan_version_patch"),
            },
            algorithm: text("algorithm"),
            engine: text("engine"),
            metric: text("metric"),
            iter_warmup: count("iter_warmup"),
            iter_sampling: count("iter_sampling"),
            thin: count("thin").filter(|&t| t > 0).unwrap_or(1),
            save_warmup: pairs.get("save_warmup").and_then(MetaValue::as_bool).unwrap_or(false),
            adapt_engaged: pairs.get("adapt_engaged").and_then(MetaValue::as_bool),
            adapt_delta: pairs.get("adapt_delta").and_then(MetaValue::as_f64),
            max_treedepth: count("max_treedepth"),
            output_samples: count("output_samples"),
            threads_per_chain: count("threads_per_chain"),
            threads: count("threads"),
            seed: count("seed"),
            model_params,
            sampler_diagnostics,
            ids: vec![id],
            variable_sizes,
            extra,
        })
    }

    /// True for `algorithm = fixed_param` sampling runs.
    pub fn is_fixed_param(&self) -> bool {
        self.algorithm.as_deref() == Some("fixed_param")
    }

    /// Rows of warmup output per file: `ceil(iter_warmup / thin)` when saved, else 0.
    pub fn num_warmup_draws(&self) -> usize {
        if self.method != Method::Sample || !self.save_warmup {
            return 0;
        }
        self.iter_warmup.unwrap_or(0).div_ceil(self.thin) as usize
    }

    /// Rows of post-warmup output per file: `ceil(iter_sampling / thin)`.
    pub fn num_post_warmup_draws(&self) -> usize {
        self.iter_sampling.unwrap_or(0).div_ceil(self.thin) as usize
    }

    /// Bracketed names of the model parameters.
    pub fn variables(&self) -> Vec<String> {
        repair_names(&self.model_params)
    }

    /// Look up a setting by its header key, covering typed fields and `extra`.
    ///
    /// Used by the consistency policy so that new keys need no code changes.
    pub fn field(&self, key: &str) -> Option<MetaValue> {
        let num = |v: u64| MetaValue::Number(v as f64);
        let text = |s: &Option<String>| s.clone().map(MetaValue::Text);
        match key {
            "method" => Some(MetaValue::Text(self.method.to_string())),
            "model_name" => Some(MetaValue::Text(self.model_name.clone())),
            "stan_version_major" => Some(num(self.stan_version.major.into())),
            "stan_version_minor" => Some(num(self.stan_version.minor.into())),
            "stan_version_patch" => Some(num(self.stan_version.patch.into())),
            "algorithm" => text(&self.algorithm),
            "engine" => text(&self.engine),
            "metric" => text(&self.metric),
            "iter_warmup" => self.iter_warmup.map(num),
            "iter_sampling" => self.iter_sampling.map(num),
            "thin" => Some(num(self.thin)),
            "save_warmup" => Some(num(self.save_warmup.into())),
            "adapt_engaged" => self.adapt_engaged.map(|b| num(b.into())),
            "adapt_delta" => self.adapt_delta.map(MetaValue::Number),
            "max_treedepth" => self.max_treedepth.map(num),
            "output_samples" => self.output_samples.map(num),
            "threads_per_chain" => self.threads_per_chain.map(num),
            "threads" => self.threads.map(num),
            "seed" => self.seed.map(num),
            other => self.extra.get(other).cloned(),
        }
    }
}
