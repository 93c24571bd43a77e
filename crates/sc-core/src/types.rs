//! Common value types for StanCSV

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Inference method that produced a CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// MCMC sampling (NUTS or fixed-parameter).
    Sample,
    /// Penalized maximum likelihood / MAP optimization.
    Optimize,
    /// ADVI variational approximation.
    Variational,
    /// Standalone generated quantities.
    GenerateQuantities,
}

impl Method {
    /// Name as written in the `method = ...` comment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Sample => "sample",
            Method::Optimize => "optimize",
            Method::Variational => "variational",
            Method::GenerateQuantities => "generate_quantities",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sample" => Ok(Method::Sample),
            "optimize" => Ok(Method::Optimize),
            "variational" => Ok(Method::Variational),
            "generate_quantities" => Ok(Method::GenerateQuantities),
            other => Err(Error::UnsupportedMethod(other.to_string())),
        }
    }
}

/// Stan library version recorded in the file header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StanVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Patch version.
    pub patch: u32,
}

impl fmt::Display for StanVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Value of a `key = value` header comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    /// Value that parsed as a number.
    Number(f64),
    /// Any other non-empty value.
    Text(String),
}

impl MetaValue {
    /// Parse a raw value; empty strings yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<f64>() {
            Ok(v) => Some(MetaValue::Number(v)),
            Err(_) => Some(MetaValue::Text(raw.to_string())),
        }
    }

    /// Numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Number(v) => Some(*v),
            MetaValue::Text(_) => None,
        }
    }

    /// Text value, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Number(_) => None,
            MetaValue::Text(s) => Some(s),
        }
    }

    /// Boolean view: `1`/`0` and `true`/`false` are both accepted.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetaValue::Number(v) => Some(*v != 0.0),
            MetaValue::Text(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
        }
    }

    /// Non-negative integer view (counts, iterations, ids).
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            MetaValue::Number(v) if *v >= 0.0 && v.fract() == 0.0 => Some(*v as u64),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Number(v) => write!(f, "{v}"),
            MetaValue::Text(s) => f.write_str(s),
        }
    }
}
