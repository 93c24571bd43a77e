//! Flattened column names and variable shapes.
//!
//! CSV headers store every element of a container variable as its own column,
//! with indices appended by `.`: `beta.1.2`. User-facing names use brackets
//! instead (`beta[1,2]`). Scalars carry no index suffix in either form.

use std::collections::{BTreeSet, HashMap};

use sc_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Convert a flattened header name into its bracketed form.
///
/// `beta.1.2` becomes `beta[1,2]`; `alpha` is returned unchanged.
pub fn repair_name(name: &str) -> String {
    match name.split_once('.') {
        Some((base, indices)) => format!("{base}[{}]", indices.replace('.', ",")),
        None => name.to_string(),
    }
}

/// Inverse of [`repair_name`]: `beta[1,2]` becomes `beta.1.2`.
pub fn unrepair_name(name: &str) -> String {
    match name.split_once('[') {
        Some((base, rest)) => {
            let indices = rest.strip_suffix(']').unwrap_or(rest);
            format!("{base}.{}", indices.replace(',', "."))
        }
        None => name.to_string(),
    }
}

/// [`repair_name`] over a slice.
pub fn repair_names(names: &[String]) -> Vec<String> {
    names.iter().map(|n| repair_name(n)).collect()
}

/// [`unrepair_name`] over a slice.
pub fn unrepair_names(names: &[String]) -> Vec<String> {
    names.iter().map(|n| unrepair_name(n)).collect()
}

/// Variable name without any index suffix, for either naming form.
pub fn base_name(name: &str) -> &str {
    name.split(['[', '.']).next().unwrap_or(name)
}

/// Index tuple of a bracketed name; empty for scalars.
///
/// Returns `None` when a suffix is not numeric (`z[real]` for complex
/// values); such names are kept whole as opaque scalars.
fn parse_indices(name: &str) -> Result<Option<Vec<usize>>> {
    let Some((_, rest)) = name.split_once('[') else {
        return Ok(Some(Vec::new()));
    };
    let inner = rest
        .strip_suffix(']')
        .ok_or_else(|| Error::MalformedName(format!("{name}: missing closing bracket")))?;
    let mut indices = Vec::new();
    for s in inner.split(',') {
        let Ok(i) = s.trim().parse::<i64>() else {
            return Ok(None);
        };
        if i < 1 {
            return Err(Error::MalformedName(format!("{name}: index {i} is not positive")));
        }
        indices.push(i as usize);
    }
    Ok(Some(indices))
}

/// Dimensions of one named variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDims {
    /// Base variable name.
    pub name: String,
    /// Size of each dimension; empty for scalars.
    pub dims: Vec<usize>,
}

impl VariableDims {
    /// Number of scalar elements.
    pub fn n_elements(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Base name -> dimension sizes, in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableShape {
    variables: Vec<VariableDims>,
}

impl VariableShape {
    /// Dimensions of `name`, if present.
    pub fn get(&self, name: &str) -> Option<&[usize]> {
        self.variables.iter().find(|v| v.name == name).map(|v| v.dims.as_slice())
    }

    /// Base names in order of first appearance.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.name.as_str())
    }

    /// All entries.
    pub fn iter(&self) -> impl Iterator<Item = &VariableDims> {
        self.variables.iter()
    }

    /// Number of distinct variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// True when no variables are present.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Infer the shape of every variable from its bracketed element names.
///
/// Each dimension's size is the largest index seen at that position. Groups
/// with mixed dimensionality, non-positive indices, or missing elements are
/// rejected with [`Error::MalformedName`]. Names with a non-numeric suffix
/// are listed under their full name with no dimensions.
pub fn variable_shapes(names: &[String]) -> Result<VariableShape> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<Vec<usize>>> = HashMap::new();

    for name in names {
        let (base, indices) = match parse_indices(name)? {
            Some(indices) => (base_name(name), indices),
            None => (name.as_str(), Vec::new()),
        };
        let group = groups.entry(base).or_insert_with(|| {
            order.push(base);
            Vec::new()
        });
        if let Some(first) = group.first()
            && first.len() != indices.len()
        {
            return Err(Error::MalformedName(format!(
                "{name}: expected {} indices for '{base}', found {}",
                first.len(),
                indices.len()
            )));
        }
        group.push(indices);
    }

    let mut variables = Vec::with_capacity(order.len());
    for base in order {
        let members = &groups[base];
        let rank = members[0].len();
        let mut dims = vec![0usize; rank];
        for idx in members {
            for (d, &i) in dims.iter_mut().zip(idx) {
                *d = (*d).max(i);
            }
        }
        let distinct: BTreeSet<&Vec<usize>> = members.iter().collect();
        let expected: usize = dims.iter().product();
        if distinct.len() != members.len() || distinct.len() != expected {
            return Err(Error::MalformedName(format!(
                "'{base}': {} elements do not fill dimensions {dims:?}",
                members.len()
            )));
        }
        variables.push(VariableDims { name: base.to_string(), dims });
    }

    Ok(VariableShape { variables })
}
