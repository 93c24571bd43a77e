//! In-memory draws containers.

use sc_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Draws indexed by iteration × chain × variable.
///
/// Stored row-major: `values[(iteration * n_chains + chain) * n_variables + variable]`.
/// A container with zero variables still records its iteration count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draws {
    variables: Vec<String>,
    n_iterations: usize,
    n_chains: usize,
    values: Vec<f64>,
}

impl Draws {
    /// Build from flat values; `values.len()` must equal the product of the axes.
    pub fn new(
        variables: Vec<String>,
        n_iterations: usize,
        n_chains: usize,
        values: Vec<f64>,
    ) -> Result<Self> {
        let expected = n_iterations * n_chains * variables.len();
        if values.len() != expected {
            return Err(Error::IncompatibleFiles(format!(
                "draws buffer has {} values, expected {n_iterations}x{n_chains}x{}",
                values.len(),
                variables.len()
            )));
        }
        Ok(Self { variables, n_iterations, n_chains, values })
    }

    /// Single-chain container from row-major `n_iterations × variables` values.
    pub fn single_chain(
        variables: Vec<String>,
        n_iterations: usize,
        values: Vec<f64>,
    ) -> Result<Self> {
        Self::new(variables, n_iterations, 1, values)
    }

    /// Empty single-chain container with the given labels.
    pub fn empty(variables: Vec<String>) -> Self {
        Self { variables, n_iterations: 0, n_chains: 1, values: Vec::new() }
    }

    /// Bind containers along the chain axis, preserving input order.
    ///
    /// Every part must share the variable labels and iteration count. A single
    /// part is returned unchanged.
    pub fn bind_chains(parts: Vec<Draws>) -> Result<Self> {
        let mut parts = parts.into_iter();
        let Some(first) = parts.next() else {
            return Err(Error::IncompatibleFiles("no chains to bind".to_string()));
        };
        let rest: Vec<Draws> = parts.collect();
        if rest.is_empty() {
            return Ok(first);
        }

        let n_iter = first.n_iterations;
        let n_var = first.variables.len();
        for (k, p) in rest.iter().enumerate() {
            if p.variables != first.variables {
                return Err(Error::IncompatibleFiles(format!(
                    "chain block {} has different variables",
                    k + 2
                )));
            }
            if p.n_iterations != n_iter {
                return Err(Error::IncompatibleFiles(format!(
                    "chain block {} has {} iterations, expected {n_iter}",
                    k + 2,
                    p.n_iterations
                )));
            }
        }

        let all: Vec<&Draws> = std::iter::once(&first).chain(rest.iter()).collect();
        let n_chains: usize = all.iter().map(|p| p.n_chains).sum();
        let mut values = Vec::with_capacity(n_iter * n_chains * n_var);
        for it in 0..n_iter {
            for p in &all {
                let width = p.n_chains * n_var;
                values.extend_from_slice(&p.values[it * width..(it + 1) * width]);
            }
        }
        Ok(Self { variables: first.variables, n_iterations: n_iter, n_chains, values })
    }

    /// Variable labels.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Number of iterations per chain.
    pub fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    /// Number of chains.
    pub fn n_chains(&self) -> usize {
        self.n_chains
    }

    /// Number of variables.
    pub fn n_variables(&self) -> usize {
        self.variables.len()
    }

    /// True when the container holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Position of a variable label.
    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == name)
    }

    /// Single value.
    pub fn get(&self, iteration: usize, chain: usize, variable: usize) -> Option<f64> {
        if iteration >= self.n_iterations || chain >= self.n_chains {
            return None;
        }
        let n_var = self.variables.len();
        if variable >= n_var {
            return None;
        }
        Some(self.values[(iteration * self.n_chains + chain) * n_var + variable])
    }

    /// All draws of one variable, one `Vec` per chain.
    pub fn variable(&self, name: &str) -> Option<Vec<Vec<f64>>> {
        let v = self.variable_index(name)?;
        let n_var = self.variables.len();
        Some(
            (0..self.n_chains)
                .map(|c| {
                    (0..self.n_iterations)
                        .map(|i| self.values[(i * self.n_chains + c) * n_var + v])
                        .collect()
                })
                .collect(),
        )
    }

    /// Rows (one per iteration) of one chain.
    pub fn chain(&self, chain: usize) -> Vec<&[f64]> {
        let n_var = self.variables.len();
        if chain >= self.n_chains {
            return Vec::new();
        }
        (0..self.n_iterations)
            .map(|i| {
                let start = (i * self.n_chains + chain) * n_var;
                &self.values[start..start + n_var]
            })
            .collect()
    }
}

/// Draws indexed by draw × variable (variational output, point estimates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawMatrix {
    variables: Vec<String>,
    n_draws: usize,
    values: Vec<f64>,
}

impl DrawMatrix {
    /// Build from row-major values.
    pub fn new(variables: Vec<String>, n_draws: usize, values: Vec<f64>) -> Result<Self> {
        if values.len() != n_draws * variables.len() {
            return Err(Error::IncompatibleFiles(format!(
                "draw matrix has {} values, expected {n_draws}x{}",
                values.len(),
                variables.len()
            )));
        }
        Ok(Self { variables, n_draws, values })
    }

    /// Variable labels.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Number of rows.
    pub fn n_draws(&self) -> usize {
        self.n_draws
    }

    /// Raw row-major values.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// One row.
    pub fn row(&self, draw: usize) -> Option<&[f64]> {
        let n_var = self.variables.len();
        (draw < self.n_draws).then(|| &self.values[draw * n_var..(draw + 1) * n_var])
    }

    /// All values of one variable.
    pub fn variable(&self, name: &str) -> Option<Vec<f64>> {
        let v = self.variables.iter().position(|x| x == name)?;
        let n_var = self.variables.len();
        Some((0..self.n_draws).map(|d| self.values[d * n_var + v]).collect())
    }

    /// Value of `name` in the first row; the point estimate of a single-file
    /// optimization.
    pub fn estimate(&self, name: &str) -> Option<f64> {
        self.variable(name)?.first().copied()
    }
}
