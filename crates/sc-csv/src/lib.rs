//! # sc-csv
//!
//! Reader for the CSV files written by CmdStan.
//!
//! A run is one or more files produced by the same model and method (one per
//! chain for sampling). This crate provides:
//! - Header parsing: run configuration, column names, adapted inverse metric,
//!   step size and timing ([`header`])
//! - Name repair between `beta.1.2` and `beta[1,2]` plus shape inference ([`names`])
//! - Cross-file consistency checks driven by a [`MatchPolicy`] table
//! - Column selection by exact or base name ([`selection`])
//! - Draws assembly into [`Draws`] / [`DrawMatrix`] containers ([`read`])
//!
//! ## Example
//!
//! ```no_run
//! use sc_csv::{Filter, ReadOptions, RunResult, read};
//!
//! let opts = ReadOptions::default().with_variables(Filter::names(["theta"]));
//! let run = read(&["chain-1.csv", "chain-2.csv"], &opts)?;
//! if let RunResult::Sample(s) = &run {
//!     println!("{} chains", s.post_warmup_draws.n_chains());
//! }
//! # Ok::<(), sc_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assemble;
pub mod consistency;
pub mod draws;
pub mod header;
pub mod metadata;
pub mod names;
pub mod rows;
pub mod selection;

pub use assemble::{
    GqResult, OptimizeResult, ReadOptions, RunResult, SampleResult, VariationalResult, read,
    read_metadata,
};
pub use consistency::{Consistency, MatchPolicy, check_metadata};
pub use draws::{DrawMatrix, Draws};
pub use header::{FileHeader, InvMetric, Timing, parse_header, read_header};
pub use metadata::RunMetadata;
pub use names::{VariableDims, VariableShape, repair_name, unrepair_name, variable_shapes};
pub use selection::{ColumnKind, ColumnSelection, Filter};
