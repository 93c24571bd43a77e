//! # sc-core
//!
//! Core types shared by the StanCSV crates.
//!
//! This crate provides:
//! - The error taxonomy surfaced to callers ([`Error`])
//! - Method, version and header-value types ([`Method`], [`StanVersion`], [`MetaValue`])

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types.
pub mod error;
/// Method, version and header-value types.
pub mod types;

pub use error::{Error, Result};
pub use types::{MetaValue, Method, StanVersion};

/// Crate version, shared by every StanCSV crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
