//! Error types for StanCSV

use std::path::PathBuf;

use thiserror::Error;

/// StanCSV error type
#[derive(Error, Debug)]
pub enum Error {
    /// A supplied path is missing, unreadable, or not a `.csv` file.
    #[error("cannot access {}: {reason}", .path.display())]
    FileAccess {
        /// Offending path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },

    /// The file has no comment/header lines or a malformed data section.
    #[error("corrupt CSV file {}: {reason}", .path.display())]
    CorruptFile {
        /// Offending path (`<memory>` when parsing a string).
        path: PathBuf,
        /// Description of the defect.
        reason: String,
    },

    /// The header yields neither parameter nor diagnostic columns.
    #[error("no variables found in {}", .0.display())]
    NoVariables(PathBuf),

    /// Requested variables or diagnostics that match no column.
    #[error("{}", selection_message(.variables, .diagnostics))]
    Selection {
        /// Unmatched variable requests.
        variables: Vec<String>,
        /// Unmatched sampler diagnostic requests.
        diagnostics: Vec<String>,
    },

    /// Files supplied for one run cannot be combined.
    #[error("incompatible CSV files: {0}")]
    IncompatibleFiles(String),

    /// A column name does not follow the flattened indexing convention.
    #[error("malformed variable name: {0}")]
    MalformedName(String),

    /// The `method` recorded in the file is not one this crate decodes.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV tokenizer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

fn selection_message(variables: &[String], diagnostics: &[String]) -> String {
    let mut parts = Vec::new();
    if !variables.is_empty() {
        parts.push(format!(
            "Can't find the following variable(s) in the output: {}",
            variables.join(", ")
        ));
    }
    if !diagnostics.is_empty() {
        parts.push(format!(
            "Can't find the following sampler diagnostic(s) in the output: {}",
            diagnostics.join(", ")
        ));
    }
    parts.join("; ")
}

impl Error {
    /// Shorthand for [`Error::CorruptFile`].
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptFile { path: path.into(), reason: reason.into() }
    }

    /// Shorthand for [`Error::FileAccess`].
    pub fn access(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::FileAccess { path: path.into(), reason: reason.into() }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_message_lists_every_name() {
        let err = Error::Selection {
            variables: vec!["gamma".into(), "delta".into()],
            diagnostics: vec!["energy__".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("variable(s) in the output: gamma, delta"), "{msg}");
        assert!(msg.contains("sampler diagnostic(s) in the output: energy__"), "{msg}");
    }

    #[test]
    fn test_selection_message_variables_only() {
        let err = Error::Selection { variables: vec!["gamma".into()], diagnostics: vec![] };
        assert_eq!(err.to_string(), "Can't find the following variable(s) in the output: gamma");
    }

    #[test]
    fn test_corrupt_display() {
        let err = Error::corrupt("a.csv", "no header line");
        assert_eq!(err.to_string(), "corrupt CSV file a.csv: no header line");
    }
}
