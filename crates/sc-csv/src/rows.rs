//! Decoding of numeric data rows for a resolved column set.

use sc_core::{Error, Result};

use crate::header::FileHeader;
use crate::selection::ColumnSelection;

/// Rows of one file restricted to the selected columns, in selection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBlock {
    /// Number of selected columns per row.
    pub width: usize,
    /// Number of data rows in the file, whether or not any column was kept.
    pub rows: usize,
    /// Row-major values.
    pub values: Vec<f64>,
}

impl RowBlock {
    /// Number of decoded rows.
    pub fn n_rows(&self) -> usize {
        self.rows
    }

    /// One row.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.width..(i + 1) * self.width]
    }

    /// Rows `range` projected onto `positions`, flattened row-major.
    pub fn project(&self, range: std::ops::Range<usize>, positions: &[usize]) -> Vec<f64> {
        let mut out = Vec::with_capacity(range.len() * positions.len());
        for i in range {
            let row = self.row(i);
            out.extend(positions.iter().map(|&p| row[p]));
        }
        out
    }
}

/// Decode the data rows of `text`, keeping only the selected columns.
///
/// Tokenizing starts after the column header that `header` located, so both
/// agree on which line is the header. Comment and whitespace-only lines are
/// skipped. An empty selection keeps no values but still counts rows.
pub fn decode_rows(
    text: &str,
    header: &FileHeader,
    selection: &ColumnSelection,
) -> Result<RowBlock> {
    let path = header.path.as_path();
    let n_columns = header.columns.len();
    let indices = selection.indices();
    let data = text.get(header.data_offset..).unwrap_or_default();

    let mut reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data.as_bytes());

    let mut values = Vec::new();
    let mut rows = 0usize;
    let mut record = csv::StringRecord::new();
    while reader.read_record(&mut record)? {
        if record.len() == 1 && record[0].is_empty() {
            continue;
        }
        let line = header.header_line + record.position().map_or(0, |p| p.line() as usize);
        if record.len() != n_columns {
            return Err(Error::corrupt(
                path,
                format!("line {line}: expected {n_columns} fields, found {}", record.len()),
            ));
        }
        for &i in &indices {
            let field = &record[i];
            let v = field.parse::<f64>().map_err(|_| {
                Error::corrupt(path, format!("line {line}: '{field}' is not a number"))
            })?;
            values.push(v);
        }
        rows += 1;
    }

    Ok(RowBlock { width: indices.len(), rows, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_header;
    use crate::selection::{Filter, resolve};
    use std::path::Path;

    const TEXT: &str = "\
# method = sample
lp__,accept_stat__,x,y
# Adaptation terminated
-1.5,0.9,1,2
-1.6,0.8,3,inf
-1.7,0.7,5,nan
";

    fn decode(text: &str, vars: Filter, diags: Filter) -> Result<RowBlock> {
        let h = parse_header(text, Path::new("t.csv"), 1)?;
        let sel = resolve(&h.metadata, &h.columns, &vars, &diags)?;
        decode_rows(text, &h, &sel)
    }

    #[test]
    fn test_decode_selected_columns() {
        let block = decode(TEXT, Filter::names(["y"]), Filter::Nothing).unwrap();
        assert_eq!(block.width, 2);
        assert_eq!(block.n_rows(), 3);
        assert_eq!(block.row(0), &[-1.5, 2.0]);
        assert!(block.row(1)[1].is_infinite());
        assert!(block.row(2)[1].is_nan());
        assert_eq!(block.project(0..2, &[0]), vec![-1.5, -1.6]);
    }

    #[test]
    fn test_empty_selection_counts_rows() {
        let block = decode(TEXT, Filter::Nothing, Filter::Nothing).unwrap();
        assert_eq!(block.width, 0);
        assert_eq!(block.n_rows(), 3);
        assert!(block.values.is_empty());
    }

    #[test]
    fn test_whitespace_line_before_header() {
        let text = "# method = optimize\n   \nlp__,x\n-1,2\n";
        let block = decode(text, Filter::All, Filter::All).unwrap();
        assert_eq!(block.n_rows(), 1);
        assert_eq!(block.row(0), &[-1.0, 2.0]);
    }

    #[test]
    fn test_whitespace_line_between_rows() {
        let text = "# method = optimize\nlp__,x\n-1,2\n  \n-3,4\n";
        let block = decode(text, Filter::All, Filter::All).unwrap();
        assert_eq!(block.values, vec![-1.0, 2.0, -3.0, 4.0]);
    }

    #[test]
    fn test_ragged_row_is_corrupt() {
        let text = "# method = sample\nlp__,x\n-1,2\n-1\n";
        let err = decode(text, Filter::All, Filter::All).unwrap_err();
        assert!(err.to_string().contains("expected 2 fields, found 1"), "{err}");
    }

    #[test]
    fn test_non_numeric_is_corrupt() {
        let text = "# method = sample\nlp__,x\n-1,abc\n";
        let err = decode(text, Filter::All, Filter::All).unwrap_err();
        assert!(matches!(err, Error::CorruptFile { .. }));
        assert!(err.to_string().contains("line 3: 'abc'"), "{err}");
    }
}
