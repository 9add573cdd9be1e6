//! Tab-separated posterior trace logs.
//!
//! Text from a `#` to the end of its line is a comment, and lines left blank
//! are ignored. The first remaining line is the header, every following line
//! one sample:
//!
//! ```text
//! # generated by ...
//! Sample	posterior	kappa	shape
//! 0	-1234.5	2.1	0.53
//! 1000	-1230.9	2.3	0.49
//! ```

use thiserror::Error;

/// Errors from parsing a trace log.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TraceLogError {
    /// The log contains no header line.
    #[error("trace log has no header line")]
    Empty,

    /// A data line could not be parsed.
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// A parsed trace log, stored column-wise.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceLog {
    headers: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl TraceLog {
    /// Parse the text of a trace log.
    pub fn parse(text: &str) -> Result<Self, TraceLogError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, strip_comment(line)))
            .filter(|(_, line)| !line.trim().is_empty());

        let (_, header) = lines.next().ok_or(TraceLogError::Empty)?;
        let headers: Vec<String> = header.split('\t').map(|h| h.trim().to_string()).collect();
        let mut columns = vec![Vec::new(); headers.len()];

        for (line_no, line) in lines {
            let cells: Vec<&str> = line.split('\t').collect();
            if cells.len() != headers.len() {
                return Err(TraceLogError::Malformed {
                    line: line_no,
                    reason: format!("expected {} columns, found {}", headers.len(), cells.len()),
                });
            }

            for ((cell, column), name) in cells.iter().zip(columns.iter_mut()).zip(&headers) {
                let value = cell.trim().parse::<f64>().map_err(|e| TraceLogError::Malformed {
                    line: line_no,
                    reason: format!("column '{}': cannot parse '{}': {}", name, cell.trim(), e),
                })?;
                column.push(value);
            }
        }

        Ok(Self { headers, columns })
    }

    /// Column names in file order.
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of sample rows.
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// All values of the named column.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.headers
            .iter()
            .position(|h| h == name)
            .map(|i| self.columns[i].as_slice())
    }

    /// Value of the named column in the first row.
    pub fn first_value(&self, name: &str) -> Option<f64> {
        self.column(name).and_then(|c| c.first().copied())
    }
}

/// Everything from the first `#` to the end of the line is a comment.
///
/// Trailing whitespace goes too, so a row ending in a tab keeps its width.
fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(start) => &line[..start],
        None => line,
    }
    .trim_end()
}
