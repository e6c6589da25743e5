//! Type definitions for Excel data

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Represents a single cell value in an Excel worksheet
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CellValue {
    /// Empty cell
    #[default]
    Empty,
    /// String value
    String(String),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// Boolean value
    Bool(bool),
    /// DateTime value (Excel serial date number)
    DateTime(f64),
    /// Error value, e.g. `#DIV/0!`
    Error(String),
}

impl CellValue {
    /// Raw text of the cell, the way a user sees it in an unformatted cell.
    ///
    /// Numbers print in their shortest round-trip form, so `42.0` becomes `"42"`.
    pub fn as_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::String(s) => s.clone(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::DateTime(d) => d.to_string(),
            CellValue::Error(e) => e.clone(),
        }
    }

    /// Check if cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Excel serial number carried by the cell, if it is numeric.
    ///
    /// Numeric text counts as well: spreadsheets frequently store dates typed
    /// by hand as plain text.
    pub fn as_serial(&self) -> Option<f64> {
        match self {
            CellValue::DateTime(d) | CellValue::Float(d) => Some(*d),
            CellValue::Int(i) => Some(*i as f64),
            CellValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

/// Excel-style reference for a zero-based coordinate (`(0, 0)` -> `"A1"`).
pub(crate) fn cell_reference(row: u32, col: u32) -> String {
    let mut reference = col_to_letter(col);
    let mut buf = itoa::Buffer::new();
    reference.push_str(buf.format(row + 1));
    reference
}

/// Convert column index to Excel letter (0 -> A, 25 -> Z, 26 -> AA)
pub(crate) fn col_to_letter(col: u32) -> String {
    let mut result = String::new();
    let mut col = col + 1;

    while col > 0 {
        col -= 1;
        result.insert(0, (b'A' + (col % 26) as u8) as char);
        col /= 26;
    }

    result
}

/// Represents a row of cells
#[derive(Debug, Clone)]
pub struct Row {
    /// Row index (0-based)
    pub index: u32,
    /// Cells in this row
    pub cells: Vec<CellValue>,
}

impl Row {
    /// Create a new row
    pub fn new(index: u32, cells: Vec<CellValue>) -> Self {
        Row { index, cells }
    }

    /// Convert row to vector of strings
    pub fn to_strings(&self) -> Vec<String> {
        self.cells.iter().map(|c| c.as_string()).collect()
    }
}

/// List constraint attached to a single cell of a written sheet.
///
/// The engine only describes the constraint; enforcing it is up to the
/// spreadsheet application that opens the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataValidation {
    /// Allowed display values, in order
    pub choices: Vec<String>,
    /// Whether an empty cell passes validation
    pub allow_blank: bool,
    /// Title of the error dialog
    pub error_title: String,
    /// Body of the error dialog
    pub error_message: String,
}

impl DataValidation {
    /// Create a drop-down list constraint with a "stop" error message
    pub fn list<I, S>(choices: I, error_message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DataValidation {
            choices: choices.into_iter().map(Into::into).collect(),
            allow_blank: false,
            error_title: String::new(),
            error_message: error_message.into(),
        }
    }

    /// Allow empty cells
    pub fn allow_blank(mut self, allow: bool) -> Self {
        self.allow_blank = allow;
        self
    }

    /// Formula text of the list, as stored in the sheet (`"a,b,c"`)
    pub fn formula(&self) -> String {
        format!("\"{}\"", self.choices.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_reference() {
        assert_eq!(cell_reference(0, 0), "A1");
        assert_eq!(cell_reference(0, 25), "Z1");
        assert_eq!(cell_reference(9, 26), "AA10");
        assert_eq!(col_to_letter(701), "ZZ");
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(CellValue::Int(42).as_string(), "42");
        assert_eq!(CellValue::Float(42.0).as_string(), "42");
        assert_eq!(CellValue::Bool(true).as_string(), "true");
        assert_eq!(
            Row::new(0, vec![CellValue::from("a"), CellValue::Empty]).to_strings(),
            vec!["a", ""]
        );
    }

    #[test]
    fn test_serial_from_text() {
        assert_eq!(CellValue::String(" 45000.5 ".into()).as_serial(), Some(45000.5));
        assert_eq!(CellValue::String("2024-01-01".into()).as_serial(), None);
        assert_eq!(CellValue::Empty.as_serial(), None);
    }

    #[test]
    fn test_validation_formula() {
        let v = DataValidation::list(["是", "否"], "应该为 是或否").allow_blank(true);
        assert_eq!(v.formula(), "\"是,否\"");
        assert!(v.allow_blank);
    }
}
