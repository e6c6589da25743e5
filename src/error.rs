//! Error types for record binding

use thiserror::Error;

/// Result type alias for excelbind operations
pub type Result<T> = std::result::Result<T, ExcelError>;

/// Errors returned by the decode and encode entry points
#[derive(Error, Debug)]
pub enum ExcelError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The workbook could not be opened or parsed
    #[error("Read error: {0}")]
    ReadError(String),

    /// The workbook could not be produced
    #[error("Write error: {0}")]
    WriteError(String),

    /// Writer used in a state that does not allow the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Requested sheet does not exist
    #[error("sheet index {index} out of range, workbook has {count} sheet(s)")]
    SheetIndexOutOfRange { index: usize, count: usize },

    /// Header row lies past the last row of the sheet
    #[error("header row index {index} out of range, sheet has {rows} row(s)")]
    HeaderRowIndexOutOfRange { index: usize, rows: usize },

    /// First data row lies past the last row of the sheet
    #[error("data start row index {index} out of range, sheet has {rows} row(s)")]
    DataStartRowIndexOutOfRange { index: usize, rows: usize },

    /// A header has no field declaring it as tag
    #[error("no destination field for column \"{header}\" (index {column})")]
    NoDestinationField { header: String, column: usize },

    /// The field bound to a header has a type with no read routine
    #[error("no unmarshaler for column \"{header}\" (index {column})")]
    NoUnmarshaler { header: String, column: usize },

    /// First conversion failure under the abort policy
    #[error(transparent)]
    Field(#[from] FieldError),

    /// Conversion failures gathered under the collect policy
    #[error(transparent)]
    Content(#[from] ContentError),
}

impl ExcelError {
    /// Whether the error names a column that could not be reconciled with
    /// the record type, or a sheet/row index outside the document.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ExcelError::SheetIndexOutOfRange { .. }
                | ExcelError::HeaderRowIndexOutOfRange { .. }
                | ExcelError::DataStartRowIndexOutOfRange { .. }
                | ExcelError::NoDestinationField { .. }
                | ExcelError::NoUnmarshaler { .. }
        )
    }
}

/// A single cell that failed to convert into its field
#[derive(Error, Debug)]
#[error("error unmarshalling column \"{column_header}\" in row {}: {source}", .row_index + 1)]
pub struct FieldError {
    /// Zero-based row index in the sheet
    pub row_index: usize,
    /// Zero-based column index in the sheet
    pub column_index: usize,
    /// Header text of the column
    pub column_header: String,
    /// Underlying conversion failure
    pub source: CellError,
}

/// Aggregate outcome of a decode pass that collected its failures
#[derive(Error, Debug, Default)]
#[error("{}", content_summary(.field_errors, *.limit_reached))]
pub struct ContentError {
    /// Failures in row-then-column order
    pub field_errors: Vec<FieldError>,
    /// Set when the pass stopped early at the configured cap
    pub limit_reached: bool,
}

impl ContentError {
    /// Number of collected failures
    pub fn len(&self) -> usize {
        self.field_errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.field_errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.field_errors.iter()
    }
}

fn content_summary(field_errors: &[FieldError], limit_reached: bool) -> String {
    if limit_reached {
        format!("too many ({}) errors reading data from Excel", field_errors.len())
    } else {
        format!("{} errors reading data from Excel", field_errors.len())
    }
}

/// Why one cell could not be converted
#[derive(Error, Debug)]
pub enum CellError {
    #[error("invalid boolean \"{0}\"")]
    InvalidBool(String),

    #[error("invalid integer \"{0}\"")]
    InvalidInt(String),

    #[error("invalid number \"{0}\"")]
    InvalidFloat(String),

    #[error("value \"{value}\" out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("cannot parse \"{value}\" as a date")]
    InvalidDate { value: String },

    #[error("field value is not a {expected}")]
    TypeMismatch { expected: &'static str },

    /// Failure reported by a user-supplied conversion
    #[error(transparent)]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl CellError {
    /// Wrap any error raised by a custom conversion
    pub fn custom<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        CellError::Custom(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_field_error_display_is_one_based() {
        let err = FieldError {
            row_index: 2,
            column_index: 1,
            column_header: "age".to_string(),
            source: CellError::InvalidInt("abc".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "error unmarshalling column \"age\" in row 3: invalid integer \"abc\""
        );
        assert!(err.source().is_some());
    }

    #[test]
    fn test_content_error_display() {
        let mut content = ContentError::default();
        content.field_errors.push(FieldError {
            row_index: 1,
            column_index: 0,
            column_header: "n".into(),
            source: CellError::InvalidFloat("x".into()),
        });
        assert_eq!(content.to_string(), "1 errors reading data from Excel");

        content.limit_reached = true;
        assert_eq!(
            content.to_string(),
            "too many (1) errors reading data from Excel"
        );
    }

    #[test]
    fn test_structural_classification() {
        let err = ExcelError::NoDestinationField {
            header: "x".into(),
            column: 3,
        };
        assert!(err.is_structural());
        assert!(err.to_string().contains("\"x\""));
        assert!(!ExcelError::ReadError("bad zip".into()).is_structural());
    }

    #[test]
    fn test_custom_cell_error() {
        let err = CellError::custom("not a colour");
        assert_eq!(err.to_string(), "not a colour");
    }
}
