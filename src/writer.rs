//! Excel file writing

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::error::{ExcelError, Result};
use crate::fast_writer::XlsxWorkbook;
use crate::types::{CellValue, DataValidation};

const DEFAULT_SHEET_NAME: &str = "Sheet1";
const DEFAULT_DATE_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
const DEFAULT_COMPRESSION: u32 = 6;

/// In-memory xlsx writer
///
/// Rows are appended to the current sheet; the package is produced by
/// [`save`](ExcelWriter::save), [`write_to`](ExcelWriter::write_to) or
/// [`into_bytes`](ExcelWriter::into_bytes). Writing a row before any
/// [`add_sheet`](ExcelWriter::add_sheet) call creates `Sheet1`.
///
/// # Examples
///
/// ```no_run
/// use excelbind::{CellValue, ExcelWriter};
///
/// let mut writer = ExcelWriter::new()?;
/// writer.write_header(["Name", "Age"])?;
/// writer.write_row_typed(&[CellValue::from("Alice"), CellValue::Int(30)])?;
/// writer.save("people.xlsx")?;
/// # Ok::<(), excelbind::ExcelError>(())
/// ```
pub struct ExcelWriter {
    workbook: XlsxWorkbook,
    sheet_names: Vec<String>,
    date_format: String,
    date_style: u32,
}

impl ExcelWriter {
    /// Create a writer with the default compression level
    pub fn new() -> Result<Self> {
        Self::with_compression(DEFAULT_COMPRESSION)
    }

    /// Create a writer with a deflate level between 0 and 9
    pub fn with_compression(level: u32) -> Result<Self> {
        let mut workbook = XlsxWorkbook::new(level)?;
        let date_style = workbook.date_style(DEFAULT_DATE_FORMAT);
        Ok(ExcelWriter {
            workbook,
            sheet_names: Vec::new(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            date_style,
        })
    }

    /// Add a new sheet and switch to it
    pub fn add_sheet(&mut self, name: &str) -> Result<()> {
        validate_sheet_name(name)?;
        if self
            .sheet_names
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(name))
        {
            return Err(ExcelError::InvalidState(format!(
                "Sheet '{}' already exists",
                name
            )));
        }
        self.workbook.add_worksheet(name)?;
        self.sheet_names.push(name.to_string());
        Ok(())
    }

    fn ensure_sheet(&mut self) -> Result<()> {
        if self.sheet_names.is_empty() {
            self.add_sheet(DEFAULT_SHEET_NAME)?;
        }
        Ok(())
    }

    /// Number format used for [`CellValue::DateTime`] cells written from now on
    pub fn set_date_format(&mut self, format: &str) {
        if self.date_format != format {
            self.date_style = self.workbook.date_style(format);
            self.date_format = format.to_string();
        }
    }

    pub fn date_format(&self) -> &str {
        &self.date_format
    }

    /// Write a bold header row
    pub fn write_header<I, S>(&mut self, headers: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ensure_sheet()?;
        let cells: Vec<CellValue> = headers
            .into_iter()
            .map(|h| CellValue::String(h.as_ref().to_string()))
            .collect();
        self.workbook.write_row(&cells, true, self.date_style)
    }

    /// Write a row of text cells
    pub fn write_row<I, S>(&mut self, data: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let cells: Vec<CellValue> = data
            .into_iter()
            .map(|v| CellValue::String(v.as_ref().to_string()))
            .collect();
        self.write_row_typed(&cells)
    }

    /// Write a row of typed cells
    pub fn write_row_typed(&mut self, cells: &[CellValue]) -> Result<()> {
        self.ensure_sheet()?;
        self.workbook.write_row(cells, false, self.date_style)
    }

    /// Attach a list validation to a cell of the current sheet
    /// (zero-based coordinates)
    pub fn add_data_validation(&mut self, row: u32, col: u32, validation: DataValidation) -> Result<()> {
        self.ensure_sheet()?;
        self.workbook.add_validation(row, col, validation)
    }

    /// Rows written to the current sheet
    pub fn current_row(&self) -> u32 {
        self.workbook.current_row()
    }

    /// Names of the sheets added so far
    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    /// Finish the package and return its bytes
    pub fn into_bytes(mut self) -> Result<Vec<u8>> {
        self.ensure_sheet()?;
        let sheets = self.workbook.worksheet_count();
        let bytes = self.workbook.finish()?;
        debug!(sheets, bytes = bytes.len(), "finished workbook");
        Ok(bytes)
    }

    /// Finish the package and write it to `writer`
    pub fn write_to<W: Write>(self, mut writer: W) -> Result<()> {
        let bytes = self.into_bytes()?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    /// Finish the package and save it to `path`
    pub fn save<P: AsRef<Path>>(self, path: P) -> Result<()> {
        let bytes = self.into_bytes()?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

fn validate_sheet_name(name: &str) -> Result<()> {
    if name.is_empty() || name.chars().count() > 31 {
        return Err(ExcelError::InvalidState(format!(
            "Sheet name '{}' must be 1 to 31 characters",
            name
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
    {
        return Err(ExcelError::InvalidState(format!(
            "Sheet name '{}' contains invalid character '{}'",
            name, c
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ExcelReader;
    use tempfile::NamedTempFile;

    #[test]
    fn test_rows_read_back() {
        let mut writer = ExcelWriter::new().unwrap();
        writer.write_header(["Name", "Score"]).unwrap();
        writer
            .write_row_typed(&[CellValue::from("Alice"), CellValue::Float(9.5)])
            .unwrap();
        writer.write_row(["Bob", "7"]).unwrap();
        assert_eq!(writer.current_row(), 3);

        let bytes = writer.into_bytes().unwrap();
        let mut reader = ExcelReader::from_bytes(bytes).unwrap();
        assert_eq!(reader.sheet_names(), ["Sheet1"]);
        let sheet = reader.sheet(0).unwrap();
        assert_eq!(sheet.max_row(), 3);
        assert_eq!(sheet.row_strings(0), vec!["Name", "Score"]);
        assert_eq!(sheet.row_strings(1), vec!["Alice", "9.5"]);
        assert_eq!(sheet.row_strings(2), vec!["Bob", "7"]);
    }

    #[test]
    fn test_multiple_sheets() {
        let mut writer = ExcelWriter::new().unwrap();
        writer.add_sheet("First").unwrap();
        writer.write_row(["a"]).unwrap();
        writer.add_sheet("Second").unwrap();
        writer.write_row(["b"]).unwrap();
        assert!(writer.add_sheet("first").is_err());

        let mut reader = ExcelReader::from_bytes(writer.into_bytes().unwrap()).unwrap();
        assert_eq!(reader.sheet_names(), ["First", "Second"]);
        assert_eq!(reader.sheet(1).unwrap().row_strings(0), vec!["b"]);
        assert!(matches!(
            reader.sheet(2),
            Err(ExcelError::SheetIndexOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_invalid_sheet_names() {
        let mut writer = ExcelWriter::new().unwrap();
        assert!(writer.add_sheet("").is_err());
        assert!(writer.add_sheet("a/b").is_err());
        assert!(writer.add_sheet(&"x".repeat(32)).is_err());
        assert!(writer.add_sheet("报表 2024").is_ok());
    }

    #[test]
    fn test_save_to_file() {
        let temp = NamedTempFile::new().unwrap();
        let mut writer = ExcelWriter::new().unwrap();
        writer.write_row(["saved"]).unwrap();
        writer.save(temp.path()).unwrap();

        let mut reader = ExcelReader::open(temp.path()).unwrap();
        assert_eq!(reader.sheet(0).unwrap().row_strings(0), vec!["saved"]);
    }

    #[test]
    fn test_empty_writer_still_has_a_sheet() {
        let writer = ExcelWriter::new().unwrap();
        let mut reader = ExcelReader::from_bytes(writer.into_bytes().unwrap()).unwrap();
        assert_eq!(reader.sheet_count(), 1);
        assert_eq!(reader.sheet(0).unwrap().max_row(), 0);
    }
}
