//! Workbook reading
//!
//! [`ExcelReader`] loads a whole xlsx package into memory and hands out
//! [`Sheet`] grids addressed by absolute, zero-based row and column indexes.
//! Cell decoding is done by `calamine`; the workbook's date system flag is
//! read straight from `xl/workbook.xml`.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xlsx};
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use tracing::debug;

use crate::error::{ExcelError, Result};
use crate::types::{CellValue, Row};

static EMPTY_CELL: CellValue = CellValue::Empty;

/// In-memory xlsx workbook
pub struct ExcelReader {
    workbook: Xlsx<Cursor<Vec<u8>>>,
    sheet_names: Vec<String>,
    date1904: bool,
}

impl ExcelReader {
    /// Open a workbook from its bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let date1904 = scan_date1904(&bytes)?;
        let workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
            .map_err(|e| ExcelError::ReadError(format!("Failed to open workbook: {}", e)))?;
        let sheet_names: Vec<String> = workbook
            .sheet_names()
            .iter()
            .map(|name| name.to_string())
            .collect();

        debug!(sheets = sheet_names.len(), date1904, "opened workbook");

        Ok(ExcelReader {
            workbook,
            sheet_names,
            date1904,
        })
    }

    /// Open a workbook file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_bytes(fs::read(path)?)
    }

    /// Open a workbook from any reader, consuming it to the end
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(bytes)
    }

    /// Sheet names in workbook order
    pub fn sheet_names(&self) -> &[String] {
        &self.sheet_names
    }

    pub fn sheet_count(&self) -> usize {
        self.sheet_names.len()
    }

    /// Whether serials count from 1904-01-01 instead of 1899-12-30
    pub fn is_date1904(&self) -> bool {
        self.date1904
    }

    /// Load the sheet at `index`
    pub fn sheet(&mut self, index: usize) -> Result<Sheet> {
        let name = self
            .sheet_names
            .get(index)
            .cloned()
            .ok_or(ExcelError::SheetIndexOutOfRange {
                index,
                count: self.sheet_names.len(),
            })?;
        let range = self
            .workbook
            .worksheet_range(&name)
            .map_err(|e| ExcelError::ReadError(format!("Failed to read sheet '{}': {}", name, e)))?;
        Ok(Sheet::from_range(name, &range))
    }
}

/// Read `date1904` off `workbookPr` in `xl/workbook.xml`
fn scan_date1904(bytes: &[u8]) -> Result<bool> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ExcelError::ReadError(format!("Failed to open ZIP: {}", e)))?;

    let mut xml = String::new();
    match archive.by_name("xl/workbook.xml") {
        Ok(mut entry) => {
            entry
                .read_to_string(&mut xml)
                .map_err(|e| ExcelError::ReadError(format!("Failed to read workbook.xml: {}", e)))?;
        }
        Err(_) => return Ok(false),
    }
    date1904_flag(&xml)
}

fn date1904_flag(xml: &str) -> Result<bool> {
    let mut reader = XmlReader::from_str(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf).map_err(xml_error)? {
            Event::Eof => return Ok(false),
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"workbookPr" => {
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| xml_error(e.into()))?;
                    if attr.key.local_name().as_ref() == b"date1904" {
                        let value = attr.unescape_value().map_err(xml_error)?;
                        return Ok(value == "1" || value.eq_ignore_ascii_case("true"));
                    }
                }
                return Ok(false);
            }
            _ => {}
        }
        buf.clear();
    }
}

fn xml_error(e: quick_xml::Error) -> ExcelError {
    ExcelError::ReadError(format!("Failed to parse workbook.xml: {}", e))
}

#[allow(unreachable_patterns)]
fn cell_value(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::String(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::DateTime(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::String(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
        other => CellValue::String(other.to_string()),
    }
}

/// A loaded worksheet
///
/// Every row holds exactly `max_col` cells; rows and cells the sheet does not
/// define are [`CellValue::Empty`].
#[derive(Debug, Clone)]
pub struct Sheet {
    name: String,
    rows: Vec<Row>,
    max_col: usize,
}

impl Sheet {
    fn from_range(name: String, range: &Range<Data>) -> Self {
        let Some((end_row, end_col)) = range.end() else {
            return Sheet {
                name,
                rows: Vec::new(),
                max_col: 0,
            };
        };
        let (start_row, start_col) = range.start().unwrap_or_default();
        let max_row = end_row as usize + 1;
        let max_col = end_col as usize + 1;

        let mut rows: Vec<Row> = (0..max_row)
            .map(|index| Row::new(index as u32, vec![CellValue::Empty; max_col]))
            .collect();
        for (row, col, data) in range.used_cells() {
            let row = row + start_row as usize;
            let col = col + start_col as usize;
            if let Some(cell) = rows.get_mut(row).and_then(|r| r.cells.get_mut(col)) {
                *cell = cell_value(data);
            }
        }

        Sheet {
            name,
            rows,
            max_col,
        }
    }

    /// Build a sheet from a grid, padding short rows
    pub fn from_rows(name: impl Into<String>, grid: Vec<Vec<CellValue>>) -> Self {
        let max_col = grid.iter().map(Vec::len).max().unwrap_or(0);
        let rows = grid
            .into_iter()
            .enumerate()
            .map(|(index, mut cells)| {
                cells.resize(max_col, CellValue::Empty);
                Row::new(index as u32, cells)
            })
            .collect();
        Sheet {
            name: name.into(),
            rows,
            max_col,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows up to the last defined one
    pub fn max_row(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns up to the last defined one
    pub fn max_col(&self) -> usize {
        self.max_col
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter()
    }

    /// Cell at a coordinate, `Empty` outside the sheet
    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.cells.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Text of the first `max_col` cells of a row
    pub fn row_strings(&self, index: usize) -> Vec<String> {
        (0..self.max_col)
            .map(|col| self.cell(index, col).as_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_pads_to_widest_row() {
        let sheet = Sheet::from_rows(
            "Data",
            vec![
                vec!["a".into(), "b".into(), "c".into()],
                vec![CellValue::Int(1)],
            ],
        );
        assert_eq!(sheet.max_row(), 2);
        assert_eq!(sheet.max_col(), 3);
        assert_eq!(sheet.row_strings(1), vec!["1", "", ""]);
        assert!(sheet.cell(5, 5).is_empty());
        assert_eq!(sheet.row(1).map(|row| row.cells.len()), Some(3));
    }

    #[test]
    fn test_garbage_is_a_read_error() {
        let result = ExcelReader::from_bytes(b"not a zip file".to_vec());
        assert!(matches!(result, Err(ExcelError::ReadError(_))));
    }

    #[test]
    fn test_date1904_flag_forms() {
        let plain = r#"<workbook><workbookPr date1904="1"/></workbook>"#;
        let quoted = "<workbook><workbookPr date1904='true'></workbookPr></workbook>";
        let prefixed = r#"<x:workbook xmlns:x="urn:x"><x:workbookPr x:date1904="1"/></x:workbook>"#;
        assert!(date1904_flag(plain).unwrap());
        assert!(date1904_flag(quoted).unwrap());
        assert!(date1904_flag(prefixed).unwrap());

        assert!(!date1904_flag(r#"<workbook><workbookPr date1904="0"/></workbook>"#).unwrap());
        assert!(!date1904_flag("<workbook><workbookPr/></workbook>").unwrap());
        assert!(!date1904_flag("<workbook><sheets/></workbook>").unwrap());
    }

    #[test]
    fn test_cell_value_mapping() {
        assert_eq!(cell_value(&Data::Int(3)), CellValue::Int(3));
        assert_eq!(
            cell_value(&Data::String("x".into())),
            CellValue::String("x".into())
        );
        assert_eq!(cell_value(&Data::Empty), CellValue::Empty);
    }
}
