//! In-memory xlsx package built with s-zip
//!
//! Rows are streamed into the current worksheet entry as soon as they are
//! written. Data validations are buffered per sheet and emitted after
//! `</sheetData>`, which is where the schema wants them. Styles are written
//! last, once every date format in use is known.

use std::fmt::Display;
use std::io::Cursor;

use s_zip::StreamingZipWriter;

use crate::error::{ExcelError, Result};
use crate::types::{cell_reference, col_to_letter, CellValue, DataValidation};

/// Style index of the bold header font
const BOLD_STYLE: u32 = 1;
/// First style index used for date formats
const FIRST_DATE_STYLE: u32 = 2;
/// First custom number format id
const FIRST_CUSTOM_NUM_FMT: u32 = 164;

fn zip_error<E: Display>(context: &str, err: E) -> ExcelError {
    ExcelError::WriteError(format!("{}: {}", context, err))
}

/// Workbook writing into an in-memory ZIP
pub(crate) struct XlsxWorkbook {
    zip: Option<StreamingZipWriter<Cursor<Vec<u8>>>>,
    worksheets: Vec<String>,
    in_worksheet: bool,
    current_row: u32,
    validations: Vec<(u32, u32, DataValidation)>,
    date_formats: Vec<String>,
    xml_buffer: Vec<u8>,
}

impl XlsxWorkbook {
    pub(crate) fn new(compression_level: u32) -> Result<Self> {
        let zip = StreamingZipWriter::from_writer_with_compression(
            Cursor::new(Vec::with_capacity(64 * 1024)),
            compression_level.min(9),
        )
        .map_err(|e| zip_error("Failed to create ZIP writer", e))?;

        Ok(XlsxWorkbook {
            zip: Some(zip),
            worksheets: Vec::new(),
            in_worksheet: false,
            current_row: 0,
            validations: Vec::new(),
            date_formats: Vec::new(),
            xml_buffer: Vec::with_capacity(4096),
        })
    }

    fn zip(&mut self) -> Result<&mut StreamingZipWriter<Cursor<Vec<u8>>>> {
        self.zip
            .as_mut()
            .ok_or_else(|| ExcelError::InvalidState("Workbook already finished".to_string()))
    }

    fn start_entry(&mut self, name: &str) -> Result<()> {
        self.zip()?
            .start_entry(name)
            .map_err(|e| zip_error("Failed to start ZIP entry", e))
    }

    fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.zip()?
            .write_data(data)
            .map_err(|e| zip_error("Failed to write to ZIP", e))
    }

    /// Number of worksheets started so far
    pub(crate) fn worksheet_count(&self) -> usize {
        self.worksheets.len()
    }

    /// Rows written to the current worksheet
    pub(crate) fn current_row(&self) -> u32 {
        self.current_row
    }

    pub(crate) fn add_worksheet(&mut self, name: &str) -> Result<()> {
        self.finish_current_worksheet()?;

        self.worksheets.push(name.to_string());
        self.current_row = 0;

        let entry_name = format!("xl/worksheets/sheet{}.xml", self.worksheets.len());
        self.start_entry(&entry_name)?;

        let header = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheetData>"#;
        self.write_data(header.as_bytes())?;
        self.in_worksheet = true;

        Ok(())
    }

    /// Style index for a date number format, registering it on first use
    pub(crate) fn date_style(&mut self, format: &str) -> u32 {
        let index = match self.date_formats.iter().position(|f| f == format) {
            Some(index) => index,
            None => {
                self.date_formats.push(format.to_string());
                self.date_formats.len() - 1
            }
        };
        FIRST_DATE_STYLE + index as u32
    }

    /// Append a row. `bold` styles every cell with the header font; date
    /// cells use `date_style`.
    pub(crate) fn write_row(&mut self, cells: &[CellValue], bold: bool, date_style: u32) -> Result<()> {
        if !self.in_worksheet {
            return Err(ExcelError::InvalidState("No worksheet started".to_string()));
        }

        self.current_row += 1;
        let mut row_num = itoa::Buffer::new();
        let row_num = row_num.format(self.current_row);

        let buf = &mut self.xml_buffer;
        buf.clear();
        buf.extend_from_slice(b"<row r=\"");
        buf.extend_from_slice(row_num.as_bytes());
        buf.extend_from_slice(b"\">");

        for (col_idx, value) in cells.iter().enumerate() {
            buf.extend_from_slice(b"<c r=\"");
            buf.extend_from_slice(col_to_letter(col_idx as u32).as_bytes());
            buf.extend_from_slice(row_num.as_bytes());
            buf.push(b'"');

            let style = match value {
                CellValue::DateTime(_) => Some(date_style),
                _ if bold => Some(BOLD_STYLE),
                _ => None,
            };
            if let Some(style) = style {
                let mut style_num = itoa::Buffer::new();
                buf.extend_from_slice(b" s=\"");
                buf.extend_from_slice(style_num.format(style).as_bytes());
                buf.push(b'"');
            }

            match value {
                CellValue::Empty => {
                    buf.extend_from_slice(b"/>");
                }
                CellValue::Int(i) => {
                    let mut num = itoa::Buffer::new();
                    buf.extend_from_slice(b" t=\"n\"><v>");
                    buf.extend_from_slice(num.format(*i).as_bytes());
                    buf.extend_from_slice(b"</v></c>");
                }
                CellValue::Float(f) | CellValue::DateTime(f) => {
                    buf.extend_from_slice(b" t=\"n\"><v>");
                    buf.extend_from_slice(f.to_string().as_bytes());
                    buf.extend_from_slice(b"</v></c>");
                }
                CellValue::Bool(b) => {
                    buf.extend_from_slice(b" t=\"b\"><v>");
                    buf.extend_from_slice(if *b { b"1" } else { b"0" });
                    buf.extend_from_slice(b"</v></c>");
                }
                CellValue::String(s) => {
                    if s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) {
                        buf.extend_from_slice(b" t=\"inlineStr\"><is><t xml:space=\"preserve\">");
                    } else {
                        buf.extend_from_slice(b" t=\"inlineStr\"><is><t>");
                    }
                    write_escaped(buf, s);
                    buf.extend_from_slice(b"</t></is></c>");
                }
                CellValue::Error(e) => {
                    buf.extend_from_slice(b" t=\"e\"><v>");
                    write_escaped(buf, e);
                    buf.extend_from_slice(b"</v></c>");
                }
            }
        }

        buf.extend_from_slice(b"</row>");

        let zip = self
            .zip
            .as_mut()
            .ok_or_else(|| ExcelError::InvalidState("Workbook already finished".to_string()))?;
        zip.write_data(&self.xml_buffer)
            .map_err(|e| zip_error("Failed to write to ZIP", e))
    }

    /// Attach a list validation to a cell of the current worksheet
    pub(crate) fn add_validation(&mut self, row: u32, col: u32, validation: DataValidation) -> Result<()> {
        if !self.in_worksheet {
            return Err(ExcelError::InvalidState("No worksheet started".to_string()));
        }
        self.validations.push((row, col, validation));
        Ok(())
    }

    fn finish_current_worksheet(&mut self) -> Result<()> {
        if !self.in_worksheet {
            return Ok(());
        }

        let mut xml = String::from("</sheetData>");
        if !self.validations.is_empty() {
            xml.push_str(&format!(
                "<dataValidations count=\"{}\">",
                self.validations.len()
            ));
            for (row, col, validation) in &self.validations {
                xml.push_str(&format!(
                    "<dataValidation type=\"list\" errorStyle=\"stop\" allowBlank=\"{}\" showErrorMessage=\"1\" errorTitle=\"{}\" error=\"{}\" sqref=\"{}\"><formula1>{}</formula1></dataValidation>",
                    u8::from(validation.allow_blank),
                    escape(&validation.error_title),
                    escape(&validation.error_message),
                    cell_reference(*row, *col),
                    escape(&validation.formula()),
                ));
            }
            xml.push_str("</dataValidations>");
        }
        xml.push_str("</worksheet>");

        self.write_data(xml.as_bytes())?;
        self.validations.clear();
        self.in_worksheet = false;
        Ok(())
    }

    /// Write the remaining package parts and return the xlsx bytes
    pub(crate) fn finish(mut self) -> Result<Vec<u8>> {
        self.finish_current_worksheet()?;

        self.write_content_types()?;
        self.write_rels()?;
        self.write_workbook()?;
        self.write_workbook_rels()?;
        self.write_styles()?;
        self.write_shared_strings()?;
        self.write_app_props()?;
        self.write_core_props()?;

        let zip = self
            .zip
            .take()
            .ok_or_else(|| ExcelError::InvalidState("Workbook already finished".to_string()))?;
        let cursor = zip
            .finish()
            .map_err(|e| zip_error("Failed to finish ZIP", e))?;
        Ok(cursor.into_inner())
    }

    fn write_content_types(&mut self) -> Result<()> {
        self.start_entry("[Content_Types].xml")?;
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>"#,
        );

        for i in 1..=self.worksheets.len() {
            xml.push_str(&format!(
                r#"
<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
                i
            ));
        }

        xml.push_str("\n</Types>");
        self.write_data(xml.as_bytes())
    }

    fn write_rels(&mut self) -> Result<()> {
        self.start_entry("_rels/.rels")?;
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;
        self.write_data(xml.as_bytes())
    }

    fn write_workbook(&mut self) -> Result<()> {
        self.start_entry("xl/workbook.xml")?;
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<workbookPr/>
<sheets>"#,
        );

        for (i, name) in self.worksheets.iter().enumerate() {
            xml.push_str(&format!(
                r#"
<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
                escape(name),
                i + 1,
                i + 1
            ));
        }

        xml.push_str("\n</sheets>\n</workbook>");
        self.write_data(xml.as_bytes())
    }

    fn write_workbook_rels(&mut self) -> Result<()> {
        self.start_entry("xl/_rels/workbook.xml.rels")?;
        let count = self.worksheets.len();
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );

        for i in 1..=count {
            xml.push_str(&format!(
                r#"
<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
                i, i
            ));
        }

        xml.push_str(&format!(
            r#"
<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
</Relationships>"#,
            count + 1,
            count + 2
        ));

        self.write_data(xml.as_bytes())
    }

    fn write_styles(&mut self) -> Result<()> {
        self.start_entry("xl/styles.xml")?;
        let xml = styles_xml(&self.date_formats);
        self.write_data(xml.as_bytes())
    }

    fn write_shared_strings(&mut self) -> Result<()> {
        self.start_entry("xl/sharedStrings.xml")?;
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="0" uniqueCount="0"/>
"#;
        self.write_data(xml.as_bytes())
    }

    fn write_app_props(&mut self) -> Result<()> {
        self.start_entry("docProps/app.xml")?;
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>excelbind</Application>
</Properties>"#;
        self.write_data(xml.as_bytes())
    }

    fn write_core_props(&mut self) -> Result<()> {
        self.start_entry("docProps/core.xml")?;
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:creator>excelbind</dc:creator>
</cp:coreProperties>"#;
        self.write_data(xml.as_bytes())
    }
}

/// styles.xml: xf 0 default, xf 1 bold, then one xf per date format
fn styles_xml(date_formats: &[String]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
    );

    xml.push_str(&format!("\n<numFmts count=\"{}\">", date_formats.len()));
    for (i, format) in date_formats.iter().enumerate() {
        xml.push_str(&format!(
            "<numFmt numFmtId=\"{}\" formatCode=\"{}\"/>",
            FIRST_CUSTOM_NUM_FMT + i as u32,
            escape(format)
        ));
    }
    xml.push_str("</numFmts>");

    xml.push_str(
        r#"
<fonts count="2">
<font><sz val="11"/><name val="Calibri"/></font>
<font><b/><sz val="11"/><name val="Calibri"/></font>
</fonts>
<fills count="2">
<fill><patternFill patternType="none"/></fill>
<fill><patternFill patternType="gray125"/></fill>
</fills>
<borders count="1">
<border><left/><right/><top/><bottom/><diagonal/></border>
</borders>"#,
    );

    xml.push_str(&format!(
        "\n<cellXfs count=\"{}\">",
        FIRST_DATE_STYLE as usize + date_formats.len()
    ));
    xml.push_str(r#"<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#);
    xml.push_str(r#"<xf numFmtId="0" fontId="1" fillId="0" borderId="0" xfId="0" applyFont="1"/>"#);
    for i in 0..date_formats.len() {
        xml.push_str(&format!(
            r#"<xf numFmtId="{}" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/>"#,
            FIRST_CUSTOM_NUM_FMT + i as u32
        ));
    }
    xml.push_str("</cellXfs>\n</styleSheet>");
    xml
}

fn write_escaped(buffer: &mut Vec<u8>, s: &str) {
    for c in s.chars() {
        match c {
            '&' => buffer.extend_from_slice(b"&amp;"),
            '<' => buffer.extend_from_slice(b"&lt;"),
            '>' => buffer.extend_from_slice(b"&gt;"),
            '"' => buffer.extend_from_slice(b"&quot;"),
            '\'' => buffer.extend_from_slice(b"&apos;"),
            _ => {
                let mut buf = [0; 4];
                buffer.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

pub(crate) fn escape(s: &str) -> String {
    let mut buffer = Vec::with_capacity(s.len());
    write_escaped(&mut buffer, s);
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
        assert_eq!(escape("是,否"), "是,否");
    }

    #[test]
    fn test_date_styles_are_deduplicated() {
        let mut wb = XlsxWorkbook::new(6).unwrap();
        assert_eq!(wb.date_style("yyyy-mm-dd"), 2);
        assert_eq!(wb.date_style("hh:mm"), 3);
        assert_eq!(wb.date_style("yyyy-mm-dd"), 2);

        let xml = styles_xml(&wb.date_formats);
        assert!(xml.contains("<numFmt numFmtId=\"165\" formatCode=\"hh:mm\"/>"));
        assert!(xml.contains("<cellXfs count=\"4\">"));
    }

    #[test]
    fn test_row_requires_worksheet() {
        let mut wb = XlsxWorkbook::new(6).unwrap();
        assert!(matches!(
            wb.write_row(&[CellValue::Int(1)], false, 2),
            Err(ExcelError::InvalidState(_))
        ));
        wb.add_worksheet("Data").unwrap();
        wb.write_row(&[CellValue::Int(1)], false, 2).unwrap();
        assert_eq!(wb.current_row(), 1);
        assert_eq!(wb.worksheet_count(), 1);

        let bytes = wb.finish().unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_entries_are_deflated() {
        let mut wb = XlsxWorkbook::new(6).unwrap();
        wb.add_worksheet("Data").unwrap();
        wb.write_row(&[CellValue::from("x".repeat(256))], false, 2)
            .unwrap();
        let bytes = wb.finish().unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        for name in ["xl/workbook.xml", "xl/worksheets/sheet1.xml", "xl/styles.xml"] {
            let entry = archive.by_name(name).unwrap();
            assert_eq!(entry.compression(), zip::CompressionMethod::Deflated, "{name}");
        }
    }
}
