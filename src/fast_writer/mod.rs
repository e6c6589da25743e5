//! Low-level xlsx package writer
//!
//! Hand-written SpreadsheetML compressed with s-zip. The public surface is
//! [`ExcelWriter`](crate::writer::ExcelWriter); this module only knows about
//! rows, styles and validations.

mod workbook;

pub(crate) use workbook::XlsxWorkbook;
