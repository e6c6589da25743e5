//! # excelbind
//!
//! Bidirectional mapping between xlsx sheets and typed Rust records.
//!
//! A record type lists its fields once, with `excel = "Header"` tags, and the
//! crate takes care of the rest: header binding, cell conversion, error
//! policy and row filtering on the way in; header rows, typed cells,
//! localized booleans and drop-down validations on the way out.
//!
//! ## Quick start
//!
//! ```no_run
//! use excelbind::{read_file, record_fields, write_file, Record};
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     name: String,
//!     age: u32,
//!     active: bool,
//! }
//!
//! impl Record for User {
//!     record_fields! {
//!         name { excel = "Name" },
//!         age { excel = "Age" },
//!         active { excel = "Active" },
//!     }
//! }
//!
//! let users = vec![User { name: "Alice".into(), age: 30, active: true }];
//! write_file("users.xlsx", &users)?;
//!
//! let adults = read_file::<User, _>("users.xlsx", &[&|u: &User| u.age >= 18])?;
//! assert_eq!(adults.len(), 1);
//! # Ok::<(), excelbind::ExcelError>(())
//! ```
//!
//! ## Field types
//!
//! Booleans, all integer widths, `f32`/`f64`, `String`, `chrono::NaiveDateTime`
//! and `chrono::NaiveDate` work out of the box, as does one level of `Option`
//! around any of them. Other types implement [`FieldValue`] and pick their
//! conversion through a [`TypeDescriptor`]:
//!
//! - [`TypeDescriptor::custom`] for [`ExcelUnmarshal`] + [`ExcelMarshal`]
//! - [`TypeDescriptor::text`] for `FromStr` + `Display`
//! - [`TypeDescriptor::opaque`] for write-only `Debug` output

pub mod binder;
pub mod config;
pub mod convert;
pub mod decode;
pub mod encode;
pub mod error;
pub mod reader;
pub mod schema;
pub mod types;
pub mod writer;

mod fast_writer;

pub use binder::{BindingPlan, ColumnBinding};
pub use config::{
    BoolLabels, DropItem, DropListMap, ReadConfig, UnmarshalErrorHandling, WriteConfig,
};
pub use convert::{ExcelMarshal, ExcelUnmarshal, UnmarshalParams};
pub use decode::{
    decode_sheet, read, read_binary, read_binary_with, read_config_of, read_excel, read_file,
    read_sheet, RowFilter,
};
pub use encode::{
    new_writer_from_slice, new_writer_with, to_bytes, to_bytes_with, write_config_of,
    write_excel, write_excel_to, write_file, write_to, ProjectedRow, RowProjector,
};
pub use error::{CellError, ContentError, ExcelError, FieldError, Result};
pub use reader::{ExcelReader, Sheet};
pub use schema::{Field, FieldValue, Kind, Record, Schema, TypeDescriptor};
pub use types::{CellValue, DataValidation, Row};
pub use writer::ExcelWriter;
