//! Sheet rows to records
//!
//! A decode pass binds the header row once ([`BindingPlan`]) and then
//! materializes every data row. Before the bound routine runs, a few field
//! shapes get special treatment:
//!
//! * optional fields stay `None` on empty text when `pointer_can_nil` is set;
//! * boolean fields accept the configured localized labels;
//! * string fields translate drop-down display values back to their keys;
//! * optional dates take a numeric serial as is.
//!
//! Conversion failures are then ignored, abort the pass, or are collected,
//! according to [`UnmarshalErrorHandling`].

use std::any::Any;
use std::fs;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, trace};

use crate::binder::{BindingPlan, ColumnBinding};
use crate::config::{ReadConfig, UnmarshalErrorHandling};
use crate::convert::{serial_to_datetime, slot, UnmarshalFn, UnmarshalParams};
use crate::error::{CellError, ContentError, ExcelError, FieldError, Result};
use crate::reader::{ExcelReader, Sheet};
use crate::schema::{Field, Kind, Record, Schema};
use crate::types::{CellValue, Row};

/// Row predicate; a record is kept only if every filter returns `true`
pub type RowFilter<'a, T> = &'a dyn Fn(&T) -> bool;

/// Read configuration of `T`: the defaults adjusted by [`Record::configure_read`]
pub fn read_config_of<T: Record>() -> ReadConfig {
    let mut config = ReadConfig::default();
    T::configure_read(&mut config);
    config
}

/// Decode records from xlsx bytes
///
/// # Examples
///
/// ```no_run
/// use excelbind::{read_binary, record_fields, Record};
///
/// #[derive(Debug, Default)]
/// struct User {
///     name: String,
///     active: bool,
/// }
///
/// impl Record for User {
///     record_fields! {
///         name { excel = "name" },
///         active { excel = "active" },
///     }
/// }
///
/// let bytes = std::fs::read("users.xlsx")?;
/// let active = read_binary::<User>(&bytes, &[&|u: &User| u.active])?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn read_binary<T: Record>(bytes: &[u8], filters: &[RowFilter<'_, T>]) -> Result<Vec<T>> {
    read_binary_with(bytes, &read_config_of::<T>(), filters)
}

/// Decode records from xlsx bytes with an explicit configuration.
///
/// [`Record::configure_read`] is not consulted.
pub fn read_binary_with<T: Record>(
    bytes: &[u8],
    config: &ReadConfig,
    filters: &[RowFilter<'_, T>],
) -> Result<Vec<T>> {
    let mut reader = ExcelReader::from_bytes(bytes.to_vec())?;
    read_sheet(&mut reader, config, filters)
}

/// Decode records from an xlsx file
pub fn read_file<T: Record, P: AsRef<Path>>(path: P, filters: &[RowFilter<'_, T>]) -> Result<Vec<T>> {
    let bytes = fs::read(path)?;
    read_binary(&bytes, filters)
}

/// Decode records from any reader, consuming it to the end
pub fn read<T: Record, R: Read>(mut reader: R, filters: &[RowFilter<'_, T>]) -> Result<Vec<T>> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    read_binary(&bytes, filters)
}

/// Decode records from the configured sheet of an open workbook
pub fn read_sheet<T: Record>(
    reader: &mut ExcelReader,
    config: &ReadConfig,
    filters: &[RowFilter<'_, T>],
) -> Result<Vec<T>> {
    let sheet = reader.sheet(config.sheet_index)?;
    decode_sheet(&sheet, config, reader.is_date1904(), filters)
}

/// Call `walk` with every row of a sheet, in order
pub fn read_excel<P, F>(path: P, sheet_index: usize, mut walk: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnMut(usize, &Row),
{
    let mut reader = ExcelReader::open(path)?;
    let sheet = reader.sheet(sheet_index)?;
    for (index, row) in sheet.rows().enumerate() {
        walk(index, row);
    }
    Ok(())
}

/// Decode the records of a loaded sheet
pub fn decode_sheet<T: Record>(
    sheet: &Sheet,
    config: &ReadConfig,
    date1904: bool,
    filters: &[RowFilter<'_, T>],
) -> Result<Vec<T>> {
    let max_row = sheet.max_row();
    if config.header_row_index >= max_row {
        return Err(ExcelError::HeaderRowIndexOutOfRange {
            index: config.header_row_index,
            rows: max_row,
        });
    }
    if config.data_start_row_index >= max_row {
        return Err(ExcelError::DataStartRowIndexOutOfRange {
            index: config.data_start_row_index,
            rows: max_row,
        });
    }

    let schema = Schema::<T>::of();
    let tags = schema.tag_map(&config.tag_name);
    let headers = sheet.row_strings(config.header_row_index);
    let plan = BindingPlan::bind(&headers, &tags, &schema, config)?;
    debug!(
        sheet = sheet.name(),
        columns = plan.len(),
        bound = plan.bound_count(),
        "bound header row"
    );

    let params = UnmarshalParams {
        trim_space: config.trim_space,
        date1904,
        fallback_date_formats: config.fallback_date_formats.clone(),
    };

    let mut collected: Vec<FieldError> = Vec::new();
    let mut records = Vec::new();

    for row_index in config.data_start_row_index..max_row {
        let mut record = T::default();

        for (column_index, binding) in plan.columns().iter().enumerate() {
            let ColumnBinding::Bound {
                field,
                header,
                unmarshal,
            } = binding
            else {
                continue;
            };
            let Some(field) = schema.field(*field) else {
                continue;
            };

            let cell = sheet.cell(row_index, column_index);
            let Err(source) = materialize(field, &mut record, header, cell, unmarshal, config, &params)
            else {
                continue;
            };

            let error = FieldError {
                row_index,
                column_index,
                column_header: header.clone(),
                source,
            };
            match config.unmarshal_error_handling {
                UnmarshalErrorHandling::Ignore => {
                    trace!(error = %error, "ignoring unmarshal error");
                }
                UnmarshalErrorHandling::Abort => return Err(error.into()),
                UnmarshalErrorHandling::Collect => {
                    collected.push(error);
                    if config.max_unmarshal_errors > 0
                        && collected.len() >= config.max_unmarshal_errors
                    {
                        return Err(ContentError {
                            field_errors: collected,
                            limit_reached: true,
                        }
                        .into());
                    }
                }
            }
        }

        if filters.iter().all(|keep| keep(&record)) {
            records.push(record);
        }
    }

    if !collected.is_empty() {
        return Err(ContentError {
            field_errors: collected,
            limit_reached: false,
        }
        .into());
    }

    debug!(sheet = sheet.name(), records = records.len(), "decoded sheet");
    Ok(records)
}

/// Populate one field from one cell
fn materialize<R: 'static>(
    field: &Field<R>,
    record: &mut R,
    header: &str,
    cell: &CellValue,
    unmarshal: &UnmarshalFn,
    config: &ReadConfig,
    params: &UnmarshalParams,
) -> std::result::Result<(), CellError> {
    let desc = field.descriptor();
    let text = cell.as_string();

    if config.pointer_can_nil && desc.is_optional() && text.is_empty() {
        return Ok(());
    }

    let dest = field.get_mut(record);
    if !desc.value_descriptor().has_custom() {
        match desc.value_kind() {
            Kind::Bool => {
                if let Some(value) = config.bool_labels.parse(&text) {
                    return assign(dest, value);
                }
            }
            Kind::String => {
                let key = config
                    .drop_lists
                    .get(header)
                    .and_then(|items| items.iter().find(|item| item.value == text));
                if let Some(item) = key {
                    return assign(dest, item.key.clone());
                }
            }
            Kind::DateTime | Kind::Date if desc.is_optional() => {
                if let Some(serial) = cell.as_serial() {
                    let value = serial_to_datetime(serial, params.date1904)
                        .ok_or(CellError::InvalidDate { value: text })?;
                    return if desc.value_kind() == Kind::Date {
                        assign::<NaiveDate>(dest, value.date())
                    } else {
                        assign::<NaiveDateTime>(dest, value)
                    };
                }
            }
            _ => {}
        }
    }

    unmarshal(dest, cell, params)
}

/// Store `value` into a `V` or `Option<V>` field
fn assign<V: Any>(dest: &mut dyn Any, value: V) -> std::result::Result<(), CellError> {
    if dest.is::<Option<V>>() {
        *slot::<Option<V>>(dest)? = Some(value);
    } else {
        *slot::<V>(dest)? = value;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DropItem;
    use crate::record_fields;
    use std::cell::Cell;

    #[derive(Debug, Default, PartialEq)]
    struct User {
        name: String,
        active: bool,
    }

    impl Record for User {
        record_fields! {
            name { excel = "name" },
            active { excel = "active" },
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Item {
        id: u32,
        status: Option<String>,
        flag: Option<bool>,
        due: Option<NaiveDate>,
        price: f64,
    }

    impl Record for Item {
        record_fields! {
            id { excel = "id" },
            status { excel = "status" },
            flag { excel = "flag" },
            due { excel = "due" },
            price { excel = "price" },
        }
    }

    fn text_sheet(rows: &[&[&str]]) -> Sheet {
        Sheet::from_rows(
            "Sheet1",
            rows.iter()
                .map(|row| row.iter().map(|s| CellValue::from(*s)).collect())
                .collect(),
        )
    }

    #[test]
    fn test_localized_booleans() {
        let sheet = text_sheet(&[&["name", "active"], &["Alice", "是"], &["Bob", "否"]]);
        let users: Vec<User> = decode_sheet(&sheet, &ReadConfig::default(), false, &[]).unwrap();
        assert_eq!(
            users,
            vec![
                User {
                    name: "Alice".into(),
                    active: true
                },
                User {
                    name: "Bob".into(),
                    active: false
                },
            ]
        );
    }

    #[test]
    fn test_unrecognized_bool_token_falls_through() {
        let sheet = text_sheet(&[&["name", "active"], &["Carol", "TRUE"], &["Dan", "yes"]]);
        let err = decode_sheet::<User>(&sheet, &ReadConfig::default(), false, &[]).unwrap_err();
        match err {
            ExcelError::Field(field) => {
                assert_eq!(field.row_index, 2);
                assert_eq!(field.column_index, 1);
                assert_eq!(field.column_header, "active");
                assert!(matches!(field.source, CellError::InvalidBool(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_index_checks() {
        let sheet = text_sheet(&[&["name", "active"]]);
        let err = decode_sheet::<User>(&sheet, &ReadConfig::default(), false, &[]).unwrap_err();
        assert!(matches!(
            err,
            ExcelError::DataStartRowIndexOutOfRange { index: 1, rows: 1 }
        ));

        let config = ReadConfig::default().with_header_row(3);
        let err = decode_sheet::<User>(&sheet, &config, false, &[]).unwrap_err();
        assert!(matches!(err, ExcelError::HeaderRowIndexOutOfRange { .. }));
    }

    #[test]
    fn test_header_and_data_offsets() {
        let sheet = text_sheet(&[
            &["User report"],
            &["name", "active"],
            &["skipped", "否"],
            &["Erin", "是"],
        ]);
        let config = ReadConfig::default()
            .with_header_row(1)
            .with_data_start_row(3);
        let users: Vec<User> = decode_sheet(&sheet, &config, false, &[]).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Erin");
    }

    #[test]
    fn test_drop_list_and_nullable_fields() {
        let sheet = text_sheet(&[
            &["id", "status", "flag", "due", "price"],
            &["1", "Open", "是", "45292", "9.5"],
            &["2", "Archived", "", "", "1"],
        ]);
        let config = ReadConfig::default()
            .with_drop_list(
                "status",
                vec![DropItem::new("O", "Open"), DropItem::new("C", "Closed")],
            )
            .with_pointer_can_nil(true);
        let items: Vec<Item> = decode_sheet(&sheet, &config, false, &[]).unwrap();

        assert_eq!(items[0].status.as_deref(), Some("O"));
        assert_eq!(items[0].flag, Some(true));
        assert_eq!(items[0].due, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(items[0].price, 9.5);

        assert_eq!(items[1].status.as_deref(), Some("Archived"));
        assert_eq!(items[1].flag, None);
        assert_eq!(items[1].due, None);
    }

    #[test]
    fn test_empty_optional_without_nil_flag_is_allocated() {
        let sheet = text_sheet(&[&["id", "status"], &["3", ""]]);
        let items: Vec<Item> = decode_sheet(&sheet, &ReadConfig::default(), false, &[]).unwrap();
        assert_eq!(items[0].status.as_deref(), Some(""));
    }

    #[test]
    fn test_collect_cap() {
        let sheet = text_sheet(&[
            &["id", "price"],
            &["x", "y"],
            &["1", "z"],
            &["w", "2"],
        ]);
        let config = ReadConfig::default()
            .with_error_handling(UnmarshalErrorHandling::Collect)
            .with_max_unmarshal_errors(3);
        let err = decode_sheet::<Item>(&sheet, &config, false, &[]).unwrap_err();
        let ExcelError::Content(content) = err else {
            panic!("expected a content error");
        };
        assert!(content.limit_reached);
        assert_eq!(content.len(), 3);
        let positions: Vec<_> = content
            .iter()
            .map(|e| (e.row_index, e.column_index))
            .collect();
        assert_eq!(positions, vec![(1, 0), (1, 1), (2, 1)]);
    }

    #[test]
    fn test_collect_below_cap_returns_no_records() {
        let sheet = text_sheet(&[&["id", "price"], &["x", "1"], &["2", "2"]]);
        let config = ReadConfig::default()
            .with_error_handling(UnmarshalErrorHandling::Collect)
            .with_max_unmarshal_errors(0);
        let err = decode_sheet::<Item>(&sheet, &config, false, &[]).unwrap_err();
        let ExcelError::Content(content) = err else {
            panic!("expected a content error");
        };
        assert!(!content.limit_reached);
        assert_eq!(content.len(), 1);
        assert_eq!(content.to_string(), "1 errors reading data from Excel");
    }

    #[test]
    fn test_ignore_leaves_default() {
        let sheet = text_sheet(&[&["id", "price"], &["x", "2.5"]]);
        let config = ReadConfig::default().with_error_handling(UnmarshalErrorHandling::Ignore);
        let items: Vec<Item> = decode_sheet(&sheet, &config, false, &[]).unwrap();
        assert_eq!(items[0].id, 0);
        assert_eq!(items[0].price, 2.5);
    }

    #[test]
    fn test_filters_short_circuit() {
        let sheet = text_sheet(&[
            &["name", "active"],
            &["Alice", "是"],
            &["Bob", "否"],
            &["Carol", "是"],
        ]);
        let second_calls = Cell::new(0);
        let only_active = |u: &User| u.active;
        let not_carol = |u: &User| {
            second_calls.set(second_calls.get() + 1);
            u.name != "Carol"
        };
        let users =
            decode_sheet::<User>(&sheet, &ReadConfig::default(), false, &[&only_active, &not_carol])
                .unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].name, "Alice");
        assert_eq!(second_calls.get(), 2);
    }

    #[test]
    fn test_trim_space_and_1904_dates() {
        #[derive(Debug, Default)]
        struct Entry {
            label: String,
            day: NaiveDate,
        }
        impl Record for Entry {
            record_fields! {
                label { excel = "label" },
                day { excel = "day" },
            }
        }

        let sheet = Sheet::from_rows(
            "Sheet1",
            vec![
                vec!["label".into(), "day".into()],
                vec!["  padded ".into(), CellValue::DateTime(1.0)],
            ],
        );
        let config = ReadConfig::default().with_trim_space(true);
        let entries: Vec<Entry> = decode_sheet(&sheet, &config, true, &[]).unwrap();
        assert_eq!(entries[0].label, "padded");
        assert_eq!(entries[0].day.to_string(), "1904-01-02");
    }
}
