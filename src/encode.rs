//! Records to sheet rows
//!
//! [`RowProjector`] resolves the output columns of a record type once and then
//! turns each record into a row of typed cells, together with the list
//! validations the row's cells should carry.

use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::config::{BoolLabels, DropItem, WriteConfig};
use crate::convert::{marshaler_for, MarshalFn};
use crate::error::Result;
use crate::schema::{Kind, Record, Schema};
use crate::types::{CellValue, DataValidation};
use crate::writer::ExcelWriter;

const CANONICAL_BOOL_CHOICES: [&str; 2] = ["TRUE", "FALSE"];

/// One record as cells, plus `(column, validation)` pairs for its data cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectedRow {
    pub cells: Vec<CellValue>,
    pub validations: Vec<(usize, DataValidation)>,
}

struct OutputColumn {
    field_index: usize,
    header: String,
    kind: Kind,
    optional: bool,
    drop_list: Option<Vec<DropItem>>,
    validation: Option<DataValidation>,
    marshal: MarshalFn,
}

/// Turns records of one type into rows
pub struct RowProjector<R> {
    schema: Schema<R>,
    columns: Vec<OutputColumn>,
    skip_nil_pointer: bool,
    localized_bool: bool,
    bool_labels: BoolLabels,
}

impl<R: Record> RowProjector<R> {
    pub fn new(config: &WriteConfig) -> Self {
        let schema = Schema::<R>::of();
        let columns = schema
            .columns(&config.tag_name, config.skip_no_tag)
            .into_iter()
            .filter_map(|column| {
                let field = schema.field(column.field_index)?;
                let desc = field.descriptor();
                let value_desc = desc.value_descriptor();
                let kind = value_desc.kind();
                let plain = !value_desc.has_custom();
                let optional = desc.is_optional();

                let drop_list = if plain && kind == Kind::String && column.tagged {
                    config.drop_lists.get(&column.header).cloned()
                } else {
                    None
                };
                let validation = if plain && kind == Kind::Bool {
                    Some(bool_validation(config).allow_blank(optional))
                } else {
                    drop_list
                        .as_deref()
                        .map(|items| drop_list_validation(items).allow_blank(optional))
                };

                Some(OutputColumn {
                    field_index: column.field_index,
                    header: column.header,
                    kind: if plain { kind } else { Kind::Opaque },
                    optional,
                    drop_list,
                    validation,
                    marshal: marshaler_for(value_desc),
                })
            })
            .collect();

        RowProjector {
            schema,
            columns,
            skip_nil_pointer: config.skip_nil_pointer,
            localized_bool: config.localized_bool,
            bool_labels: config.bool_labels.clone(),
        }
    }

    /// Header row: the tag value of each output field, or its name
    pub fn header(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn project(&self, record: &R) -> ProjectedRow {
        let mut row = ProjectedRow {
            cells: Vec::with_capacity(self.columns.len()),
            validations: Vec::new(),
        };

        for (column_index, column) in self.columns.iter().enumerate() {
            if let Some(validation) = &column.validation {
                row.validations.push((column_index, validation.clone()));
            }
            row.cells.push(self.cell(record, column));
        }
        row
    }

    fn cell(&self, record: &R, column: &OutputColumn) -> CellValue {
        let Some(field) = self.schema.field(column.field_index) else {
            return CellValue::Empty;
        };
        let mut value = field.get(record);

        if column.optional {
            let deref = field.descriptor().optional.as_ref().map(|hooks| hooks.deref);
            match deref.and_then(|deref| deref(value)) {
                Some(inner) => value = inner,
                None if self.skip_nil_pointer => return CellValue::String(String::new()),
                None => return CellValue::Empty,
            }
        }

        match column.kind {
            Kind::Bool if self.localized_bool => match value.downcast_ref::<bool>() {
                Some(b) => CellValue::String(self.bool_labels.label(*b).to_string()),
                None => (column.marshal)(value),
            },
            Kind::String => {
                let display = column.drop_list.as_deref().and_then(|items| {
                    let key = value.downcast_ref::<String>()?;
                    items.iter().find(|item| &item.key == key)
                });
                match display {
                    Some(item) => CellValue::String(item.value.clone()),
                    None => (column.marshal)(value),
                }
            }
            _ => (column.marshal)(value),
        }
    }
}

fn bool_validation(config: &WriteConfig) -> DataValidation {
    if config.localized_bool {
        let labels = &config.bool_labels;
        DataValidation::list(
            [labels.truthy.clone(), labels.falsy.clone()],
            format!("应该为 {}或{}", labels.truthy, labels.falsy),
        )
    } else {
        DataValidation::list(CANONICAL_BOOL_CHOICES, "should be TRUE or FALSE")
    }
}

fn drop_list_validation(items: &[DropItem]) -> DataValidation {
    let values: Vec<&str> = items.iter().map(|item| item.value.as_str()).collect();
    let message = format!("应该为 {} 中之一", values.join("、"));
    DataValidation::list(values, message)
}

/// Write configuration of a batch: the defaults adjusted by the first
/// record's [`Record::configure_write`]
pub fn write_config_of<R: Record>(records: &[R]) -> WriteConfig {
    let mut config = WriteConfig::default();
    if let Some(first) = records.first() {
        first.configure_write(&mut config);
    }
    config
}

/// Build an unsaved workbook holding `records`
///
/// # Examples
///
/// ```no_run
/// use excelbind::{new_writer_from_slice, record_fields, Record};
///
/// #[derive(Default)]
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
/// let users = vec![User { name: "Alice".into(), active: true }];
/// new_writer_from_slice(&users)?.save("users.xlsx")?;
/// # Ok::<(), excelbind::ExcelError>(())
/// ```
pub fn new_writer_from_slice<R: Record>(records: &[R]) -> Result<ExcelWriter> {
    new_writer_with(records, &write_config_of(records))
}

/// Build an unsaved workbook with an explicit configuration.
///
/// [`Record::configure_write`] is not consulted.
pub fn new_writer_with<R: Record>(records: &[R], config: &WriteConfig) -> Result<ExcelWriter> {
    let projector = RowProjector::<R>::new(config);
    let mut writer = ExcelWriter::new()?;
    writer.add_sheet(&config.sheet_name)?;
    writer.set_date_format(&config.write_time_format);
    writer.write_header(projector.header())?;

    for (index, record) in records.iter().enumerate() {
        let row_index = index as u32 + 1;
        let row = projector.project(record);
        writer.write_row_typed(&row.cells)?;
        for (column_index, validation) in row.validations {
            writer.add_data_validation(row_index, column_index as u32, validation)?;
        }
    }

    debug!(
        sheet = %config.sheet_name,
        rows = records.len(),
        columns = projector.column_count(),
        "encoded records"
    );
    Ok(writer)
}

/// Encode `records` into xlsx bytes
pub fn to_bytes<R: Record>(records: &[R]) -> Result<Vec<u8>> {
    new_writer_from_slice(records)?.into_bytes()
}

/// Encode `records` into xlsx bytes with an explicit configuration
pub fn to_bytes_with<R: Record>(records: &[R], config: &WriteConfig) -> Result<Vec<u8>> {
    new_writer_with(records, config)?.into_bytes()
}

/// Encode `records` and save them to `path`
pub fn write_file<R: Record, P: AsRef<Path>>(path: P, records: &[R]) -> Result<()> {
    new_writer_from_slice(records)?.save(path)
}

/// Encode `records` and stream the package into `writer`
pub fn write_to<R: Record, W: Write>(writer: W, records: &[R]) -> Result<()> {
    new_writer_from_slice(records)?.write_to(writer)
}

/// Save a grid of strings to `path`; the first row is written like any other
pub fn write_excel<P: AsRef<Path>>(path: P, rows: &[Vec<String>]) -> Result<()> {
    grid_writer(rows)?.save(path)
}

/// Write a grid of strings into `writer`
pub fn write_excel_to<W: Write>(writer: W, rows: &[Vec<String>]) -> Result<()> {
    grid_writer(rows)?.write_to(writer)
}

fn grid_writer(rows: &[Vec<String>]) -> Result<ExcelWriter> {
    let mut writer = ExcelWriter::new()?;
    for row in rows {
        writer.write_row(row)?;
    }
    Ok(writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_fields;
    use chrono::NaiveDate;

    #[derive(Debug, Default)]
    struct Task {
        title: String,
        done: bool,
        state: Option<String>,
        due: Option<NaiveDate>,
        internal: u32,
        note: String,
    }

    impl Record for Task {
        record_fields! {
            title { excel = "title" },
            done { excel = "done" },
            state { excel = "state" },
            due { excel = "due" },
            internal { excel = "internal" } hidden,
            note,
        }
    }

    fn sample() -> Task {
        Task {
            title: "Ship".into(),
            done: true,
            state: Some("P".into()),
            due: None,
            internal: 7,
            note: "n".into(),
        }
    }

    fn config() -> WriteConfig {
        WriteConfig::default().with_drop_list(
            "state",
            vec![DropItem::new("P", "Pending"), DropItem::new("D", "Done")],
        )
    }

    #[test]
    fn test_header_uses_tags_and_names() {
        let projector = RowProjector::<Task>::new(&config());
        assert_eq!(projector.header(), vec!["title", "done", "state", "due", "note"]);

        let projector = RowProjector::<Task>::new(&config().with_skip_no_tag(true));
        assert_eq!(projector.header(), vec!["title", "done", "state", "due"]);
    }

    #[test]
    fn test_project_values() {
        let projector = RowProjector::<Task>::new(&config());
        let row = projector.project(&sample());
        assert_eq!(
            row.cells,
            vec![
                CellValue::from("Ship"),
                CellValue::Bool(true),
                CellValue::from("Pending"),
                CellValue::Empty,
                CellValue::from("n"),
            ]
        );

        let projector = RowProjector::<Task>::new(
            &config().with_localized_bool(true).with_skip_nil_pointer(true),
        );
        let row = projector.project(&sample());
        assert_eq!(row.cells[1], CellValue::from("是"));
        assert_eq!(row.cells[3], CellValue::from(""));
    }

    #[test]
    fn test_unknown_drop_key_is_written_raw() {
        let projector = RowProjector::<Task>::new(&config());
        let task = Task {
            state: Some("X".into()),
            ..sample()
        };
        assert_eq!(projector.project(&task).cells[2], CellValue::from("X"));
    }

    #[test]
    fn test_validations() {
        let projector = RowProjector::<Task>::new(&config());
        let row = projector.project(&sample());
        assert_eq!(row.validations.len(), 2);

        let (column, bool_list) = &row.validations[0];
        assert_eq!(*column, 1);
        assert_eq!(bool_list.choices, vec!["TRUE", "FALSE"]);
        assert_eq!(bool_list.error_message, "should be TRUE or FALSE");
        assert!(!bool_list.allow_blank);

        let (column, drop) = &row.validations[1];
        assert_eq!(*column, 2);
        assert_eq!(drop.choices, vec!["Pending", "Done"]);
        assert_eq!(drop.error_message, "应该为 Pending、Done 中之一");
        assert!(drop.allow_blank);

        let projector = RowProjector::<Task>::new(&config().with_localized_bool(true));
        let (_, localized) = &projector.project(&sample()).validations[0];
        assert_eq!(localized.choices, vec!["是", "否"]);
        assert_eq!(localized.error_message, "应该为 是或否");
    }

    #[test]
    fn test_write_config_comes_from_first_record() {
        #[derive(Default)]
        struct Sheeted {
            id: i64,
        }
        impl Record for Sheeted {
            record_fields! {
                id { excel = "id" },
            }
            fn configure_write(&self, config: &mut WriteConfig) {
                config.sheet_name = format!("Batch {}", self.id);
            }
        }

        let config = write_config_of(&[Sheeted { id: 4 }, Sheeted { id: 5 }]);
        assert_eq!(config.sheet_name, "Batch 4");
        assert_eq!(write_config_of::<Sheeted>(&[]).sheet_name, "Sheet1");
    }
}
