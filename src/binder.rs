//! Column binding: header row against a record's tag map

use std::fmt;

use tracing::debug;

use crate::config::ReadConfig;
use crate::convert::{unmarshaler_for, UnmarshalFn};
use crate::error::{ExcelError, Result};
use crate::schema::{Schema, TagMap};

/// What a decode pass does with one column
#[derive(Clone)]
pub enum ColumnBinding {
    /// Nothing is read from this column
    Skip { header: String },
    /// The column feeds `field` through `unmarshal`
    Bound {
        field: usize,
        header: String,
        unmarshal: UnmarshalFn,
    },
}

impl ColumnBinding {
    pub fn header(&self) -> &str {
        match self {
            ColumnBinding::Skip { header } | ColumnBinding::Bound { header, .. } => header,
        }
    }

    /// Index of the destination field, if bound
    pub fn field(&self) -> Option<usize> {
        match self {
            ColumnBinding::Skip { .. } => None,
            ColumnBinding::Bound { field, .. } => Some(*field),
        }
    }
}

impl fmt::Debug for ColumnBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnBinding::Skip { header } => f.debug_struct("Skip").field("header", header).finish(),
            ColumnBinding::Bound { field, header, .. } => f
                .debug_struct("Bound")
                .field("field", field)
                .field("header", header)
                .finish(),
        }
    }
}

/// One binding per sheet column, in column order
#[derive(Debug, Clone, Default)]
pub struct BindingPlan {
    columns: Vec<ColumnBinding>,
}

impl BindingPlan {
    /// Bind every header to a field of `schema`.
    ///
    /// A header missing from `tags` is skipped when `skip_unknown_columns` is
    /// set and is an error otherwise; a bound field whose type has no read
    /// routine is governed by `skip_unknown_types` the same way.
    pub fn bind<R: 'static>(
        headers: &[String],
        tags: &TagMap,
        schema: &Schema<R>,
        config: &ReadConfig,
    ) -> Result<Self> {
        let mut columns = Vec::with_capacity(headers.len());

        for (column, header) in headers.iter().enumerate() {
            let Some(&field) = tags.get(header.as_str()) else {
                if !config.skip_unknown_columns {
                    return Err(ExcelError::NoDestinationField {
                        header: header.clone(),
                        column,
                    });
                }
                debug!(column, header = %header, "no destination field, skipping column");
                columns.push(ColumnBinding::Skip {
                    header: header.clone(),
                });
                continue;
            };

            let unmarshal = schema
                .field(field)
                .and_then(|f| unmarshaler_for(f.descriptor()));
            match unmarshal {
                Some(unmarshal) => columns.push(ColumnBinding::Bound {
                    field,
                    header: header.clone(),
                    unmarshal,
                }),
                None if config.skip_unknown_types => {
                    debug!(column, header = %header, "no unmarshaler, skipping column");
                    columns.push(ColumnBinding::Skip {
                        header: header.clone(),
                    });
                }
                None => {
                    return Err(ExcelError::NoUnmarshaler {
                        header: header.clone(),
                        column,
                    })
                }
            }
        }

        Ok(BindingPlan { columns })
    }

    pub fn columns(&self) -> &[ColumnBinding] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Number of columns feeding a field
    pub fn bound_count(&self) -> usize {
        self.columns
            .iter()
            .filter(|c| matches!(c, ColumnBinding::Bound { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, FieldValue, Record, TypeDescriptor};

    #[derive(Debug, Default)]
    struct Opaque;

    impl FieldValue for Opaque {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::opaque::<Opaque>()
        }
    }

    #[derive(Debug, Default)]
    struct Person {
        name: String,
        age: u32,
        extra: Opaque,
    }

    impl Record for Person {
        fn fields() -> Vec<Field<Self>> {
            vec![
                Field::new("name", |r: &Self| &r.name, |r: &mut Self| &mut r.name)
                    .tag("excel", "name"),
                Field::new("age", |r: &Self| &r.age, |r: &mut Self| &mut r.age).tag("excel", "age"),
                Field::new("extra", |r: &Self| &r.extra, |r: &mut Self| &mut r.extra)
                    .tag("excel", "extra"),
            ]
        }
    }

    fn headers(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn bind(items: &[&str], config: &ReadConfig) -> Result<BindingPlan> {
        let schema = Schema::<Person>::of();
        let tags = schema.tag_map(&config.tag_name);
        BindingPlan::bind(&headers(items), &tags, &schema, config)
    }

    #[test]
    fn test_bound_count_is_intersection() {
        let plan = bind(&["age", "unknown", "name", ""], &ReadConfig::default()).unwrap();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.bound_count(), 2);
        assert_eq!(plan.columns()[0].field(), Some(1));
        assert_eq!(plan.columns()[1].field(), None);
        assert_eq!(plan.columns()[2].header(), "name");
    }

    #[test]
    fn test_unknown_column_is_structural_when_not_skipped() {
        let config = ReadConfig::default().with_skip_unknown_columns(false);
        let err = bind(&["name", "nickname"], &config).unwrap_err();
        match err {
            ExcelError::NoDestinationField { header, column } => {
                assert_eq!(header, "nickname");
                assert_eq!(column, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_type_policy() {
        let err = bind(&["extra"], &ReadConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ExcelError::NoUnmarshaler { column: 0, .. }
        ));

        let config = ReadConfig::default().with_skip_unknown_types(true);
        let plan = bind(&["extra", "age"], &config).unwrap();
        assert_eq!(plan.bound_count(), 1);
    }

    #[test]
    fn test_empty_header_row() {
        let plan = bind(&[], &ReadConfig::default()).unwrap();
        assert!(plan.is_empty());
    }
}
