//! Record declarations and the per-type field table
//!
//! A record type describes its fields once through [`Record::fields`]. Each
//! [`Field`] couples a field name and its tags with a [`TypeDescriptor`] and a
//! pair of accessors, which is all the decode and encode paths need to read or
//! populate the field without knowing its concrete type.
//!
//! ```
//! use excelbind::{record_fields, Record};
//!
//! #[derive(Debug, Default)]
//! struct User {
//!     name: String,
//!     active: bool,
//!     note: Option<String>,
//! }
//!
//! impl Record for User {
//!     record_fields! {
//!         name { excel = "name" },
//!         active { excel = "active" },
//!         note,
//!     }
//! }
//!
//! let schema = excelbind::Schema::<User>::of();
//! assert_eq!(schema.tag_map("excel").len(), 2);
//! ```

use std::any::{type_name, Any};
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use tracing::warn;

use crate::config::{ReadConfig, WriteConfig};
use crate::convert::{self, ExcelMarshal, ExcelUnmarshal, UnmarshalParams};
use crate::error::CellError;
use crate::types::CellValue;

/// A type whose rows can be bound to spreadsheet rows
pub trait Record: Default + 'static {
    /// Fields in declaration order
    fn fields() -> Vec<Field<Self>>;

    /// Adjust the read configuration. Called once per decode, without an instance.
    fn configure_read(_config: &mut ReadConfig) {}

    /// Adjust the write configuration. Called once per encode, on the first record.
    fn configure_write(&self, _config: &mut WriteConfig) {}
}

/// A value type that can live in a record field
pub trait FieldValue: Any + Default {
    fn descriptor() -> TypeDescriptor;
}

/// Closed set of value shapes the built-in routines understand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    String,
    DateTime,
    Date,
    /// `Option<T>`, the nullable form of another kind
    Optional,
    /// Anything else; only reachable through capability hooks
    Opaque,
}

impl Kind {
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Kind::I8
                | Kind::I16
                | Kind::I32
                | Kind::I64
                | Kind::Isize
                | Kind::U8
                | Kind::U16
                | Kind::U32
                | Kind::U64
                | Kind::Usize
        )
    }

    pub fn is_float(self) -> bool {
        matches!(self, Kind::F32 | Kind::F64)
    }
}

/// Self-describing read/write routines (`ExcelUnmarshal` + `ExcelMarshal`)
#[derive(Clone, Copy)]
pub struct CustomHooks {
    pub(crate) unmarshal: fn(&mut dyn Any, &CellValue, &UnmarshalParams) -> Result<(), CellError>,
    pub(crate) marshal: fn(&dyn Any) -> Option<CellValue>,
}

/// Text routines (`FromStr` + `Display`)
#[derive(Clone, Copy)]
pub struct TextHooks {
    pub(crate) unmarshal: fn(&mut dyn Any, &CellValue, &UnmarshalParams) -> Result<(), CellError>,
    pub(crate) marshal: fn(&dyn Any) -> Option<String>,
}

/// How an `Option<T>` reaches its inner value
#[derive(Clone)]
pub struct OptionalHooks {
    pub(crate) inner: TypeDescriptor,
    pub(crate) new_inner: fn() -> Box<dyn Any>,
    pub(crate) attach: fn(&mut dyn Any, Box<dyn Any>) -> Result<(), CellError>,
    pub(crate) deref: fn(&dyn Any) -> Option<&dyn Any>,
}

/// Static description of a field's value type
#[derive(Clone)]
pub struct TypeDescriptor {
    type_name: &'static str,
    kind: Kind,
    pub(crate) custom: Option<CustomHooks>,
    pub(crate) text: Option<TextHooks>,
    pub(crate) debug: Option<fn(&dyn Any) -> Option<String>>,
    pub(crate) optional: Option<Box<OptionalHooks>>,
}

impl TypeDescriptor {
    fn bare<T: Any>(kind: Kind) -> Self {
        TypeDescriptor {
            type_name: type_name::<T>(),
            kind,
            custom: None,
            text: None,
            debug: None,
            optional: None,
        }
    }

    /// Descriptor of a built-in scalar
    pub fn builtin<T: Any>(kind: Kind) -> Self {
        Self::bare::<T>(kind)
    }

    /// A type converting itself through [`ExcelUnmarshal`] and [`ExcelMarshal`]
    pub fn custom<T>() -> Self
    where
        T: ExcelUnmarshal + ExcelMarshal + Any,
    {
        Self::bare::<T>(Kind::Opaque).with_custom::<T>()
    }

    /// A type converting through `FromStr` and `Display`
    pub fn text<T>() -> Self
    where
        T: FromStr + fmt::Display + Any,
        T::Err: fmt::Display,
    {
        Self::bare::<T>(Kind::Opaque).with_text::<T>()
    }

    /// A type with no read routine; written through its `Debug` output
    pub fn opaque<T: fmt::Debug + Any>() -> Self {
        let mut desc = Self::bare::<T>(Kind::Opaque);
        desc.debug = Some(convert::debug_marshal::<T>);
        desc
    }

    /// Layer the self-describing capability on top of this descriptor
    pub fn with_custom<T>(mut self) -> Self
    where
        T: ExcelUnmarshal + ExcelMarshal + Any,
    {
        self.custom = Some(CustomHooks {
            unmarshal: convert::custom_unmarshal::<T>,
            marshal: convert::custom_marshal::<T>,
        });
        self
    }

    /// Layer the text capability on top of this descriptor
    pub fn with_text<T>(mut self) -> Self
    where
        T: FromStr + fmt::Display + Any,
        T::Err: fmt::Display,
    {
        self.text = Some(TextHooks {
            unmarshal: convert::text_unmarshal::<T>,
            marshal: convert::text_marshal::<T>,
        });
        self
    }

    /// Nullable form of `T`
    pub fn optional<T: FieldValue>() -> Self {
        let mut desc = Self::bare::<Option<T>>(Kind::Optional);
        desc.optional = Some(Box::new(OptionalHooks {
            inner: T::descriptor(),
            new_inner: convert::new_boxed::<T>,
            attach: convert::attach_some::<T>,
            deref: convert::deref_option::<T>,
        }));
        desc
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_optional(&self) -> bool {
        self.optional.is_some()
    }

    /// Descriptor with one level of `Option` removed
    pub fn value_descriptor(&self) -> &TypeDescriptor {
        match &self.optional {
            Some(hooks) => &hooks.inner,
            None => self,
        }
    }

    /// Kind with one level of `Option` removed
    pub fn value_kind(&self) -> Kind {
        self.value_descriptor().kind
    }

    pub fn has_custom(&self) -> bool {
        self.custom.is_some()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("type_name", &self.type_name)
            .field("kind", &self.kind)
            .field("custom", &self.custom.is_some())
            .field("text", &self.text.is_some())
            .field("inner", &self.optional.as_ref().map(|o| &o.inner))
            .finish()
    }
}

macro_rules! builtin_field_value {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn descriptor() -> TypeDescriptor {
                    TypeDescriptor::builtin::<$ty>(Kind::$kind)
                }
            }
        )*
    };
}

builtin_field_value! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    String => String,
    NaiveDateTime => DateTime,
    NaiveDate => Date,
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::optional::<T>()
    }
}

/// Type-erased access to one field of `R`
pub trait Access<R>: Send + Sync {
    fn get<'a>(&self, record: &'a R) -> &'a dyn Any;
    fn get_mut<'a>(&self, record: &'a mut R) -> &'a mut dyn Any;
}

struct Accessor<R, V> {
    get: fn(&R) -> &V,
    get_mut: fn(&mut R) -> &mut V,
}

impl<R: 'static, V: Any> Access<R> for Accessor<R, V> {
    fn get<'a>(&self, record: &'a R) -> &'a dyn Any {
        (self.get)(record)
    }

    fn get_mut<'a>(&self, record: &'a mut R) -> &'a mut dyn Any {
        (self.get_mut)(record)
    }
}

/// One declared field of a record type
pub struct Field<R> {
    name: &'static str,
    tags: Vec<(&'static str, &'static str)>,
    visible: bool,
    descriptor: TypeDescriptor,
    access: Box<dyn Access<R>>,
}

impl<R: 'static> Field<R> {
    /// Declare a field from its accessors
    pub fn new<V: FieldValue>(
        name: &'static str,
        get: fn(&R) -> &V,
        get_mut: fn(&mut R) -> &mut V,
    ) -> Self {
        Field {
            name,
            tags: Vec::new(),
            visible: true,
            descriptor: V::descriptor(),
            access: Box::new(Accessor { get, get_mut }),
        }
    }

    /// Attach a `key = value` tag
    pub fn tag(mut self, key: &'static str, value: &'static str) -> Self {
        self.tags.push((key, value));
        self
    }

    /// Exclude the field from reading and writing
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Value of the tag `key`, if declared
    pub fn tag_value(&self, key: &str) -> Option<&'static str> {
        self.tags.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn get<'a>(&self, record: &'a R) -> &'a dyn Any {
        self.access.get(record)
    }

    pub fn get_mut<'a>(&self, record: &'a mut R) -> &'a mut dyn Any {
        self.access.get_mut(record)
    }
}

impl<R> fmt::Debug for Field<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("visible", &self.visible)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// Tag value to field index
pub type TagMap = IndexMap<String, usize>;

/// A column of the written sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub field_index: usize,
    /// Tag value, or the field name for untagged fields
    pub header: String,
    pub tagged: bool,
}

/// Field table of a record type
pub struct Schema<R> {
    fields: Vec<Field<R>>,
}

impl<R: Record> Schema<R> {
    pub fn of() -> Self {
        Schema {
            fields: R::fields(),
        }
    }
}

impl<R: 'static> Schema<R> {
    pub fn from_fields(fields: Vec<Field<R>>) -> Self {
        Schema { fields }
    }

    pub fn fields(&self) -> &[Field<R>] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field<R>> {
        self.fields.get(index)
    }

    /// Map each declared `tag_name` value to its field.
    ///
    /// Hidden and untagged fields are left out. When a tag value repeats, the
    /// first field in declaration order keeps it.
    pub fn tag_map(&self, tag_name: &str) -> TagMap {
        let mut map = TagMap::new();
        for (index, field) in self.fields.iter().enumerate() {
            if !field.is_visible() {
                continue;
            }
            let Some(tag) = field.tag_value(tag_name) else {
                continue;
            };
            if let Some(first) = map.get(tag) {
                warn!(
                    tag,
                    kept = self.fields[*first].name(),
                    ignored = field.name(),
                    "duplicate tag, keeping the first field"
                );
                continue;
            }
            map.insert(tag.to_string(), index);
        }
        map
    }

    /// Columns written for this type, in declaration order
    pub fn columns(&self, tag_name: &str, skip_no_tag: bool) -> Vec<Column> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, field)| field.is_visible())
            .filter_map(|(index, field)| match field.tag_value(tag_name) {
                Some(tag) => Some(Column {
                    field_index: index,
                    header: tag.to_string(),
                    tagged: true,
                }),
                None if skip_no_tag => None,
                None => Some(Column {
                    field_index: index,
                    header: field.name().to_string(),
                    tagged: false,
                }),
            })
            .collect()
    }
}

/// Generate [`Record::fields`] from a field list.
///
/// Each entry is a field name, optionally followed by `{ key = "value", ... }`
/// tags and then `hidden` to keep the field out of both directions. Every
/// listed field must implement [`FieldValue`].
#[macro_export]
macro_rules! record_fields {
    ($($field:ident $({ $($key:ident = $value:literal),* $(,)? })? $($hidden:ident)?),* $(,)?) => {
        fn fields() -> ::std::vec::Vec<$crate::Field<Self>> {
            ::std::vec![
                $(
                    $crate::Field::<Self>::new(
                        ::std::stringify!($field),
                        |r| &r.$field,
                        |r| &mut r.$field,
                    )
                    $($(.tag(::std::stringify!($key), $value))*)?
                    $(.$hidden())?
                ),*
            ]
        }
    };
}
