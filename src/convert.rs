//! Conversion routines between cells and field values
//!
//! [`unmarshaler_for`] picks the read routine of a field type once, when a
//! column is bound; the decode loop then calls it for every row. Precedence:
//! self-describing types, then dates, then text-convertible types, then the
//! built-in scalars, with `Option<T>` wrapping whatever `T` resolves to.

use std::any::{type_name, Any};
use std::fmt;
use std::num::{IntErrorKind, ParseIntError};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::error::CellError;
use crate::schema::{Kind, OptionalHooks, TypeDescriptor};
use crate::types::CellValue;

/// Largest serial Excel can display (9999-12-31)
pub const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Integers beyond this magnitude are not exact in a numeric cell
const MAX_EXACT_INT: i128 = 1 << 53;

const MS_PER_DAY: f64 = 86_400_000.0;

/// Parameters shared by every read routine of one decode pass
#[derive(Debug, Clone, Default)]
pub struct UnmarshalParams {
    /// Trim whitespace in the built-in string routine
    pub trim_space: bool,
    /// The workbook counts days from 1904-01-01
    pub date1904: bool,
    /// chrono format strings tried on date cells holding text
    pub fallback_date_formats: Vec<String>,
}

/// A type that reads itself from a cell
pub trait ExcelUnmarshal {
    fn unmarshal_excel(&mut self, cell: &CellValue, params: &UnmarshalParams)
        -> Result<(), CellError>;
}

/// A type that writes itself to a cell
pub trait ExcelMarshal {
    fn marshal_excel(&self) -> CellValue;
}

/// Read routine bound to a column
pub type UnmarshalFn =
    Arc<dyn Fn(&mut dyn Any, &CellValue, &UnmarshalParams) -> Result<(), CellError> + Send + Sync>;

/// Write routine of a field type
pub type MarshalFn = Arc<dyn Fn(&dyn Any) -> CellValue + Send + Sync>;

pub(crate) fn slot<T: Any>(dest: &mut dyn Any) -> Result<&mut T, CellError> {
    dest.downcast_mut::<T>().ok_or(CellError::TypeMismatch {
        expected: type_name::<T>(),
    })
}

/// Resolve the read routine of a field type, `None` when nothing applies
pub fn unmarshaler_for(desc: &TypeDescriptor) -> Option<UnmarshalFn> {
    if let Some(custom) = desc.custom {
        return Some(Arc::new(custom.unmarshal));
    }
    match desc.kind() {
        Kind::DateTime => return Some(Arc::new(unmarshal_datetime)),
        Kind::Date => return Some(Arc::new(unmarshal_date)),
        _ => {}
    }
    if let Some(text) = desc.text {
        return Some(Arc::new(text.unmarshal));
    }
    let routine: UnmarshalFn = match desc.kind() {
        Kind::Bool => Arc::new(unmarshal_bool),
        Kind::I8 => Arc::new(unmarshal_int::<i8>),
        Kind::I16 => Arc::new(unmarshal_int::<i16>),
        Kind::I32 => Arc::new(unmarshal_int::<i32>),
        Kind::I64 => Arc::new(unmarshal_int::<i64>),
        Kind::Isize => Arc::new(unmarshal_int::<isize>),
        Kind::U8 => Arc::new(unmarshal_int::<u8>),
        Kind::U16 => Arc::new(unmarshal_int::<u16>),
        Kind::U32 => Arc::new(unmarshal_int::<u32>),
        Kind::U64 => Arc::new(unmarshal_int::<u64>),
        Kind::Usize => Arc::new(unmarshal_int::<usize>),
        Kind::F32 => Arc::new(unmarshal_f32),
        Kind::F64 => Arc::new(unmarshal_f64),
        Kind::String => Arc::new(unmarshal_string),
        Kind::Optional => return desc.optional.as_deref().and_then(optional_unmarshaler),
        Kind::DateTime | Kind::Date | Kind::Opaque => return None,
    };
    Some(routine)
}

fn optional_unmarshaler(hooks: &OptionalHooks) -> Option<UnmarshalFn> {
    // only one level of Option is unwrapped
    if hooks.inner.kind() == Kind::Optional {
        return None;
    }
    let inner = unmarshaler_for(&hooks.inner)?;
    let new_inner = hooks.new_inner;
    let attach = hooks.attach;
    Some(Arc::new(
        move |dest: &mut dyn Any, cell: &CellValue, params: &UnmarshalParams| {
            let mut value = new_inner();
            inner(&mut *value, cell, params)?;
            attach(dest, value)
        },
    ))
}

/// Resolve the write routine of a field type
pub fn marshaler_for(desc: &TypeDescriptor) -> MarshalFn {
    if let Some(custom) = desc.custom {
        let marshal = custom.marshal;
        return Arc::new(move |v: &dyn Any| marshal(v).unwrap_or_default());
    }
    match desc.kind() {
        Kind::DateTime => return Arc::new(marshal_datetime),
        Kind::Date => return Arc::new(marshal_date),
        _ => {}
    }
    if let Some(text) = desc.text {
        let marshal = text.marshal;
        return Arc::new(move |v: &dyn Any| {
            marshal(v).map(CellValue::String).unwrap_or_default()
        });
    }
    match desc.kind() {
        Kind::Bool => Arc::new(|v: &dyn Any| {
            v.downcast_ref::<bool>()
                .map(|b| CellValue::Bool(*b))
                .unwrap_or_default()
        }),
        Kind::I8 => Arc::new(marshal_int::<i8>),
        Kind::I16 => Arc::new(marshal_int::<i16>),
        Kind::I32 => Arc::new(marshal_int::<i32>),
        Kind::I64 => Arc::new(marshal_int::<i64>),
        Kind::Isize => Arc::new(marshal_int::<isize>),
        Kind::U8 => Arc::new(marshal_int::<u8>),
        Kind::U16 => Arc::new(marshal_int::<u16>),
        Kind::U32 => Arc::new(marshal_int::<u32>),
        Kind::U64 => Arc::new(marshal_int::<u64>),
        Kind::Usize => Arc::new(marshal_int::<usize>),
        Kind::F32 => Arc::new(|v: &dyn Any| {
            v.downcast_ref::<f32>()
                .map(|f| float_cell(f.to_string().parse().unwrap_or(f64::from(*f))))
                .unwrap_or_default()
        }),
        Kind::F64 => Arc::new(|v: &dyn Any| {
            v.downcast_ref::<f64>()
                .map(|f| float_cell(*f))
                .unwrap_or_default()
        }),
        Kind::String => Arc::new(|v: &dyn Any| {
            v.downcast_ref::<String>()
                .map(|s| CellValue::String(s.clone()))
                .unwrap_or_default()
        }),
        Kind::Optional => match desc.optional.as_deref() {
            Some(hooks) => {
                let inner = marshaler_for(&hooks.inner);
                let deref = hooks.deref;
                Arc::new(move |v: &dyn Any| {
                    deref(v)
                        .map(|inner_value| inner(inner_value))
                        .unwrap_or_default()
                })
            }
            None => Arc::new(|_: &dyn Any| CellValue::Empty),
        },
        Kind::DateTime | Kind::Date | Kind::Opaque => match desc.debug {
            Some(debug) => Arc::new(move |v: &dyn Any| {
                debug(v).map(CellValue::String).unwrap_or_default()
            }),
            None => Arc::new(|_: &dyn Any| CellValue::Empty),
        },
    }
}

/// Parse a boolean token: `1 t T TRUE true True` or `0 f F FALSE false False`
pub fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

fn unmarshal_bool(
    dest: &mut dyn Any,
    cell: &CellValue,
    _params: &UnmarshalParams,
) -> Result<(), CellError> {
    let text = cell.as_string();
    if text.is_empty() {
        return Ok(());
    }
    *slot::<bool>(dest)? = parse_bool(&text).ok_or(CellError::InvalidBool(text))?;
    Ok(())
}

fn unmarshal_int<T>(
    dest: &mut dyn Any,
    cell: &CellValue,
    _params: &UnmarshalParams,
) -> Result<(), CellError>
where
    T: FromStr<Err = ParseIntError> + Any,
{
    let text = cell.as_string();
    if text.is_empty() {
        return Ok(());
    }
    let value = text.parse::<T>().map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => CellError::OutOfRange {
            value: text.clone(),
            target: type_name::<T>(),
        },
        _ => CellError::InvalidInt(text.clone()),
    })?;
    *slot::<T>(dest)? = value;
    Ok(())
}

fn unmarshal_f64(
    dest: &mut dyn Any,
    cell: &CellValue,
    _params: &UnmarshalParams,
) -> Result<(), CellError> {
    let text = cell.as_string();
    if text.is_empty() {
        return Ok(());
    }
    *slot::<f64>(dest)? = text.parse().map_err(|_| CellError::InvalidFloat(text))?;
    Ok(())
}

fn unmarshal_f32(
    dest: &mut dyn Any,
    cell: &CellValue,
    _params: &UnmarshalParams,
) -> Result<(), CellError> {
    let text = cell.as_string();
    if text.is_empty() {
        return Ok(());
    }
    let wide: f64 = text
        .parse()
        .map_err(|_| CellError::InvalidFloat(text.clone()))?;
    let narrow: f32 = text
        .parse()
        .map_err(|_| CellError::InvalidFloat(text.clone()))?;
    if wide.is_finite() && narrow.is_infinite() {
        return Err(CellError::OutOfRange {
            value: text,
            target: "f32",
        });
    }
    *slot::<f32>(dest)? = narrow;
    Ok(())
}

fn unmarshal_string(
    dest: &mut dyn Any,
    cell: &CellValue,
    params: &UnmarshalParams,
) -> Result<(), CellError> {
    let text = cell.as_string();
    *slot::<String>(dest)? = if params.trim_space {
        text.trim().to_string()
    } else {
        text
    };
    Ok(())
}

fn unmarshal_datetime(
    dest: &mut dyn Any,
    cell: &CellValue,
    params: &UnmarshalParams,
) -> Result<(), CellError> {
    if let Some(value) = parse_datetime(cell, params)? {
        *slot::<NaiveDateTime>(dest)? = value;
    }
    Ok(())
}

fn unmarshal_date(
    dest: &mut dyn Any,
    cell: &CellValue,
    params: &UnmarshalParams,
) -> Result<(), CellError> {
    if let Some(value) = parse_datetime(cell, params)? {
        *slot::<NaiveDate>(dest)? = value.date();
    }
    Ok(())
}

/// Date/time of a cell: the numeric serial first, then each fallback format.
///
/// `Ok(None)` for a blank cell.
pub fn parse_datetime(
    cell: &CellValue,
    params: &UnmarshalParams,
) -> Result<Option<NaiveDateTime>, CellError> {
    let text = cell.as_string();
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    if let Some(serial) = cell.as_serial() {
        return serial_to_datetime(serial, params.date1904)
            .map(Some)
            .ok_or_else(|| CellError::InvalidDate {
                value: text.to_string(),
            });
    }
    for format in &params.fallback_date_formats {
        if let Ok(value) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(Some(value));
        }
        if let Some(value) = NaiveDate::parse_from_str(text, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Ok(Some(value));
        }
    }
    Err(CellError::InvalidDate {
        value: text.to_string(),
    })
}

fn epoch(date1904: bool, before_leap_bug: bool) -> Option<NaiveDateTime> {
    let date = if date1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)
    } else if before_leap_bug {
        // serials below 61 precede the phantom 1900-02-29
        NaiveDate::from_ymd_opt(1899, 12, 31)
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)
    };
    date.and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Convert an Excel serial to a date/time, rounded to the millisecond
pub fn serial_to_datetime(serial: f64, date1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let base = epoch(date1904, serial < 61.0)?;
    let ms = (serial * MS_PER_DAY).round() as i64;
    base.checked_add_signed(Duration::milliseconds(ms))
}

/// Convert a date/time to an Excel serial in the 1900 system.
///
/// `None` for dates Excel cannot represent.
pub fn datetime_to_serial(value: NaiveDateTime) -> Option<f64> {
    let base = epoch(false, false)?;
    let ms = value.signed_duration_since(base).num_milliseconds();
    let mut serial = ms as f64 / MS_PER_DAY;
    if serial < 61.0 {
        serial -= 1.0;
    }
    if (0.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        Some(serial)
    } else {
        None
    }
}

fn datetime_cell(value: NaiveDateTime) -> CellValue {
    match datetime_to_serial(value) {
        Some(serial) => CellValue::DateTime(serial),
        None => CellValue::String(value.format("%Y-%m-%d %H:%M:%S").to_string()),
    }
}

fn marshal_datetime(v: &dyn Any) -> CellValue {
    v.downcast_ref::<NaiveDateTime>()
        .map(|dt| datetime_cell(*dt))
        .unwrap_or_default()
}

fn marshal_date(v: &dyn Any) -> CellValue {
    v.downcast_ref::<NaiveDate>()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(datetime_cell)
        .unwrap_or_default()
}

fn int_cell(value: i128) -> CellValue {
    if value.abs() <= MAX_EXACT_INT {
        CellValue::Int(value as i64)
    } else {
        CellValue::String(value.to_string())
    }
}

fn float_cell(value: f64) -> CellValue {
    if value.is_finite() {
        CellValue::Float(value)
    } else {
        CellValue::String(value.to_string())
    }
}

fn marshal_int<T>(v: &dyn Any) -> CellValue
where
    T: Copy + TryInto<i128> + Any,
{
    v.downcast_ref::<T>()
        .and_then(|i| (*i).try_into().ok())
        .map(int_cell)
        .unwrap_or_default()
}

pub(crate) fn custom_unmarshal<T: ExcelUnmarshal + Any>(
    dest: &mut dyn Any,
    cell: &CellValue,
    params: &UnmarshalParams,
) -> Result<(), CellError> {
    slot::<T>(dest)?.unmarshal_excel(cell, params)
}

pub(crate) fn custom_marshal<T: ExcelMarshal + Any>(v: &dyn Any) -> Option<CellValue> {
    v.downcast_ref::<T>().map(ExcelMarshal::marshal_excel)
}

pub(crate) fn text_unmarshal<T>(
    dest: &mut dyn Any,
    cell: &CellValue,
    _params: &UnmarshalParams,
) -> Result<(), CellError>
where
    T: FromStr + Any,
    T::Err: fmt::Display,
{
    let text = cell.as_string();
    if text.is_empty() {
        return Ok(());
    }
    *slot::<T>(dest)? = text
        .parse()
        .map_err(|e: T::Err| CellError::custom(e.to_string()))?;
    Ok(())
}

pub(crate) fn text_marshal<T: fmt::Display + Any>(v: &dyn Any) -> Option<String> {
    v.downcast_ref::<T>().map(ToString::to_string)
}

pub(crate) fn debug_marshal<T: fmt::Debug + Any>(v: &dyn Any) -> Option<String> {
    v.downcast_ref::<T>().map(|value| format!("{:?}", value))
}

pub(crate) fn new_boxed<T: Default + Any>() -> Box<dyn Any> {
    Box::new(T::default())
}

pub(crate) fn attach_some<T: Any>(dest: &mut dyn Any, value: Box<dyn Any>) -> Result<(), CellError> {
    let value = value.downcast::<T>().map_err(|_| CellError::TypeMismatch {
        expected: type_name::<T>(),
    })?;
    *slot::<Option<T>>(dest)? = Some(*value);
    Ok(())
}

pub(crate) fn deref_option<T: Any>(v: &dyn Any) -> Option<&dyn Any> {
    v.downcast_ref::<Option<T>>()
        .and_then(Option::as_ref)
        .map(|inner| inner as &dyn Any)
}
