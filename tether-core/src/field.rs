//! Wire fields and the typed values they coerce into.
//!
//! A [`FieldItem`] is the untrusted `{name, type, value}` triple a client
//! sends. Its type tag selects a [`FieldKind`]; the binder parses the string
//! into a [`FieldValue`], and the target field's [`FieldType`] impl converts
//! that value into the concrete Rust type, checking width and range.

use crate::error::FieldError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One bound field as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldItem {
    /// Dotted or bracketed path into the target record.
    pub name: String,
    /// Declared type tag.
    #[serde(rename = "type")]
    pub kind: String,
    /// String form of the value.
    pub value: String,
}

impl FieldItem {
    /// Create an item with a known kind.
    pub fn new(name: impl Into<String>, kind: FieldKind, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.tag().to_string(),
            value: value.into(),
        }
    }
}

/// Length class used to pick a value-size ceiling before parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCategory {
    /// Integers and booleans.
    Numeric,
    /// Floating point.
    Decimal,
    /// Strings, timestamps and everything else.
    Text,
}

/// The closed set of wire type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// `int` (64-bit).
    Int,
    /// `int8`.
    Int8,
    /// `int16`.
    Int16,
    /// `int32`.
    Int32,
    /// `int64`.
    Int64,
    /// `uint` (64-bit).
    Uint,
    /// `uint8`.
    Uint8,
    /// `uint16`.
    Uint16,
    /// `uint32`.
    Uint32,
    /// `uint64`.
    Uint64,
    /// `float32`.
    Float32,
    /// `float64`.
    Float64,
    /// `bool`, strictly `true`/`false`.
    Bool,
    /// `string`.
    String,
    /// `time`, see [`parse_time`].
    Time,
    /// `Target`, an opaque element id.
    Target,
    /// `DeletedAt`, a soft-delete timestamp.
    DeletedAt,
}

impl FieldKind {
    /// Every kind.
    pub const ALL: [FieldKind; 17] = [
        FieldKind::Int,
        FieldKind::Int8,
        FieldKind::Int16,
        FieldKind::Int32,
        FieldKind::Int64,
        FieldKind::Uint,
        FieldKind::Uint8,
        FieldKind::Uint16,
        FieldKind::Uint32,
        FieldKind::Uint64,
        FieldKind::Float32,
        FieldKind::Float64,
        FieldKind::Bool,
        FieldKind::String,
        FieldKind::Time,
        FieldKind::Target,
        FieldKind::DeletedAt,
    ];

    /// The wire tag.
    pub const fn tag(self) -> &'static str {
        match self {
            FieldKind::Int => "int",
            FieldKind::Int8 => "int8",
            FieldKind::Int16 => "int16",
            FieldKind::Int32 => "int32",
            FieldKind::Int64 => "int64",
            FieldKind::Uint => "uint",
            FieldKind::Uint8 => "uint8",
            FieldKind::Uint16 => "uint16",
            FieldKind::Uint32 => "uint32",
            FieldKind::Uint64 => "uint64",
            FieldKind::Float32 => "float32",
            FieldKind::Float64 => "float64",
            FieldKind::Bool => "bool",
            FieldKind::String => "string",
            FieldKind::Time => "time",
            FieldKind::Target => "Target",
            FieldKind::DeletedAt => "DeletedAt",
        }
    }

    /// Resolve a wire tag. Tags are case-sensitive.
    pub fn from_tag(tag: &str) -> Option<Self> {
        KINDS_BY_TAG.get(tag).copied()
    }

    /// Size class of values of this kind.
    pub const fn category(self) -> ValueCategory {
        match self {
            FieldKind::Float32 | FieldKind::Float64 => ValueCategory::Decimal,
            FieldKind::String | FieldKind::Time | FieldKind::Target | FieldKind::DeletedAt => {
                ValueCategory::Text
            }
            _ => ValueCategory::Numeric,
        }
    }
}

static KINDS_BY_TAG: phf::Map<&'static str, FieldKind> = phf::phf_map! {
    "int" => FieldKind::Int,
    "int8" => FieldKind::Int8,
    "int16" => FieldKind::Int16,
    "int32" => FieldKind::Int32,
    "int64" => FieldKind::Int64,
    "uint" => FieldKind::Uint,
    "uint8" => FieldKind::Uint8,
    "uint16" => FieldKind::Uint16,
    "uint32" => FieldKind::Uint32,
    "uint64" => FieldKind::Uint64,
    "float32" => FieldKind::Float32,
    "float64" => FieldKind::Float64,
    "bool" => FieldKind::Bool,
    "string" => FieldKind::String,
    "time" => FieldKind::Time,
    "Target" => FieldKind::Target,
    "DeletedAt" => FieldKind::DeletedAt,
};

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A parsed wire value, before it is narrowed to the target field type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Empty input for a non-text kind.
    Null,
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Floating point, already range-checked for its declared width.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Text.
    Text(String),
    /// Timestamp.
    Time(DateTime<Utc>),
    /// Element id.
    Target(Target),
    /// Soft-delete marker.
    DeletedAt(SoftDelete),
}

impl FieldValue {
    /// Short name of the value kind for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Int(_) => "int",
            FieldValue::Uint(_) => "uint",
            FieldValue::Float(_) => "float",
            FieldValue::Bool(_) => "bool",
            FieldValue::Text(_) => "string",
            FieldValue::Time(_) => "time",
            FieldValue::Target(_) => "Target",
            FieldValue::DeletedAt(_) => "DeletedAt",
        }
    }

    fn mismatch(&self, expected: &'static str) -> FieldError {
        FieldError::TypeMismatch {
            expected,
            found: self.kind_name(),
        }
    }
}

/// The canonical layout every timestamp is encoded with.
pub const TIME_LAYOUT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Format a timestamp in [`TIME_LAYOUT`].
pub fn format_time(time: &DateTime<Utc>) -> String {
    time.format(TIME_LAYOUT).to_string()
}

/// Parse a timestamp, trying layouts in a fixed order.
///
/// 1. RFC 3339 (`2024-05-01T10:20:30Z`, offsets and fractions allowed)
/// 2. `2024-05-01 10:20:30`
/// 3. `2024-05-01T10:20:30`
/// 4. `2024-05-01T10:20` (datetime-local inputs)
/// 5. `2024-05-01` (midnight)
/// 6. `10:20` (on 1970-01-01)
///
/// Layouts without an offset are read as UTC.
pub fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for layout in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(raw, layout) {
            return Some(t.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    }
    let clock = NaiveTime::parse_from_str(raw, "%H:%M").ok()?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    Some(epoch.and_time(clock).and_utc())
}

/// An opaque client element id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    /// Wrap an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Target {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A soft-delete timestamp; unset means the record is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SoftDelete(Option<DateTime<Utc>>);

impl SoftDelete {
    /// A live record.
    pub const fn live() -> Self {
        Self(None)
    }

    /// A record deleted at `at`.
    pub const fn deleted(at: DateTime<Utc>) -> Self {
        Self(Some(at))
    }

    /// Whether the record is deleted.
    pub fn is_deleted(&self) -> bool {
        self.0.is_some()
    }

    /// Deletion time, if deleted.
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.0
    }
}

/// A Rust type a wire value can be narrowed into.
///
/// Implemented for the integer family, `f32`/`f64`, `bool`, `String`,
/// chrono timestamps and dates, [`Target`], [`SoftDelete`], and `Option<T>`
/// of any of those.
pub trait FieldType: Sized {
    /// Kind emitted when encoding this type.
    const KIND: FieldKind;

    /// Narrow a parsed value into `Self`.
    fn from_value(value: FieldValue) -> Result<Self, FieldError>;

    /// String form for the wire.
    fn to_wire(&self) -> String;
}

macro_rules! signed_field {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl FieldType for $ty {
            const KIND: FieldKind = FieldKind::$kind;

            fn from_value(value: FieldValue) -> Result<Self, FieldError> {
                match value {
                    FieldValue::Int(v) => <$ty>::try_from(v).map_err(|_| out_of_range(stringify!($ty), v)),
                    FieldValue::Uint(v) => <$ty>::try_from(v).map_err(|_| out_of_range(stringify!($ty), v)),
                    other => Err(other.mismatch(stringify!($ty))),
                }
            }

            fn to_wire(&self) -> String {
                self.to_string()
            }
        }
    )*};
}

macro_rules! unsigned_field {
    ($($ty:ty => $kind:ident),* $(,)?) => {$(
        impl FieldType for $ty {
            const KIND: FieldKind = FieldKind::$kind;

            fn from_value(value: FieldValue) -> Result<Self, FieldError> {
                match value {
                    FieldValue::Uint(v) => <$ty>::try_from(v).map_err(|_| out_of_range(stringify!($ty), v)),
                    FieldValue::Int(v) => <$ty>::try_from(v).map_err(|_| out_of_range(stringify!($ty), v)),
                    other => Err(other.mismatch(stringify!($ty))),
                }
            }

            fn to_wire(&self) -> String {
                self.to_string()
            }
        }
    )*};
}

signed_field!(i8 => Int8, i16 => Int16, i32 => Int32, i64 => Int64, isize => Int);
unsigned_field!(u8 => Uint8, u16 => Uint16, u32 => Uint32, u64 => Uint64, usize => Uint);

fn out_of_range(ty: &'static str, value: impl fmt::Display) -> FieldError {
    FieldError::OutOfRange {
        ty,
        value: value.to_string(),
    }
}

impl FieldType for f64 {
    const KIND: FieldKind = FieldKind::Float64;

    fn from_value(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Float(v) => Ok(v),
            FieldValue::Int(v) => Ok(v as f64),
            FieldValue::Uint(v) => Ok(v as f64),
            other => Err(other.mismatch("f64")),
        }
    }

    fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl FieldType for f32 {
    const KIND: FieldKind = FieldKind::Float32;

    fn from_value(value: FieldValue) -> Result<Self, FieldError> {
        let wide = f64::from_value(value).map_err(|err| match err {
            FieldError::TypeMismatch { found, .. } => FieldError::TypeMismatch {
                expected: "f32",
                found,
            },
            other => other,
        })?;
        if wide.abs() > f32::MAX as f64 {
            return Err(out_of_range("f32", wide));
        }
        Ok(wide as f32)
    }

    fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn from_value(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Bool(v) => Ok(v),
            other => Err(other.mismatch("bool")),
        }
    }

    fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::String;

    fn from_value(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Text(v) => Ok(v),
            FieldValue::Target(t) => Ok(t.0),
            FieldValue::Int(v) => Ok(v.to_string()),
            FieldValue::Uint(v) => Ok(v.to_string()),
            FieldValue::Float(v) => Ok(v.to_string()),
            FieldValue::Bool(v) => Ok(v.to_string()),
            FieldValue::Time(t) => Ok(format_time(&t)),
            other => Err(other.mismatch("String")),
        }
    }

    fn to_wire(&self) -> String {
        self.clone()
    }
}

impl FieldType for Target {
    const KIND: FieldKind = FieldKind::Target;

    fn from_value(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Target(t) => Ok(t),
            FieldValue::Text(v) => Ok(Target(v)),
            other => Err(other.mismatch("Target")),
        }
    }

    fn to_wire(&self) -> String {
        self.0.clone()
    }
}

impl FieldType for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Time;

    fn from_value(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Time(t) => Ok(t),
            other => Err(other.mismatch("DateTime<Utc>")),
        }
    }

    fn to_wire(&self) -> String {
        format_time(self)
    }
}

impl FieldType for NaiveDateTime {
    const KIND: FieldKind = FieldKind::Time;

    fn from_value(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Time(t) => Ok(t.naive_utc()),
            other => Err(other.mismatch("NaiveDateTime")),
        }
    }

    fn to_wire(&self) -> String {
        format_time(&self.and_utc())
    }
}

impl FieldType for NaiveDate {
    const KIND: FieldKind = FieldKind::Time;

    fn from_value(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Time(t) => Ok(t.date_naive()),
            other => Err(other.mismatch("NaiveDate")),
        }
    }

    fn to_wire(&self) -> String {
        self.and_hms_opt(0, 0, 0)
            .map(|t| format_time(&t.and_utc()))
            .unwrap_or_default()
    }
}

impl FieldType for SoftDelete {
    const KIND: FieldKind = FieldKind::DeletedAt;

    fn from_value(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::DeletedAt(d) => Ok(d),
            FieldValue::Time(t) => Ok(SoftDelete(Some(t))),
            FieldValue::Null => Ok(SoftDelete(None)),
            other => Err(other.mismatch("DeletedAt")),
        }
    }

    fn to_wire(&self) -> String {
        self.0.as_ref().map(format_time).unwrap_or_default()
    }
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = T::KIND;

    fn from_value(value: FieldValue) -> Result<Self, FieldError> {
        match value {
            FieldValue::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn to_wire(&self) -> String {
        self.as_ref().map(T::to_wire).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_integer_width_checks() {
        assert_eq!(i8::from_value(FieldValue::Int(-128)), Ok(-128));
        assert!(matches!(
            i8::from_value(FieldValue::Int(200)),
            Err(FieldError::OutOfRange { ty: "i8", .. })
        ));
        assert!(matches!(
            u16::from_value(FieldValue::Int(-1)),
            Err(FieldError::OutOfRange { ty: "u16", .. })
        ));
        assert_eq!(u64::from_value(FieldValue::Uint(u64::MAX)), Ok(u64::MAX));
    }

    #[test]
    fn test_float32_overflow() {
        assert!(f32::from_value(FieldValue::Float(1e39)).is_err());
        assert_eq!(f32::from_value(FieldValue::Float(1.5)), Ok(1.5));
    }

    #[test]
    fn test_mismatch_reports_kinds() {
        assert_eq!(
            bool::from_value(FieldValue::Int(1)),
            Err(FieldError::TypeMismatch {
                expected: "bool",
                found: "int"
            })
        );
    }

    #[test]
    fn test_time_layout_fallbacks() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 30).unwrap();
        assert_eq!(parse_time("2024-05-01T10:20:30Z"), Some(expected));
        assert_eq!(parse_time("2024-05-01T12:20:30+02:00"), Some(expected));
        assert_eq!(parse_time("2024-05-01 10:20:30"), Some(expected));
        assert_eq!(parse_time("2024-05-01T10:20:30"), Some(expected));
        assert_eq!(
            parse_time("2024-05-01T10:20"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 20, 0).unwrap())
        );
        assert_eq!(
            parse_time("2024-05-01"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_time("10:20"),
            Some(Utc.with_ymd_and_hms(1970, 1, 1, 10, 20, 0).unwrap())
        );
        assert_eq!(parse_time("yesterday"), None);
    }

    #[test]
    fn test_option_accepts_null() {
        assert_eq!(Option::<i32>::from_value(FieldValue::Null), Ok(None));
        assert_eq!(Option::<i32>::from_value(FieldValue::Int(3)), Ok(Some(3)));
        assert_eq!(Option::<i32>::None.to_wire(), "");
    }

    #[test]
    fn test_soft_delete_wire() {
        let at = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(SoftDelete::deleted(at).to_wire(), "2023-01-02T03:04:05Z");
        assert_eq!(SoftDelete::live().to_wire(), "");
        assert!(!SoftDelete::from_value(FieldValue::Null).unwrap().is_deleted());
    }

    #[test]
    fn test_tags_round_trip() {
        for kind in FieldKind::ALL {
            assert_eq!(FieldKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(FieldKind::from_tag("complex128"), None);
        assert_eq!(FieldKind::from_tag("target"), None);
    }
}
