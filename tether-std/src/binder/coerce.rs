//! Tag-directed parsing of wire strings.
//!
//! One parse function per [`FieldKind`]. The result is still untyped; the
//! target field's `FieldType` impl narrows it further.

use std::num::IntErrorKind;
use tether_core::{FieldError, FieldKind, FieldValue, SoftDelete, Target, parse_time};

/// Parse `raw` as a value of `kind`.
///
/// Empty input is `Null` for every kind except `string` and `Target`, whose
/// empty form is a valid value, and `DeletedAt`, where it means "live".
pub fn coerce(kind: FieldKind, raw: &str) -> Result<FieldValue, FieldError> {
    match kind {
        FieldKind::Int
        | FieldKind::Int8
        | FieldKind::Int16
        | FieldKind::Int32
        | FieldKind::Int64 => signed(kind, raw),
        FieldKind::Uint
        | FieldKind::Uint8
        | FieldKind::Uint16
        | FieldKind::Uint32
        | FieldKind::Uint64 => unsigned(kind, raw),
        FieldKind::Float32 | FieldKind::Float64 => float(kind, raw),
        FieldKind::Bool => match raw {
            "" => Ok(FieldValue::Null),
            "true" => Ok(FieldValue::Bool(true)),
            "false" => Ok(FieldValue::Bool(false)),
            _ => Err(parse_error(kind, raw)),
        },
        FieldKind::String => Ok(FieldValue::Text(raw.to_string())),
        FieldKind::Time => {
            if raw.is_empty() {
                return Ok(FieldValue::Null);
            }
            parse_time(raw)
                .map(FieldValue::Time)
                .ok_or_else(|| parse_error(kind, raw))
        }
        FieldKind::Target => Ok(FieldValue::Target(Target::new(raw))),
        FieldKind::DeletedAt => {
            if raw.is_empty() {
                return Ok(FieldValue::DeletedAt(SoftDelete::live()));
            }
            parse_time(raw)
                .map(|at| FieldValue::DeletedAt(SoftDelete::deleted(at)))
                .ok_or_else(|| parse_error(kind, raw))
        }
    }
}

/// Strip grouping underscores from a numeric literal. Whitespace is kept so
/// that it fails to parse.
fn numeric_literal(raw: &str) -> String {
    raw.chars().filter(|c| *c != '_').collect()
}

fn parse_error(kind: FieldKind, raw: &str) -> FieldError {
    FieldError::Parse {
        tag: kind.tag(),
        value: raw.to_string(),
    }
}

fn out_of_range(kind: FieldKind, raw: &str) -> FieldError {
    FieldError::OutOfRange {
        ty: kind.tag(),
        value: raw.to_string(),
    }
}

fn signed(kind: FieldKind, raw: &str) -> Result<FieldValue, FieldError> {
    let literal = numeric_literal(raw);
    if literal.is_empty() {
        return Ok(FieldValue::Null);
    }
    let value: i64 = literal.parse().map_err(|err: std::num::ParseIntError| {
        match err.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => out_of_range(kind, raw),
            _ => parse_error(kind, raw),
        }
    })?;
    let fits = match kind {
        FieldKind::Int8 => i8::try_from(value).is_ok(),
        FieldKind::Int16 => i16::try_from(value).is_ok(),
        FieldKind::Int32 => i32::try_from(value).is_ok(),
        _ => true,
    };
    if !fits {
        return Err(out_of_range(kind, raw));
    }
    Ok(FieldValue::Int(value))
}

fn unsigned(kind: FieldKind, raw: &str) -> Result<FieldValue, FieldError> {
    let literal = numeric_literal(raw);
    if literal.is_empty() {
        return Ok(FieldValue::Null);
    }
    if literal.starts_with('-') {
        return Err(out_of_range(kind, raw));
    }
    let value: u64 = literal.parse().map_err(|err: std::num::ParseIntError| {
        match err.kind() {
            IntErrorKind::PosOverflow => out_of_range(kind, raw),
            _ => parse_error(kind, raw),
        }
    })?;
    let fits = match kind {
        FieldKind::Uint8 => u8::try_from(value).is_ok(),
        FieldKind::Uint16 => u16::try_from(value).is_ok(),
        FieldKind::Uint32 => u32::try_from(value).is_ok(),
        _ => true,
    };
    if !fits {
        return Err(out_of_range(kind, raw));
    }
    Ok(FieldValue::Uint(value))
}

fn float(kind: FieldKind, raw: &str) -> Result<FieldValue, FieldError> {
    let literal = numeric_literal(raw);
    if literal.is_empty() {
        return Ok(FieldValue::Null);
    }
    let value: f64 = literal.parse().map_err(|_| parse_error(kind, raw))?;
    if !value.is_finite() {
        return Err(parse_error(kind, raw));
    }
    if kind == FieldKind::Float32 {
        let narrow: f32 = literal.parse().map_err(|_| parse_error(kind, raw))?;
        if !narrow.is_finite() {
            return Err(out_of_range(kind, raw));
        }
        return Ok(FieldValue::Float(f64::from(narrow)));
    }
    Ok(FieldValue::Float(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widths() {
        assert_eq!(coerce(FieldKind::Int8, "127"), Ok(FieldValue::Int(127)));
        assert_eq!(
            coerce(FieldKind::Int8, "128"),
            Err(FieldError::OutOfRange {
                ty: "int8",
                value: "128".into()
            })
        );
        assert_eq!(coerce(FieldKind::Int16, "-32768"), Ok(FieldValue::Int(-32768)));
        assert!(coerce(FieldKind::Int32, "2147483648").is_err());
        assert!(matches!(
            coerce(FieldKind::Int64, "9223372036854775808"),
            Err(FieldError::OutOfRange { .. })
        ));
        assert_eq!(coerce(FieldKind::Uint8, "255"), Ok(FieldValue::Uint(255)));
        assert!(coerce(FieldKind::Uint8, "256").is_err());
        assert!(matches!(
            coerce(FieldKind::Uint, "-1"),
            Err(FieldError::OutOfRange { ty: "uint", .. })
        ));
    }

    #[test]
    fn test_grouping_underscores() {
        assert_eq!(
            coerce(FieldKind::Int, "1_000_000"),
            Ok(FieldValue::Int(1_000_000))
        );
        assert_eq!(
            coerce(FieldKind::Float64, "1_234.5"),
            Ok(FieldValue::Float(1234.5))
        );
    }

    #[test]
    fn test_empty_numeric_is_null() {
        assert_eq!(coerce(FieldKind::Int, ""), Ok(FieldValue::Null));
        assert_eq!(coerce(FieldKind::Float32, ""), Ok(FieldValue::Null));
        assert_eq!(coerce(FieldKind::Bool, ""), Ok(FieldValue::Null));
        assert_eq!(coerce(FieldKind::Time, ""), Ok(FieldValue::Null));
    }

    #[test]
    fn test_garbage_numbers() {
        assert!(matches!(
            coerce(FieldKind::Int, "12abc"),
            Err(FieldError::Parse { tag: "int", .. })
        ));
        assert!(coerce(FieldKind::Float64, "NaN").is_err());
        for padded in [" 12", "12 ", " 12 ", "\t1", " "] {
            assert!(
                matches!(coerce(FieldKind::Int, padded), Err(FieldError::Parse { .. })),
                "{padded:?}"
            );
            assert!(coerce(FieldKind::Uint8, padded).is_err(), "{padded:?}");
            assert!(coerce(FieldKind::Float64, padded).is_err(), "{padded:?}");
        }
        assert!(coerce(FieldKind::Float64, "inf").is_err());
    }

    #[test]
    fn test_float32_overflow() {
        assert!(matches!(
            coerce(FieldKind::Float32, "3.5e38"),
            Err(FieldError::OutOfRange { ty: "float32", .. })
        ));
        assert_eq!(
            coerce(FieldKind::Float64, "3.5e38"),
            Ok(FieldValue::Float(3.5e38))
        );
    }

    #[test]
    fn test_bool_is_strict() {
        assert_eq!(coerce(FieldKind::Bool, "true"), Ok(FieldValue::Bool(true)));
        assert_eq!(coerce(FieldKind::Bool, "false"), Ok(FieldValue::Bool(false)));
        for loose in ["TRUE", "1", "yes", "on"] {
            assert!(coerce(FieldKind::Bool, loose).is_err(), "{loose}");
        }
    }

    #[test]
    fn test_soft_delete() {
        assert_eq!(
            coerce(FieldKind::DeletedAt, ""),
            Ok(FieldValue::DeletedAt(SoftDelete::live()))
        );
        let Ok(FieldValue::DeletedAt(marker)) = coerce(FieldKind::DeletedAt, "2024-01-01")
        else {
            panic!("expected a deletion marker");
        };
        assert!(marker.is_deleted());
        assert!(coerce(FieldKind::DeletedAt, "soon").is_err());
    }

    #[test]
    fn test_text_kinds_keep_input() {
        assert_eq!(
            coerce(FieldKind::String, " a b "),
            Ok(FieldValue::Text(" a b ".into()))
        );
        assert_eq!(
            coerce(FieldKind::Target, "row-3"),
            Ok(FieldValue::Target(Target::new("row-3")))
        );
    }
}
