//! Input binder: untrusted wire fields → a [`Bindable`] record.
//!
//! Every request passes two stages:
//!
//! 1. **Validation.** Body size, field count, name length and character set,
//!    and value length per [`ValueCategory`] are checked for *all* fields
//!    before anything is parsed. Any violation rejects the request and
//!    leaves the target untouched.
//! 2. **Application.** Each field's path is resolved through the record's
//!    accessor table and its value parsed by [`coerce`]. A failing field is
//!    logged and skipped; the remaining fields are still applied.

mod coerce;

pub use coerce::coerce;

use tether_core::{
    BindError, Bindable, FieldError, FieldItem, FieldKind, FieldPath, ValueCategory,
};
use tracing::{debug, warn};

/// Ceilings enforced before any field is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindLimits {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
    /// Maximum number of fields.
    pub max_fields: usize,
    /// Maximum field name length in bytes.
    pub max_name_len: usize,
    /// Maximum value length for integer and boolean fields.
    pub max_numeric_len: usize,
    /// Maximum value length for floating point fields.
    pub max_decimal_len: usize,
    /// Maximum value length for text, time and untyped fields.
    pub max_text_len: usize,
}

impl Default for BindLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
            max_fields: 1000,
            max_name_len: 256,
            max_numeric_len: 64,
            max_decimal_len: 512,
            max_text_len: 64 * 1024,
        }
    }
}

impl BindLimits {
    /// Value ceiling for a category.
    pub fn value_limit(&self, category: ValueCategory) -> usize {
        match category {
            ValueCategory::Numeric => self.max_numeric_len,
            ValueCategory::Decimal => self.max_decimal_len,
            ValueCategory::Text => self.max_text_len,
        }
    }
}

fn valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '[' | ']')
}

/// Applies [`BindLimits`] and binds fields into records.
#[derive(Debug, Clone, Copy, Default)]
pub struct Binder {
    limits: BindLimits,
}

impl Binder {
    /// A binder enforcing `limits`.
    pub fn new(limits: BindLimits) -> Self {
        Self { limits }
    }

    /// The enforced limits.
    pub fn limits(&self) -> &BindLimits {
        &self.limits
    }

    /// Reject bodies over the size ceiling.
    pub fn check_body(&self, size: usize) -> Result<(), BindError> {
        if size > self.limits.max_body_bytes {
            return Err(BindError::BodyTooLarge {
                size,
                limit: self.limits.max_body_bytes,
            });
        }
        Ok(())
    }

    fn check_field(&self, name: &str, value: &str, kind: Option<FieldKind>) -> Result<(), BindError> {
        self.check_name(name)?;
        self.check_value(name, value, kind)
    }

    fn check_name(&self, name: &str) -> Result<(), BindError> {
        if name.is_empty() {
            return Err(BindError::EmptyFieldName);
        }
        if name.len() > self.limits.max_name_len {
            return Err(BindError::FieldNameTooLong {
                len: name.len(),
                limit: self.limits.max_name_len,
            });
        }
        if !name.chars().all(valid_name_char) {
            return Err(BindError::InvalidFieldName(name.to_string()));
        }
        Ok(())
    }

    fn check_value(&self, name: &str, value: &str, kind: Option<FieldKind>) -> Result<(), BindError> {
        let category = kind.map_or(ValueCategory::Text, FieldKind::category);
        let limit = self.limits.value_limit(category);
        if value.len() > limit {
            return Err(BindError::ValueTooLong {
                name: name.to_string(),
                len: value.len(),
                limit,
            });
        }
        Ok(())
    }

    fn check_count(&self, count: usize) -> Result<(), BindError> {
        if count > self.limits.max_fields {
            return Err(BindError::TooManyFields {
                count,
                limit: self.limits.max_fields,
            });
        }
        Ok(())
    }

    /// Decode a JSON array of `{name, type, value}` and bind it.
    ///
    /// An empty body binds nothing.
    pub fn bind_json(&self, body: &[u8], target: &mut dyn Bindable) -> Result<(), BindError> {
        self.check_body(body.len())?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        let items: Vec<FieldItem> =
            serde_json::from_slice(body).map_err(|err| BindError::Malformed(err.to_string()))?;
        self.bind_items(items, target)
    }

    /// Bind typed items.
    ///
    /// Every field is attempted. The first per-field failure is returned as
    /// [`BindError::Field`] after the rest were applied.
    pub fn bind_items(&self, items: Vec<FieldItem>, target: &mut dyn Bindable) -> Result<(), BindError> {
        self.check_count(items.len())?;
        for item in &items {
            self.check_field(&item.name, &item.value, FieldKind::from_tag(&item.kind))?;
        }

        let mut first = None;
        for item in last_write_wins(items, |item| item.name.as_str()) {
            let applied = FieldKind::from_tag(&item.kind)
                .ok_or_else(|| FieldError::UnknownTag(item.kind.clone()))
                .and_then(|kind| apply(target, &item.name, kind, &item.value));
            if let Err(source) = applied {
                warn!(field = %item.name, error = %source, "skipping field");
                first.get_or_insert(BindError::Field {
                    name: item.name,
                    source,
                });
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Bind untyped form fields, inferring each kind from the target.
    ///
    /// Only validation failures are returned; field failures are logged.
    pub fn bind_form(
        &self,
        pairs: &[(String, String)],
        target: &mut dyn Bindable,
    ) -> Result<(), BindError> {
        self.check_count(pairs.len())?;
        let mut resolved = Vec::with_capacity(pairs.len());
        for (name, value) in pairs {
            self.check_name(name)?;
            let kind = FieldPath::split(name)
                .and_then(|segments| target.field_kind(FieldPath::new(&segments)));
            self.check_value(name, value, kind)?;
            resolved.push((name, value, kind));
        }

        for (name, value, kind) in last_write_wins(resolved, |(name, ..)| name.as_str()) {
            let Some(kind) = kind else {
                debug!(field = %name, "skipping unknown form field");
                continue;
            };
            if let Err(error) = apply(target, name, kind, value) {
                warn!(field = %name, %error, "skipping field");
            }
        }
        Ok(())
    }
}

fn apply(target: &mut dyn Bindable, name: &str, kind: FieldKind, raw: &str) -> Result<(), FieldError> {
    let segments = FieldPath::split(name).ok_or_else(|| FieldError::UnknownField(name.to_string()))?;
    let value = coerce(kind, raw)?;
    target.bind_field(FieldPath::new(&segments), value)
}

/// Keep only the last occurrence of each name, at the position it was last seen.
fn last_write_wins<T>(items: Vec<T>, name: impl Fn(&T) -> &str) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if let Some(previous) = out.iter().position(|seen| name(seen) == name(&item)) {
            out.remove(previous);
        }
        out.push(item);
    }
    out
}
