//! Record shapes the binder can populate and the encoder can reflect.
//!
//! A [`Bindable`] record exposes an explicit accessor table: a static
//! [`FieldSpec`] list plus a `bind_field` method that matches on the first
//! path segment. `#[derive(Bindable)]` generates both; hand-written impls
//! use [`set_leaf`] and [`encode_leaf`].

use crate::{
    error::FieldError,
    field::{FieldItem, FieldKind, FieldType, FieldValue},
};
use std::fmt;

/// A field path split into segments.
///
/// `user.tags[2]` and `user[tags][2]` both split into `["user", "tags", "2"]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath<'a> {
    segments: &'a [&'a str],
}

impl<'a> FieldPath<'a> {
    /// Wrap pre-split segments.
    pub const fn new(segments: &'a [&'a str]) -> Self {
        Self { segments }
    }

    /// Split a wire name into segments.
    ///
    /// Returns `None` for empty segments (`a..b`, `a[]`) and unbalanced
    /// brackets.
    pub fn split(name: &str) -> Option<Vec<&str>> {
        let bytes = name.as_bytes();
        let mut segments = Vec::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'[' {
                let close = name[i + 1..].find(']')? + i + 1;
                let segment = &name[i + 1..close];
                if segment.is_empty() || segment.contains(['[', '.']) {
                    return None;
                }
                segments.push(segment);
                i = close + 1;
                if i < bytes.len() && !matches!(bytes[i], b'.' | b'[') {
                    return None;
                }
            } else if matches!(bytes[i], b'.' | b']') {
                return None;
            } else {
                let end = name[i..]
                    .find(['.', '[', ']'])
                    .map_or(bytes.len(), |offset| i + offset);
                segments.push(&name[i..end]);
                i = end;
            }
            if i < bytes.len() && bytes[i] == b'.' {
                i += 1;
                if i == bytes.len() || matches!(bytes[i], b'.' | b'[' | b']') {
                    return None;
                }
            }
        }
        (!segments.is_empty()).then_some(segments)
    }

    /// The first segment.
    pub fn head(&self) -> Option<&'a str> {
        self.segments.first().copied()
    }

    /// Everything after the first segment.
    pub fn tail(&self) -> FieldPath<'a> {
        FieldPath {
            segments: self.segments.get(1..).unwrap_or(&[]),
        }
    }

    /// Whether no segments remain.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// One row of a record's accessor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Wire name of the field.
    pub name: &'static str,
    /// Leaf kind, or `None` for a nested record.
    pub kind: Option<FieldKind>,
}

/// A record with an explicit field accessor table.
pub trait Bindable {
    /// The accessor table.
    fn fields() -> &'static [FieldSpec]
    where
        Self: Sized;

    /// Assign `value` to the field at `path`.
    fn bind_field(&mut self, path: FieldPath<'_>, value: FieldValue) -> Result<(), FieldError>;

    /// Declared kind of the leaf at `path`, used when the wire omits tags.
    fn field_kind(&self, path: FieldPath<'_>) -> Option<FieldKind>;

    /// Append the wire form of every leaf field, names prefixed by `prefix`.
    fn encode_fields(&self, prefix: &str, out: &mut Vec<FieldItem>);

    /// Collect the wire form of every leaf field.
    fn to_fields(&self) -> Vec<FieldItem> {
        let mut out = Vec::new();
        self.encode_fields("", &mut out);
        out
    }
}

/// Join a prefix and a field name with `.`.
pub fn join_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Assign a leaf field; `path` is what remains after the field's own name.
pub fn set_leaf<T: FieldType>(
    slot: &mut T,
    path: FieldPath<'_>,
    value: FieldValue,
) -> Result<(), FieldError> {
    if !path.is_empty() {
        return Err(FieldError::UnknownField(path.to_string()));
    }
    *slot = T::from_value(value)?;
    Ok(())
}

/// The kind of a leaf field, if `path` ends at it.
pub fn leaf_kind<T: FieldType>(path: FieldPath<'_>) -> Option<FieldKind> {
    path.is_empty().then_some(T::KIND)
}

/// Append a leaf field's wire form.
pub fn encode_leaf<T: FieldType>(slot: &T, name: String, out: &mut Vec<FieldItem>) {
    out.push(FieldItem::new(name, T::KIND, slot.to_wire()));
}

impl<T: Bindable> Bindable for Vec<T> {
    fn fields() -> &'static [FieldSpec] {
        &[]
    }

    fn bind_field(&mut self, path: FieldPath<'_>, value: FieldValue) -> Result<(), FieldError> {
        let head = path
            .head()
            .ok_or_else(|| FieldError::UnknownField(String::new()))?;
        let index: usize = head
            .parse()
            .map_err(|_| FieldError::UnknownField(head.to_string()))?;
        match self.get_mut(index) {
            Some(item) => item.bind_field(path.tail(), value),
            None => Err(FieldError::NeedsAllocation(format!("[{index}]"))),
        }
    }

    fn field_kind(&self, path: FieldPath<'_>) -> Option<FieldKind> {
        let index: usize = path.head()?.parse().ok()?;
        self.get(index)?.field_kind(path.tail())
    }

    fn encode_fields(&self, prefix: &str, out: &mut Vec<FieldItem>) {
        for (index, item) in self.iter().enumerate() {
            item.encode_fields(&format!("{prefix}[{index}]"), out);
        }
    }
}

impl<T: Bindable> Bindable for Option<T> {
    fn fields() -> &'static [FieldSpec] {
        &[]
    }

    fn bind_field(&mut self, path: FieldPath<'_>, value: FieldValue) -> Result<(), FieldError> {
        match self {
            Some(inner) => inner.bind_field(path, value),
            None => Err(FieldError::NeedsAllocation(path.to_string())),
        }
    }

    fn field_kind(&self, path: FieldPath<'_>) -> Option<FieldKind> {
        self.as_ref()?.field_kind(path)
    }

    fn encode_fields(&self, prefix: &str, out: &mut Vec<FieldItem>) {
        if let Some(inner) = self {
            inner.encode_fields(prefix, out);
        }
    }
}

impl<T: Bindable> Bindable for Box<T> {
    fn fields() -> &'static [FieldSpec] {
        T::fields()
    }

    fn bind_field(&mut self, path: FieldPath<'_>, value: FieldValue) -> Result<(), FieldError> {
        (**self).bind_field(path, value)
    }

    fn field_kind(&self, path: FieldPath<'_>) -> Option<FieldKind> {
        (**self).field_kind(path)
    }

    fn encode_fields(&self, prefix: &str, out: &mut Vec<FieldItem>) {
        (**self).encode_fields(prefix, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_dotted_and_bracketed() {
        assert_eq!(FieldPath::split("name"), Some(vec!["name"]));
        assert_eq!(
            FieldPath::split("user.tags[2]"),
            Some(vec!["user", "tags", "2"])
        );
        assert_eq!(
            FieldPath::split("user[tags][2]"),
            Some(vec!["user", "tags", "2"])
        );
        assert_eq!(
            FieldPath::split("rows[0].cells[1].v"),
            Some(vec!["rows", "0", "cells", "1", "v"])
        );
    }

    #[test]
    fn test_split_rejects_malformed() {
        for bad in ["", "a..b", "a[]", "a[0", "a]0", ".a", "a.", "a[b.c]", "a[[0]]"] {
            assert_eq!(FieldPath::split(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn test_path_walk() {
        let segments = ["a", "b", "c"];
        let path = FieldPath::new(&segments);
        assert_eq!(path.head(), Some("a"));
        assert_eq!(path.tail().head(), Some("b"));
        assert!(path.tail().tail().tail().is_empty());
        assert_eq!(path.to_string(), "a.b.c");
    }

    #[test]
    fn test_set_leaf_rejects_deeper_paths() {
        let mut n = 0i32;
        let segments = ["extra"];
        assert!(matches!(
            set_leaf(&mut n, FieldPath::new(&segments), FieldValue::Int(1)),
            Err(FieldError::UnknownField(_))
        ));
        set_leaf(&mut n, FieldPath::new(&[]), FieldValue::Int(7)).unwrap();
        assert_eq!(n, 7);
    }
}
