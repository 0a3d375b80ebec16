//! Action encoder: registered handler + values → client invocation.
//!
//! The encoder never talks to the hub. It only produces a description of
//! the call, either as an inline script for an event attribute or as an
//! [`EventDescriptor`] for element trees built directly.

use crate::registry::{ActionHandle, ActionRegistry};
use tether_core::{Bindable, EventDescriptor, Invoke, RegistryError, Swap};

/// How the client gathers values when the event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationKind {
    /// Send the pre-filled values plus the triggering element's own value.
    Post,
    /// Send every named control of the enclosing form. Unchecked
    /// checkboxes are sent as `false`; only the checked radio of a group is
    /// sent.
    Form,
}

impl InvocationKind {
    /// Client function name.
    pub const fn function(self) -> &'static str {
        match self {
            InvocationKind::Post => "post",
            InvocationKind::Form => "submit",
        }
    }

    /// DOM event the invocation is usually wired to.
    pub const fn event_name(self) -> &'static str {
        match self {
            InvocationKind::Post => "click",
            InvocationKind::Form => "submit",
        }
    }
}

/// A fully resolved client call.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    kind: InvocationKind,
    invoke: Invoke,
}

impl Invocation {
    /// A call to `path` with no pre-filled values.
    pub fn new(kind: InvocationKind, swap: Swap, target: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            kind,
            invoke: Invoke {
                swap,
                target: target.into(),
                path: path.into(),
                values: Vec::new(),
            },
        }
    }

    /// Append the encoded fields of `record`.
    pub fn with_values(mut self, record: &dyn Bindable) -> Self {
        record.encode_fields("", &mut self.invoke.values);
        self
    }

    /// Append the encoded fields of `record`, names prefixed by `prefix`.
    pub fn with_values_at(mut self, prefix: &str, record: &dyn Bindable) -> Self {
        record.encode_fields(prefix, &mut self.invoke.values);
        self
    }

    /// The invocation kind.
    pub fn kind(&self) -> InvocationKind {
        self.kind
    }

    /// The resolved payload.
    pub fn invoke(&self) -> &Invoke {
        &self.invoke
    }

    /// Event descriptor for an element tree.
    pub fn descriptor(&self) -> EventDescriptor {
        match self.kind {
            InvocationKind::Post => EventDescriptor::Post(self.invoke.clone()),
            InvocationKind::Form => EventDescriptor::Form(self.invoke.clone()),
        }
    }

    /// Inline client script, e.g. `post(event,"inline","t1","/h",[])`.
    pub fn script(&self) -> String {
        let Invoke {
            swap,
            target,
            path,
            values,
        } = &self.invoke;
        format!(
            "{}(event,{},{},{},{})",
            self.kind.function(),
            json_string(swap.as_str()),
            json_string(target),
            json_string(path),
            serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string()),
        )
    }

    /// The event name the script is wired to.
    pub fn event_name(&self) -> &'static str {
        self.kind.event_name()
    }

    /// A complete attribute, e.g. `onclick='post(...)'`.
    pub fn attribute(&self) -> String {
        format!("on{}='{}'", self.event_name(), escape_attribute(&self.script()))
    }
}

fn json_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

/// Escape a value for a single-quoted attribute.
pub fn escape_attribute(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

impl ActionHandle {
    /// Build an invocation of this handler.
    pub fn invoke(&self, kind: InvocationKind, swap: Swap, target: impl Into<String>) -> Invocation {
        Invocation::new(kind, swap, target, self.path())
    }
}

/// Resolve `identity` and build an invocation.
///
/// # Panics
///
/// If the handler was never registered.
pub fn encode(
    registry: &ActionRegistry,
    identity: &str,
    kind: InvocationKind,
    swap: Swap,
    target: impl Into<String>,
) -> Invocation {
    match try_encode(registry, identity, kind, swap, target) {
        Ok(invocation) => invocation,
        Err(err) => panic!("{err}"),
    }
}

/// Fallible [`encode`].
pub fn try_encode(
    registry: &ActionRegistry,
    identity: &str,
    kind: InvocationKind,
    swap: Swap,
    target: impl Into<String>,
) -> Result<Invocation, RegistryError> {
    let handle = registry.try_resolve(identity)?;
    Ok(handle.invoke(kind, swap, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{action::Html, context::Context};
    use tether_core::{
        BoxError, FieldError, FieldItem, FieldKind, FieldPath, FieldSpec, FieldValue, encode_leaf,
        join_name, leaf_kind, set_leaf,
    };

    struct Row {
        id: u32,
        label: String,
    }

    impl Bindable for Row {
        fn fields() -> &'static [FieldSpec] {
            &[]
        }

        fn bind_field(&mut self, path: FieldPath<'_>, value: FieldValue) -> Result<(), FieldError> {
            match path.head() {
                Some("id") => set_leaf(&mut self.id, path.tail(), value),
                Some("label") => set_leaf(&mut self.label, path.tail(), value),
                _ => Err(FieldError::UnknownField(path.to_string())),
            }
        }

        fn field_kind(&self, path: FieldPath<'_>) -> Option<FieldKind> {
            match path.head()? {
                "id" => leaf_kind::<u32>(path.tail()),
                "label" => leaf_kind::<String>(path.tail()),
                _ => None,
            }
        }

        fn encode_fields(&self, prefix: &str, out: &mut Vec<FieldItem>) {
            encode_leaf(&self.id, join_name(prefix, "id"), out);
            encode_leaf(&self.label, join_name(prefix, "label"), out);
        }
    }

    async fn remove_row(_ctx: Context) -> Result<Html, BoxError> {
        Ok(Html::empty())
    }

    #[test]
    fn test_script_shape() {
        let invocation = Invocation::new(InvocationKind::Post, Swap::Inline, "t1", "/h");
        assert_eq!(invocation.script(), r#"post(event,"inline","t1","/h",[])"#);
        assert_eq!(invocation.event_name(), "click");

        let form = Invocation::new(InvocationKind::Form, Swap::Outline, "f", "/save");
        assert!(form.script().starts_with(r#"submit(event,"outline""#));
        assert_eq!(form.event_name(), "submit");
    }

    #[test]
    fn test_values_are_reflected() {
        let row = Row {
            id: 7,
            label: "it's <b>".into(),
        };
        let invocation =
            Invocation::new(InvocationKind::Post, Swap::Outline, "row-7", "/rows/remove")
                .with_values_at("row", &row);

        assert_eq!(invocation.invoke().values, vec![
            FieldItem::new("row.id", FieldKind::Uint32, "7"),
            FieldItem::new("row.label", FieldKind::String, "it's <b>"),
        ]);
        let attribute = invocation.attribute();
        assert!(attribute.starts_with("onclick='post(event,"));
        assert!(attribute.contains("it&#39;s &lt;b&gt;"));
        assert!(!attribute[9..attribute.len() - 1].contains('\''));
    }

    #[test]
    fn test_encode_resolves_registered_handler() {
        let registry = ActionRegistry::new();
        let handle = registry.register(remove_row);
        assert_eq!(
            try_encode(&registry, "remove_row", InvocationKind::Post, Swap::None, "x"),
            Err(RegistryError::NotRegistered("remove_row".into()))
        );

        let name = std::any::type_name_of_val(&remove_row);
        let invocation = encode(&registry, name, InvocationKind::Post, Swap::None, "x");
        assert_eq!(invocation.invoke().path, handle.path());
        assert!(matches!(invocation.descriptor(), EventDescriptor::Post(_)));
    }

    #[test]
    #[should_panic(expected = "not registered")]
    fn test_encode_unregistered_panics() {
        let registry = ActionRegistry::new();
        encode(&registry, "missing", InvocationKind::Form, Swap::Inline, "t");
    }
}
