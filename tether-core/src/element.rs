//! Structured element trees.
//!
//! An [`ElementNode`] is what the markup compiler produces and what patch
//! operations carry to the client. Empty attribute, event and child
//! containers are omitted from the serialised form to keep payloads small.

use crate::field::FieldItem;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// How an element tree is applied to its client target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Swap {
    /// Replace the target's contents.
    #[default]
    Inline,
    /// Replace the target element itself.
    Outline,
    /// Append to the target's children.
    Append,
    /// Prepend to the target's children.
    Prepend,
    /// Apply with no DOM change (side effects only).
    None,
}

impl Swap {
    /// All swap modes, in wire order.
    pub const ALL: [Swap; 5] = [
        Swap::Inline,
        Swap::Outline,
        Swap::Append,
        Swap::Prepend,
        Swap::None,
    ];

    /// The wire name of this mode.
    pub const fn as_str(self) -> &'static str {
        match self {
            Swap::Inline => "inline",
            Swap::Outline => "outline",
            Swap::Append => "append",
            Swap::Prepend => "prepend",
            Swap::None => "none",
        }
    }
}

impl fmt::Display for Swap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown swap mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSwap(pub String);

impl fmt::Display for UnknownSwap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown swap mode `{}`", self.0)
    }
}

impl std::error::Error for UnknownSwap {}

impl FromStr for Swap {
    type Err = UnknownSwap;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Swap::ALL
            .into_iter()
            .find(|swap| swap.as_str() == s)
            .ok_or_else(|| UnknownSwap(s.to_string()))
    }
}

/// Payload of a wired `post`/`form` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoke {
    /// How the response is applied.
    pub swap: Swap,
    /// Client element id the response is applied to.
    pub target: String,
    /// Registered handler path.
    pub path: String,
    /// Pre-filled argument values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<FieldItem>,
}

/// A typed description of what a client event does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventDescriptor {
    /// Post the pre-filled values plus the triggering element's value.
    Post(Invoke),
    /// Submit every named control of the enclosing form.
    Form(Invoke),
    /// Opaque client script passed through verbatim.
    Raw {
        /// The original attribute text.
        script: String,
    },
}

impl EventDescriptor {
    /// The invocation payload, if this is not a raw script.
    pub fn invoke(&self) -> Option<&Invoke> {
        match self {
            EventDescriptor::Post(invoke) | EventDescriptor::Form(invoke) => Some(invoke),
            EventDescriptor::Raw { .. } => None,
        }
    }

    /// Whether this descriptor carries an opaque script.
    pub fn is_raw(&self) -> bool {
        matches!(self, EventDescriptor::Raw { .. })
    }
}

/// A child of an element: a nested element or a text run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Child {
    /// Raw text.
    Text(String),
    /// A nested element.
    Element(ElementNode),
}

impl Child {
    /// The nested element, if any.
    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Child::Element(el) => Some(el),
            Child::Text(_) => None,
        }
    }

    /// The text content, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Child::Text(text) => Some(text),
            Child::Element(_) => None,
        }
    }
}

impl From<ElementNode> for Child {
    fn from(el: ElementNode) -> Self {
        Child::Element(el)
    }
}

impl From<String> for Child {
    fn from(text: String) -> Self {
        Child::Text(text)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Self {
        Child::Text(text.to_string())
    }
}

/// A structured, serialisable element.
///
/// Built once with the `with_*` methods and read through accessors; a node
/// is owned by the response that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementNode {
    tag: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attrs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    events: BTreeMap<String, EventDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Child>,
}

impl ElementNode {
    /// Create an element with no attributes, events or children.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            events: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Add an event descriptor under an event name such as `click`.
    pub fn with_event(mut self, name: impl Into<String>, event: EventDescriptor) -> Self {
        self.events.insert(name.into(), event);
        self
    }

    /// Append a child.
    pub fn with_child(mut self, child: impl Into<Child>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Tag name, lower-cased by the compiler.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Attributes in name order.
    pub fn attrs(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    /// Look up one attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Typed events keyed by event name.
    pub fn events(&self) -> &BTreeMap<String, EventDescriptor> {
        &self.events
    }

    /// Look up one event.
    pub fn event(&self, name: &str) -> Option<&EventDescriptor> {
        self.events.get(name)
    }

    /// Children in document order.
    pub fn children(&self) -> &[Child] {
        &self.children
    }

    /// Concatenated text of this subtree.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(el: &ElementNode, out: &mut String) {
    for child in &el.children {
        match child {
            Child::Text(text) => out.push_str(text),
            Child::Element(inner) => collect_text(inner, out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_containers_are_omitted() {
        let el = ElementNode::new("div");
        assert_eq!(serde_json::to_value(&el).unwrap(), json!({ "tag": "div" }));
    }

    #[test]
    fn test_children_serialise_text_as_strings() {
        let el = ElementNode::new("p")
            .with_attr("class", "lead")
            .with_child("hello ")
            .with_child(ElementNode::new("b").with_child("world"));

        assert_eq!(
            serde_json::to_value(&el).unwrap(),
            json!({
                "tag": "p",
                "attrs": { "class": "lead" },
                "children": ["hello ", { "tag": "b", "children": ["world"] }]
            })
        );
        assert_eq!(el.text(), "hello world");
    }

    #[test]
    fn test_event_descriptor_tagging() {
        let ev = EventDescriptor::Post(Invoke {
            swap: Swap::Outline,
            target: "t1".into(),
            path: "/h".into(),
            values: Vec::new(),
        });
        assert_eq!(
            serde_json::to_value(&ev).unwrap(),
            json!({ "kind": "post", "swap": "outline", "target": "t1", "path": "/h" })
        );

        let raw = EventDescriptor::Raw {
            script: "doStuff()".into(),
        };
        assert_eq!(
            serde_json::to_value(&raw).unwrap(),
            json!({ "kind": "raw", "script": "doStuff()" })
        );
    }

    #[test]
    fn test_swap_from_str() {
        for swap in Swap::ALL {
            assert_eq!(swap.as_str().parse::<Swap>().unwrap(), swap);
        }
        assert!("sideways".parse::<Swap>().is_err());
    }
}
