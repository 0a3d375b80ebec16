//! Markup compiler: rendered HTML → [`ElementNode`].
//!
//! The compiler picks the first content element of a fragment, skipping
//! document wrappers (`<!doctype>`, `<html>`, `<head>`, `<body>`), and turns
//! it into a tree:
//!
//! - attributes are copied verbatim; valueless (boolean) attributes become
//!   empty strings. HTML tag and attribute names are lower-cased, while names
//!   inside `svg` and `math` keep their spelling (`viewBox`,
//!   `linearGradient`)
//! - `onclick`, `onchange` and `onsubmit` holding an encoded `post(...)` or
//!   `submit(...)` call become typed events and are removed from the
//!   attributes
//! - any other value in those attributes stays as an attribute *and* is
//!   recorded as a `raw` event
//! - whitespace-only text that spans lines is dropped as formatting, except
//!   inside `pre`, `textarea` and `listing`
//!
//! Compilation never fails. Markup without any element compiles to a `div`
//! holding the original string as text.

mod event;
mod tokenizer;

use std::collections::BTreeMap;
use tether_core::{Child, ElementNode, EventDescriptor};
use tokenizer::{Token, tokenize};

/// Compile a fragment.
pub fn compile(markup: &str) -> ElementNode {
    let roots = build(tokenize(markup));
    select_root(roots).unwrap_or_else(|| fallback(markup))
}

/// The tree used when no element can be found.
pub fn fallback(markup: &str) -> ElementNode {
    ElementNode::new("div").with_child(markup)
}

struct Open {
    tag: String,
    /// Inside `svg` or `math`.
    foreign: bool,
    preformatted: bool,
    attrs: BTreeMap<String, String>,
    events: BTreeMap<String, EventDescriptor>,
    children: Vec<Child>,
}

impl Open {
    fn new(
        tag: String,
        foreign: bool,
        preformatted: bool,
        attributes: Vec<(String, Option<String>)>,
    ) -> Self {
        let mut attrs = BTreeMap::new();
        let mut events = BTreeMap::new();
        for (name, value) in attributes {
            let name = if foreign {
                name
            } else {
                name.to_ascii_lowercase()
            };
            if attrs.contains_key(&name) {
                continue;
            }
            let value = value.unwrap_or_default();
            if let Some(event_name) = event::event_for_attribute(&name.to_ascii_lowercase()) {
                match event::parse_invocation(&value) {
                    Some(descriptor) => {
                        events.insert(event_name.to_string(), descriptor);
                        continue;
                    }
                    None => {
                        events.insert(event_name.to_string(), EventDescriptor::Raw {
                            script: value.clone(),
                        });
                    }
                }
            }
            attrs.insert(name, value);
        }
        Self {
            tag,
            foreign,
            preformatted,
            attrs,
            events,
            children: Vec::new(),
        }
    }

    fn close(self) -> ElementNode {
        let mut el = ElementNode::new(self.tag);
        for (name, value) in self.attrs {
            el = el.with_attr(name, value);
        }
        for (name, event) in self.events {
            el = el.with_event(name, event);
        }
        self.children
            .into_iter()
            .fold(el, |el, child| el.with_child(child))
    }
}

fn attach(stack: &mut [Open], roots: &mut Vec<Child>, child: Child) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(child),
        None => roots.push(child),
    }
}

fn close_top(stack: &mut Vec<Open>, roots: &mut Vec<Child>) {
    if let Some(open) = stack.pop() {
        let el = open.close();
        attach(stack, roots, Child::Element(el));
    }
}

fn is_formatting(text: &str) -> bool {
    text.contains('\n') && text.trim().is_empty()
}

fn keeps_whitespace(tag: &str) -> bool {
    matches!(tag, "pre" | "textarea" | "listing")
}

/// Whether children of `parent` are SVG or MathML content.
fn children_are_foreign(parent: Option<&Open>) -> bool {
    parent.is_some_and(|open| open.foreign && !open.tag.eq_ignore_ascii_case("foreignObject"))
}

fn build(tokens: Vec<Token>) -> Vec<Child> {
    let mut roots = Vec::new();
    let mut stack: Vec<Open> = Vec::new();
    for token in tokens {
        match token {
            Token::Doctype | Token::Comment => {}
            Token::Text(text) => {
                let preformatted = stack.last().is_some_and(|open| open.preformatted);
                if is_formatting(&text) && !preformatted {
                    continue;
                }
                // Adjacent runs (split around a stray `<`) are merged.
                let siblings = match stack.last_mut() {
                    Some(parent) => &mut parent.children,
                    None => &mut roots,
                };
                match siblings.last_mut() {
                    Some(Child::Text(previous)) => previous.push_str(&text),
                    _ => siblings.push(Child::Text(text)),
                }
            }
            Token::StartTag {
                name,
                raw_name,
                attributes,
                self_closing,
            } => {
                let parent = stack.last();
                let in_foreign = children_are_foreign(parent);
                let foreign = in_foreign || matches!(name.as_str(), "svg" | "math");
                let preformatted = !foreign
                    && (keeps_whitespace(&name) || parent.is_some_and(|open| open.preformatted));
                let tag = if in_foreign { raw_name } else { name };
                let open = Open::new(tag, foreign, preformatted, attributes);
                if self_closing {
                    attach(&mut stack, &mut roots, Child::Element(open.close()));
                } else {
                    stack.push(open);
                }
            }
            Token::EndTag(name) => {
                if !stack.iter().any(|open| open.tag.eq_ignore_ascii_case(&name)) {
                    continue;
                }
                while let Some(open) = stack.last() {
                    let matched = open.tag.eq_ignore_ascii_case(&name);
                    close_top(&mut stack, &mut roots);
                    if matched {
                        break;
                    }
                }
            }
        }
    }
    while !stack.is_empty() {
        close_top(&mut stack, &mut roots);
    }
    roots
}

fn select_root(children: Vec<Child>) -> Option<ElementNode> {
    for child in children {
        let Child::Element(el) = child else {
            continue;
        };
        match el.tag() {
            "head" => continue,
            "html" | "body" => {
                if let Some(found) = select_root(el.children().to_vec()) {
                    return Some(found);
                }
            }
            _ => return Some(el),
        }
    }
    None
}
