//! Recognition of encoded invocations inside event attributes.

use serde_json::Value;
use tether_core::{EventDescriptor, FieldItem, Invoke, Swap};

/// Attributes that may carry an invocation, mapped to their event names.
pub(crate) fn event_for_attribute(name: &str) -> Option<&'static str> {
    match name {
        "onclick" => Some("click"),
        "onchange" => Some("change"),
        "onsubmit" => Some("submit"),
        _ => None,
    }
}

/// Parse `post(...)` or `submit(...)` with four positional arguments:
/// swap mode, target id, path and a JSON array of field items. A leading
/// `event` argument is accepted and ignored.
pub(crate) fn parse_invocation(script: &str) -> Option<EventDescriptor> {
    let script = script.trim().trim_end_matches(';').trim_end();
    let (form, args) = if let Some(rest) = script.strip_prefix("post(") {
        (false, rest)
    } else if let Some(rest) = script.strip_prefix("submit(") {
        (true, rest)
    } else {
        return None;
    };
    let args = args.strip_suffix(')')?.trim_start();
    let args = match args.strip_prefix("event") {
        Some(rest) => rest.trim_start().strip_prefix(',')?,
        None => args,
    };

    let Value::Array(mut positional) = serde_json::from_str(&format!("[{args}]")).ok()? else {
        return None;
    };
    if positional.len() != 4 {
        return None;
    }
    let values: Vec<FieldItem> = serde_json::from_value(positional.pop()?).ok()?;
    let path = positional.pop()?.as_str()?.to_string();
    let target = positional.pop()?.as_str()?.to_string();
    let swap: Swap = positional.pop()?.as_str()?.parse().ok()?;

    let invoke = Invoke {
        swap,
        target,
        path,
        values,
    };
    Some(if form {
        EventDescriptor::Form(invoke)
    } else {
        EventDescriptor::Post(invoke)
    })
}
