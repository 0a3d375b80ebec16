//! Response shapes for actions and pages.
//!
//! Action callers that accept `application/json` receive an [`ActionReply`];
//! everyone else gets the markup fragment followed by one inline `<script>`
//! per operation.

use axum::{
    Json,
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;
use tether_core::{BindError, ElementNode, PatchOperation, Severity};
use tether_std::{compiler, encoder::escape_attribute};
use tracing::warn;

/// Text shown when an action fails unexpectedly.
pub const FAILURE_TEXT: &str = "Something went wrong.";

const ERROR_DOCUMENT: &str = "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Error</title></head>\n<body><h1>Internal Server Error</h1></body>\n</html>\n";

/// Structured reply to an in-place action.
#[derive(Debug, Serialize)]
pub struct ActionReply {
    /// Compiled markup, absent when the action returned none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementNode>,
    /// Operations to apply in order.
    pub ops: Vec<PatchOperation>,
}

pub(crate) fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

/// An inline script replaying `op`.
pub(crate) fn replay_script(op: &PatchOperation) -> Option<String> {
    match serde_json::to_string(op) {
        Ok(json) => Some(format!(
            "<script>tether.apply({})</script>",
            json.replace("</", "<\\/")
        )),
        Err(error) => {
            warn!(%error, "operation could not be encoded");
            None
        }
    }
}

fn replay_all(ops: &[PatchOperation]) -> String {
    ops.iter().filter_map(replay_script).collect()
}

/// Markup followed by replay scripts.
pub(crate) fn legacy_fragment(markup: &str, ops: &[PatchOperation]) -> String {
    let mut out = String::with_capacity(markup.len());
    out.push_str(markup);
    out.push_str(&replay_all(ops));
    out
}

pub(crate) fn action(json: bool, markup: &str, ops: Vec<PatchOperation>) -> Response {
    if json {
        let element = (!markup.trim().is_empty()).then(|| compiler::compile(markup));
        Json(ActionReply { element, ops }).into_response()
    } else {
        Html(legacy_fragment(markup, &ops)).into_response()
    }
}

pub(crate) fn rejected(json: bool, error: &BindError) -> Response {
    let message = error.to_string();
    if json {
        let ops = vec![PatchOperation::notify(message, Severity::Error)];
        (StatusCode::BAD_REQUEST, Json(ActionReply { element: None, ops })).into_response()
    } else {
        (StatusCode::BAD_REQUEST, message).into_response()
    }
}

pub(crate) fn failed(json: bool) -> Response {
    let ops = vec![PatchOperation::notify(FAILURE_TEXT, Severity::Error)];
    if json {
        let reply = ActionReply {
            element: Some(compiler::fallback(FAILURE_TEXT)),
            ops,
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(reply)).into_response()
    } else {
        let markup = format!("<div>{FAILURE_TEXT}</div>");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(legacy_fragment(&markup, &ops)),
        )
            .into_response()
    }
}

pub(crate) fn page_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Html(ERROR_DOCUMENT)).into_response()
}

fn insert_before(doc: &mut String, lower: &str, needle: &str, insert: &str) -> bool {
    match lower.rfind(needle) {
        Some(at) => {
            doc.insert_str(at, insert);
            true
        }
        None => false,
    }
}

/// A full page: `markup` as-is when it is a document, wrapped otherwise, with
/// the client script tag and the queued operations.
pub(crate) fn document(
    markup: &str,
    script_path: &str,
    socket_path: &str,
    ops: &[PatchOperation],
) -> String {
    let tag = format!(
        "<script src='{}' data-socket='{}' defer></script>",
        escape_attribute(script_path),
        escape_attribute(socket_path)
    );
    let replay = replay_all(ops);

    if !markup.to_ascii_lowercase().contains("<html") {
        return format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n{tag}\n</head>\n<body>\n{markup}{replay}\n</body>\n</html>\n"
        );
    }

    // Lower-casing ASCII keeps byte offsets, so positions found in `lower`
    // are valid in `doc`. Insert the later one first.
    let mut doc = markup.to_string();
    let lower = doc.to_ascii_lowercase();
    if !insert_before(&mut doc, &lower, "</body>", &replay) {
        doc.push_str(&replay);
    }
    let lower = doc.to_ascii_lowercase();
    if !insert_before(&mut doc, &lower, "</head>", &tag) {
        let lower = doc.to_ascii_lowercase();
        if !insert_before(&mut doc, &lower, "</body>", &tag) {
            doc.push_str(&tag);
        }
    }
    doc
}
