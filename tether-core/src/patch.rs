//! Patch operations sent to the client.
//!
//! A response carries an ordered list of [`PatchOperation`]s; the client
//! applies them in order.

use crate::element::{ElementNode, Swap};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Neutral information.
    #[default]
    Info,
    /// A completed action.
    Success,
    /// Something needs attention.
    Warning,
    /// A failure.
    Error,
}

/// An element tree addressed to a client target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPatch {
    /// Client element id.
    pub target: String,
    /// Element tree to apply.
    pub element: ElementNode,
}

/// One client-side instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    /// Replace the target's contents.
    Inline(TargetPatch),
    /// Replace the target element.
    Outline(TargetPatch),
    /// Append to the target.
    Append(TargetPatch),
    /// Prepend to the target.
    Prepend(TargetPatch),
    /// Deliver the tree without touching the DOM.
    None(TargetPatch),
    /// Show a toast.
    Notify {
        /// Message text.
        message: String,
        /// Severity.
        severity: Severity,
    },
    /// Set the document title.
    Title {
        /// New title.
        title: String,
    },
    /// Reload the page.
    Reload,
    /// Navigate to another URL.
    Redirect {
        /// Destination.
        url: String,
    },
    /// Offer a file for download.
    Download {
        /// Base64 encoded file content.
        payload: String,
        /// MIME type.
        mime: String,
        /// Suggested file name.
        filename: String,
    },
}

impl PatchOperation {
    /// Build a target patch for the given swap mode.
    pub fn swap(swap: Swap, target: impl Into<String>, element: ElementNode) -> Self {
        let patch = TargetPatch {
            target: target.into(),
            element,
        };
        match swap {
            Swap::Inline => PatchOperation::Inline(patch),
            Swap::Outline => PatchOperation::Outline(patch),
            Swap::Append => PatchOperation::Append(patch),
            Swap::Prepend => PatchOperation::Prepend(patch),
            Swap::None => PatchOperation::None(patch),
        }
    }

    /// A notification.
    pub fn notify(message: impl Into<String>, severity: Severity) -> Self {
        PatchOperation::Notify {
            message: message.into(),
            severity,
        }
    }

    /// A title change.
    pub fn title(title: impl Into<String>) -> Self {
        PatchOperation::Title {
            title: title.into(),
        }
    }

    /// A redirect.
    pub fn redirect(url: impl Into<String>) -> Self {
        PatchOperation::Redirect { url: url.into() }
    }

    /// A download; the bytes are base64 encoded for transport.
    pub fn download(bytes: &[u8], mime: impl Into<String>, filename: impl Into<String>) -> Self {
        PatchOperation::Download {
            payload: STANDARD.encode(bytes),
            mime: mime.into(),
            filename: filename.into(),
        }
    }

    /// The target patch carried by the swap variants.
    pub fn target_patch(&self) -> Option<&TargetPatch> {
        match self {
            PatchOperation::Inline(p)
            | PatchOperation::Outline(p)
            | PatchOperation::Append(p)
            | PatchOperation::Prepend(p)
            | PatchOperation::None(p) => Some(p),
            _ => None,
        }
    }

    /// The swap mode of a target patch.
    pub fn swap_mode(&self) -> Option<Swap> {
        match self {
            PatchOperation::Inline(_) => Some(Swap::Inline),
            PatchOperation::Outline(_) => Some(Swap::Outline),
            PatchOperation::Append(_) => Some(Swap::Append),
            PatchOperation::Prepend(_) => Some(Swap::Prepend),
            PatchOperation::None(_) => Some(Swap::None),
            _ => None,
        }
    }
}
