//! # tether-core
//!
//! Data model and traits for the Tether server-driven UI runtime.
//!
//! This crate has minimal dependencies and is meant to be imported by code
//! that only describes UI state (components, records) without running a
//! server.
//!
//! # Model
//!
//! ## Element trees ([`ElementNode`])
//!
//! The structured form of rendered markup. Attributes are copied through,
//! inline event handlers are lifted into typed [`EventDescriptor`]s, and
//! children are nested elements or raw text.
//!
//! ## Patch operations ([`PatchOperation`])
//!
//! Ordered client instructions: swap an element tree into a target, notify,
//! set the title, reload, redirect or download.
//!
//! ## Wire fields ([`FieldItem`], [`FieldKind`], [`FieldType`])
//!
//! The `{name, type, value}` triples exchanged between client and server.
//! Type tags form a closed set; each Rust field type narrows a parsed
//! [`FieldValue`] with its own range checks.
//!
//! ## Bindable records ([`Bindable`])
//!
//! Records expose an explicit accessor table instead of being inspected at
//! runtime. `#[derive(Bindable)]` in the `tether` crate generates it.
//!
//! # Error Types
//!
//! - [`TetherError`] - Top-level error type
//! - [`RegistryError`] - Handler wiring mistakes
//! - [`BindError`] / [`FieldError`] - Untrusted input failures
//! - [`HubError`] - Connection failures

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod bind;
mod element;
mod error;
mod field;
mod patch;

pub use bind::{Bindable, FieldPath, FieldSpec, encode_leaf, join_name, leaf_kind, set_leaf};
pub use element::{Child, ElementNode, EventDescriptor, Invoke, Swap, UnknownSwap};
pub use error::{
    ActionError, BindError, BoxError, FieldError, HubError, RegistryError, TetherError,
};
pub use field::{
    FieldItem, FieldKind, FieldType, FieldValue, SoftDelete, TIME_LAYOUT, Target, ValueCategory,
    format_time, parse_time,
};
pub use patch::{PatchOperation, Severity, TargetPatch};
