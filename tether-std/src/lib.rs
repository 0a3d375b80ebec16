//! # tether-std
//!
//! Standard implementations for the Tether server-driven UI runtime.
//!
//! This crate provides:
//! - **Actions**: [`action::Action`], middleware chains
//! - **Handler registry**: [`registry::ActionRegistry`]
//! - **Input binding**: [`binder::Binder`] with [`binder::BindLimits`]
//! - **Action encoding**: [`encoder::Invocation`]
//! - **Markup compilation**: [`compiler::compile`]
//! - **Patch/session hub**: [`hub::Hub`]
//! - **Request context**: [`context::Context`]

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core types
pub use tether_core;

// Modules
pub mod action;
pub mod binder;
pub mod compiler;
pub mod context;
pub mod encoder;
pub mod hub;
pub mod registry;
pub mod testing;
