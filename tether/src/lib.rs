//! # tether - Server-Driven UI Runtime
//!
//! `tether` keeps UI logic on the server. Rendered components carry compact
//! action invocations; the browser posts them back, the server runs the
//! bound handler and answers with an element tree plus ordered patch
//! operations. Out-of-band updates travel over a socket as newline-delimited
//! JSON frames.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tether::prelude::*;
//!
//! #[derive(Bindable, Default)]
//! struct NewTodo {
//!     title: String,
//! }
//!
//! async fn add(ctx: Context) -> ActionResult {
//!     let mut todo = NewTodo::default();
//!     ctx.bind(&mut todo)?;
//!     ctx.success("added");
//!     Ok(Html::new(format!("<li>{}</li>", todo.title)))
//! }
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     tether::telemetry::init();
//!     let app = App::new(ServerConfig::default());
//!     let add = app.registry().register_named("todos.add", None, add);
//!     let button = add.invoke(InvocationKind::Post, Swap::Append, "todos");
//!     app.page("/", move |_ctx: Context| {
//!         let button = button.clone();
//!         async move { Ok(Html::new(format!("<button {}>Add</button>", button.attribute()))) }
//!     })
//!     .serve()
//!     .await
//! }
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

mod app;
pub mod config;
mod respond;
pub mod security;
pub mod session;
pub mod telemetry;
mod ws;

pub use app::{App, CLIENT_SCRIPT};
pub use config::ServerConfig;
pub use respond::{ActionReply, FAILURE_TEXT};
pub use ws::WsSink;

pub use tether_core::{
    ActionError,
    // Errors
    BindError,
    // Binding
    Bindable,
    BoxError,
    // Element model
    Child,
    ElementNode,
    EventDescriptor,
    FieldError,
    // Wire fields
    FieldItem,
    FieldKind,
    FieldPath,
    FieldSpec,
    FieldType,
    FieldValue,
    HubError,
    Invoke,
    // Patches
    PatchOperation,
    RegistryError,
    Severity,
    SoftDelete,
    Swap,
    Target,
    TargetPatch,
    TetherError,
    encode_leaf,
    join_name,
    leaf_kind,
    set_leaf,
};

pub use tether_std::{
    action::{Action, ActionResult, DynAction, Html, SharedAction, run_chain, shared},
    binder::{BindLimits, Binder},
    compiler::compile,
    context::{Context, RequestBody},
    encoder::{Invocation, InvocationKind, encode, try_encode},
    hub::{
        ClearCallback, ConnState, ConnectionId, Frame, FrameSink, Hub, HubConfig, PushReport,
        SessionId,
    },
    registry::{ActionHandle, ActionRegistry},
};

pub use tether_macros::Bindable;

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use tether_std::testing::*;
}

/// Prelude module - common imports for tether.
///
/// # Usage
///
/// ```rust,ignore
/// use tether::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Action, ActionResult, App, BindError, Bindable, BoxError, Context, Html, InvocationKind,
        PatchOperation, ServerConfig, Severity, Swap,
    };
}
