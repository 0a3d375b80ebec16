//! # Server-side actions
//!
//! An [`Action`] is the server half of a client invocation: it receives a
//! [`Context`] for the request, may bind the body into a record, queue patch
//! operations, and returns the markup that replaces the client target.
//!
//! # Usage Patterns
//!
//! 1. **Closure**: `|ctx: Context| async move { Ok(Html::from("<p>hi</p>")) }`
//! 2. **Struct implementation**: `impl Action for Counter`, for stateful
//!    receivers whose latest instance must be dispatched
//! 3. **Chain**: middleware actions followed by a terminal action, see
//!    [`run_chain`]
//!
//! An action returning an empty [`Html`] from a middleware position lets the
//! chain continue; anything else short-circuits.

use crate::context::Context;
use futures::future::BoxFuture;
use std::{fmt, future::Future, sync::Arc};
use tether_core::BoxError;

/// The result of running an action.
pub type ActionResult = Result<Html, BoxError>;

/// A markup fragment returned by an action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Html(String);

impl Html {
    /// Wrap a markup string.
    pub fn new(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }

    /// No markup; lets a middleware chain continue.
    pub const fn empty() -> Self {
        Self(String::new())
    }

    /// Whether there is no markup.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The markup.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap the markup.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Html {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Html {
    fn from(markup: String) -> Self {
        Self(markup)
    }
}

impl From<&str> for Html {
    fn from(markup: &str) -> Self {
        Self(markup.to_string())
    }
}

/// A server-side handler bound to an invocation path.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an `Action`",
    label = "missing `Action` implementation",
    note = "Actions take a `Context` and return `Result<Html, BoxError>`."
)]
pub trait Action: Send + Sync + 'static {
    /// Handle one invocation.
    fn call(&self, ctx: Context) -> impl Future<Output = ActionResult> + Send;
}

impl<F, Fut> Action for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send,
{
    fn call(&self, ctx: Context) -> impl Future<Output = ActionResult> + Send {
        (self)(ctx)
    }
}

/// Object-safe version of [`Action`], used by the registry.
pub trait DynAction: Send + Sync + 'static {
    /// Handle one invocation (dynamic dispatch version).
    fn call_dyn(&self, ctx: Context) -> BoxFuture<'_, ActionResult>;
}

impl<A: Action> DynAction for A {
    fn call_dyn(&self, ctx: Context) -> BoxFuture<'_, ActionResult> {
        Box::pin(self.call(ctx))
    }
}

/// A shared, type-erased action.
pub type SharedAction = Arc<dyn DynAction>;

/// Erase an action for use in a chain.
pub fn shared<A: Action>(action: A) -> SharedAction {
    Arc::new(action)
}

/// Run a chain: every entry but the last is middleware.
///
/// Middleware runs in order; the first non-empty result is returned
/// immediately. An empty chain yields empty markup.
pub async fn run_chain(chain: &[SharedAction], ctx: Context) -> ActionResult {
    let Some((last, middleware)) = chain.split_last() else {
        return Ok(Html::empty());
    };
    for step in middleware {
        let out = step.call_dyn(ctx.clone()).await?;
        if !out.is_empty() {
            return Ok(out);
        }
    }
    last.call_dyn(ctx).await
}
