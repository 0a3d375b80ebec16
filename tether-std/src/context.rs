//! Per-request state handed to every action.
//!
//! A [`Context`] is cheap to clone; clones share the same operation buffer,
//! so middleware and the terminal action of a chain append to one ordered
//! list of [`PatchOperation`]s that the server returns with the response.

use crate::{
    binder::Binder,
    compiler,
    hub::{ClearCallback, Hub, PushReport, SessionId},
};
use bytes::Bytes;
use std::sync::{Arc, Mutex, MutexGuard};
use tether_core::{BindError, Bindable, ElementNode, HubError, PatchOperation, Severity, Swap};
use tracing::debug;

/// The decoded body of an action request.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// A JSON array of `{name, type, value}` items, not yet decoded.
    Json(Bytes),
    /// Untyped form fields, file fields already dropped.
    Form(Vec<(String, String)>),
}

struct Inner {
    session: SessionId,
    body: RequestBody,
    binder: Binder,
    hub: Option<Arc<Hub>>,
    ops: Mutex<Vec<PatchOperation>>,
}

/// The request an action is running for.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

/// Builder for [`Context`].
pub struct ContextBuilder {
    session: SessionId,
    body: RequestBody,
    binder: Binder,
    hub: Option<Arc<Hub>>,
}

impl ContextBuilder {
    /// Set the request body.
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Set the binder used by [`Context::bind`].
    pub fn binder(mut self, binder: Binder) -> Self {
        self.binder = binder;
        self
    }

    /// Attach the hub used by [`Context::push`] and [`Context::patch`].
    pub fn hub(mut self, hub: Arc<Hub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Finish.
    pub fn build(self) -> Context {
        Context {
            inner: Arc::new(Inner {
                session: self.session,
                body: self.body,
                binder: self.binder,
                hub: self.hub,
                ops: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Context {
    /// Start building a context for `session`.
    pub fn builder(session: SessionId) -> ContextBuilder {
        ContextBuilder {
            session,
            body: RequestBody::Empty,
            binder: Binder::default(),
            hub: None,
        }
    }

    /// A context with a fresh session, no body and no hub.
    pub fn detached() -> Self {
        Self::builder(SessionId::generate()).build()
    }

    /// The caller's session.
    pub fn session(&self) -> &SessionId {
        &self.inner.session
    }

    /// The raw request body.
    pub fn body(&self) -> &RequestBody {
        &self.inner.body
    }

    /// The hub, if the request came through a server.
    pub fn hub(&self) -> Option<&Arc<Hub>> {
        self.inner.hub.as_ref()
    }

    /// Bind the request body into `target`.
    ///
    /// JSON bodies report the first per-field failure after every field was
    /// attempted; form bodies only report validation failures.
    pub fn bind(&self, target: &mut dyn Bindable) -> Result<(), BindError> {
        match &self.inner.body {
            RequestBody::Empty => Ok(()),
            RequestBody::Json(bytes) => self.inner.binder.bind_json(bytes, target),
            RequestBody::Form(pairs) => self.inner.binder.bind_form(pairs, target),
        }
    }

    fn ops_lock(&self) -> MutexGuard<'_, Vec<PatchOperation>> {
        self.inner
            .ops
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an operation for the response.
    pub fn patch_op(&self, op: PatchOperation) {
        self.ops_lock().push(op);
    }

    /// Queue a notification.
    pub fn notify(&self, severity: Severity, message: impl Into<String>) {
        self.patch_op(PatchOperation::notify(message, severity));
    }

    /// Queue an informational notification.
    pub fn info(&self, message: impl Into<String>) {
        self.notify(Severity::Info, message);
    }

    /// Queue a success notification.
    pub fn success(&self, message: impl Into<String>) {
        self.notify(Severity::Success, message);
    }

    /// Queue an error notification.
    pub fn error(&self, message: impl Into<String>) {
        self.notify(Severity::Error, message);
    }

    /// Queue a document title change.
    pub fn title(&self, title: impl Into<String>) {
        self.patch_op(PatchOperation::title(title));
    }

    /// Queue a full page reload.
    pub fn reload(&self) {
        self.patch_op(PatchOperation::Reload);
    }

    /// Queue a navigation.
    pub fn redirect(&self, url: impl Into<String>) {
        self.patch_op(PatchOperation::redirect(url));
    }

    /// Queue a file download.
    pub fn download(&self, bytes: &[u8], mime: impl Into<String>, filename: impl Into<String>) {
        self.patch_op(PatchOperation::download(bytes, mime, filename));
    }

    /// Queue a swap of compiled markup into another target.
    pub fn swap(&self, swap: Swap, target: impl Into<String>, markup: &str) {
        self.patch_op(PatchOperation::swap(swap, target, compiler::compile(markup)));
    }

    /// The operations queued so far.
    pub fn ops(&self) -> Vec<PatchOperation> {
        self.ops_lock().clone()
    }

    /// Drain the queued operations.
    pub fn take_ops(&self) -> Vec<PatchOperation> {
        std::mem::take(&mut *self.ops_lock())
    }

    /// Broadcast operations to every open connection.
    pub async fn push(&self, ops: Vec<PatchOperation>) -> Result<PushReport, HubError> {
        match &self.inner.hub {
            Some(hub) => hub.push(ops).await,
            None => {
                debug!("push without a hub dropped");
                Ok(PushReport::default())
            }
        }
    }

    /// Push one element tree to `target`, remembering `on_clear` for this
    /// session until the client reports the target gone.
    pub async fn patch(
        &self,
        swap: Swap,
        target: &str,
        element: ElementNode,
        on_clear: Option<ClearCallback>,
    ) -> Result<PushReport, HubError> {
        match &self.inner.hub {
            Some(hub) => {
                hub.patch(&self.inner.session, swap, target, element, on_clear)
                    .await
            }
            None => {
                debug!(target, "patch without a hub dropped");
                Ok(PushReport::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ops_are_shared_between_clones() {
        let ctx = Context::detached();
        let other = ctx.clone();
        ctx.title("Users");
        other.success("saved");
        other.reload();

        let ops = ctx.take_ops();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], PatchOperation::title("Users"));
        assert_eq!(ops[1], PatchOperation::notify("saved", Severity::Success));
        assert_eq!(ops[2], PatchOperation::Reload);
        assert!(other.ops().is_empty());
    }

    #[test]
    fn test_swap_compiles_markup() {
        let ctx = Context::detached();
        ctx.swap(Swap::Append, "list", "<li>one</li>");
        let ops = ctx.ops();
        let patch = ops[0].target_patch().unwrap();
        assert_eq!(patch.target, "list");
        assert_eq!(patch.element.tag(), "li");
        assert_eq!(ops[0].swap_mode(), Some(Swap::Append));
    }

    #[test]
    fn test_bind_empty_body_is_noop() {
        struct Nothing;
        impl Bindable for Nothing {
            fn fields() -> &'static [tether_core::FieldSpec] {
                &[]
            }
            fn bind_field(
                &mut self,
                path: tether_core::FieldPath<'_>,
                _value: tether_core::FieldValue,
            ) -> Result<(), tether_core::FieldError> {
                Err(tether_core::FieldError::UnknownField(path.to_string()))
            }
            fn field_kind(&self, _path: tether_core::FieldPath<'_>) -> Option<tether_core::FieldKind> {
                None
            }
            fn encode_fields(&self, _prefix: &str, _out: &mut Vec<tether_core::FieldItem>) {}
        }

        Context::detached().bind(&mut Nothing).unwrap();
    }

    #[tokio::test]
    async fn test_push_without_hub_reports_nothing() {
        let report = Context::detached()
            .push(vec![PatchOperation::Reload])
            .await
            .unwrap();
        assert_eq!(report, PushReport::default());
    }
}
