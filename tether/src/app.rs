//! The HTTP surface: pages, action dispatch, the patch socket and the
//! client script, wrapped in the session and security middleware.

use crate::{
    config::ServerConfig,
    respond, security, session, ws,
};
use axum::{
    Extension, Form, Router,
    body::{Body, Bytes},
    extract::{FromRequest, Multipart, Request, State},
    http::{HeaderMap, Method, StatusCode, header},
    middleware::from_fn_with_state,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use futures::{FutureExt, StreamExt};
use std::{panic::AssertUnwindSafe, sync::Arc};
use tether_core::{ActionError, BindError};
use tether_std::{
    action::{Action, SharedAction, shared},
    binder::Binder,
    context::{Context, RequestBody},
    hub::{Hub, SessionId},
    registry::{ActionRegistry, panic_message},
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tracing::{debug, error, info, warn};

/// Source of the bundled client.
pub const CLIENT_SCRIPT: &str = include_str!("client.js");

struct Shared {
    config: ServerConfig,
    registry: Arc<ActionRegistry>,
    hub: Arc<Hub>,
    binder: Binder,
}

/// State shared by every route and middleware.
#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<Shared>,
}

impl AppState {
    pub(crate) fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub(crate) fn registry(&self) -> &ActionRegistry {
        &self.inner.registry
    }

    pub(crate) fn hub(&self) -> &Arc<Hub> {
        &self.inner.hub
    }

    fn context(&self, session: SessionId, body: RequestBody) -> Context {
        Context::builder(session)
            .body(body)
            .binder(self.inner.binder)
            .hub(self.inner.hub.clone())
            .build()
    }
}

/// A tether application.
///
/// # Example
///
/// ```rust,ignore
/// let app = App::new(ServerConfig::default());
/// let add = app.registry().register_named("todos.add", None, add_todo);
/// let app = app.page("/", move |ctx: Context| {
///     let add = add.clone();
///     async move { render_index(&add) }
/// });
/// app.serve().await?;
/// ```
pub struct App {
    config: ServerConfig,
    registry: Arc<ActionRegistry>,
    hub: Arc<Hub>,
    pages: Vec<(String, SharedAction)>,
}

impl App {
    /// An application with an empty registry and a fresh hub.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ActionRegistry::with_base(config.action_base.clone()));
        let hub = Arc::new(Hub::new(config.hub));
        Self {
            config,
            registry,
            hub,
            pages: Vec::new(),
        }
    }

    /// The configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The action registry.
    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    /// The patch hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Serve the markup returned by `action` as a full document on `GET path`.
    pub fn page<A: Action>(mut self, path: impl Into<String>, action: A) -> Self {
        self.pages.push((path.into(), shared(action)));
        self
    }

    /// Build the router.
    ///
    /// Registered actions are reached through the fallback, so actions
    /// registered after this call are still dispatched.
    pub fn router(&self) -> Router {
        let state = AppState {
            inner: Arc::new(Shared {
                config: self.config.clone(),
                registry: self.registry.clone(),
                hub: self.hub.clone(),
                binder: Binder::new(self.config.limits),
            }),
        };

        let mut router = Router::new()
            .route(&self.config.script_path, get(client_script))
            .route(&self.config.socket_path, get(ws::upgrade));
        for (path, action) in &self.pages {
            let action = action.clone();
            router = router.route(
                path,
                get(
                    move |State(state): State<AppState>,
                          Extension(session): Extension<SessionId>| {
                        let action = action.clone();
                        async move { serve_page(state, action, session).await }
                    },
                ),
            );
        }

        router
            .fallback(dispatch_action)
            .layer(
                ServiceBuilder::new()
                    .layer(from_fn_with_state(state.clone(), security::security_headers))
                    .layer(from_fn_with_state(state.clone(), session::session_layer)),
            )
            .with_state(state)
    }

    /// Bind the configured address, start the session sweeper and serve
    /// until the listener fails.
    pub async fn serve(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.addr).await?;
        info!(addr = %listener.local_addr()?, "tether listening");
        let sweeper = self.hub.spawn_sweeper();
        let result = axum::serve(listener, self.router()).await;
        sweeper.abort();
        result
    }
}

async fn client_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        CLIENT_SCRIPT,
    )
}

async fn serve_page(state: AppState, action: SharedAction, session: SessionId) -> Response {
    let ctx = state.context(session, RequestBody::Empty);
    let outcome = AssertUnwindSafe(action.call_dyn(ctx.clone()))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(markup)) => {
            let config = state.config();
            Html(respond::document(
                markup.as_str(),
                &config.script_path,
                &config.socket_path,
                &ctx.take_ops(),
            ))
            .into_response()
        }
        Ok(Err(error)) => {
            error!(%error, "page failed");
            respond::page_error()
        }
        Err(payload) => {
            error!(panic = %panic_message(payload.as_ref()), "page panicked");
            respond::page_error()
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

async fn read_multipart(binder: &Binder, request: Request) -> Result<RequestBody, BindError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|rejection| BindError::Malformed(rejection.body_text()))?;
    let mut pairs = Vec::new();
    let mut total = 0;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|error| BindError::Malformed(error.body_text()))?
    {
        if field.file_name().is_some() {
            debug!(field = ?field.name(), "skipping file field");
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field
            .text()
            .await
            .map_err(|error| BindError::Malformed(error.body_text()))?;
        total += name.len() + value.len();
        binder.check_body(total)?;
        pairs.push((name, value));
    }
    Ok(RequestBody::Form(pairs))
}

/// Buffer a body, failing as soon as it grows past the size ceiling.
async fn collect_body(binder: &Binder, body: Body) -> Result<Bytes, BindError> {
    let mut chunks = body.into_data_stream();
    let mut buffer = Vec::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|error| BindError::Malformed(error.to_string()))?;
        binder.check_body(buffer.len() + chunk.len())?;
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}

/// Decode the body by content type. Size ceilings are checked before the
/// body is buffered.
async fn read_body(binder: &Binder, request: Request) -> Result<RequestBody, BindError> {
    if let Some(declared) = content_length(request.headers()) {
        binder.check_body(declared)?;
    }
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        return read_multipart(binder, request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = collect_body(binder, body).await?;

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let request = Request::from_parts(parts, Body::from(bytes));
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, &())
            .await
            .map_err(|rejection| BindError::Malformed(rejection.body_text()))?;
        return Ok(RequestBody::Form(pairs));
    }

    if bytes.is_empty() {
        Ok(RequestBody::Empty)
    } else {
        Ok(RequestBody::Json(bytes))
    }
}

async fn dispatch_action(
    State(state): State<AppState>,
    Extension(session): Extension<SessionId>,
    request: Request,
) -> Response {
    let path = request.uri().path().to_string();
    if request.method() != Method::POST || state.registry().lookup(&path).is_none() {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    let json = respond::wants_json(request.headers());

    let body = match read_body(&state.inner.binder, request).await {
        Ok(body) => body,
        Err(error) => {
            warn!(path, %error, "request body rejected");
            return respond::rejected(json, &error);
        }
    };

    let ctx = state.context(session, body);
    match state.registry().dispatch(&path, ctx.clone()).await {
        Ok(markup) => respond::action(json, markup.as_str(), ctx.take_ops()),
        Err(ActionError::NotFound(_)) => (StatusCode::NOT_FOUND, "not found").into_response(),
        Err(ActionError::Handler(error)) => match error.downcast_ref::<BindError>() {
            Some(bind) => {
                warn!(path, error = %bind, "action rejected its input");
                respond::rejected(json, bind)
            }
            None => {
                error!(path, %error, "action failed");
                respond::failed(json)
            }
        },
        Err(ActionError::Panic(_)) => respond::failed(json),
    }
}
