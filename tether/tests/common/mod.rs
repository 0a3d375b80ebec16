#![allow(dead_code)]

use axum::{
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use chrono::{DateTime, Utc};
use tether::{
    ActionResult, App, Bindable, BoxError, Context, Html, ServerConfig, SoftDelete, Target,
};

// ============================================================================
// Test Records
// ============================================================================

#[derive(Bindable, Debug, Default, Clone, PartialEq)]
pub struct Tag {
    pub label: String,
    pub weight: i16,
}

#[derive(Bindable, Debug, Default, Clone, PartialEq)]
pub struct Todo {
    pub title: String,
    #[bind(rename = "done")]
    pub completed: bool,
    pub priority: u8,
    pub estimate: f32,
    pub due: Option<DateTime<Utc>>,
    pub owner: Target,
    pub deleted_at: SoftDelete,
    #[bind(nested)]
    pub tags: Vec<Tag>,
    #[bind(nested)]
    pub primary: Option<Tag>,
    #[bind(skip)]
    pub cache: Vec<u8>,
}

// ============================================================================
// Test Actions
// ============================================================================

pub async fn add_todo(ctx: Context) -> ActionResult {
    let mut todo = Todo::default();
    ctx.bind(&mut todo)?;
    ctx.success(format!("added {}", todo.title));
    Ok(Html::new(format!(
        "<li id=\"todo\" data-priority=\"{}\">{}</li>",
        todo.priority, todo.title
    )))
}

pub async fn explode(_ctx: Context) -> ActionResult {
    panic!("boom")
}

pub async fn fail(_ctx: Context) -> ActionResult {
    Err("database unavailable".into())
}

/// An app with `add_todo` at `/__tether/todos-add` and a home page.
pub fn app() -> App {
    let app = App::new(ServerConfig::default());
    app.registry().register_named("todos.add", None, add_todo);
    app.registry().register_named("boom", None, explode);
    app.registry().register_named("fail", None, fail);
    app.page("/", |ctx: Context| async move {
        ctx.title("Todos");
        Ok::<_, BoxError>(Html::new("<main id=\"todos\"></main>"))
    })
    .page("/broken", |_ctx: Context| async move {
        if true {
            panic!("page exploded");
        }
        Ok::<_, BoxError>(Html::empty())
    })
}

// ============================================================================
// Helpers
// ============================================================================

pub fn json_post(path: &str, body: &str) -> Request<Body> {
    Request::post(path)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
