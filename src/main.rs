//! routekit demo server.
//!
//! A small todo list served through one `Router`:
//!
//! ```text
//! GET    /                              page listing the todos
//! GET    /api/todos                     all todos (initial load)
//! POST   /api/todos                     create       {"title": "..."}
//! POST   /api/todos/{id}/toggle         flip done
//! DELETE /api/todos/{id}                remove (Authorization: Bearer <token>)
//! GET    /api/todos/events?done=bool    live watch events, replayable
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::http::Method;
use clap::Parser;
use serde::{Deserialize, Serialize};

use routekit::client::{Identified, WatchEvent};
use routekit::config::{load_config, AppConfig};
use routekit::lifecycle::{self, Shutdown};
use routekit::observability::logging;
use routekit::route::{NoParams, Route};
use routekit::router::auth::bearer_token;
use routekit::router::{
    allow, ApiSpec, AuthFailure, AuthOutcome, BoxError, Call, HandlerError, HttpError, Json,
    NoBody, Page, RequestHead, RouterBuilder, SseSpec,
};
use routekit::sse::SseChannel;

const TOKEN_ENV: &str = "ROUTEKIT_DEMO_TOKEN";

#[derive(Parser)]
#[command(name = "routekit")]
#[command(about = "Typed routes, dispatch and live SSE feeds (todo demo)", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Todo {
    id: u64,
    title: String,
    done: bool,
}

impl Identified for Todo {
    type Id = u64;

    fn identifier(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TodoId {
    id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NewTodo {
    title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FeedFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    done: Option<bool>,
}

struct Store {
    next_id: u64,
    todos: Vec<Todo>,
}

struct App {
    store: Mutex<Store>,
    token: String,
}

type Feed = Arc<SseChannel<FeedFilter, WatchEvent<Todo>>>;

struct Specs {
    list: ApiSpec<NoParams, NoBody, Json<Vec<Todo>>>,
    create: ApiSpec<NoParams, Json<NewTodo>, Json<Todo>>,
    toggle: ApiSpec<TodoId, NoBody, Json<Todo>>,
    delete: ApiSpec<TodoId, NoBody, NoBody>,
    events: SseSpec<FeedFilter, WatchEvent<Todo>>,
    index: Route<NoParams>,
}

impl Specs {
    fn new() -> Result<Self, routekit::TemplateError> {
        Ok(Self {
            list: ApiSpec::new(Method::GET, Route::new("/api/todos")?)
                .tagged("todos", "Todo list"),
            create: ApiSpec::new(Method::POST, Route::new("/api/todos")?)
                .tagged("todos", "Todo list"),
            toggle: ApiSpec::new(Method::POST, Route::new("/api/todos/{id:number}/toggle")?)
                .tagged("todos", "Todo list"),
            delete: ApiSpec::new(Method::DELETE, Route::new("/api/todos/{id:number}")?)
                .tagged("todos", "Todo list"),
            events: SseSpec::new(Route::new("/api/todos/events?{done:boolean}")?),
            index: Route::new("/")?,
        })
    }
}

async fn require_token<P>(
    request: RequestHead,
    context: Arc<App>,
    _params: P,
) -> Result<AuthOutcome<()>, BoxError> {
    match bearer_token(&request.headers) {
        Some(token) if token == context.token => Ok(Ok(())),
        Some(_) => Ok(Err(AuthFailure::message("invalid token"))),
        None => Ok(Err(AuthFailure::message("missing bearer token"))),
    }
}

fn render_index(todos: &[Todo]) -> String {
    let items: String = todos
        .iter()
        .map(|todo| {
            format!(
                "<li data-id=\"{}\">{}{}</li>",
                todo.id,
                if todo.done { "[x] " } else { "[ ] " },
                escape(&todo.title)
            )
        })
        .collect();
    format!("<head><title>todos</title></head><body><ul>{items}</ul></body>")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn build_router(
    config: &AppConfig,
    specs: &Specs,
    token: String,
) -> Result<routekit::Router<App>, Box<dyn std::error::Error>> {
    let app = App {
        store: Mutex::new(Store {
            next_id: 1,
            todos: Vec::new(),
        }),
        token,
    };
    let mut builder = RouterBuilder::new(app, config.router_settings());

    let feed: Feed = builder.server_sent_events(&specs.events, allow, |filter, event| {
        filter.done.map_or(true, |done| event.item().done == done)
    })?;

    builder.page(specs.index.clone(), allow, |call: Call<App, NoParams, (), ()>| async move {
        let store = call.context.store.lock().expect("store mutex poisoned");
        Ok::<_, HandlerError>(Page::Html(render_index(&store.todos)))
    })?;

    builder.api(&specs.list, allow, |call: Call<App, NoParams, (), ()>| async move {
        let store = call.context.store.lock().expect("store mutex poisoned");
        Ok::<_, HandlerError>(store.todos.clone())
    })?;

    let published = feed.clone();
    builder.api(&specs.create, allow, move |call: Call<App, NoParams, NewTodo, ()>| {
        let feed = published.clone();
        async move {
            let title = call.body.title.trim().to_string();
            if title.is_empty() {
                return Err(HttpError::bad_request("title must not be empty").into());
            }
            let todo = {
                let mut store = call.context.store.lock().expect("store mutex poisoned");
                let todo = Todo {
                    id: store.next_id,
                    title,
                    done: false,
                };
                store.next_id += 1;
                store.todos.push(todo.clone());
                todo
            };
            feed.new_item(vec![WatchEvent::New(todo.clone())]);
            Ok::<_, HandlerError>(todo)
        }
    })?;

    let published = feed.clone();
    builder.api(&specs.toggle, allow, move |call: Call<App, TodoId, (), ()>| {
        let feed = published.clone();
        async move {
            let todo = {
                let mut store = call.context.store.lock().expect("store mutex poisoned");
                let todo = store
                    .todos
                    .iter_mut()
                    .find(|todo| todo.id == call.params.id)
                    .ok_or_else(|| HttpError::not_found(format!("no todo {}", call.params.id)))?;
                todo.done = !todo.done;
                todo.clone()
            };
            feed.new_item(vec![WatchEvent::Updated(todo.clone())]);
            Ok::<_, HandlerError>(todo)
        }
    })?;

    let published = feed;
    builder.api(&specs.delete, require_token, move |call: Call<App, TodoId, (), ()>| {
        let feed = published.clone();
        async move {
            let removed = {
                let mut store = call.context.store.lock().expect("store mutex poisoned");
                let index = store
                    .todos
                    .iter()
                    .position(|todo| todo.id == call.params.id)
                    .ok_or_else(|| HttpError::not_found(format!("no todo {}", call.params.id)))?;
                store.todos.remove(index)
            };
            feed.new_item(vec![WatchEvent::Deleted(removed)]);
            Ok::<_, HandlerError>(())
        }
    })?;

    Ok(builder.build())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("routekit v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        mode = ?config.router.mode,
        sse_retention_minutes = config.sse.retention_minutes,
        "Configuration loaded"
    );

    let token = std::env::var(TOKEN_ENV).unwrap_or_else(|_| "demo".to_string());
    let specs = Specs::new()?;
    let router = build_router(&config, &specs, token)?;

    let declared = [
        specs.list.declared(),
        specs.create.declared(),
        specs.toggle.declared(),
        specs.delete.declared(),
        specs.events.declared(),
        (&specs.index).into(),
    ];
    if let Some(missing) = router.find_unimplemented(&declared) {
        tracing::error!(method = %missing.method, route = %missing.template, "Route declared but not implemented");
        return Err(format!("unimplemented route: {} {}", missing.method, missing.template).into());
    }

    lifecycle::serve(&config, router, Shutdown::new()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
