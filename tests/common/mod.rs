//! Shared fixture: an item store served by a real routekit server.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::Method;
use serde::{Deserialize, Serialize};

use routekit::client::{Identified, WatchEvent};
use routekit::http::HttpServer;
use routekit::lifecycle::Shutdown;
use routekit::route::{NoParams, Route};
use routekit::router::auth::bearer_token;
use routekit::router::{
    allow, ApiSpec, AuthFailure, AuthOutcome, BoxError, Call, HandlerError, HttpError, Json,
    NoBody, Page, RequestHead, RouterBuilder, RouterSettings, RunOptions, SseSpec,
};
use routekit::sse::SseChannel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: u64,
    pub owner: String,
    pub v: String,
}

impl Item {
    pub fn new(id: u64, owner: &str, v: &str) -> Self {
        Self {
            id,
            owner: owner.into(),
            v: v.into(),
        }
    }
}

impl Identified for Item {
    type Id = u64;

    fn identifier(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemId {
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

pub type Feed = Arc<SseChannel<OwnerFilter, WatchEvent<Item>>>;

pub struct Specs {
    pub list: ApiSpec<OwnerFilter, NoBody, Json<Vec<Item>>>,
    pub put: ApiSpec<NoParams, Json<Item>, Json<Item>>,
    pub get: ApiSpec<ItemId, NoBody, Json<Item>>,
    pub delete: ApiSpec<ItemId, NoBody, NoBody>,
    pub events: SseSpec<OwnerFilter, WatchEvent<Item>>,
}

impl Specs {
    pub fn new() -> Self {
        Self {
            list: ApiSpec::new(Method::GET, Route::new("/items?{owner:string}").unwrap()),
            put: ApiSpec::new(Method::POST, Route::new("/items").unwrap()),
            get: ApiSpec::new(Method::GET, Route::new("/items/{id:number}").unwrap()),
            delete: ApiSpec::new(Method::DELETE, Route::new("/items/{id:number}").unwrap()),
            events: SseSpec::new(Route::new("/events?{owner:string}").unwrap()),
        }
    }
}

pub struct Store {
    pub items: Mutex<Vec<Item>>,
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub feed: Feed,
    pub specs: Specs,
    pub shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

async fn require_secret<P>(
    request: RequestHead,
    _context: Arc<Store>,
    _params: P,
) -> Result<AuthOutcome<String>, BoxError> {
    match bearer_token(&request.headers) {
        Some("secret") => Ok(Ok("admin".to_string())),
        Some("broken") => Err("token store offline".into()),
        _ => Ok(Err(AuthFailure::message("missing or wrong token"))),
    }
}

fn owned_by(filter: &OwnerFilter, item: &Item) -> bool {
    filter.owner.as_deref().map_or(true, |owner| owner == item.owner)
}

/// Bind the fixture on `addr` and serve it until the returned handle drops.
pub async fn start_server(addr: SocketAddr, options: RunOptions, settings: RouterSettings) -> TestServer {
    let specs = Specs::new();
    let store = Store {
        items: Mutex::new(Vec::new()),
    };
    let mut builder = RouterBuilder::new(store, settings);

    let feed: Feed = builder
        .server_sent_events(&specs.events, allow, |filter, event| {
            owned_by(filter, event.item())
        })
        .unwrap();

    builder
        .api(&specs.list, allow, |call: Call<Store, OwnerFilter, (), ()>| async move {
            let items: Vec<Item> = call
                .context
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|item| owned_by(&call.params, item))
                .cloned()
                .collect();
            Ok::<_, HandlerError>(items)
        })
        .unwrap();

    let published = feed.clone();
    builder
        .api(&specs.put, allow, move |call: Call<Store, NoParams, Item, ()>| {
            let feed = published.clone();
            async move {
                let item = call.body;
                let existed = {
                    let mut items = call.context.items.lock().unwrap();
                    let existed = items.iter().any(|i| i.id == item.id);
                    items.retain(|i| i.id != item.id);
                    items.push(item.clone());
                    existed
                };
                let event = if existed {
                    WatchEvent::Updated(item.clone())
                } else {
                    WatchEvent::New(item.clone())
                };
                feed.new_item(vec![event]);
                Ok::<_, HandlerError>(item)
            }
        })
        .unwrap();

    builder
        .api(&specs.get, allow, |call: Call<Store, ItemId, (), ()>| async move {
            let found = call
                .context
                .items
                .lock()
                .unwrap()
                .iter()
                .find(|item| item.id == call.params.id)
                .cloned();
            found.ok_or_else(|| HandlerError::from(HttpError::not_found("no such item")))
        })
        .unwrap();

    let published = feed.clone();
    builder
        .api(&specs.delete, require_secret, move |call: Call<Store, ItemId, (), String>| {
            let feed = published.clone();
            async move {
                let removed = {
                    let mut items = call.context.items.lock().unwrap();
                    let index = items
                        .iter()
                        .position(|item| item.id == call.params.id)
                        .ok_or_else(|| HandlerError::from(HttpError::not_found("no such item")))?;
                    items.remove(index)
                };
                feed.new_item(vec![WatchEvent::Deleted(removed)]);
                Ok::<_, HandlerError>(())
            }
        })
        .unwrap();

    builder
        .page(
            Route::<NoParams>::new("/").unwrap(),
            allow,
            |call: Call<Store, NoParams, (), ()>| async move {
                let count = call.context.items.lock().unwrap().len();
                Ok::<_, HandlerError>(Page::Html(format!("<body>{count} items</body>")))
            },
        )
        .unwrap();

    builder
        .page(
            Route::<NoParams>::new("/admin").unwrap(),
            require_secret,
            |call: Call<Store, NoParams, (), String>| async move {
                Ok::<_, HandlerError>(Page::Html(format!("<body>hello {}</body>", call.token)))
            },
        )
        .unwrap();

    let router = builder.build();
    let shutdown = Shutdown::new();
    let server = HttpServer::with_options(router, options, Duration::from_secs(60));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let serving = shutdown.clone();
    tokio::spawn(async move {
        let _ = server.run(listener, &serving).await;
    });

    TestServer {
        addr,
        feed,
        specs,
        shutdown,
    }
}

/// Client that never pools, so each test sees fresh connections.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Read from `response` until `needle` shows up or `wait` elapses.
pub async fn read_until(response: &mut reqwest::Response, needle: &str, wait: Duration) -> String {
    let mut seen = String::new();
    let _ = tokio::time::timeout(wait, async {
        while let Ok(Some(chunk)) = response.chunk().await {
            seen.push_str(&String::from_utf8_lossy(&chunk));
            if seen.contains(needle) {
                break;
            }
        }
    })
    .await;
    seen
}
