//! Registration and request dispatch.
//!
//! # Responsibilities
//! - Register endpoints in order, rejecting shadowed shapes in development
//! - Match requests first-wins on method and route
//! - Run the body → authorization → handler pipeline
//! - Translate every failure into a plain-text response
//!
//! # Design Decisions
//! - `RouterBuilder` is the only mutable phase; `build()` freezes it
//! - Endpoints are type-erased behind `Endpoint<C>` so one list holds all shapes
//! - `run` matches synchronously and hands the request back on a miss

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{request, HeaderMap, Method, Request, StatusCode, Uri};
use axum::response::Response;
use futures_util::future::{self, BoxFuture, FutureExt};
use percent_encoding::percent_decode_str;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::observability::metrics;
use crate::route::{Route, RouteShape};
use crate::router::auth::AuthOutcome;
use crate::router::body::{self, BodyCodec, NoBody};
use crate::router::error::{BoxError, HandlerError, RegistrationError};
use crate::router::respond;
use crate::router::spec::{ApiSpec, Declared, Page, Returns, SpecInfo, SseSpec, Tag};
use crate::sse::{frame, SseChannel, SseEndpoint, SseSettings};

/// Method, URI and headers of an incoming request, detached from its body.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestHead {
    pub fn path_and_query(&self) -> &str {
        self.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }

    /// `Last-Event-ID` header, falling back to the `last-event-id` query parameter.
    pub fn last_event_id(&self) -> Option<String> {
        if let Some(value) = self
            .headers
            .get("last-event-id")
            .and_then(|v| v.to_str().ok())
        {
            return Some(value.to_string());
        }
        self.uri.query()?.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (key == frame::LAST_EVENT_ID_PARAM)
                .then(|| percent_decode_str(value).decode_utf8_lossy().into_owned())
        })
    }
}

impl From<request::Parts> for RequestHead {
    fn from(parts: request::Parts) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
        }
    }
}

/// Everything a handler gets to work with.
pub struct Call<C, P, B, T> {
    pub context: Arc<C>,
    pub params: P,
    pub body: B,
    pub token: T,
    pub request: RequestHead,
}

/// Per-run options supplied by the hosting server.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Where plain authorization failures redirect instead of answering 401.
    pub redirect_on_unauthorized_page: Option<String>,
}

/// Outcome of [`Router::run`].
pub enum Dispatch {
    /// A spec claimed the request; awaiting the future produces the response.
    Matched(BoxFuture<'static, Response>),
    /// Nothing matched. The caller owns the request again and decides (usually 404).
    Unmatched(Request<Body>),
}

impl Dispatch {
    pub fn is_matched(&self) -> bool {
        matches!(self, Dispatch::Matched(_))
    }
}

/// Router-wide settings, usually derived from configuration.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Reject shadowed routes at registration and enable `find_unimplemented`.
    pub development: bool,
    pub max_body_bytes: usize,
    pub sse: SseSettings,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            development: true,
            max_body_bytes: 2 * 1024 * 1024,
            sse: SseSettings::default(),
        }
    }
}

type BoxedAuth<C, P, T> = Arc<
    dyn Fn(RequestHead, Arc<C>, P) -> BoxFuture<'static, Result<AuthOutcome<T>, BoxError>>
        + Send
        + Sync,
>;

type BoxedHandler<C, P, B, T> =
    Arc<dyn Fn(Call<C, P, B, T>) -> BoxFuture<'static, Result<Response, HandlerError>> + Send + Sync>;

trait Endpoint<C>: Send + Sync {
    fn info(&self) -> &SpecInfo;

    fn dispatch(&self, context: &Arc<C>, opts: &RunOptions, request: Request<Body>) -> Dispatch;
}

struct TypedEndpoint<C, P, B: BodyCodec, T> {
    info: Arc<SpecInfo>,
    route: Route<P>,
    auth: BoxedAuth<C, P, T>,
    handler: BoxedHandler<C, P, B::Value, T>,
    max_body_bytes: usize,
    _body: PhantomData<fn() -> B>,
}

impl<C, P, B, T> Endpoint<C> for TypedEndpoint<C, P, B, T>
where
    C: Send + Sync + 'static,
    P: DeserializeOwned + Clone + Send + Sync + 'static,
    B: BodyCodec,
    T: Send + 'static,
{
    fn info(&self) -> &SpecInfo {
        &self.info
    }

    fn dispatch(&self, context: &Arc<C>, opts: &RunOptions, request: Request<Body>) -> Dispatch {
        if !request
            .method()
            .as_str()
            .eq_ignore_ascii_case(self.info.method.as_str())
        {
            return Dispatch::Unmatched(request);
        }
        let raw = request.uri().path_and_query().map_or("/", |pq| pq.as_str());
        let params = match self.route.parse(raw) {
            Ok(params) => params,
            Err(_) => return Dispatch::Unmatched(request),
        };

        let pipeline = Pipeline::<C, P, B, T> {
            info: self.info.clone(),
            auth: self.auth.clone(),
            handler: self.handler.clone(),
            context: context.clone(),
            redirect_on_unauthorized: opts.redirect_on_unauthorized_page.clone(),
            max_body_bytes: self.max_body_bytes,
            _body: PhantomData,
        };
        Dispatch::Matched(Box::pin(pipeline.run(params, request)))
    }
}

/// One matched request on its way through body, authorization and handler.
struct Pipeline<C, P, B: BodyCodec, T> {
    info: Arc<SpecInfo>,
    auth: BoxedAuth<C, P, T>,
    handler: BoxedHandler<C, P, B::Value, T>,
    context: Arc<C>,
    redirect_on_unauthorized: Option<String>,
    max_body_bytes: usize,
    _body: PhantomData<fn() -> B>,
}

impl<C, P, B, T> Pipeline<C, P, B, T>
where
    C: Send + Sync + 'static,
    P: Clone + Send + 'static,
    B: BodyCodec,
    T: Send + 'static,
{
    async fn run(self, params: P, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let info = self.info.clone();

        let response = self.serve(params, request).await;

        metrics::record_request(
            method.as_str(),
            &info.template,
            response.status().as_u16(),
            start,
        );
        response
    }

    async fn serve(self, params: P, request: Request<Body>) -> Response {
        let (parts, incoming) = request.into_parts();
        let head = RequestHead::from(parts);

        let (raw_body, body) = match body::read::<B>(incoming, self.max_body_bytes).await {
            Ok(read) => read,
            Err(error) => {
                tracing::error!(
                    method = %head.method,
                    url = %head.uri,
                    error = %error,
                    "Failed to decode request body"
                );
                return respond::text(StatusCode::BAD_REQUEST, error.to_string());
            }
        };

        let token = match (self.auth)(head.clone(), self.context.clone(), params.clone()).await {
            Ok(Ok(token)) => token,
            Ok(Err(failure)) => {
                tracing::debug!(url = %head.uri, failure = ?failure, "Authorization refused");
                return failure.into_response(self.redirect_on_unauthorized.as_deref());
            }
            Err(error) => {
                tracing::error!(
                    method = %head.method,
                    url = %head.uri,
                    headers = ?head.headers,
                    error = %error,
                    "Authorization function failed"
                );
                return respond::text(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Server error: {error}"),
                );
            }
        };

        let call = Call {
            context: self.context,
            params,
            body,
            token,
            request: head.clone(),
        };
        match (self.handler)(call).await {
            Ok(response) => response,
            Err(error) => {
                let status = error.status();
                tracing::error!(
                    method = %head.method,
                    url = %head.uri,
                    route = %self.info.template,
                    body = %String::from_utf8_lossy(&raw_body),
                    status = status.as_u16(),
                    error = ?error,
                    "Handler failed"
                );
                respond::text(status, format!("Server error: {error}"))
            }
        }
    }
}

fn handler_fn<C, P, B, T, F>(f: F) -> BoxedHandler<C, P, B, T>
where
    F: Fn(Call<C, P, B, T>) -> BoxFuture<'static, Result<Response, HandlerError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

fn auth_fn<C, P, T, F>(f: F) -> BoxedAuth<C, P, T>
where
    F: Fn(RequestHead, Arc<C>, P) -> BoxFuture<'static, Result<AuthOutcome<T>, BoxError>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

async fn encode_api<R, F>(pending: F) -> Result<Response, HandlerError>
where
    R: BodyCodec,
    F: Future<Output = Result<R::Value, HandlerError>>,
{
    let value = pending.await?;
    Ok(match R::encode(&value)? {
        Some(bytes) => respond::json(bytes),
        None => respond::text(StatusCode::OK, ""),
    })
}

async fn render_page<F>(pending: F) -> Result<Response, HandlerError>
where
    F: Future<Output = Result<Page, HandlerError>>,
{
    Ok(match pending.await? {
        Page::Html(markup) => respond::html(&markup),
        Page::Redirect(location) => respond::redirect(&location),
    })
}

/// Mutable registration phase of a [`Router`].
pub struct RouterBuilder<C> {
    context: Arc<C>,
    settings: RouterSettings,
    endpoints: Vec<Box<dyn Endpoint<C>>>,
    sse_channels: Vec<Arc<dyn SseEndpoint>>,
}

impl<C> RouterBuilder<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(context: C, settings: RouterSettings) -> Self {
        Self::with_shared_context(Arc::new(context), settings)
    }

    pub fn with_shared_context(context: Arc<C>, settings: RouterSettings) -> Self {
        Self {
            context,
            settings,
            endpoints: Vec::new(),
            sse_channels: Vec::new(),
        }
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    /// Register an endpoint whose handler builds the whole response itself.
    pub fn custom<P, B, T, A, AF, H, HF>(
        &mut self,
        method: Method,
        route: Route<P>,
        auth: A,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        P: DeserializeOwned + Clone + Send + Sync + 'static,
        B: BodyCodec,
        T: Send + 'static,
        A: Fn(RequestHead, Arc<C>, P) -> AF + Send + Sync + 'static,
        AF: Future<Output = Result<AuthOutcome<T>, BoxError>> + Send + 'static,
        H: Fn(Call<C, P, B::Value, T>) -> HF + Send + Sync + 'static,
        HF: Future<Output = Result<Response, HandlerError>> + Send + 'static,
    {
        self.register::<P, B, T, A, AF>(
            method,
            route,
            Returns::None,
            Vec::new(),
            auth,
            handler_fn(move |call| handler(call).boxed()),
        )
    }

    /// Register a JSON API endpoint described by `spec`.
    pub fn api<P, B, R, T, A, AF, H, HF>(
        &mut self,
        spec: &ApiSpec<P, B, R>,
        auth: A,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        P: DeserializeOwned + Clone + Send + Sync + 'static,
        B: BodyCodec,
        R: BodyCodec,
        T: Send + 'static,
        A: Fn(RequestHead, Arc<C>, P) -> AF + Send + Sync + 'static,
        AF: Future<Output = Result<AuthOutcome<T>, BoxError>> + Send + 'static,
        H: Fn(Call<C, P, B::Value, T>) -> HF + Send + Sync + 'static,
        HF: Future<Output = Result<R::Value, HandlerError>> + Send + 'static,
    {
        let returns = if R::READS_BODY {
            Returns::Json
        } else {
            Returns::None
        };
        self.register::<P, B, T, A, AF>(
            spec.method.clone(),
            spec.route.clone(),
            returns,
            spec.tags.clone(),
            auth,
            handler_fn(move |call| encode_api::<R, _>(handler(call)).boxed()),
        )
    }

    /// Register a GET page rendering markup or redirecting.
    pub fn page<P, T, A, AF, H, HF>(
        &mut self,
        route: Route<P>,
        auth: A,
        handler: H,
    ) -> Result<(), RegistrationError>
    where
        P: DeserializeOwned + Clone + Send + Sync + 'static,
        T: Send + 'static,
        A: Fn(RequestHead, Arc<C>, P) -> AF + Send + Sync + 'static,
        AF: Future<Output = Result<AuthOutcome<T>, BoxError>> + Send + 'static,
        H: Fn(Call<C, P, (), T>) -> HF + Send + Sync + 'static,
        HF: Future<Output = Result<Page, HandlerError>> + Send + 'static,
    {
        self.register::<P, NoBody, T, A, AF>(
            Method::GET,
            route,
            Returns::Html,
            vec![Tag::new("pages", "")],
            auth,
            handler_fn(move |call| render_page(handler(call)).boxed()),
        )
    }

    /// Register an SSE endpoint and return the channel producers publish to.
    pub fn server_sent_events<P, I, T, A, AF, F>(
        &mut self,
        spec: &SseSpec<P, I>,
        auth: A,
        filter: F,
    ) -> Result<Arc<SseChannel<P, I>>, RegistrationError>
    where
        P: DeserializeOwned + Clone + Send + Sync + 'static,
        I: Serialize + Send + Sync + 'static,
        T: Send + 'static,
        A: Fn(RequestHead, Arc<C>, P) -> AF + Send + Sync + 'static,
        AF: Future<Output = Result<AuthOutcome<T>, BoxError>> + Send + 'static,
        F: Fn(&P, &I) -> bool + Send + Sync + 'static,
    {
        let channel = Arc::new(SseChannel::new(
            spec.route.template(),
            &self.settings.sse,
            filter,
        ));
        let serving = channel.clone();
        self.register::<P, NoBody, T, A, AF>(
            Method::GET,
            spec.route.clone(),
            Returns::EventStream,
            Vec::new(),
            auth,
            handler_fn(move |call: Call<C, P, (), T>| {
                let last_event_id = call.request.last_event_id();
                let response = serving.response(call.params, last_event_id.as_deref());
                future::ready(Ok(response)).boxed()
            }),
        )?;
        self.sse_channels.push(channel.clone());
        Ok(channel)
    }

    fn register<P, B, T, A, AF>(
        &mut self,
        method: Method,
        route: Route<P>,
        returns: Returns,
        tags: Vec<Tag>,
        auth: A,
        handler: BoxedHandler<C, P, B::Value, T>,
    ) -> Result<(), RegistrationError>
    where
        P: DeserializeOwned + Clone + Send + Sync + 'static,
        B: BodyCodec,
        T: Send + 'static,
        A: Fn(RequestHead, Arc<C>, P) -> AF + Send + Sync + 'static,
        AF: Future<Output = Result<AuthOutcome<T>, BoxError>> + Send + 'static,
    {
        let shape = route.shape();
        if self.settings.development {
            self.check_collision(&method, route.template(), &shape)?;
        }

        let info = SpecInfo {
            method,
            template: route.template().to_string(),
            shape,
            reads_body: B::READS_BODY,
            returns,
            tags,
        };
        tracing::debug!(method = %info.method, route = %info.template, "Registered endpoint");

        self.endpoints.push(Box::new(TypedEndpoint::<C, P, B, T> {
            info: Arc::new(info),
            route,
            auth: auth_fn(move |head, context, params| auth(head, context, params).boxed()),
            handler,
            max_body_bytes: self.settings.max_body_bytes,
            _body: PhantomData,
        }));
        Ok(())
    }

    fn check_collision(
        &self,
        method: &Method,
        template: &str,
        shape: &RouteShape,
    ) -> Result<(), RegistrationError> {
        let existing = self.endpoints.iter().map(|e| e.info()).find(|info| {
            info.method.as_str().eq_ignore_ascii_case(method.as_str()) && &info.shape == shape
        });
        match existing {
            Some(info) => Err(RegistrationError {
                method: method.clone(),
                template: template.to_string(),
                existing: info.template.clone(),
                shape: shape.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Freeze the registrations.
    pub fn build(self) -> Router<C> {
        tracing::info!(
            endpoints = self.endpoints.len(),
            sse_channels = self.sse_channels.len(),
            development = self.settings.development,
            "Router built"
        );
        Router {
            context: self.context,
            endpoints: self.endpoints,
            sse_channels: self.sse_channels,
            development: self.settings.development,
        }
    }
}

/// Frozen, ordered list of endpoints. First match wins.
pub struct Router<C> {
    context: Arc<C>,
    endpoints: Vec<Box<dyn Endpoint<C>>>,
    sse_channels: Vec<Arc<dyn SseEndpoint>>,
    development: bool,
}

impl<C> Router<C>
where
    C: Send + Sync + 'static,
{
    /// Try every endpoint in registration order.
    ///
    /// Matching is synchronous. On a miss the request comes back untouched and
    /// no response has been produced.
    pub fn run(&self, opts: &RunOptions, request: Request<Body>) -> Dispatch {
        let mut request = request;
        for endpoint in &self.endpoints {
            match endpoint.dispatch(&self.context, opts, request) {
                Dispatch::Unmatched(returned) => request = returned,
                matched => return matched,
            }
        }
        Dispatch::Unmatched(request)
    }

    pub fn context(&self) -> &Arc<C> {
        &self.context
    }

    pub fn specs(&self) -> impl Iterator<Item = &SpecInfo> {
        self.endpoints.iter().map(|e| e.info())
    }

    /// Every SSE channel registered on this router.
    pub fn sse_channels(&self) -> Vec<Arc<dyn SseEndpoint>> {
        self.sse_channels.clone()
    }

    /// First declared route with no endpoint registered for it.
    ///
    /// Always `None` outside development mode.
    pub fn find_unimplemented(&self, declared: &[Declared]) -> Option<Declared> {
        if !self.development {
            return None;
        }
        declared
            .iter()
            .find(|wanted| {
                !self.specs().any(|info| {
                    info.method == wanted.method && info.template == wanted.template
                })
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Params;
    use crate::router::auth::{allow, AuthFailure};
    use crate::router::body::Json;
    use crate::router::error::HttpError;
    use axum::body::to_bytes;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Seen {
        params: Mutex<Vec<Params>>,
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn expect_matched(router: &Router<Seen>, req: Request<Body>) -> Response {
        match router.run(&RunOptions::default(), req) {
            Dispatch::Matched(pending) => pending.await,
            Dispatch::Unmatched(req) => panic!("{} did not match", req.uri()),
        }
    }

    fn recording_router(templates: &[&str]) -> Router<Seen> {
        let mut builder = RouterBuilder::new(Seen::default(), RouterSettings::default());
        for template in templates {
            let route = Route::<Params>::new(template).unwrap();
            builder
                .custom::<_, NoBody, _, _, _, _, _>(
                    Method::GET,
                    route,
                    allow,
                    |call: Call<Seen, Params, (), ()>| async move {
                        call.context.params.lock().unwrap().push(call.params);
                        Ok(respond::text(StatusCode::OK, "ok"))
                    },
                )
                .unwrap();
        }
        builder.build()
    }

    #[tokio::test]
    async fn test_scenario_path_capture() {
        let router = recording_router(&["/abc/def/{id:number}/ghi"]);
        let response = expect_matched(&router, request(Method::GET, "/abc/def/666/ghi")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let seen = router.context().params.lock().unwrap().clone();
        assert_eq!(serde_json::Value::Object(seen[0].clone()), json!({"id": 666}));

        assert!(!router
            .run(&RunOptions::default(), request(Method::GET, "/haha"))
            .is_matched());
    }

    #[tokio::test]
    async fn test_scenario_optional_query() {
        let router = recording_router(&["/withparams/{text:string}?{p1:string}&{p2:number}"]);
        expect_matched(&router, request(Method::GET, "/withparams/mytext?p2=123")).await;
        let seen = router.context().params.lock().unwrap().clone();
        assert_eq!(
            serde_json::Value::Object(seen[0].clone()),
            json!({"text": "mytext", "p2": 123})
        );
        assert!(!seen[0].contains_key("p1"));
    }

    #[tokio::test]
    async fn test_method_is_matched_case_insensitively_and_in_order() {
        let router = recording_router(&["/a/{x:number}", "/b"]);
        assert!(!router
            .run(&RunOptions::default(), request(Method::POST, "/b"))
            .is_matched());
        let custom = Method::from_bytes(b"get").unwrap();
        assert!(router
            .run(&RunOptions::default(), request(custom, "/b"))
            .is_matched());
    }

    #[test]
    fn test_shadowed_route_is_rejected_in_development() {
        let mut builder = RouterBuilder::new((), RouterSettings::default());
        let first = Route::<Params>::new("/users/{id:number}").unwrap();
        let second = Route::<Params>::new("/users/{name:string}").unwrap();
        let handler = |_: Call<(), Params, (), ()>| async { Ok(respond::empty(StatusCode::OK)) };

        builder
            .custom::<_, NoBody, _, _, _, _, _>(Method::GET, first, allow, handler)
            .unwrap();
        let err = builder
            .custom::<_, NoBody, _, _, _, _, _>(Method::GET, second.clone(), allow, handler)
            .unwrap_err();
        assert_eq!(err.existing, "/users/{id:number}");

        builder
            .custom::<_, NoBody, _, _, _, _, _>(Method::DELETE, second, allow, handler)
            .unwrap();
    }

    #[test]
    fn test_shadowed_route_is_allowed_in_production() {
        let settings = RouterSettings {
            development: false,
            ..RouterSettings::default()
        };
        let mut builder = RouterBuilder::new((), settings);
        let handler = |_: Call<(), Params, (), ()>| async { Ok(respond::empty(StatusCode::OK)) };
        for template in ["/x/{a:number}", "/x/{b:string}"] {
            builder
                .custom::<_, NoBody, _, _, _, _, _>(
                    Method::GET,
                    Route::new(template).unwrap(),
                    allow,
                    handler,
                )
                .unwrap();
        }
        let router = builder.build();
        assert_eq!(router.specs().count(), 2);
        assert_eq!(router.find_unimplemented(&[Declared {
            method: Method::GET,
            template: "/nowhere".into(),
        }]), None);
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Item {
        id: u32,
        title: String,
    }

    fn api_router() -> (Router<()>, ApiSpec<Params, Json<Item>, Json<Item>>) {
        let spec = ApiSpec::<Params, Json<Item>, Json<Item>>::new(
            Method::POST,
            Route::new("/items").unwrap(),
        );
        let mut builder = RouterBuilder::new((), RouterSettings::default());
        builder
            .api(&spec, allow, |call: Call<(), Params, Item, ()>| async move {
                if call.body.id == 0 {
                    return Err(HandlerError::from(HttpError::new(422, "id must be positive")));
                }
                Ok(call.body)
            })
            .unwrap();
        (builder.build(), spec)
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn run_unit(router: &Router<()>, opts: &RunOptions, req: Request<Body>) -> Response {
        match router.run(opts, req) {
            Dispatch::Matched(pending) => pending.await,
            Dispatch::Unmatched(_) => panic!("expected a match"),
        }
    }

    #[tokio::test]
    async fn test_api_encodes_json_with_length() {
        let (router, _) = api_router();
        let response = run_unit(
            &router,
            &RunOptions::default(),
            post("/items", r#"{"id":1,"title":"a"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(response.headers()["content-length"], "20");
        assert_eq!(body_text(response).await, r#"{"id":1,"title":"a"}"#);
    }

    #[tokio::test]
    async fn test_api_body_errors_are_400() {
        let (router, _) = api_router();
        let response = run_unit(&router, &RunOptions::default(), post("/items", "{oops")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert!(body_text(response)
            .await
            .starts_with("Error while parsing body. Invalid Json!: "));

        let response =
            run_unit(&router, &RunOptions::default(), post("/items", r#"{"id":"x"}"#)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.starts_with("Error decoding body: "));
    }

    #[tokio::test]
    async fn test_handler_http_error_uses_its_code() {
        let (router, _) = api_router();
        let response = run_unit(
            &router,
            &RunOptions::default(),
            post("/items", r#"{"id":0,"title":"a"}"#),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_text(response).await, "Server error: id must be positive");
    }

    async fn deny(_: RequestHead, _: Arc<()>, _: Params) -> Result<AuthOutcome<()>, BoxError> {
        Ok(Err(AuthFailure::message("no session")))
    }

    async fn explode(_: RequestHead, _: Arc<()>, _: Params) -> Result<AuthOutcome<()>, BoxError> {
        Err("auth backend down".into())
    }

    async fn send_elsewhere(
        _: RequestHead,
        _: Arc<()>,
        _: Params,
    ) -> Result<AuthOutcome<()>, BoxError> {
        Ok(Err(AuthFailure::Redirect("/elsewhere".into())))
    }

    fn page_router<A, AF>(auth: A) -> Router<()>
    where
        A: Fn(RequestHead, Arc<()>, Params) -> AF + Send + Sync + 'static,
        AF: Future<Output = Result<AuthOutcome<()>, BoxError>> + Send + 'static,
    {
        let mut builder = RouterBuilder::new((), RouterSettings::default());
        builder
            .page(
                Route::new("/home").unwrap(),
                auth,
                |_: Call<(), Params, (), ()>| async { Ok(Page::Html("<body>hi</body>".into())) },
            )
            .unwrap();
        builder.build()
    }

    #[tokio::test]
    async fn test_page_renders_document() {
        let router = page_router(allow);
        let response = run_unit(&router, &RunOptions::default(), request(Method::GET, "/home")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/html; charset=utf-8");
        assert_eq!(response.headers()["cache-control"], "no-cache");
        assert_eq!(
            body_text(response).await,
            "<!DOCTYPE html><html><body>hi</body></html>"
        );
    }

    #[tokio::test]
    async fn test_auth_failures() {
        let router = page_router(deny);
        let response = run_unit(&router, &RunOptions::default(), request(Method::GET, "/home")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await, "Failed to authorize: no session");

        let opts = RunOptions {
            redirect_on_unauthorized_page: Some("/login".into()),
        };
        let response = run_unit(&router, &opts, request(Method::GET, "/home")).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()["location"], "/login");

        let router = page_router(send_elsewhere);
        for opts in [RunOptions::default(), opts] {
            let response = run_unit(&router, &opts, request(Method::GET, "/home")).await;
            assert_eq!(response.status(), StatusCode::FOUND);
            assert_eq!(response.headers()["location"], "/elsewhere");
        }

        let router = page_router(explode);
        let response = run_unit(&router, &RunOptions::default(), request(Method::GET, "/home")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "Server error: auth backend down");
    }

    #[test]
    fn test_find_unimplemented() {
        let (router, spec) = api_router();
        let missing = SseSpec::<Params, Item>::new(Route::new("/items/events").unwrap());
        assert_eq!(router.find_unimplemented(&[spec.declared()]), None);
        assert_eq!(
            router.find_unimplemented(&[spec.declared(), missing.declared()]),
            Some(missing.declared())
        );
    }

    #[test]
    fn test_last_event_id_sources() {
        let mut head = RequestHead {
            method: Method::GET,
            uri: "/events?last-event-id=4".parse().unwrap(),
            headers: HeaderMap::new(),
        };
        assert_eq!(head.last_event_id().as_deref(), Some("4"));
        head.headers.insert("last-event-id", "9".parse().unwrap());
        assert_eq!(head.last_event_id().as_deref(), Some("9"));
        head.uri = "/events".parse().unwrap();
        head.headers.clear();
        assert_eq!(head.last_event_id(), None);
    }
}
