//! End-to-end dispatch scenarios through an in-memory listener.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, Method, StatusCode};
use futures_util::future::BoxFuture;
use tokio::sync::Notify;

use modhttp::http::{HttpException, JsonExceptionHandler};
use modhttp::modules::{ActionModule, ModuleGroup, RoutingModule};
use modhttp::net::ListenerError;
use modhttp::session::LocalSessionManager;
use modhttp::webapi::{
    AsyncAction, Controller, ControllerScope, Param, RequestDataProvider, SyncAction, WebApiModule,
};
use modhttp::{ConfigurationError, HandlerError, ServerError, ServerState, WebServer};

mod common;

use common::{body_text, request, with_header, TestServer};

#[derive(Default)]
struct Greeter {
    scope: Option<ControllerScope>,
}

impl Controller for Greeter {
    fn attach(&mut self, scope: ControllerScope) {
        self.scope = Some(scope);
    }
}

impl Greeter {
    fn say_hi(&mut self, name: String) -> Result<String, HandlerError> {
        Ok(format!("Hello, {name}"))
    }

    fn item(&mut self, id: u32) -> Result<serde_json::Value, HandlerError> {
        Ok(serde_json::json!({ "id": id }))
    }

    fn touch(&mut self) -> Result<(), HandlerError> {
        Ok(())
    }

    fn visits<'c>(&'c mut self) -> BoxFuture<'c, Result<serde_json::Value, HandlerError>> {
        Box::pin(async move {
            let scope = self
                .scope
                .as_ref()
                .ok_or_else(|| HandlerError::Unhandled(anyhow::anyhow!("not attached")))?;
            let session = scope.context.session();
            let visits = session.get_as::<u64>("visits").unwrap_or(0) + 1;
            session.set("visits", serde_json::json!(visits));
            Ok(serde_json::json!(visits))
        })
    }

    fn whoami(&mut self, user: String) -> Result<String, HandlerError> {
        Ok(user)
    }
}

struct HeaderUser;

#[async_trait]
impl RequestDataProvider<Greeter, String> for HeaderUser {
    async fn provide(&self, controller: &Greeter, _parameter: &str) -> Result<String, HandlerError> {
        controller
            .scope
            .as_ref()
            .and_then(|scope| scope.context.request().header("x-user").map(str::to_string))
            .ok_or_else(|| HttpException::unauthorized().into())
    }
}

fn greeter_module() -> WebApiModule {
    let mut api = WebApiModule::new("api");
    api.provide::<Greeter, String, _>(HeaderUser);
    api.controller(Greeter::default)
        .unwrap()
        .get("/hi/{name}", "say_hi", (Param::<String>::named("name"),), SyncAction(Greeter::say_hi))
        .unwrap()
        .get("/items/{id}", "item", (Param::<u32>::named("id"),), SyncAction(Greeter::item))
        .unwrap()
        .post("/touch", "touch", (), SyncAction(Greeter::touch))
        .unwrap()
        .get("/visits", "visits", (), AsyncAction(Greeter::visits))
        .unwrap()
        .get("/me", "whoami", (Param::<String>::injected("user"),), SyncAction(Greeter::whoami))
        .unwrap();
    api
}

fn greeter_server() -> WebServer {
    let mut server = WebServer::new();
    server.register("/api", greeter_module()).unwrap();
    server
}

#[tokio::test]
async fn greeter_binds_route_value() {
    let server = TestServer::start(greeter_server()).await;

    let response = server.get("/api/hi/Ann").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(body_text(response).await, r#""Hello, Ann""#);

    let (_, result) = server.stop().await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn percent_encoded_route_values_are_decoded() {
    let server = TestServer::start(greeter_server()).await;

    let response = server.get("/api/hi/Ann%20Lee").await;
    assert_eq!(body_text(response).await, r#""Hello, Ann Lee""#);

    let response = server.get("/api/hi/a%2Fb").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, r#""Hello, a/b""#);

    server.stop().await;
}

#[tokio::test]
async fn unmatched_path_is_404() {
    let server = TestServer::start(greeter_server()).await;

    let response = server.get("/api/nothing/here").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(response).await, "404 Not Found");

    let response = server.get("/elsewhere").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    server.stop().await;
}

#[tokio::test]
async fn wrong_verb_is_405_with_allow_header() {
    let server = TestServer::start(greeter_server()).await;

    let response = server.get("/api/touch").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "POST");

    server.stop().await;
}

#[tokio::test]
async fn conversion_failure_is_400() {
    let server = TestServer::start(greeter_server()).await;

    let response = server.get("/api/items/abc").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("'id'"));

    let response = server.get("/api/items/7").await;
    assert_eq!(body_text(response).await, r#"{"id":7}"#);

    server.stop().await;
}

#[tokio::test]
async fn void_method_reports_handled() {
    let server = TestServer::start(greeter_server()).await;

    let response = server.send(request(Method::POST, "/api/touch")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.is_empty());

    server.stop().await;
}

#[tokio::test]
async fn injected_parameter_uses_provider() {
    let server = TestServer::start(greeter_server()).await;

    let response = server
        .send(with_header(request(Method::GET, "/api/me"), "x-user", "ann"))
        .await;
    assert_eq!(body_text(response).await, r#""ann""#);

    let response = server.get("/api/me").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    server.stop().await;
}

#[tokio::test]
async fn session_survives_between_requests() {
    let mut server = greeter_server();
    server
        .set_session_manager(Arc::new(LocalSessionManager::new("sid", Duration::from_secs(60))))
        .unwrap();
    let server = TestServer::start(server).await;

    let first = server.get("/api/visits").await;
    let cookie = first.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("sid="));
    assert_eq!(body_text(first).await, "1");

    let second = server
        .send(with_header(request(Method::GET, "/api/visits"), "cookie", &cookie))
        .await;
    assert!(second.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_text(second).await, "2");

    server.stop().await;
}

#[tokio::test]
async fn terminal_module_stops_the_chain() {
    let later = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&later);

    let mut server = WebServer::new();
    server
        .register("/x", ActionModule::new("gate", |_, _| Ok(false)).terminal())
        .unwrap()
        .register(
            "/x",
            ActionModule::new("after", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }),
        )
        .unwrap();
    let server = TestServer::start(server).await;

    let response = server.get("/x").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(later.load(Ordering::SeqCst), 0);

    server.stop().await;
}

#[tokio::test]
async fn groups_nest_base_paths() {
    let mut routes = RoutingModule::new("status");
    routes
        .get("/ping/{n}", |ctx, route| {
            let n = route.by_name("n").unwrap_or_default().to_string();
            ctx.response().write_text(&format!("pong {n}"), "text/plain");
            Ok(true)
        })
        .unwrap();
    let group = ModuleGroup::new("v1").with("/status", routes).unwrap();

    let mut server = WebServer::new();
    server.register("/v1", group).unwrap();
    let server = TestServer::start(server).await;

    let response = server.get("/v1/status/ping/3").await;
    assert_eq!(body_text(response).await, "pong 3");

    server.stop().await;
}

struct Disposable {
    disposed: Arc<AtomicUsize>,
}

impl Controller for Disposable {
    fn attach(&mut self, _scope: ControllerScope) {}

    fn dispose(&mut self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Disposable {
    fn forbidden(&mut self) -> Result<String, HandlerError> {
        Err(HttpException::forbidden().with_message("nope").into())
    }

    fn broken(&mut self) -> Result<bool, HandlerError> {
        Err(anyhow::anyhow!("database unreachable").into())
    }
}

#[tokio::test]
async fn failing_controller_is_disposed_once() {
    let disposed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&disposed);

    let mut api = WebApiModule::new("api");
    api.controller(move || Disposable {
        disposed: Arc::clone(&counter),
    })
    .unwrap()
    .get("/forbidden", "forbidden", (), SyncAction(Disposable::forbidden))
    .unwrap()
    .get("/broken", "broken", (), SyncAction(Disposable::broken))
    .unwrap();

    let mut server = WebServer::new();
    server.register("/", api).unwrap();
    let server = TestServer::start(server).await;

    let response = server.get("/forbidden").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(response).await, "nope");
    assert_eq!(disposed.load(Ordering::SeqCst), 1);

    let response = server.get("/broken").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");
    assert_eq!(body_text(response).await, "500 Internal Server Error");
    assert_eq!(disposed.load(Ordering::SeqCst), 2);

    server.stop().await;
}

#[tokio::test]
async fn json_exception_bodies() {
    let mut server = greeter_server();
    server.set_exception_handler(JsonExceptionHandler).unwrap();
    let server = TestServer::start(server).await;

    let response = server.get("/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["status"], 404);
    assert_eq!(body["error"], "Not Found");

    server.stop().await;
}

#[tokio::test]
async fn panic_becomes_500_and_server_keeps_serving() {
    let mut server = WebServer::new();
    server
        .register("/boom", ActionModule::new("boom", |_, _| panic!("kaboom")))
        .unwrap()
        .register("/api", greeter_module())
        .unwrap();
    let server = TestServer::start(server).await;

    let response = server.get("/boom").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = server.get("/api/hi/Bo").await;
    assert_eq!(response.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn cancellation_abandons_in_flight_request() {
    let entered = Arc::new(Notify::new());
    let signal = Arc::clone(&entered);

    let mut server = WebServer::new();
    server
        .register(
            "/slow",
            ActionModule::from_async("slow", move |ctx, _| {
                let signal = Arc::clone(&signal);
                async move {
                    signal.notify_one();
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    ctx.response().set_status(StatusCode::ACCEPTED);
                    Ok(true)
                }
            }),
        )
        .unwrap();
    let server = TestServer::start(server).await;

    let pending = server
        .sender
        .send(request(Method::GET, "/slow"))
        .await
        .unwrap();
    entered.notified().await;

    let (server, result) = server.stop().await;
    assert!(result.is_ok());
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.active_requests(), 0);
    assert!(pending.await.is_err(), "cancelled request must not be answered");
}

#[tokio::test]
async fn transient_accept_errors_are_survived() {
    let server = TestServer::start(greeter_server()).await;

    server
        .sender
        .fail(ListenerError::Accept(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
        .await
        .unwrap();
    let response = server.get("/api/hi/Cy").await;
    assert_eq!(response.status(), StatusCode::OK);

    server.stop().await;
}

#[tokio::test]
async fn fatal_listener_error_stops_the_loop() {
    let server = TestServer::start(greeter_server()).await;

    server
        .sender
        .fail(ListenerError::Closed("socket gone".to_string()))
        .await
        .unwrap();

    let (server, result) = server.join().await;
    assert!(matches!(result, Err(ServerError::Listener(ListenerError::Closed(_)))));
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn registration_is_locked_once_running() {
    let server = TestServer::start(greeter_server()).await;
    let (mut server, _) = server.stop().await;

    let err = server.register("/late", greeter_module()).err().unwrap();
    assert!(matches!(err, ConfigurationError::Locked));
}
