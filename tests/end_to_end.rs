use std::sync::{Arc, Mutex};

use pathway::context::Context;
use pathway::middleware::{LoggerMiddleware, Next, RecoveryMiddleware, from_fn};
use pathway::security::{AuthMiddleware, BearerTokenValidator, CorsConfig, CorsMiddleware};
use pathway::{Dispatcher, Request, Response, Router, Server, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn request(method: &str, target: &str, headers: &[(&str, &str)], body: &str) -> Request {
    let mut raw = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\n");
    for (name, value) in headers {
        raw.push_str(&format!("{name}: {value}\r\n"));
    }
    raw.push_str(&format!("Content-Length: {}\r\n\r\n{body}", body.len()));
    let (req, _) = Request::parse(raw.as_bytes()).unwrap();
    req
}

fn get(target: &str) -> Request {
    request("GET", target, &[], "")
}

fn body_json(res: &Response) -> Value {
    serde_json::from_slice(res.content()).unwrap()
}

async fn show_user(ctx: Context) -> Response {
    let id = ctx.param("id").unwrap_or_default().to_owned();
    ctx.write_json(StatusCode::Ok, &json!({ "id": id }))
}

async fn explode(_ctx: Context) -> Response {
    panic!("boom at the handler")
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
struct NewUser {
    name: String,
}

async fn create_user(ctx: Context) -> Response {
    match ctx.bind_json::<NewUser>() {
        Ok(user) => ctx.write_json(StatusCode::Created, &user),
        Err(err) => ctx.write_error_with_details(
            StatusCode::BadRequest,
            "Invalid request body",
            json!({ "reason": err.to_string() }),
        ),
    }
}

fn app() -> Dispatcher {
    let mut router = Router::new();
    router.use_middleware(LoggerMiddleware);
    router.use_middleware(RecoveryMiddleware::new());

    router.get("/health", |ctx: Context| async move { ctx.write_text(StatusCode::Ok, "ok") });
    router.get("/users/:id", show_user);
    router.get("/boom", explode);
    {
        let mut secured = router.group("");
        secured.use_middleware(AuthMiddleware::new(BearerTokenValidator::new("valid-token")));
        secured.post("/users", create_user);
    }
    router.build()
}

#[tokio::test]
async fn static_route_returns_its_handler_output() {
    let res = app().dispatch(get("/health")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(res.content(), b"ok");
}

#[tokio::test]
async fn user_by_id_echoes_the_parameter() {
    let res = app().dispatch(get("/users/7")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(body_json(&res), json!({ "id": "7" }));
}

#[tokio::test]
async fn missing_trailing_segment_is_not_found() {
    let mut router = Router::new();
    router.get("/users/:id", show_user);
    let res = router.build().dispatch(get("/users")).await;
    assert_eq!(res.status(), StatusCode::NotFound);
}

#[tokio::test]
async fn post_to_get_only_route_is_405() {
    let res = app().dispatch(request("POST", "/health", &[], "")).await;
    assert_eq!(res.status(), StatusCode::MethodNotAllowed);
    let body = body_json(&res);
    assert_eq!(body["details"]["allowed_methods"], json!(["GET"]));
    assert_eq!(body["code"], 405);
    assert_eq!(body["method"], "POST");
    assert_eq!(body["path"], "/health");
}

#[tokio::test]
async fn not_found_suggestions_share_first_or_last_characters() {
    let mut router = Router::new();
    for path in ["/alpha", "/beta", "/gamma", "/delta", "xyz-report"] {
        router.get(path, |_ctx| async { Response::new(StatusCode::Ok) });
    }
    let res = router.build().dispatch(get("/missing-report")).await;

    assert_eq!(res.status(), StatusCode::NotFound);
    let suggestions: Vec<String> =
        serde_json::from_value(body_json(&res)["details"]["suggestions"].clone()).unwrap();
    assert_eq!(suggestions.len(), 3);
    for suggestion in &suggestions {
        let shares_first = suggestion.as_bytes()[0] == b'/';
        let shares_last = suggestion.ends_with("ort");
        assert!(shares_first || shares_last, "{suggestion}");
    }
}

#[tokio::test]
async fn not_found_suggests_by_suffix_when_first_char_differs() {
    let mut router = Router::new();
    router.get("api/report", |_ctx| async { Response::new(StatusCode::Ok) });
    router.get("zzz", |_ctx| async { Response::new(StatusCode::Ok) });
    let res = router.build().dispatch(get("/old/report")).await;

    assert_eq!(body_json(&res)["details"]["suggestions"], json!(["api/report"]));
}

#[tokio::test]
async fn global_then_group_middleware_then_handler() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let tag = |name: &'static str| {
        let trace = Arc::clone(&trace);
        from_fn(move |ctx, next: Next| {
            trace.lock().unwrap().push(name);
            async move { next.run(ctx).await }
        })
    };

    let mut router = Router::new();
    router.use_middleware(tag("A"));
    router.use_middleware(tag("B"));
    {
        let mut group = router.group("/g");
        group.use_middleware(tag("C"));
        let trace = Arc::clone(&trace);
        group.get("/route", move |_ctx: Context| {
            trace.lock().unwrap().push("handler");
            async { Response::new(StatusCode::Ok) }
        });
    }

    let res = router.build().dispatch(get("/g/route")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(*trace.lock().unwrap(), vec!["A", "B", "C", "handler"]);
}

#[tokio::test]
async fn recovered_panic_is_a_single_500_and_serving_continues() {
    let dispatcher = app();

    let res = dispatcher.dispatch(get("/boom")).await;
    assert_eq!(res.status(), StatusCode::InternalServerError);
    let body = body_json(&res);
    assert_eq!(body["details"]["panic_message"], "boom at the handler");
    assert_eq!(body["code"], 500);

    let res = dispatcher.dispatch(get("/users/8")).await;
    assert_eq!(res.status(), StatusCode::Ok);
    assert_eq!(body_json(&res), json!({ "id": "8" }));
}

#[tokio::test]
async fn cors_echoes_only_listed_origins() {
    let mut router = Router::new();
    router.use_middleware(CorsMiddleware::new(
        CorsConfig::default().with_origins(["https://a.com"]),
    ));
    router.get("/data", |_ctx| async { Response::new(StatusCode::Ok) });
    let dispatcher = router.build();

    let res = dispatcher
        .dispatch(request("GET", "/data", &[("Origin", "https://a.com")], ""))
        .await;
    assert_eq!(
        res.headers().get("Access-Control-Allow-Origin"),
        Some("https://a.com")
    );

    let res = dispatcher
        .dispatch(request("GET", "/data", &[("Origin", "https://b.com")], ""))
        .await;
    assert_eq!(res.headers().get("Access-Control-Allow-Origin"), None);
}

#[tokio::test]
async fn cors_answers_preflight_for_paths_without_options_route() {
    let mut router = Router::new();
    router.use_middleware(CorsMiddleware::default());
    router.post("/data", |_ctx| async { Response::new(StatusCode::Created) });

    let res = router
        .build()
        .dispatch(request("OPTIONS", "/data", &[("Origin", "https://a.com")], ""))
        .await;
    assert_eq!(res.status(), StatusCode::NoContent);
    assert_eq!(
        res.headers().get("Access-Control-Allow-Origin"),
        Some("https://a.com")
    );
}

#[tokio::test]
async fn auth_guards_the_handler() {
    let dispatcher = app();
    let body = r#"{"name":"Alice"}"#;
    let json_type = ("Content-Type", "application/json");

    let res = dispatcher
        .dispatch(request("POST", "/users", &[json_type], body))
        .await;
    assert_eq!(res.status(), StatusCode::Unauthorized);

    let res = dispatcher
        .dispatch(request(
            "POST",
            "/users",
            &[json_type, ("Authorization", "Bearer wrong")],
            body,
        ))
        .await;
    assert_eq!(res.status(), StatusCode::Unauthorized);

    let res = dispatcher
        .dispatch(request(
            "POST",
            "/users",
            &[json_type, ("Authorization", "Bearer valid-token")],
            body,
        ))
        .await;
    assert_eq!(res.status(), StatusCode::Created);
    assert_eq!(body_json(&res), json!({ "name": "Alice" }));
}

#[tokio::test]
async fn malformed_body_is_400() {
    let res = app()
        .dispatch(request(
            "POST",
            "/users",
            &[("Authorization", "Bearer valid-token")],
            "{oops",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::BadRequest);
    assert!(body_json(&res)["details"]["reason"].is_string());
}

#[tokio::test]
async fn query_parameters_reach_the_handler() {
    let mut router = Router::new();
    router.get("/search", |ctx: Context| async move {
        let q = ctx.query_param("q").unwrap_or_default().to_owned();
        ctx.write_text(StatusCode::Ok, q)
    });

    let res = router.build().dispatch(get("/search?q=rust+router&x=1")).await;
    assert_eq!(res.content(), b"rust router");
}

#[tokio::test]
async fn served_over_tcp() {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let serving = tokio::spawn(server.serve(app()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"GET /users/42 HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8(raw).unwrap();

    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"), "{text}");
    assert!(text.contains("Connection: close\r\n"));
    assert!(text.ends_with(r#"{"id":"42"}"#));

    serving.abort();
}

#[tokio::test]
async fn tcp_keep_alive_frames_bodies_by_content_length() {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let serving = tokio::spawn(server.serve(app()));

    let body = r#"{"name":"Bob"}"#;
    let pipelined = format!(
        "POST /users HTTP/1.1\r\nHost: localhost\r\nAuthorization: Bearer valid-token\r\n\
         Content-Length: {}\r\n\r\n{body}\
         GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(pipelined.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8(raw).unwrap();

    assert!(text.starts_with("HTTP/1.1 201 Created\r\n"), "{text}");
    assert!(text.contains(r#"{"name":"Bob"}"#));
    assert!(text.contains("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with("ok"));

    serving.abort();
}
