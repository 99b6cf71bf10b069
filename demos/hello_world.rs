//! A small API showing routing, groups and the built-in middleware.
//!
//! ```text
//! RUST_LOG=debug cargo run --example hello_world
//! curl http://127.0.0.1:8080/users/7
//! curl -X POST -H 'Authorization: Bearer valid-token' -d '{"name":"Alice"}' \
//!      http://127.0.0.1:8080/api/users
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use pathway::context::Context;
use pathway::middleware::{LoggerMiddleware, RecoveryMiddleware};
use pathway::security::{AuthMiddleware, BearerTokenValidator, CorsMiddleware};
use pathway::{Response, Router, Server, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, Serialize)]
struct NewUser {
    name: String,
}

async fn explode(_ctx: Context) -> Response {
    panic!("something went badly wrong")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut router = Router::new();
    router.detailed_errors(std::env::var("PATHWAY_DETAILED_ERRORS").is_ok());
    router.use_middleware(LoggerMiddleware);
    router.use_middleware(RecoveryMiddleware::new());
    router.use_middleware(CorsMiddleware::from_env());

    let hits = Arc::new(AtomicU64::new(0));
    router.get("/", move |ctx: Context| {
        let count = hits.fetch_add(1, Ordering::Relaxed) + 1;
        async move { ctx.write_json(StatusCode::Ok, &json!({ "hello": "world", "hits": count })) }
    });

    router.get("/users/:id", |ctx: Context| async move {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        ctx.write_json(StatusCode::Ok, &json!({ "id": id }))
    });

    router.get("/search", |ctx: Context| async move {
        let q = ctx.query_param("q").unwrap_or_default().to_owned();
        ctx.write_text(StatusCode::Ok, format!("searching for {q:?}"))
    });

    router.get("/panic", explode);

    {
        let mut api = router.group("/api");
        api.use_middleware(AuthMiddleware::new(BearerTokenValidator::new("valid-token")));
        api.post("/users", |ctx: Context| async move {
            match ctx.bind_json::<NewUser>() {
                Ok(user) => ctx.write_json(StatusCode::Created, &user),
                Err(err) => ctx.write_error_with_details(
                    StatusCode::BadRequest,
                    "Invalid request body",
                    json!({ "reason": err.to_string() }),
                ),
            }
        });
    }

    router.log_routes();

    let server = Server::bind("127.0.0.1:8080").await?;
    tracing::info!("open http://{}", server.local_addr());
    server.serve(router.build()).await?;
    Ok(())
}
