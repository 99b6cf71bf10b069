//! # pathway
//!
//! An async HTTP request router: path templates with named parameters, static-first
//! resolution with 404/405 diagnostics, and a composable middleware chain (logging,
//! panic recovery, CORS, token authentication) around each handler.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pathway::{Router, Server, StatusCode};
//! use pathway::context::Context;
//! use pathway::middleware::{LoggerMiddleware, RecoveryMiddleware};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut router = Router::new();
//!     router.use_middleware(LoggerMiddleware);
//!     router.use_middleware(RecoveryMiddleware::new());
//!
//!     router.get("/users/:id", |ctx: Context| async move {
//!         let id = ctx.param("id").unwrap_or_default().to_owned();
//!         ctx.write_json(StatusCode::Ok, &serde_json::json!({ "id": id }))
//!     });
//!
//!     let server = Server::bind("127.0.0.1:8080").await?;
//!     server.serve(router.build()).await?;
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod diagnostics;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use context::Context;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::{Middleware, Next};
pub use router::{Dispatcher, Group, Router};
pub use server::{Server, ServerError};
