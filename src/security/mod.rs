//! Security middleware: cross-origin resource sharing and token authentication.
//!
//! - [`CorsMiddleware`] adds `Access-Control-*` headers for allowed origins and
//!   answers preflight (`OPTIONS`) requests without running the handler.
//! - [`AuthMiddleware`] rejects requests whose `Authorization` header is missing or
//!   refused by a [`TokenValidator`].
//!
//! Both are configured with small immutable values ([`CorsConfig`], a validator) at
//! construction time and hold no per-request state.

mod auth;
mod cors;

pub use auth::{AuthMiddleware, BearerTokenValidator, TokenValidator};
pub use cors::{CorsConfig, CorsMiddleware};
