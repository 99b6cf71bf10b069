use std::fmt;
use std::sync::Arc;

use serde_json::json;

use crate::context::Context;
use crate::diagnostics::mask_secret;
use crate::http::StatusCode;
use crate::middleware::{Middleware, Next, ResponseFuture};

const REQUIRED_FORMAT: &str = "Authorization: Bearer <token>";
const TOKEN_FORMAT: &str = "Bearer <token>";

/// Decides whether an `Authorization` header value grants access.
///
/// The whole header value is passed in, scheme included (`"Bearer abc"`). Any
/// `Fn(&str) -> bool + Send + Sync` is a validator.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> bool;
}

impl<F> TokenValidator for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn validate(&self, token: &str) -> bool {
        self(token)
    }
}

/// Accepts exactly `Bearer <token>` for one configured token.
///
/// # Examples
///
/// ```rust
/// use pathway::security::{BearerTokenValidator, TokenValidator};
///
/// let validator = BearerTokenValidator::new("valid-token");
/// assert!(validator.validate("Bearer valid-token"));
/// assert!(!validator.validate("Bearer wrong"));
/// assert!(!validator.validate("valid-token"));
/// ```
#[derive(Clone)]
pub struct BearerTokenValidator {
    expected: String,
}

impl BearerTokenValidator {
    pub fn new(token: impl AsRef<str>) -> Self {
        Self {
            expected: format!("Bearer {}", token.as_ref()),
        }
    }
}

impl TokenValidator for BearerTokenValidator {
    fn validate(&self, token: &str) -> bool {
        token.trim() == self.expected
    }
}

// The expected token stays out of debug output.
impl fmt::Debug for BearerTokenValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerTokenValidator")
            .field("expected", &mask_secret(&self.expected))
            .finish()
    }
}

/// Rejects requests that do not carry an accepted `Authorization` header.
///
/// | Request                          | Response                                  |
/// |----------------------------------|-------------------------------------------|
/// | no or blank `Authorization`      | `401`, `details.required_format`, `details.example` |
/// | header refused by the validator  | `401`, `details.token_format`, `details.note` |
/// | header accepted                  | downstream response, untouched            |
///
/// Failures are logged at `warn` with the header masked; the raw token is never
/// logged or echoed.
///
/// # Examples
///
/// ```rust,no_run
/// use pathway::Router;
/// use pathway::security::{AuthMiddleware, BearerTokenValidator};
///
/// let mut router = Router::new();
/// let mut admin = router.group("/admin");
/// admin.use_middleware(AuthMiddleware::new(BearerTokenValidator::new("s3cret")));
/// ```
#[derive(Clone)]
pub struct AuthMiddleware {
    validator: Arc<dyn TokenValidator>,
}

impl AuthMiddleware {
    pub fn new<V>(validator: V) -> Self
    where
        V: TokenValidator + 'static,
    {
        Self {
            validator: Arc::new(validator),
        }
    }
}

impl Middleware for AuthMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        let Some(token) = ctx.header("authorization").filter(|v| !v.trim().is_empty()) else {
            tracing::warn!(method = %ctx.method(), path = %ctx.path(), "authentication failed: missing Authorization header");
            let response = ctx.write_error_with_details(
                StatusCode::Unauthorized,
                "Missing Authorization header",
                json!({
                    "required_format": REQUIRED_FORMAT,
                    "example": "Authorization: Bearer valid-token",
                }),
            );
            return Box::pin(async move { response });
        };

        if !self.validator.validate(token) {
            tracing::warn!(
                method = %ctx.method(),
                path = %ctx.path(),
                token = %mask_secret(token),
                "authentication failed: invalid token"
            );
            let response = ctx.write_error_with_details(
                StatusCode::Unauthorized,
                "Invalid authentication token",
                json!({
                    "token_format": TOKEN_FORMAT,
                    "note": "Check that the token is valid and has not expired",
                }),
            );
            return Box::pin(async move { response });
        }

        Box::pin(next.run(ctx))
    }
}
