use tokio::time::Instant;

use super::{Middleware, Next, ResponseFuture};
use crate::context::Context;

/// Built-in middleware that logs each request's method, path, status, and duration.
///
/// Emits a single `tracing::info!` record after the downstream chain completes:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// `LoggerMiddleware` never short-circuits and returns the downstream response
/// untouched. Register it first so the timing covers everything after it.
///
/// # Examples
///
/// ```rust,no_run
/// use pathway::Router;
/// use pathway::middleware::LoggerMiddleware;
///
/// let mut router = Router::new();
/// router.use_middleware(LoggerMiddleware);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerMiddleware;

impl Middleware for LoggerMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        Box::pin(async move {
            let start = Instant::now();
            let method = ctx.method().as_str().to_owned();
            let path = ctx.path().to_owned();

            let response = next.run(ctx).await;

            let elapsed = start.elapsed();
            let status = response.status().as_u16();
            tracing::info!(
                %method,
                %path,
                status,
                ?elapsed,
                "{} {} - {} ({:?})",
                method,
                path,
                status,
                elapsed
            );

            response
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::http::{Method, Request, Response, StatusCode};
    use crate::middleware::{MiddlewareChain, from_middleware};
    use crate::router::erase_handler;

    #[tokio::test]
    async fn passes_response_through_unchanged() {
        let chain = Arc::new(MiddlewareChain::new(
            vec![from_middleware(Arc::new(LoggerMiddleware))],
            erase_handler(|_ctx: Context| async {
                Response::new(StatusCode::Accepted)
                    .header("X-Handler", "ran")
                    .body("queued")
            }),
        ));
        let ctx = Context::new(
            Request::new(Method::Post, "/jobs"),
            Default::default(),
            Arc::new(Diagnostics::new()),
        );

        let res = chain.run(ctx).await;
        assert_eq!(res.status(), StatusCode::Accepted);
        assert_eq!(res.headers().get("x-handler"), Some("ran"));
        assert_eq!(res.content(), b"queued");
    }
}
