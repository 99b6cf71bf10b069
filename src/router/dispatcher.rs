use std::sync::Arc;

use serde_json::json;

use super::erase_handler;
use super::table::{ResolveError, Resolved, RouteTable};
use crate::context::{Context, Parameters};
use crate::diagnostics::{Diagnostics, suggest_routes};
use crate::http::{Request, Response, StatusCode};
use crate::middleware::{MiddlewareChain, MiddlewareHandler};

const NOT_FOUND_TIP: &str = "Check the URL and the HTTP method";

/// The serving-phase router produced by [`Router::build`](super::Router::build).
///
/// Immutable and cheap to clone: every clone shares the same route table and
/// pre-composed chains, so one `Dispatcher` can be handed to any number of concurrent
/// connection tasks without locking.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    table: RouteTable<Arc<MiddlewareChain>>,
    global: Arc<[MiddlewareHandler]>,
    diagnostics: Arc<Diagnostics>,
}

impl Dispatcher {
    pub(super) fn new(
        table: RouteTable<Arc<MiddlewareChain>>,
        global: Arc<[MiddlewareHandler]>,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                table,
                global,
                diagnostics,
            }),
        }
    }

    /// Number of routes in the table.
    pub fn len(&self) -> usize {
        self.inner.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.table.is_empty()
    }

    /// Resolve `request` and run it through the matched route's chain.
    ///
    /// When no route matches, the global middleware still runs, around a final step
    /// that answers `404 Not Found` (with route suggestions) or
    /// `405 Method Not Allowed` (with the allowed methods and an `Allow` header).
    pub async fn dispatch(&self, request: Request) -> Response {
        let resolved = self.inner.table.resolve(request.method(), request.path());

        let (chain, params) = match resolved {
            Ok(Resolved { route, params }) => (Arc::clone(route.target()), params),
            Err(miss) => (self.miss_chain(miss), Parameters::new()),
        };

        let ctx = Context::new(request, params, Arc::clone(&self.inner.diagnostics));
        chain.run(ctx).await
    }

    fn miss_chain(&self, miss: ResolveError) -> Arc<MiddlewareChain> {
        let inner = Arc::clone(&self.inner);
        let endpoint = erase_handler(move |ctx: Context| {
            let response = inner.miss_response(&ctx, &miss);
            async move { response }
        });
        Arc::new(MiddlewareChain::new(Arc::clone(&self.inner.global), endpoint))
    }
}

impl Inner {
    fn miss_response(&self, ctx: &Context, miss: &ResolveError) -> Response {
        match miss {
            ResolveError::NotFound { method, path } => {
                tracing::warn!(%method, %path, "route not found");

                let known = self.table.known_paths();
                let mut details = json!({
                    "suggestions": suggest_routes(path, known),
                    "tip": NOT_FOUND_TIP,
                });
                if self.diagnostics.is_detailed() {
                    details["available_routes"] = json!(known);
                }
                ctx.write_error_with_details(StatusCode::NotFound, "Route not found", details)
            }
            ResolveError::MethodNotAllowed {
                method,
                path,
                allowed,
            } => {
                let allow = allowed.join(", ");
                tracing::warn!(%method, %path, allowed = %allow, "method not allowed");

                let details = json!({
                    "allowed_methods": allowed,
                    "suggestion": format!("Try with: {}", allowed.first().map_or("", String::as_str)),
                });
                let mut response = ctx.write_error_with_details(
                    StatusCode::MethodNotAllowed,
                    "Method not allowed for this route",
                    details,
                );
                response.set_header("Allow", allow);
                response
            }
        }
    }
}
