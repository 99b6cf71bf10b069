//! Request routing: map method and path templates to handlers.
//!
//! Routing has two phases, kept apart by the type system:
//!
//! 1. **Setup.** A mutable [`Router`] collects routes, global middleware and
//!    [`Group`]s.
//! 2. **Serving.** [`Router::build`] consumes the router and returns a
//!    [`Dispatcher`]: an immutable, cheaply cloneable value holding the route table and
//!    one pre-composed [`MiddlewareChain`] per route. Nothing can be registered once a
//!    `Dispatcher` exists.
//!
//! | Template                 | Example match          | Captured params           |
//! |--------------------------|------------------------|---------------------------|
//! | `/users`                 | `/users`               | *(none)*                  |
//! | `/users/:id`             | `/users/42`            | `id → "42"`               |
//! | `/users/:id/posts/:post` | `/users/42/posts/7`    | `id → "42"`, `post → "7"` |
//!
//! Static templates are looked up directly and win over dynamic ones; dynamic
//! templates are tried in registration order. See [`RouteTable`] for the full
//! resolution rules.

use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::diagnostics::Diagnostics;
use crate::middleware::{Middleware, MiddlewareChain, MiddlewareHandler, from_middleware};
use crate::{Method, Response};

mod dispatcher;
pub mod pattern;
mod table;

pub use dispatcher::Dispatcher;
pub use pattern::Pattern;
pub use table::{ResolveError, Resolved, Route, RouteTable};

/// The terminal step of every chain: an async function from [`Context`] to [`Response`].
///
/// Built by [`Router::register`] and the method shortcuts; each endpoint keeps one.
pub type Handler =
    Arc<dyn Fn(Context) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync + 'static>;

/// Anything a route can be pointed at.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = Response>` that can be
/// shared across tasks, so plain `async fn`s and closures both qualify.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>>;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        Box::pin((self)(ctx))
    }
}

// Erase the concrete handler type and store it as a `Handler` trait object.
pub(crate) fn erase_handler(handler: impl IntoHandler) -> Handler {
    Arc::new(move |ctx| handler.call(ctx))
}

// What a route resolves to during setup: the handler plus the group middleware that
// was in force when it was registered.
struct Endpoint {
    middleware: Vec<MiddlewareHandler>,
    handler: Handler,
}

/// The mutable setup-phase router.
///
/// # Examples
///
/// ```rust,no_run
/// use pathway::{Router, Response, StatusCode};
/// use pathway::context::Context;
/// use pathway::middleware::{LoggerMiddleware, RecoveryMiddleware};
///
/// let mut router = Router::new();
/// router.use_middleware(LoggerMiddleware);
/// router.use_middleware(RecoveryMiddleware::new());
///
/// router.get("/ping", |_ctx| async { Response::new(StatusCode::Ok).body("pong") });
/// router.get("/users/:id", |ctx: Context| async move {
///     let id = ctx.param("id").unwrap_or_default().to_owned();
///     ctx.write_text(StatusCode::Ok, id)
/// });
///
/// let dispatcher = router.build();
/// ```
pub struct Router {
    table: RouteTable<Endpoint>,
    middleware: Vec<MiddlewareHandler>,
    diagnostics: Diagnostics,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a new, empty `Router` with no routes and no middleware.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pathway::Router;
    ///
    /// let router = Router::new();
    /// assert!(router.is_empty());
    /// ```
    pub fn new() -> Self {
        Self {
            table: RouteTable::new(),
            middleware: Vec::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Register `handler` for `method` requests matching `template`.
    ///
    /// Registering the same method and template twice replaces the earlier handler.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use pathway::{Method, Router, Response, StatusCode};
    ///
    /// let mut router = Router::new();
    /// router.register(Method::Get, "/hello", |_ctx| async { Response::new(StatusCode::Ok) });
    /// router.register("PURGE", "/cache", |_ctx| async { Response::new(StatusCode::NoContent) });
    /// ```
    pub fn register(&mut self, method: impl Into<Method>, template: &str, handler: impl IntoHandler) {
        self.insert(method.into(), template, Vec::new(), erase_handler(handler));
    }

    /// Register a handler for `GET` requests matching `template`.
    pub fn get(&mut self, template: &str, handler: impl IntoHandler) {
        self.register(Method::Get, template, handler);
    }

    /// Register a handler for `POST` requests matching `template`.
    pub fn post(&mut self, template: &str, handler: impl IntoHandler) {
        self.register(Method::Post, template, handler);
    }

    /// Register a handler for `PUT` requests matching `template`.
    pub fn put(&mut self, template: &str, handler: impl IntoHandler) {
        self.register(Method::Put, template, handler);
    }

    /// Register a handler for `DELETE` requests matching `template`.
    pub fn delete(&mut self, template: &str, handler: impl IntoHandler) {
        self.register(Method::Delete, template, handler);
    }

    /// Register a handler for `PATCH` requests matching `template`.
    pub fn patch(&mut self, template: &str, handler: impl IntoHandler) {
        self.register(Method::Patch, template, handler);
    }

    /// Register a handler for `OPTIONS` requests matching `template`.
    pub fn options(&mut self, template: &str, handler: impl IntoHandler) {
        self.register(Method::Options, template, handler);
    }

    /// Register a handler for `HEAD` requests matching `template`.
    pub fn head(&mut self, template: &str, handler: impl IntoHandler) {
        self.register(Method::Head, template, handler);
    }

    /// Append `middleware` to the global sequence.
    ///
    /// Global middleware runs, in registration order, in front of every route
    /// (including routes registered before this call) and around the 404/405
    /// responses for requests that match no route.
    pub fn use_middleware<M>(&mut self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.middleware.push(from_middleware(Arc::new(middleware)));
    }

    /// Open a route group under `prefix`.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use pathway::{Router, Response, StatusCode};
    /// use pathway::security::{AuthMiddleware, BearerTokenValidator};
    ///
    /// let mut router = Router::new();
    /// let mut api = router.group("/api");
    /// api.use_middleware(AuthMiddleware::new(BearerTokenValidator::new("secret")));
    /// api.get("/me", |_ctx| async { Response::new(StatusCode::Ok) });
    /// ```
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            router: self,
            prefix: prefix.to_owned(),
            middleware: Vec::new(),
        }
    }

    /// Include stack traces, masked request headers and the full route list in error
    /// payloads. Off by default.
    pub fn detailed_errors(&mut self, enabled: bool) {
        self.diagnostics = Diagnostics::new().detailed(enabled);
    }

    /// Return the number of routes registered in this router.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Every registered `(method, template)` pair, sorted by method then template.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pathway::{Method, Router, Response, StatusCode};
    ///
    /// let mut router = Router::new();
    /// router.post("/users", |_ctx| async { Response::new(StatusCode::Created) });
    /// router.get("/users/:id", |_ctx| async { Response::new(StatusCode::Ok) });
    /// router.get("/health", |_ctx| async { Response::new(StatusCode::Ok) });
    ///
    /// assert_eq!(
    ///     router.routes(),
    ///     vec![
    ///         (Method::Get, "/health".to_owned()),
    ///         (Method::Get, "/users/:id".to_owned()),
    ///         (Method::Post, "/users".to_owned()),
    ///     ]
    /// );
    /// ```
    pub fn routes(&self) -> Vec<(Method, String)> {
        let mut routes: Vec<(Method, String)> = self
            .table
            .iter()
            .map(|route| (route.method().clone(), route.template().to_owned()))
            .collect();
        routes.sort_by(|(m1, p1), (m2, p2)| m1.as_str().cmp(m2.as_str()).then_with(|| p1.cmp(p2)));
        routes
    }

    /// Write the route list to the `info` log, one record per route.
    pub fn log_routes(&self) {
        let routes = self.routes();
        tracing::info!(count = routes.len(), "registered routes");
        for (method, template) in &routes {
            tracing::info!(%method, template = %template, "  {:<7} {}", method, template);
        }
    }

    /// Finish setup and compile every route's middleware chain.
    ///
    /// Each route's chain is the global middleware, then the group middleware bound
    /// at registration, then the handler.
    pub fn build(self) -> Dispatcher {
        let global: Arc<[MiddlewareHandler]> = self.middleware.into();

        let table = self.table.map_targets(|endpoint| {
            let steps: Vec<MiddlewareHandler> =
                global.iter().cloned().chain(endpoint.middleware).collect();
            Arc::new(MiddlewareChain::new(steps, endpoint.handler))
        });

        tracing::debug!(routes = table.len(), middleware = global.len(), "router built");
        Dispatcher::new(table, global, Arc::new(self.diagnostics))
    }

    fn insert(
        &mut self,
        method: Method,
        template: &str,
        middleware: Vec<MiddlewareHandler>,
        handler: Handler,
    ) {
        let endpoint = Endpoint {
            middleware,
            handler,
        };
        if self.table.insert(method.clone(), template, endpoint).is_some() {
            tracing::warn!(%method, template, "route registered twice; the later handler replaces the earlier one");
        } else {
            tracing::debug!(%method, template, "route registered");
        }
    }
}

/// A path-prefix scope with its own middleware, opened by [`Router::group`].
///
/// Routes registered through a group get the prefix prepended to their template and run
/// the group's middleware after the global middleware. Middleware added to a group
/// applies only to routes registered through it afterwards.
///
/// Groups nest: [`Group::group`] extends the prefix and starts from the parent group's
/// middleware.
pub struct Group<'r> {
    router: &'r mut Router,
    prefix: String,
    middleware: Vec<MiddlewareHandler>,
}

impl Group<'_> {
    /// The full prefix of this group.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Append `middleware` to this group's sequence.
    pub fn use_middleware<M>(&mut self, middleware: M)
    where
        M: Middleware + 'static,
    {
        self.middleware.push(from_middleware(Arc::new(middleware)));
    }

    /// Register `handler` for `method` requests matching `prefix + suffix`.
    pub fn register(&mut self, method: impl Into<Method>, suffix: &str, handler: impl IntoHandler) {
        let template = format!("{}{}", self.prefix, suffix);
        self.router.insert(
            method.into(),
            &template,
            self.middleware.clone(),
            erase_handler(handler),
        );
    }

    pub fn get(&mut self, suffix: &str, handler: impl IntoHandler) {
        self.register(Method::Get, suffix, handler);
    }

    pub fn post(&mut self, suffix: &str, handler: impl IntoHandler) {
        self.register(Method::Post, suffix, handler);
    }

    pub fn put(&mut self, suffix: &str, handler: impl IntoHandler) {
        self.register(Method::Put, suffix, handler);
    }

    pub fn delete(&mut self, suffix: &str, handler: impl IntoHandler) {
        self.register(Method::Delete, suffix, handler);
    }

    pub fn patch(&mut self, suffix: &str, handler: impl IntoHandler) {
        self.register(Method::Patch, suffix, handler);
    }

    pub fn options(&mut self, suffix: &str, handler: impl IntoHandler) {
        self.register(Method::Options, suffix, handler);
    }

    pub fn head(&mut self, suffix: &str, handler: impl IntoHandler) {
        self.register(Method::Head, suffix, handler);
    }

    /// Open a nested group under `self.prefix + prefix`, inheriting this group's
    /// current middleware.
    pub fn group(&mut self, prefix: &str) -> Group<'_> {
        Group {
            prefix: format!("{}{}", self.prefix, prefix),
            middleware: self.middleware.clone(),
            router: &mut *self.router,
        }
    }
}
