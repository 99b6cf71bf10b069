//! Middleware pipeline: composable steps wrapped around a route handler.
//!
//! A route's effective pipeline is a [`MiddlewareChain`]: an ordered, immutable list of
//! middleware ending in the route's handler. Execution order equals registration order:
//! for `[m0, m1, m2]` around handler `h` the request flows `m0 → m1 → m2 → h`.
//!
//! ## Core types
//!
//! - [`Middleware`]: trait implemented by all middleware.
//! - [`Next`]: single-use continuation into the rest of the chain; call [`Next::run`]
//!   to proceed. It is consumed by value, so a middleware cannot run the downstream
//!   steps twice. Dropping it without calling `run` short-circuits the request.
//! - [`MiddlewareHandler`]: type-erased, cheaply-cloneable middleware function.
//! - [`from_middleware`] / [`from_fn`]: adapters into the chain.
//!
//! ## Built-in middleware
//!
//! - [`LoggerMiddleware`]: method, path, status and elapsed time per request.
//! - [`RecoveryMiddleware`]: turns a panic downstream into a `500` diagnostic.
//!
//! CORS and token authentication live in [`crate::security`].

use std::{future::Future, pin::Pin, sync::Arc};

use crate::{Response, context::Context, router::Handler};

mod logger;
mod recovery;

pub use logger::LoggerMiddleware;
pub use recovery::RecoveryMiddleware;

/// Boxed future every middleware and handler resolves to.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// A type-erased, reference-counted middleware function.
///
/// Every entry in a [`MiddlewareChain`] is stored as a `MiddlewareHandler`. The [`Arc`]
/// wrapper lets the global middleware list be shared by every route's chain.
pub type MiddlewareHandler = Arc<dyn Fn(Context, Next) -> ResponseFuture + Send + Sync + 'static>;

/// Converts a [`Middleware`] implementation into a [`MiddlewareHandler`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pathway::middleware::{LoggerMiddleware, from_middleware};
///
/// let handler = from_middleware(Arc::new(LoggerMiddleware));
/// ```
pub fn from_middleware<M>(middleware: Arc<M>) -> MiddlewareHandler
where
    M: Middleware + 'static,
{
    Arc::new(move |ctx: Context, next: Next| middleware.handle(ctx, next))
}

/// Adapts an async closure into a [`Middleware`].
///
/// # Examples
///
/// ```rust,no_run
/// use pathway::{Router, StatusCode};
/// use pathway::middleware::from_fn;
///
/// let mut router = Router::new();
/// router.use_middleware(from_fn(|ctx, next| async move {
///     if ctx.header("x-maintenance").is_some() {
///         return ctx.write_error(StatusCode::ServiceUnavailable, "Down for maintenance");
///     }
///     next.run(ctx).await
/// }));
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FromFn { f }
}

/// Middleware built from a closure by [`from_fn`].
pub struct FromFn<F> {
    f: F,
}

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        Box::pin((self.f)(ctx, next))
    }
}

/// The core trait for all middleware.
///
/// Implementors receive a [`Context`] and a [`Next`] continuation. They may:
///
/// - **Pass through**: `next.run(ctx).await`.
/// - **Short-circuit**: return a [`Response`] without calling `next`; nothing
///   downstream (including the handler) runs.
/// - **Decorate**: call `next.run(ctx).await` and adjust the response it returns.
///
/// Middleware is shared by every request in flight, so it must be `Send + Sync` and any
/// cross-request state needs a concurrency-safe type (an atomic counter, a mutex).
pub trait Middleware: Send + Sync {
    /// Handle the request and optionally delegate to the next step.
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture;
}

/// An immutable pipeline: middleware in execution order, ending in a handler.
///
/// The router builds one chain per route when it is turned into a
/// [`Dispatcher`](crate::router::Dispatcher); chains are never modified afterwards.
pub struct MiddlewareChain {
    middleware: Arc<[MiddlewareHandler]>,
    endpoint: Handler,
}

impl MiddlewareChain {
    /// Creates a chain that runs `middleware` in order, then `endpoint`.
    pub fn new(middleware: impl Into<Arc<[MiddlewareHandler]>>, endpoint: Handler) -> Self {
        Self {
            middleware: middleware.into(),
            endpoint,
        }
    }

    /// Number of middleware steps before the handler.
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Runs the whole chain for one request.
    pub async fn run(self: Arc<Self>, ctx: Context) -> Response {
        Next {
            chain: self,
            index: 0,
        }
        .run(ctx)
        .await
    }
}

/// Continuation into the remainder of a [`MiddlewareChain`].
///
/// Each middleware receives its own `Next`, positioned just after itself.
/// [`run`](Self::run) takes `self` by value, so the continuation fires at most once.
pub struct Next {
    chain: Arc<MiddlewareChain>,
    index: usize,
}

impl Next {
    /// Invokes the next middleware, or the handler once the middleware is exhausted.
    pub async fn run(self, ctx: Context) -> Response {
        let Next { chain, index } = self;
        match chain.middleware.get(index).cloned() {
            Some(middleware) => {
                let next = Next {
                    chain,
                    index: index + 1,
                };
                middleware(ctx, next).await
            }
            None => (chain.endpoint)(ctx).await,
        }
    }

    /// Number of steps still ahead of this continuation, the handler included.
    pub fn remaining(&self) -> usize {
        self.chain.middleware.len() - self.index + 1
    }
}
