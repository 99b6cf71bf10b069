use crate::context::Context;
use crate::http::{Response, StatusCode};
use crate::middleware::{Middleware, Next, ResponseFuture};

const DEFAULT_METHODS: [&str; 6] = ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"];
const DEFAULT_HEADERS: [&str; 2] = ["Content-Type", "Authorization"];

/// Allowed origins, methods and headers for [`CorsMiddleware`].
///
/// The defaults are:
///
/// | Setting          | Default value                                   |
/// |------------------|-------------------------------------------------|
/// | Allowed origins  | `*` (all origins)                               |
/// | Allowed methods  | `GET`, `POST`, `PUT`, `DELETE`, `PATCH`, `OPTIONS` |
/// | Allowed headers  | `Content-Type`, `Authorization`                 |
///
/// # Examples
///
/// ```rust
/// use pathway::security::CorsConfig;
///
/// let config = CorsConfig::default()
///     .with_origins(["https://app.example.com", "https://staging.example.com"])
///     .with_headers(["Content-Type", "X-Request-ID"]);
///
/// assert!(config.allows("https://app.example.com"));
/// assert!(!config.allows("https://evil.example.com"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    allow_origins: Vec<String>,
    allow_methods: Vec<String>,
    allow_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_owned()],
            allow_methods: DEFAULT_METHODS.map(str::to_owned).to_vec(),
            allow_headers: DEFAULT_HEADERS.map(str::to_owned).to_vec(),
        }
    }
}

impl CorsConfig {
    /// Replaces the allowed origins. `"*"` allows every origin.
    #[must_use]
    pub fn with_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the allowed methods, sent verbatim in `Access-Control-Allow-Methods`.
    #[must_use]
    pub fn with_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the allowed request headers, sent verbatim in
    /// `Access-Control-Allow-Headers`.
    #[must_use]
    pub fn with_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Reads the configuration through `lookup`, typically an environment accessor.
    ///
    /// | Variable                                     | Field   |
    /// |----------------------------------------------|---------|
    /// | `CORS_ALLOWED_ORIGINS`, else `ALLOWED_ORIGINS` | origins |
    /// | `CORS_ALLOWED_METHODS`                       | methods (upper-cased) |
    /// | `CORS_ALLOWED_HEADERS`                       | headers |
    ///
    /// Values are comma-separated; entries are trimmed and empty entries dropped. A
    /// variable that is unset, or that leaves no entries, keeps that field's default.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use pathway::security::CorsConfig;
    ///
    /// let config = CorsConfig::from_lookup(|name| match name {
    ///     "ALLOWED_ORIGINS" => Some("https://a.com, https://b.com".to_owned()),
    ///     "CORS_ALLOWED_METHODS" => Some("get,post".to_owned()),
    ///     _ => None,
    /// });
    ///
    /// assert_eq!(config.origins(), ["https://a.com", "https://b.com"]);
    /// assert_eq!(config.methods(), ["GET", "POST"]);
    /// assert_eq!(config.headers(), ["Content-Type", "Authorization"]);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(origins) =
            list(&lookup, "CORS_ALLOWED_ORIGINS").or_else(|| list(&lookup, "ALLOWED_ORIGINS"))
        {
            config.allow_origins = origins;
        }
        if let Some(methods) = list(&lookup, "CORS_ALLOWED_METHODS") {
            config.allow_methods = methods.iter().map(|m| m.to_uppercase()).collect();
        }
        if let Some(headers) = list(&lookup, "CORS_ALLOWED_HEADERS") {
            config.allow_headers = headers;
        }

        config
    }

    /// [`from_lookup`](Self::from_lookup) over the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn origins(&self) -> &[String] {
        &self.allow_origins
    }

    pub fn methods(&self) -> &[String] {
        &self.allow_methods
    }

    pub fn headers(&self) -> &[String] {
        &self.allow_headers
    }

    /// Returns `true` if `origin` is listed or the list contains `"*"`.
    pub fn allows(&self, origin: &str) -> bool {
        self.allow_origins.iter().any(|o| o == "*" || o == origin)
    }

    fn allows_any(&self) -> bool {
        self.allow_origins.iter().any(|o| o == "*")
    }
}

fn list<F>(lookup: &F, name: &str) -> Option<Vec<String>>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    let entries: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect();
    (!entries.is_empty()).then_some(entries)
}

/// CORS middleware: validates the `Origin` header, answers preflight requests, and
/// adds `Access-Control-*` headers to responses.
///
/// # Behavior
///
/// - An allowed `Origin` is echoed back in `Access-Control-Allow-Origin` together with
///   `Vary: Origin`. Without an `Origin` header the value is `*`, provided the
///   configuration allows every origin. A rejected origin gets no
///   `Access-Control-Allow-Origin` at all.
/// - `Access-Control-Allow-Methods`, `Access-Control-Allow-Headers` and
///   `Access-Control-Allow-Credentials: true` are always set.
/// - `OPTIONS` requests are short-circuited with `204 No Content`; nothing downstream
///   runs, including an `OPTIONS` route registered behind this middleware.
///
/// Registered globally, it also answers preflight requests for paths that have no
/// route of their own.
///
/// # Examples
///
/// ```rust,no_run
/// use pathway::Router;
/// use pathway::security::{CorsConfig, CorsMiddleware};
///
/// let mut router = Router::new();
/// router.use_middleware(CorsMiddleware::new(
///     CorsConfig::default().with_origins(["https://example.com"]),
/// ));
/// ```
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    config: CorsConfig,
    methods: String,
    headers: String,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self::new(CorsConfig::default())
    }
}

impl CorsMiddleware {
    pub fn new(config: CorsConfig) -> Self {
        let methods = config.allow_methods.join(", ");
        let headers = config.allow_headers.join(", ");
        Self {
            config,
            methods,
            headers,
        }
    }

    /// Shorthand for `CorsMiddleware::new(CorsConfig::from_env())`.
    pub fn from_env() -> Self {
        Self::new(CorsConfig::from_env())
    }

    pub fn config(&self) -> &CorsConfig {
        &self.config
    }

    fn allow_origin(&self, origin: Option<&str>) -> Option<String> {
        match origin {
            Some(origin) if self.config.allows(origin) => Some(origin.to_owned()),
            Some(origin) => {
                tracing::debug!(origin, "cross-origin request from an origin not on the allow-list");
                None
            }
            None => self.config.allows_any().then(|| "*".to_owned()),
        }
    }
}

impl Middleware for CorsMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        let origin = ctx.header("origin");
        let echoed = origin.is_some();
        let allow_origin = self.allow_origin(origin);
        let methods = self.methods.clone();
        let headers = self.headers.clone();
        let preflight = ctx.method().is_preflight();

        Box::pin(async move {
            let mut resp = if preflight {
                Response::new(StatusCode::NoContent).header("Access-Control-Max-Age", "3600")
            } else {
                next.run(ctx).await
            };

            if let Some(allow_origin) = allow_origin {
                resp.set_header("Access-Control-Allow-Origin", allow_origin);
                if echoed {
                    resp.add_header("Vary", "Origin");
                }
            }
            resp.set_header("Access-Control-Allow-Methods", methods);
            resp.set_header("Access-Control-Allow-Headers", headers);
            resp.set_header("Access-Control-Allow-Credentials", "true");
            resp
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::diagnostics::Diagnostics;
    use crate::http::{Method, Request};
    use crate::middleware::{MiddlewareChain, from_middleware};
    use crate::router::erase_handler;

    fn chain(cors: CorsMiddleware, reached: &Arc<AtomicBool>) -> Arc<MiddlewareChain> {
        let reached = Arc::clone(reached);
        Arc::new(MiddlewareChain::new(
            vec![from_middleware(Arc::new(cors))],
            erase_handler(move |_ctx: Context| {
                reached.store(true, Ordering::SeqCst);
                async { Response::new(StatusCode::Ok).body("handled") }
            }),
        ))
    }

    fn context(request: Request) -> Context {
        Context::new(request, Default::default(), Arc::new(Diagnostics::new()))
    }

    fn only_a_com() -> CorsMiddleware {
        CorsMiddleware::new(CorsConfig::default().with_origins(["https://a.com"]))
    }

    #[test]
    fn default_config_is_permissive() {
        let config = CorsConfig::default();
        assert_eq!(config.origins(), ["*"]);
        assert_eq!(config.methods(), DEFAULT_METHODS);
        assert_eq!(config.headers(), DEFAULT_HEADERS);
        assert!(config.allows("https://anything.example"));
    }

    #[test]
    fn lookup_prefers_cors_prefixed_origins() {
        let env = HashMap::from([
            ("CORS_ALLOWED_ORIGINS", " https://a.com ,, https://b.com "),
            ("ALLOWED_ORIGINS", "https://ignored.com"),
            ("CORS_ALLOWED_HEADERS", "X-Token, Content-Type"),
        ]);
        let config = CorsConfig::from_lookup(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.origins(), ["https://a.com", "https://b.com"]);
        assert_eq!(config.methods(), DEFAULT_METHODS);
        assert_eq!(config.headers(), ["X-Token", "Content-Type"]);
    }

    #[test]
    fn lookup_with_nothing_set_yields_defaults() {
        assert_eq!(CorsConfig::from_lookup(|_| None), CorsConfig::default());
    }

    #[test]
    fn lookup_with_only_separators_keeps_default() {
        let config = CorsConfig::from_lookup(|name| {
            (name == "CORS_ALLOWED_METHODS").then(|| " , ,".to_owned())
        });
        assert_eq!(config.methods(), DEFAULT_METHODS);
    }

    #[tokio::test]
    async fn allowed_origin_is_echoed() {
        let reached = Arc::new(AtomicBool::new(false));
        let req = Request::new(Method::Get, "/").header("Origin", "https://a.com");

        let res = chain(only_a_com(), &reached).run(context(req)).await;
        assert!(reached.load(Ordering::SeqCst));
        assert_eq!(res.content(), b"handled");
        assert_eq!(
            res.headers().get("access-control-allow-origin"),
            Some("https://a.com")
        );
        assert_eq!(res.headers().get("vary"), Some("Origin"));
        assert_eq!(
            res.headers().get("access-control-allow-credentials"),
            Some("true")
        );
    }

    #[tokio::test]
    async fn rejected_origin_gets_no_allow_origin() {
        let reached = Arc::new(AtomicBool::new(false));
        let req = Request::new(Method::Get, "/").header("Origin", "https://b.com");

        let res = chain(only_a_com(), &reached).run(context(req)).await;
        assert!(reached.load(Ordering::SeqCst));
        assert_eq!(res.headers().get("access-control-allow-origin"), None);
        assert_eq!(
            res.headers().get("access-control-allow-methods"),
            Some("GET, POST, PUT, DELETE, PATCH, OPTIONS")
        );
    }

    #[tokio::test]
    async fn wildcard_without_origin_uses_star() {
        let reached = Arc::new(AtomicBool::new(false));
        let req = Request::new(Method::Get, "/");

        let res = chain(CorsMiddleware::default(), &reached).run(context(req)).await;
        assert_eq!(res.headers().get("access-control-allow-origin"), Some("*"));
        assert_eq!(res.headers().get("vary"), None);
    }

    #[tokio::test]
    async fn wildcard_with_origin_echoes_it() {
        let reached = Arc::new(AtomicBool::new(false));
        let req = Request::new(Method::Get, "/").header("Origin", "https://c.com");

        let res = chain(CorsMiddleware::default(), &reached).run(context(req)).await;
        assert_eq!(
            res.headers().get("access-control-allow-origin"),
            Some("https://c.com")
        );
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let reached = Arc::new(AtomicBool::new(false));
        let req = Request::new(Method::Options, "/users").header("Origin", "https://a.com");

        let res = chain(only_a_com(), &reached).run(context(req)).await;
        assert!(!reached.load(Ordering::SeqCst));
        assert_eq!(res.status(), StatusCode::NoContent);
        assert_eq!(
            res.headers().get("access-control-allow-origin"),
            Some("https://a.com")
        );
        assert_eq!(res.headers().get("access-control-max-age"), Some("3600"));
    }
}
