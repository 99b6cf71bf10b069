//! Per-request context handed through the middleware chain to the handler.
//!
//! A [`Context`] is created fresh by the [`Dispatcher`](crate::router::Dispatcher) for
//! every inbound request and moved (never shared) from middleware to middleware. It
//! owns the request, the path parameters extracted by the matched route, and the query
//! string parsed once up front. Handlers answer by building a [`Response`] through the
//! `write_*` helpers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

use crate::diagnostics::{Diagnostics, ErrorSite};
use crate::http::{Method, Request, Response, StatusCode};

/// Failure to bind a request body with [`Context::bind_json`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("request body is empty")]
    Empty,

    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Path parameters extracted from the matched route.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    map: HashMap<String, String>,
}

impl Parameters {
    /// Create a new empty parameters map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any earlier capture with the same name.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Get a value from the parameters map
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Decoded query-string parameters.
///
/// Pairs are split on `&`, keys from values on the first `=`, and `+` decodes to a
/// space. Pairs without `=` are ignored. A repeated key keeps its last value.
#[derive(Default, Debug, Clone)]
pub struct Query {
    map: HashMap<String, String>,
}

impl Query {
    /// Parses a raw query string (without the leading `?`).
    pub fn parse(raw: &str) -> Self {
        let map = raw
            .split('&')
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                Some((key.replace('+', " "), value.replace('+', " ")))
            })
            .collect();
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Per-request state: the request, its route parameters and its query parameters.
///
/// # Examples
///
/// ```rust,no_run
/// use pathway::{Router, StatusCode};
/// use pathway::context::Context;
///
/// let mut router = Router::new();
/// router.get("/users/:id", |ctx: Context| async move {
///     let id = ctx.param("id").unwrap_or_default().to_owned();
///     ctx.write_json(StatusCode::Ok, &serde_json::json!({ "id": id }))
/// });
/// ```
pub struct Context {
    request: Request,
    params: Parameters,
    query: Query,
    diagnostics: Arc<Diagnostics>,
}

impl Context {
    /// Builds a context; the query string is parsed here, once.
    pub fn new(request: Request, params: Parameters, diagnostics: Arc<Diagnostics>) -> Self {
        let query = request
            .query_string()
            .map(Query::parse)
            .unwrap_or_default();
        Self {
            request,
            params,
            query,
            diagnostics,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Returns a request header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name)
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Returns the path parameter captured for `name`, if the route declared one.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// The raw query string, without the leading `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.request.query_string()
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Returns a decoded query-string parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name)
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }

    /// Deserializes the request body as JSON.
    ///
    /// # Errors
    ///
    /// [`DecodeError::Empty`] for an empty body, [`DecodeError::Json`] when the body is
    /// not valid JSON for `T`.
    pub fn bind_json<T>(&self) -> Result<T, DecodeError>
    where
        T: DeserializeOwned,
    {
        let body = self.request.body();
        if body.is_empty() {
            return Err(DecodeError::Empty);
        }
        Ok(serde_json::from_slice(body)?)
    }

    /// Builds a JSON response. A value that cannot be serialized yields a 500 report.
    pub fn write_json<T>(&self, status: StatusCode, value: &T) -> Response
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_vec(value) {
            Ok(bytes) => Response::new(status)
                .header("Content-Type", "application/json")
                .body_bytes(bytes),
            Err(err) => {
                tracing::error!(path = %self.path(), error = %err, "failed to serialize response body");
                self.write_error(StatusCode::InternalServerError, "Failed to encode response")
            }
        }
    }

    /// Builds a `text/plain` response.
    pub fn write_text(&self, status: StatusCode, text: impl Into<String>) -> Response {
        Response::new(status)
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(text)
    }

    /// Builds a `text/html` response.
    pub fn write_html(&self, status: StatusCode, html: impl Into<String>) -> Response {
        Response::new(status)
            .header("Content-Type", "text/html; charset=utf-8")
            .body(html)
    }

    /// Builds a diagnostic error response for this request.
    pub fn write_error(&self, status: StatusCode, message: impl Into<String>) -> Response {
        let site = self.error_site();
        self.diagnostics
            .report(&site, status, message)
            .into_response()
    }

    /// Like [`write_error`](Self::write_error), with a kind-specific `details` object.
    pub fn write_error_with_details(
        &self,
        status: StatusCode,
        message: impl Into<String>,
        details: Value,
    ) -> Response {
        let site = self.error_site();
        self.diagnostics
            .report(&site, status, message)
            .details(details)
            .into_response()
    }

    /// Captures what an error report needs, for use after the context has moved on.
    pub fn error_site(&self) -> ErrorSite {
        ErrorSite::capture(&self.request)
    }
}
