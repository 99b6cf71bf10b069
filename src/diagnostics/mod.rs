//! Structured error payloads for every failure the router reports.
//!
//! All failure kinds (route not found, method not allowed, unauthorized, bad request,
//! recovered panic) share one JSON shape:
//!
//! ```json
//! {
//!   "error": "Method Not Allowed",
//!   "message": "Method not allowed for this route",
//!   "path": "/health",
//!   "method": "POST",
//!   "timestamp": "2026-10-16T09:30:00Z",
//!   "code": 405,
//!   "details": { "allowed_methods": ["GET"] }
//! }
//! ```
//!
//! `details` carries kind-specific data and is always included when supplied. `trace`
//! and a masked subset of the request headers are only added when [`Diagnostics`] runs
//! in detailed mode.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::http::{Request, Response, StatusCode};

/// Marker appended to masked secrets.
pub const MASK: &str = "***";

/// Number of leading characters of a secret that survive masking.
const MASK_KEEP: usize = 10;

/// Upper bound on route suggestions in a 404 payload.
pub const MAX_SUGGESTIONS: usize = 3;

// Request headers echoed back in detailed mode. Authorization is masked on capture.
const CAPTURED_HEADERS: [&str; 4] = ["User-Agent", "Content-Type", "Authorization", "Origin"];

/// The diagnostics engine: decides how much detail error responses carry and renders
/// them.
///
/// Cheap to clone; the router shares one instance with every request [`Context`].
///
/// [`Context`]: crate::context::Context
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    detailed: bool,
}

impl Diagnostics {
    /// Creates an engine that emits the compact payload shape.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables detailed mode (stack traces and masked request headers).
    #[must_use]
    pub fn detailed(mut self, enabled: bool) -> Self {
        self.detailed = enabled;
        self
    }

    /// Returns `true` when detailed diagnostics are enabled.
    pub fn is_detailed(&self) -> bool {
        self.detailed
    }

    /// Starts an error report for the request described by `site`.
    pub fn report<'a>(
        &'a self,
        site: &'a ErrorSite,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Report<'a> {
        Report {
            diagnostics: self,
            site,
            status,
            message: message.into(),
            details: None,
            trace: None,
        }
    }
}

/// The request facts an error payload needs, captured up front.
///
/// Middleware that hands its [`Context`](crate::context::Context) downstream (Recovery
/// in particular) captures a site first so it can still report after the context is
/// gone. Sensitive headers are masked at capture time, so the raw value is never held.
#[derive(Debug, Clone)]
pub struct ErrorSite {
    method: String,
    path: String,
    headers: Vec<(&'static str, String)>,
}

impl ErrorSite {
    /// Captures method, path and the masked diagnostic header subset of `request`.
    pub fn capture(request: &Request) -> Self {
        let headers = CAPTURED_HEADERS
            .iter()
            .filter_map(|&name| {
                let value = request.headers().get(name)?;
                let value = if name.eq_ignore_ascii_case("authorization") {
                    mask_secret(value)
                } else {
                    value.to_owned()
                };
                Some((name, value))
            })
            .collect();

        Self {
            method: request.method().as_str().to_owned(),
            path: request.path().to_owned(),
            headers,
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Serialized form of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub path: String,
    pub method: String,
    pub timestamp: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<&'static str, String>>,
}

/// An error response under construction. Finish with [`into_response`](Self::into_response).
#[must_use]
pub struct Report<'a> {
    diagnostics: &'a Diagnostics,
    site: &'a ErrorSite,
    status: StatusCode,
    message: String,
    details: Option<Value>,
    trace: Option<String>,
}

impl Report<'_> {
    /// Attaches the kind-specific `details` object.
    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Attaches stack text. Dropped unless the engine is in detailed mode.
    pub fn trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Builds the payload without rendering it.
    pub fn body(self) -> ErrorBody {
        let detailed = self.diagnostics.is_detailed();
        let headers = detailed.then(|| {
            self.site
                .headers
                .iter()
                .map(|(name, value)| (*name, value.clone()))
                .collect()
        });

        ErrorBody {
            error: self.status.canonical_reason(),
            message: self.message,
            path: self.site.path.clone(),
            method: self.site.method.clone(),
            timestamp: now_rfc3339(),
            code: self.status.as_u16(),
            details: self.details,
            trace: self.trace.filter(|_| detailed),
            headers,
        }
    }

    /// Renders the payload as an `application/json` response.
    pub fn into_response(self) -> Response {
        let status = self.status;
        let body = self.body();
        match serde_json::to_vec(&body) {
            Ok(bytes) => Response::new(status)
                .header("Content-Type", "application/json")
                .body_bytes(bytes),
            Err(err) => {
                tracing::error!(error = %err, code = body.code, "failed to serialize error body");
                Response::new(status).body(body.message)
            }
        }
    }
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Picks up to [`MAX_SUGGESTIONS`] entries of `known` that look like `requested`.
///
/// A candidate qualifies when it starts with the same byte as `requested`, or, when
/// both are longer than three bytes, when they end with the same three bytes. This is
/// deliberately crude (no edit distance) and keeps `known`'s order.
///
/// # Examples
///
/// ```
/// use pathway::diagnostics::suggest_routes;
///
/// let known = ["/users", "/health", "api/users"];
/// assert_eq!(suggest_routes("/userz", &known), vec!["/users", "/health"]);
/// assert_eq!(suggest_routes("x/users", &known), vec!["/users", "api/users"]);
/// ```
pub fn suggest_routes<S: AsRef<str>>(requested: &str, known: &[S]) -> Vec<String> {
    let requested = requested.as_bytes();
    known
        .iter()
        .map(AsRef::as_ref)
        .filter(|candidate| is_similar(requested, candidate.as_bytes()))
        .take(MAX_SUGGESTIONS)
        .map(str::to_owned)
        .collect()
}

fn is_similar(requested: &[u8], candidate: &[u8]) -> bool {
    let (Some(first), Some(other)) = (requested.first(), candidate.first()) else {
        return false;
    };
    if first == other {
        return true;
    }
    requested.len() > 3
        && candidate.len() > 3
        && requested[requested.len() - 3..] == candidate[candidate.len() - 3..]
}

/// Masks a secret for logs and payloads: keeps at most the first ten characters and
/// appends [`MASK`]. Values of ten characters or fewer collapse to the marker alone.
///
/// # Examples
///
/// ```
/// use pathway::diagnostics::mask_secret;
///
/// assert_eq!(mask_secret("Bearer valid-token"), "Bearer val***");
/// assert_eq!(mask_secret("short"), "***");
/// assert_eq!(mask_secret(""), "");
/// ```
pub fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    if value.chars().count() <= MASK_KEEP {
        return MASK.to_owned();
    }
    let kept: String = value.chars().take(MASK_KEEP).collect();
    format!("{kept}{MASK}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use serde_json::json;

    fn site() -> ErrorSite {
        let request = Request::new(Method::Post, "/orders?draft=1")
            .header("Authorization", "Bearer super-secret-token")
            .header("User-Agent", "curl/8.0")
            .header("X-Other", "ignored");
        ErrorSite::capture(&request)
    }

    fn body_json(response: &Response) -> Value {
        serde_json::from_slice(response.content()).unwrap()
    }

    #[test]
    fn suggestions_are_capped_at_three() {
        let known = ["/a", "/b", "/c", "/d"];
        assert_eq!(suggest_routes("/zzz", &known), vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn suggestions_match_on_shared_suffix() {
        let known = ["users", "groups", "xyz"];
        assert_eq!(suggest_routes("admin/users", &known), vec!["users"]);
    }

    #[test]
    fn suffix_rule_needs_both_longer_than_three() {
        // "abc" and "zbc" share a suffix but neither is longer than three bytes.
        assert!(suggest_routes("zbc", &["abc"]).is_empty());
        assert!(suggest_routes("zabc", &["abc"]).is_empty());
    }

    #[test]
    fn empty_inputs_never_suggest() {
        assert!(suggest_routes("", &["/users"]).is_empty());
        assert!(suggest_routes("/users", &[""]).is_empty());
    }

    #[test]
    fn masking_keeps_ten_characters() {
        assert_eq!(mask_secret("0123456789"), "***");
        assert_eq!(mask_secret("0123456789a"), "0123456789***");
    }

    #[test]
    fn masking_respects_char_boundaries() {
        assert_eq!(mask_secret("ééééééééééé"), "éééééééééé***");
    }

    #[test]
    fn capture_masks_authorization() {
        let site = site();
        let auth = site
            .headers
            .iter()
            .find(|(name, _)| *name == "Authorization")
            .map(|(_, value)| value.as_str());
        assert_eq!(auth, Some("Bearer sup***"));
        assert!(site.headers.iter().all(|(name, _)| *name != "X-Other"));
    }

    #[test]
    fn compact_payload_shape() {
        let site = site();
        let response = Diagnostics::new()
            .report(&site, StatusCode::BadRequest, "name is required")
            .details(json!({"missing_parameter": "name"}))
            .trace("stack")
            .into_response();

        assert_eq!(response.status(), StatusCode::BadRequest);
        assert_eq!(
            response.headers().get("content-type"),
            Some("application/json")
        );
        let body = body_json(&response);
        assert_eq!(body["error"], "Bad Request");
        assert_eq!(body["message"], "name is required");
        assert_eq!(body["path"], "/orders");
        assert_eq!(body["method"], "POST");
        assert_eq!(body["code"], 400);
        assert_eq!(body["details"]["missing_parameter"], "name");
        assert!(body.get("trace").is_none());
        assert!(body.get("headers").is_none());
        let timestamp = body["timestamp"].as_str().unwrap();
        assert!(timestamp.contains('T') && timestamp.ends_with('Z'));
    }

    #[test]
    fn detailed_payload_adds_trace_and_masked_headers() {
        let site = site();
        let response = Diagnostics::new()
            .detailed(true)
            .report(&site, StatusCode::InternalServerError, "boom")
            .trace("frame 0")
            .into_response();

        let body = body_json(&response);
        assert_eq!(body["trace"], "frame 0");
        assert_eq!(body["headers"]["Authorization"], "Bearer sup***");
        assert_eq!(body["headers"]["User-Agent"], "curl/8.0");
        assert!(body.get("details").is_none());
        assert!(!String::from_utf8_lossy(response.content()).contains("super-secret"));
    }
}
