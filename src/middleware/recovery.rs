use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};

use futures::FutureExt;
use serde_json::json;

use super::{Middleware, Next, ResponseFuture};
use crate::context::Context;
use crate::http::StatusCode;

const RECOVERY_NOTE: &str = "The application recovered from a panic while handling this request";

// Where and how the most recent panic on this thread happened. Written by the panic
// hook, taken by the middleware right after `catch_unwind` returns on the same thread.
struct PanicTrace {
    location: Option<String>,
    backtrace: String,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicTrace>> = const { RefCell::new(None) };
}

// Chains onto whatever hook is already installed, so default panic output is kept.
fn install_panic_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let trace = PanicTrace {
                location: info.location().map(ToString::to_string),
                backtrace: Backtrace::force_capture().to_string(),
            };
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_panic_trace() -> Option<PanicTrace> {
    LAST_PANIC.with(|slot| slot.borrow_mut().take())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Converts a panic anywhere downstream into a single `500` diagnostic response.
///
/// The downstream future is polled inside a fault guard. When it panics, the panic
/// message and stack text are logged at `error`, and the response becomes:
///
/// ```json
/// { "error": "Internal Server Error", "code": 500, ...,
///   "details": { "panic_message": "...", "note": "..." } }
/// ```
///
/// In detailed mode `details.stack_trace` and the top-level `trace` carry the captured
/// backtrace. The failed downstream never produced a response, so this one is the only
/// response for the request.
///
/// Without this middleware a panic unwinds out of
/// [`Dispatcher::dispatch`](crate::router::Dispatcher::dispatch). Register it early
/// (usually right after the logger) so it guards as much of the chain as possible.
///
/// The first construction or use installs a process-wide panic hook; the hook records
/// the panic location and backtrace for the panicking thread and then defers to the
/// previously installed hook.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryMiddleware {
    _hook: (),
}

impl RecoveryMiddleware {
    pub fn new() -> Self {
        install_panic_hook();
        Self { _hook: () }
    }
}

impl Default for RecoveryMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for RecoveryMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> ResponseFuture {
        install_panic_hook();
        Box::pin(async move {
            let site = ctx.error_site();
            let diagnostics = Arc::clone(ctx.diagnostics());

            let payload = match AssertUnwindSafe(next.run(ctx)).catch_unwind().await {
                Ok(response) => return response,
                Err(payload) => payload,
            };

            let message = panic_message(payload.as_ref());
            let trace = take_panic_trace();
            let location = trace.as_ref().and_then(|t| t.location.as_deref());
            let backtrace = trace
                .as_ref()
                .map(|t| t.backtrace.as_str())
                .filter(|b| !b.is_empty());

            tracing::error!(
                method = %site.method(),
                path = %site.path(),
                panic = %message,
                location = location.unwrap_or("unknown"),
                "panic recovered:\n{}",
                backtrace.unwrap_or("<no backtrace captured>")
            );

            let mut details = json!({
                "panic_message": message,
                "note": RECOVERY_NOTE,
            });
            let report = diagnostics.report(&site, StatusCode::InternalServerError, "Internal server error");
            let report = match backtrace {
                Some(backtrace) => {
                    if diagnostics.is_detailed() {
                        details["stack_trace"] = json!(backtrace);
                    }
                    report.trace(backtrace)
                }
                None => report,
            };
            report.details(details).into_response()
        })
    }
}
