//! Panic recovery for handler execution.
//!
//! # Flow
//! ```text
//! handler panics
//!     → panic hook snapshots the backtrace on the panicking thread
//!     → middleware catches the unwind, builds a ResponseBodyError
//!     → body emitted as a 500 through the response adapter
//!     → failure escalated to the FailureSupervisor (log, or shut down)
//! ```
//!
//! # Design Decisions
//! - The panic is never swallowed: the global hook chain still reports it,
//!   and the supervisor receives it after the 500 is built
//! - Resuming the unwind would drop the 500, so escalation is the
//!   supervisor's job rather than a second panic
//! - Stack details and panic messages are opt-in

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use futures_util::FutureExt;

use crate::config::{ErrorReportingConfig, PanicPolicy};
use crate::failure::body::ResponseBodyError;
use crate::failure::stack;
use crate::http::content_type;
use crate::http::response::{adapt, Response};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::observability::trace_context::TraceContext;
use crate::proxy::identity::IdentityError;

/// Symbol of the hook closure that captures the backtrace.
const HOOK_SYMBOL: &str = "install_panic_hook";

/// Panic runtime frames between the hook and the code that panicked.
const PANIC_RUNTIME_PREFIXES: [&str; 7] = [
    "<alloc::boxed::Box",
    "std::panicking::",
    "core::panicking::",
    "std::sys::backtrace::",
    "__rust",
    "rust_begin_unwind",
    "core::panic::",
];

static HOOK: Once = Once::new();
static CAPTURE_STACKS: AtomicBool = AtomicBool::new(false);

thread_local! {
    static LAST_PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Install the stack-capturing panic hook, chained in front of the existing one.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if CAPTURE_STACKS.load(Ordering::Relaxed) {
                let captured = Backtrace::force_capture().to_string();
                let stack = strip_capture_frames(&captured).to_string();
                LAST_PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            }
            previous(info);
        }));
    });
}

/// Drop everything up to the hook frame, then the panic runtime frames after it.
///
/// A backtrace without the hook frame is returned unchanged.
fn strip_capture_frames(raw: &str) -> &str {
    let mut offset = 0;
    let mut past_hook = false;
    for line in raw.split_inclusive('\n') {
        if let Some(symbol) = stack::numbered_symbol(line.trim()) {
            if symbol.contains(HOOK_SYMBOL) {
                past_hook = true;
            } else if past_hook
                && !PANIC_RUNTIME_PREFIXES
                    .iter()
                    .any(|prefix| symbol.starts_with(prefix))
            {
                return &raw[offset..];
            }
        }
        offset += line.len();
    }

    if past_hook {
        ""
    } else {
        raw
    }
}

fn take_panic_stack() -> Option<String> {
    LAST_PANIC_STACK.with(|slot| slot.borrow_mut().take())
}

/// Textual form of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(err) = payload.downcast_ref::<Box<dyn StdError + Send + Sync>>() {
        err.to_string()
    } else if let Some(err) = payload.downcast_ref::<IdentityError>() {
        err.to_string()
    } else {
        format!("{:?}", payload)
    }
}

/// A handler panic, as handed to supervision.
#[derive(Debug, Clone)]
pub struct UnhandledFailure {
    pub message: String,
    pub method: Method,
    pub path: String,
}

/// Outer supervision that must observe every recovered panic.
pub trait FailureSupervisor: Send + Sync {
    fn escalate(&self, failure: &UnhandledFailure);
}

/// Reports the failure through the error log.
#[derive(Debug, Default)]
pub struct LogSupervisor;

impl FailureSupervisor for LogSupervisor {
    fn escalate(&self, failure: &UnhandledFailure) {
        tracing::error!(
            method = %failure.method,
            path = %failure.path,
            panic = %failure.message,
            "Handler panicked"
        );
    }
}

/// Logs, then starts a graceful shutdown so the process supervisor restarts us.
#[derive(Clone)]
pub struct ShutdownSupervisor {
    shutdown: Shutdown,
}

impl ShutdownSupervisor {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }
}

impl FailureSupervisor for ShutdownSupervisor {
    fn escalate(&self, failure: &UnhandledFailure) {
        LogSupervisor.escalate(failure);
        tracing::error!("Unhandled failure escalated, shutting down");
        self.shutdown.trigger();
    }
}

/// Build the supervisor selected by `policy`.
pub fn supervisor_for(policy: PanicPolicy, shutdown: &Shutdown) -> Arc<dyn FailureSupervisor> {
    match policy {
        PanicPolicy::Log => Arc::new(LogSupervisor),
        PanicPolicy::Shutdown => Arc::new(ShutdownSupervisor::new(shutdown.clone())),
    }
}

/// Settings and supervision for the recovery middleware.
pub struct ErrorRecovery {
    module_name: String,
    include_message: bool,
    include_stack: bool,
    supervisor: Arc<dyn FailureSupervisor>,
}

impl ErrorRecovery {
    pub fn new(config: &ErrorReportingConfig, supervisor: Arc<dyn FailureSupervisor>) -> Self {
        install_panic_hook();
        if config.include_stack {
            CAPTURE_STACKS.store(true, Ordering::Relaxed);
        }

        Self {
            module_name: config.module_name.clone(),
            include_message: config.include_message,
            include_stack: config.include_stack,
            supervisor,
        }
    }

    /// Error body for a recovered panic.
    pub fn error_body(&self, message: &str, raw_stack: Option<&str>) -> ResponseBodyError {
        let mut body = ResponseBodyError::internal();
        if self.include_message {
            body.message = message.to_string();
        }
        if self.include_stack {
            let frames = raw_stack
                .map(|raw| stack::parse_and_sort(raw, &self.module_name))
                .unwrap_or_default();
            body = body.with_stack(frames);
        }
        body
    }

    async fn emit(
        &self,
        trace: Option<&TraceContext>,
        body: ResponseBodyError,
    ) -> axum::response::Response {
        let response = match Response::json(StatusCode::INTERNAL_SERVER_ERROR, &body) {
            Ok(response) => response.with_headers(content_type::json_headers()),
            Err(err) => return err.into_response(),
        };

        match adapt(trace, response).await {
            Ok(wire) => wire,
            Err(err) => err.into_response(),
        }
    }
}

/// Middleware converting handler panics into structured 500 responses.
pub async fn recover_panics(
    State(recovery): State<Arc<ErrorRecovery>>,
    request: Request<Body>,
    next: Next,
) -> axum::response::Response {
    let trace = request.extensions().get::<TraceContext>().cloned();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let payload = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => return response,
        Err(payload) => payload,
    };

    let raw_stack = if recovery.include_stack {
        take_panic_stack().or_else(|| Some(Backtrace::force_capture().to_string()))
    } else {
        None
    };

    let failure = UnhandledFailure {
        message: panic_message(payload.as_ref()),
        method,
        path,
    };
    metrics::record_recovered_panic();

    let body = recovery.error_body(&failure.message, raw_stack.as_deref());
    let response = recovery.emit(trace.as_ref(), body).await;

    recovery.supervisor.escalate(&failure);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recovery(include_message: bool, include_stack: bool) -> ErrorRecovery {
        let config = ErrorReportingConfig {
            module_name: "request_relay".into(),
            include_message,
            include_stack,
            ..ErrorReportingConfig::default()
        };
        ErrorRecovery::new(&config, Arc::new(LogSupervisor))
    }

    #[test]
    fn test_panic_message_variants() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let err: Box<dyn StdError + Send + Sync> = "boxed error".into();
        let payload: Box<dyn Any + Send> = Box::new(err);
        assert_eq!(panic_message(payload.as_ref()), "boxed error");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert!(!panic_message(payload.as_ref()).is_empty());
    }

    #[test]
    fn test_body_defaults_hide_details() {
        let body = recovery(false, false).error_body("secret detail", Some("a.b()\n/x.go:1\n"));
        assert_eq!(body, ResponseBodyError::internal());
    }

    #[test]
    fn test_body_includes_message_and_stack() {
        let raw = "other::f()\n/z/other.rs:1\nrequest_relay::g()\n/a/relay.rs:2\n";
        let body = recovery(true, true).error_body("index out of bounds", Some(raw));
        assert_eq!(body.message, "index out of bounds");

        let frames = body.stack.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].func_name, "request_relay::g()");
    }

    #[test]
    fn test_capture_frames_stripped() {
        let raw = "   0: std::backtrace::Backtrace::force_capture
             at /rustc/abc/library/std/src/backtrace.rs:312:9
   1: request_relay::failure::recovery::install_panic_hook::{{closure}}
             at ./src/failure/recovery.rs:59:33
   2: std::panicking::rust_panic_with_hook
             at /rustc/abc/library/std/src/panicking.rs:841:13
   3: core::panicking::panic_fmt
             at /rustc/abc/library/core/src/panicking.rs:75:14
   4: app::handlers::create::{{closure}}
             at ./src/handlers.rs:12:5
   5: tokio::runtime::task::raw::poll
             at /cargo/tokio/src/runtime/task/raw.rs:255:5
";
        let stripped = strip_capture_frames(raw);
        assert!(stripped.trim_start().starts_with("4: app::handlers::create"));

        let frames = stack::parse_and_sort(stripped, "app::");
        let names: Vec<&str> = frames.iter().map(|f| f.func_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["app::handlers::create::{{closure}}", "tokio::runtime::task::raw::poll"]
        );
    }

    #[test]
    fn test_foreign_backtrace_kept_whole() {
        let raw = "foo.Handler(a)\n/app/handler.go:10\n";
        assert_eq!(strip_capture_frames(raw), raw);
    }

    #[test]
    fn test_shutdown_supervisor_triggers() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let supervisor = supervisor_for(PanicPolicy::Shutdown, &shutdown);

        supervisor.escalate(&UnhandledFailure {
            message: "boom".into(),
            method: Method::GET,
            path: "/".into(),
        });
        assert!(rx.try_recv().is_ok());
    }
}
