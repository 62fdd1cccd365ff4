//! Panic recovery at the operation boundary
//!
//! [`RecoveredOperation`] turns every panic raised by an operation (while the
//! future is created, while it is polled, or inside a blocking closure) into an
//! [`AttemptFailure::Panicked`], so the executor only ever sees "success or
//! failure".
//!
//! ## Trace capture
//! Unwinding has already discarded the panicking frames by the time
//! `catch_unwind` returns, so the trace is taken inside a process-wide panic
//! hook instead. The hook is installed once and chains to the previous hook:
//! - inside a recovered scope it records the backtrace into a thread-local slot
//!   and prints nothing;
//! - outside a recovered scope it defers to the previous hook unchanged.
//!
//! A trace is attached only when the hook recorded it for the same panic
//! payload, so a panic the operation catches by itself never lends its trace
//! to a later failure.
//!
//! The hook is process-wide state. If the host replaces it later with
//! `std::panic::set_hook`, traces are no longer captured and recovered panics
//! are printed by the host's hook; call [`reinstall_panic_hook`] after such a
//! change to put capture back in front of it.
//!
//! The standard library only exposes the current thread's stack. With
//! [`TraceOptions::all_threads`] the report additionally names every other
//! thread that is running a recovered operation at the time of the panic.
//!
//! **Warning**: `AssertUnwindSafe` is used, so an operation that panics while
//! holding a lock on shared state may leave that state inconsistent for the
//! next attempt.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe, Location};
use std::pin::Pin;
use std::sync::{Arc, LazyLock, Mutex, Once, PoisonError};
use std::task::{Context, Poll};
use std::thread::{self, ThreadId};

use futures::FutureExt;

use crate::types::TraceOptions;

use super::error::{AttemptFailure, BoxError};
use super::operation::{Operation, OperationFuture};

thread_local! {
    static ACTIVE: Cell<Option<TraceOptions>> = const { Cell::new(None) };
    /// Panic message and trace recorded by the hook
    static CAPTURED: RefCell<Option<(String, String)>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Threads currently inside a recovered scope, with nesting depth
static RUNNING: LazyLock<Mutex<HashMap<ThreadId, (String, usize)>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

const NO_TRACE: &str = "(no trace captured)";

/// An operation whose panics are converted into attempt failures
///
/// Cloning is cheap: the underlying operation is shared.
#[derive(Clone)]
pub struct RecoveredOperation {
    operation: Arc<dyn Operation>,
    trace: TraceOptions,
}

impl RecoveredOperation {
    /// Wrap `operation`, capturing diagnostics per `trace` on panic
    pub fn new(operation: impl Operation, trace: TraceOptions) -> Self {
        Self::from_arc(Arc::new(operation), trace)
    }

    /// Wrap an already shared operation
    pub fn from_arc(operation: Arc<dyn Operation>, trace: TraceOptions) -> Self {
        Self { operation, trace }
    }

    /// Diagnostics settings used on panic
    pub fn trace_options(&self) -> TraceOptions {
        self.trace
    }

    /// Invoke the operation once
    ///
    /// Never panics on behalf of the operation: a panic comes back as
    /// [`AttemptFailure::Panicked`].
    pub async fn invoke(&self) -> Result<(), AttemptFailure> {
        let future = match scoped(self.trace, || self.operation.invoke()) {
            Ok(future) => future,
            Err(report) => return Err(report.into()),
        };
        let scoped = InScope {
            future,
            trace: self.trace,
        };
        match AssertUnwindSafe(scoped).catch_unwind().await {
            Ok(result) => result.map_err(AttemptFailure::Returned),
            Err(payload) => Err(PanicReport::from_payload(payload).into()),
        }
    }
}

impl std::fmt::Debug for RecoveredOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveredOperation")
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

/// Polls the operation future with its recovered scope active
struct InScope {
    future: OperationFuture,
    trace: TraceOptions,
}

impl Future for InScope {
    type Output = Result<(), BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _scope = Scope::enter(this.trace);
        this.future.as_mut().poll(cx)
    }
}

/// A caught panic: its message and the trace taken at the panic site
#[derive(Debug)]
pub(crate) struct PanicReport {
    payload: String,
    trace: String,
}

impl PanicReport {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        // A report re-raised from a blocking thread already carries its trace.
        match payload.downcast::<PanicReport>() {
            Ok(report) => {
                clear_captured();
                *report
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                let trace = take_captured(&message).unwrap_or_else(|| NO_TRACE.to_string());
                Self {
                    payload: message,
                    trace,
                }
            }
        }
    }
}

impl From<PanicReport> for AttemptFailure {
    fn from(report: PanicReport) -> Self {
        AttemptFailure::Panicked {
            payload: report.payload,
            trace: report.trace,
        }
    }
}

/// Run `f` inside a recovered scope on the current thread
pub(crate) fn scoped<R>(trace: TraceOptions, f: impl FnOnce() -> R) -> Result<R, PanicReport> {
    install_hook();
    let _scope = Scope::enter(trace);
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(PanicReport::from_payload)
}

/// Re-raise a report caught on another thread so the enclosing scope sees it
pub(crate) fn resume(report: PanicReport) -> ! {
    panic::resume_unwind(Box::new(report))
}

/// Trace settings of the innermost recovered scope on this thread
pub(crate) fn active_options() -> Option<TraceOptions> {
    ACTIVE.with(Cell::get)
}

/// Put trace capture back in front of the current panic hook
///
/// The capture hook is installed automatically on first use. Call this after
/// the host process replaced the panic hook; the replacement keeps handling
/// panics raised outside recovered operations.
pub fn reinstall_panic_hook() {
    HOOK.call_once(|| {});
    chain_hook();
}

fn install_hook() {
    HOOK.call_once(chain_hook);
}

fn chain_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| match ACTIVE.try_with(Cell::get) {
        Ok(Some(options)) => {
            let message = panic_message(info.payload());
            let trace = render_trace(info.location(), options);
            let _ = CAPTURED.try_with(|slot| *slot.borrow_mut() = Some((message, trace)));
        }
        _ => previous(info),
    }));
    tracing::trace!("panic capture hook installed");
}

fn clear_captured() {
    CAPTURED.with(|slot| slot.borrow_mut().take());
}

/// Take the recorded trace if it belongs to the panic carrying `message`
fn take_captured(message: &str) -> Option<String> {
    CAPTURED.with(|slot| match slot.borrow_mut().take() {
        Some((recorded, trace)) if recorded == message => Some(trace),
        _ => None,
    })
}

struct Scope {
    previous: Option<TraceOptions>,
}

impl Scope {
    fn enter(trace: TraceOptions) -> Self {
        let previous = ACTIVE.with(|active| active.replace(Some(trace)));
        if previous.is_none() {
            clear_captured();
        }
        let current = thread::current();
        let name = current.name().unwrap_or("<unnamed>").to_string();
        let mut running = RUNNING.lock().unwrap_or_else(PoisonError::into_inner);
        running.entry(current.id()).or_insert((name, 0)).1 += 1;
        Self { previous }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.set(self.previous));
        let id = thread::current().id();
        let mut running = RUNNING.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = running.get_mut(&id) {
            entry.1 -= 1;
            if entry.1 == 0 {
                running.remove(&id);
            }
        }
    }
}

fn render_trace(location: Option<&Location<'_>>, options: TraceOptions) -> String {
    let current = thread::current();
    let mut out = format!("thread '{}' panicked", current.name().unwrap_or("<unnamed>"));
    if let Some(location) = location {
        let _ = write!(out, " at {}", location);
    }
    out.push('\n');

    if options.all_threads {
        let running = RUNNING.lock().unwrap_or_else(PoisonError::into_inner);
        for (id, (name, _)) in running.iter().filter(|(id, _)| **id != current.id()) {
            let _ = writeln!(out, "also running: thread '{}' ({:?})", name, id);
        }
    }

    let _ = write!(out, "{}", Backtrace::force_capture());
    truncate_to(&mut out, options.buffer_size);
    out
}

fn truncate_to(text: &mut String, max: usize) {
    if text.len() <= max {
        return;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::operation::{AsyncFn, BlockingFn};
    use std::io;

    fn options(buffer_size: usize) -> TraceOptions {
        TraceOptions {
            buffer_size,
            all_threads: false,
        }
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let mut text = "héllo".to_string();
        truncate_to(&mut text, 2);
        assert_eq!(text, "h");

        let mut text = "short".to_string();
        truncate_to(&mut text, 64);
        assert_eq!(text, "short");
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }

    #[test]
    fn test_scoped_catches_and_captures() {
        let report = scoped(options(4096), || panic!("kaboom")).unwrap_err();
        assert_eq!(report.payload, "kaboom");
        assert!(report.trace.contains("panicked"), "trace: {}", report.trace);
        assert_eq!(active_options(), None);
    }

    #[test]
    fn test_scoped_passes_value_through() {
        assert_eq!(scoped(options(16), || 7).unwrap(), 7);
    }

    #[test]
    fn test_swallowed_panic_trace_not_reused_by_next_scope() {
        let opts = options(4096);
        scoped(opts, || {
            let _ = panic::catch_unwind(|| panic!("caught inside the operation"));
        })
        .unwrap();

        let report = scoped(opts, || panic::resume_unwind(Box::new("second"))).unwrap_err();
        assert_eq!(report.payload, "second");
        assert_eq!(report.trace, NO_TRACE);
    }

    #[test]
    fn test_swallowed_panic_trace_not_reused_in_same_scope() {
        let report = scoped(options(4096), || {
            let _ = panic::catch_unwind(|| panic!("caught inside the operation"));
            panic::resume_unwind(Box::new("rethrown elsewhere"))
        })
        .unwrap_err();

        assert_eq!(report.payload, "rethrown elsewhere");
        assert_eq!(report.trace, NO_TRACE);
    }

    #[tokio::test]
    async fn test_async_swallowed_panic_trace_not_reused() {
        let op = RecoveredOperation::new(
            AsyncFn::new(|| async {
                let _ = panic::catch_unwind(|| panic!("caught inside the operation"));
                tokio::task::yield_now().await;
                panic::resume_unwind(Box::new("after the yield")) as ()
            }),
            TraceOptions::default(),
        );
        match op.invoke().await.unwrap_err() {
            AttemptFailure::Panicked { payload, trace } => {
                assert_eq!(payload, "after the yield");
                assert_eq!(trace, NO_TRACE);
            }
            other => panic!("expected panic failure, got {other}"),
        }
    }

    #[test]
    fn test_trace_bounded_by_buffer_size() {
        let report = scoped(options(32), || panic!("bounded")).unwrap_err();
        assert!(report.trace.len() <= 32, "trace too long: {}", report.trace.len());
    }

    #[test]
    fn test_nested_scope_restores_outer_options() {
        let outer = options(100);
        let inner = options(200);
        scoped(outer, || {
            assert_eq!(active_options(), Some(outer));
            let _ = scoped(inner, || assert_eq!(active_options(), Some(inner)));
            assert_eq!(active_options(), Some(outer));
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_returned_error_propagates_unchanged() {
        let op = RecoveredOperation::new(
            AsyncFn::new(|| async { Err::<(), _>(io::Error::other("refused")) }),
            TraceOptions::default(),
        );
        let failure = op.invoke().await.unwrap_err();
        assert!(!failure.is_panic());
        assert_eq!(failure.to_string(), "refused");
    }

    #[tokio::test]
    async fn test_panic_while_polling() {
        let op = RecoveredOperation::new(
            AsyncFn::new(|| async {
                tokio::task::yield_now().await;
                panic!("mid-flight") as ()
            }),
            TraceOptions::default(),
        );
        let failure = op.invoke().await.unwrap_err();
        assert!(failure.is_panic());
        assert!(failure.to_string().contains("mid-flight"));
    }

    #[tokio::test]
    async fn test_panic_while_creating_future() {
        let op = RecoveredOperation::new(
            AsyncFn::new(|| -> std::future::Ready<()> { panic!("before the future") }),
            TraceOptions::default(),
        );
        let failure = op.invoke().await.unwrap_err();
        assert!(failure.to_string().contains("before the future"));
    }

    #[tokio::test]
    async fn test_blocking_panic_keeps_trace_from_worker_thread() {
        let op = RecoveredOperation::new(
            BlockingFn::new(|| -> Result<(), io::Error> { panic!("on the blocking pool") }),
            TraceOptions::default(),
        );
        match op.invoke().await.unwrap_err() {
            AttemptFailure::Panicked { payload, trace } => {
                assert_eq!(payload, "on the blocking pool");
                assert_ne!(trace, NO_TRACE);
            }
            other => panic!("expected panic failure, got {other}"),
        }
    }

    #[test]
    fn test_all_threads_lists_other_running_contexts() {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let other = thread::Builder::new()
            .name("retrying-sibling".to_string())
            .spawn(move || {
                scoped(options(64), || {
                    let _ = entered_tx.send(());
                    let _ = release_rx.recv();
                })
            })
            .unwrap();
        entered_rx.recv().unwrap();

        let trace_opts = TraceOptions {
            buffer_size: 1 << 20,
            all_threads: true,
        };
        let report = scoped(trace_opts, || panic!("wide")).unwrap_err();
        release_tx.send(()).unwrap();
        other.join().unwrap().unwrap();

        assert!(
            report.trace.contains("retrying-sibling"),
            "trace: {}",
            report.trace
        );
    }
}
