//! Operation shapes accepted by the retry engine
//!
//! An operation takes no arguments and yields either nothing (`()`, always a
//! success) or a `Result<T, E>` whose `Err` is the failure; the `Ok` value is
//! discarded. Any other shape is rejected at compile time by the [`Outcome`]
//! bound.
//!
//! Two adapters cover the common cases:
//! - [`AsyncFn`]: a closure returning a future, polled on the caller's runtime;
//! - [`BlockingFn`]: a synchronous closure, run on tokio's blocking pool so a
//!   long call never stalls the deadline timer.
//!
//! ```rust
//! use retrying_core::retry::{AsyncFn, BlockingFn};
//!
//! let ping = AsyncFn::new(|| async { Ok::<_, std::io::Error>("pong") });
//! let touch = BlockingFn::new(|| std::fs::metadata("/"));
//! # let _ = (ping, touch);
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::error::BoxError;
use super::recover;

/// Future returned by [`Operation::invoke`]
pub type OperationFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send + 'static>>;

/// A zero-argument, repeatable unit of work
///
/// Implementations must produce a fresh future per call; nothing is shared
/// between attempts unless the implementation shares it explicitly.
pub trait Operation: Send + Sync + 'static {
    /// Start one invocation
    fn invoke(&self) -> OperationFuture;
}

impl<T: Operation + ?Sized> Operation for Arc<T> {
    fn invoke(&self) -> OperationFuture {
        (**self).invoke()
    }
}

/// Result shapes an operation may produce
pub trait Outcome {
    /// Normalize into "failure or nothing"
    fn into_outcome(self) -> Result<(), BoxError>;
}

impl Outcome for () {
    fn into_outcome(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<T, E> Outcome for Result<T, E>
where
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Result<(), BoxError> {
        self.map(|_| ()).map_err(Into::into)
    }
}

/// Operation backed by a closure that creates a new future per call
#[derive(Debug, Clone)]
pub struct AsyncFn<F> {
    f: F,
}

impl<F> AsyncFn<F> {
    /// Wrap `f`
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Operation for AsyncFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Outcome,
{
    fn invoke(&self) -> OperationFuture {
        let fut = (self.f)();
        Box::pin(async move { fut.await.into_outcome() })
    }
}

/// Operation backed by a synchronous closure run on the blocking pool
///
/// A panic inside the closure is caught on the blocking thread, where the
/// trace is captured, and re-raised into the enclosing
/// [`RecoveredOperation`](super::RecoveredOperation). Invoked outside a
/// recovered operation, such a panic propagates to the caller.
///
/// A blocking call cannot be interrupted: when a run gives up on it (deadline
/// elapsed), the thread finishes the call in the background and its result is
/// dropped.
#[derive(Debug)]
pub struct BlockingFn<F> {
    f: Arc<F>,
}

impl<F> BlockingFn<F> {
    /// Wrap `f`
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

impl<F> Clone for BlockingFn<F> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<F, R> Operation for BlockingFn<F>
where
    F: Fn() -> R + Send + Sync + 'static,
    R: Outcome + 'static,
{
    fn invoke(&self) -> OperationFuture {
        let f = Arc::clone(&self.f);
        let trace = recover::active_options().unwrap_or_default();

        Box::pin(async move {
            let joined =
                tokio::task::spawn_blocking(move || recover::scoped(trace, || f().into_outcome()))
                    .await;

            match joined {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(report)) => recover::resume(report),
                Err(join_err) => Err(join_err.into()),
            }
        })
    }
}
