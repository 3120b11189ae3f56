use std::{fmt::Debug, sync::Arc, time::Duration};

/// A unit of work posted to an [`Executor`]
pub type Work = Box<dyn FnOnce() + Send>;

/// Runs completions and deferred work on threads it owns
///
/// Completions of an endpoint are always delivered through its executor, never on the thread
/// that submitted the operation. Work posted from a single completion source must run in the
/// order it was posted; no ordering is required between unrelated work.
///
/// Posted work is expected to run eventually. An executor may still drop work unrun, typically
/// while shutting down; the operation it belonged to is then released and its callback dropped
/// without being called.
pub trait Executor: Send + Sync + Debug + 'static {
    /// Run `work` as soon as possible
    fn run(&self, work: Work);
    /// Run `work` once `delay` has elapsed
    fn run_after(&self, delay: Duration, work: Work);
}

/// Automatically select an appropriate executor from those enabled at compile time
///
/// If `runtime-tokio` is enabled and this function is called from within a Tokio runtime context,
/// then a [`TokioExecutor`] for that runtime is returned. Otherwise, `None` is returned.
pub fn default_executor() -> Option<Arc<dyn Executor>> {
    #[cfg(feature = "runtime-tokio")]
    {
        if let Some(executor) = TokioExecutor::try_current() {
            return Some(Arc::new(executor));
        }
    }

    None
}

#[cfg(feature = "runtime-tokio")]
mod tokio;
#[cfg(feature = "runtime-tokio")]
pub use self::tokio::TokioExecutor;
