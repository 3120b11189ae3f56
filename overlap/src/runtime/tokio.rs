use std::time::Duration;

use tokio::runtime::Handle;

use super::{Executor, Work};

/// An [`Executor`] running work on a Tokio runtime
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Run work on the runtime behind `handle`
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Run work on the runtime this function is called from, if any
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// The runtime handle work is spawned on
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl Executor for TokioExecutor {
    fn run(&self, work: Work) {
        self.handle.spawn(async move { work() });
    }

    fn run_after(&self, delay: Duration, work: Work) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            work()
        });
    }
}
