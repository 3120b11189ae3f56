use std::{
    fmt, io,
    sync::{Arc, Mutex, PoisonError, Weak},
    time::Instant,
};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::{
    adapter::{self, CompletionAdapter, PendingRead, PendingWrite},
    runtime::Executor,
    socket::SocketBackend,
    IO_ERROR_LOG_INTERVAL,
};

/// Data that must outlive the [`Endpoint`](crate::Endpoint)
///
/// Once an endpoint is dropped there may still be operations owned by the socket. Each of them
/// holds a share of this state through its adapter, so the socket and adapters are only released
/// after the endpoint is gone and every outstanding completion has been delivered.
pub(crate) struct AsyncIoState {
    pub(crate) socket: Box<dyn SocketBackend>,
    pub(crate) executor: Arc<dyn Executor>,
    pub(crate) handle_read: CompletionAdapter<PendingRead>,
    pub(crate) handle_write: CompletionAdapter<PendingWrite>,
    /// Display form of the peer address, for logging
    pub(crate) peer: String,
    last_error_log: Mutex<Option<Instant>>,
}

impl AsyncIoState {
    pub(crate) fn new(
        socket: Box<dyn SocketBackend>,
        executor: Arc<dyn Executor>,
        peer: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            socket,
            executor,
            handle_read: CompletionAdapter::new("read"),
            handle_write: CompletionAdapter::new("write"),
            peer,
            last_error_log: Mutex::new(None),
        })
    }

    /// Hand the primed read to the socket, to be filled into `region`
    pub(crate) fn submit_read(self: &Arc<Self>, region: BytesMut) {
        self.handle_read.submit_with(|_| ());
        trace!(peer = %self.peer, len = region.len(), "submitting read");
        self.socket.submit_read(region, ReadNotification::new(self));
    }

    /// Hand the unwritten part of the primed write to the socket
    pub(crate) fn submit_write(self: &Arc<Self>) {
        let slices = self.handle_write.submit_with(|op| op.next_slices());
        if slices.is_empty() {
            // Nothing left for the socket; complete through the executor like any other write
            WriteNotification::new(self).complete(Ok(0));
            return;
        }
        trace!(
            peer = %self.peer,
            slices = slices.len(),
            len = slices.iter().map(|s| s.len()).sum::<usize>(),
            "submitting write"
        );
        self.socket.submit_write(slices, WriteNotification::new(self));
    }

    /// Logs a socket error
    ///
    /// Logging will only be performed if at least [`IO_ERROR_LOG_INTERVAL`] has elapsed since the
    /// last error was logged for this endpoint.
    pub(crate) fn log_io_error(&self, direction: &str, err: &io::Error) {
        let mut last = self
            .last_error_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if last.map_or(true, |t| now.saturating_duration_since(t) > IO_ERROR_LOG_INTERVAL) {
            *last = Some(now);
            warn!(peer = %self.peer, "{} error: {}", direction, err);
        }
    }
}

impl fmt::Debug for AsyncIoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncIoState")
            .field("socket", &self.socket)
            .field("peer", &self.peer)
            .field("read", &self.handle_read.state())
            .field("write", &self.handle_write.state())
            .finish_non_exhaustive()
    }
}

impl Drop for AsyncIoState {
    fn drop(&mut self) {
        trace!(peer = %self.peer, "releasing socket");
    }
}

/// Which adapter a piece of posted work drives
#[derive(Debug, Clone, Copy)]
pub(crate) enum Direction {
    Read,
    Write,
}

/// The state's share carried by work posted to the executor
///
/// While an operation is outstanding the state and the operation keep each other alive. If the
/// executor drops the work without running it, as a runtime shutting down does, that cycle would
/// never be broken, so dropping an unrun `Posted` resets the adapter instead. The operation and
/// its callback are released without the callback running.
pub(crate) struct Posted {
    state: Option<Arc<AsyncIoState>>,
    direction: Direction,
}

impl Posted {
    pub(crate) fn new(state: Arc<AsyncIoState>, direction: Direction) -> Self {
        Self {
            state: Some(state),
            direction,
        }
    }

    /// Hand out the state for running the work
    pub(crate) fn run(mut self) -> Option<Arc<AsyncIoState>> {
        self.state.take()
    }
}

impl Drop for Posted {
    fn drop(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };
        debug!(
            peer = %state.peer,
            direction = ?self.direction,
            "executor dropped posted work, releasing operation"
        );
        match self.direction {
            Direction::Read => drop(state.handle_read.reset()),
            Direction::Write => drop(state.handle_write.reset()),
        }
    }
}

/// Raw result of a socket operation, as delivered to a completion adapter
pub(crate) enum Outcome<T> {
    Completed(io::Result<T>),
    /// The socket dropped its notification without completing it
    Cancelled,
}

/// Completion token for a read handed to a [`SocketBackend`]
///
/// Exactly one of [`complete`](Self::complete) or dropping the token must happen per submitted
/// read. Dropping it reports the read as cancelled.
#[derive(Debug)]
#[must_use = "dropping a notification cancels the operation"]
pub struct ReadNotification {
    state: Option<Weak<AsyncIoState>>,
}

impl ReadNotification {
    fn new(state: &Arc<AsyncIoState>) -> Self {
        Self {
            state: Some(Arc::downgrade(state)),
        }
    }

    /// Report that the read into `buf` finished
    ///
    /// On success `result` is the number of bytes placed at the start of `buf`; zero signals a
    /// clean end of stream.
    pub fn complete(mut self, mut buf: BytesMut, result: io::Result<usize>) {
        let outcome = result.map(|n| {
            buf.truncate(n);
            buf.freeze()
        });
        self.deliver(Outcome::Completed(outcome));
    }

    fn deliver(&mut self, outcome: Outcome<Bytes>) {
        let Some(state) = self.state.take().and_then(|state| state.upgrade()) else {
            return;
        };
        let executor = state.executor.clone();
        let posted = Posted::new(state, Direction::Read);
        executor.run(Box::new(move || {
            if let Some(state) = posted.run() {
                adapter::complete_read(state, outcome);
            }
        }));
    }
}

impl Drop for ReadNotification {
    fn drop(&mut self) {
        self.deliver(Outcome::Cancelled);
    }
}

/// Completion token for a write handed to a [`SocketBackend`]
///
/// Exactly one of [`complete`](Self::complete) or dropping the token must happen per submitted
/// write. Dropping it reports the write as cancelled.
#[derive(Debug)]
#[must_use = "dropping a notification cancels the operation"]
pub struct WriteNotification {
    state: Option<Weak<AsyncIoState>>,
}

impl WriteNotification {
    fn new(state: &Arc<AsyncIoState>) -> Self {
        Self {
            state: Some(Arc::downgrade(state)),
        }
    }

    /// Report that the write finished
    ///
    /// On success `result` is the number of bytes the socket accepted, which may be fewer than
    /// were submitted.
    pub fn complete(mut self, result: io::Result<usize>) {
        self.deliver(Outcome::Completed(result));
    }

    fn deliver(&mut self, outcome: Outcome<usize>) {
        let Some(state) = self.state.take().and_then(|state| state.upgrade()) else {
            return;
        };
        let executor = state.executor.clone();
        let posted = Posted::new(state, Direction::Write);
        executor.run(Box::new(move || {
            if let Some(state) = posted.run() {
                adapter::complete_write(state, outcome);
            }
        }));
    }
}

impl Drop for WriteNotification {
    fn drop(&mut self) {
        self.deliver(Outcome::Cancelled);
    }
}
