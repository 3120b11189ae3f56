use std::{
    io, mem,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
#[cfg(feature = "lock_tracking")]
use std::{collections::VecDeque, time::Instant};

use bytes::Bytes;
#[cfg(feature = "lock_tracking")]
use tracing::warn;
use tracing::{debug, trace};

use crate::{
    allocator::Reservation,
    buffer::SliceBuffer,
    error::EndpointError,
    io_state::{AsyncIoState, Direction, Outcome, Posted},
    ReadCallback, WriteCallback, MAX_WRITE_SLICES, MAX_ZERO_WRITE_RETRIES,
    ZERO_WRITE_BACKOFF_MAX, ZERO_WRITE_BACKOFF_START,
};

/// Observable phase of a read or write completion adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    /// No operation is bound
    Idle,
    /// An operation is bound but not yet handed to the socket
    Primed,
    /// The socket owns the operation; its completion will fire the adapter
    Submitted,
}

enum Phase<Op> {
    Idle,
    Primed(Op),
    Submitted(Op),
}

impl<Op> Phase<Op> {
    fn state(&self) -> AdapterState {
        match self {
            Self::Idle => AdapterState::Idle,
            Self::Primed(_) => AdapterState::Primed,
            Self::Submitted(_) => AdapterState::Submitted,
        }
    }
}

/// The lock-protected part of an adapter
struct Slot<Op> {
    phase: Phase<Op>,
    /// Most recent transitions, newest first
    #[cfg(feature = "lock_tracking")]
    transitions: VecDeque<Transition>,
}

impl<Op> Slot<Op> {
    /// Note that `purpose` just moved the adapter out of `from`
    fn record(&mut self, purpose: &'static str, from: AdapterState) {
        #[cfg(feature = "lock_tracking")]
        {
            if self.transitions.len() == MAX_TRANSITIONS {
                self.transitions.pop_back();
            }
            let to = self.phase.state();
            self.transitions.push_front(Transition { purpose, from, to });
        }
        #[cfg(not(feature = "lock_tracking"))]
        let _ = (purpose, from);
    }
}

#[cfg(feature = "lock_tracking")]
#[derive(Clone, Copy)]
struct Transition {
    purpose: &'static str,
    from: AdapterState,
    to: AdapterState,
}

#[cfg(feature = "lock_tracking")]
impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?} -> {:?}", self.purpose, self.from, self.to)
    }
}

#[cfg(feature = "lock_tracking")]
const MAX_TRANSITIONS: usize = 8;

#[cfg(feature = "lock_tracking")]
const LOCK_WAIT_WARN: Duration = Duration::from_millis(1);

/// A reusable trampoline binding one in-flight operation to its buffer and callback
///
/// Transitions are strictly `Idle -> Primed -> Submitted -> Idle`. Priming an adapter that is
/// not idle, or submitting one that is not primed, violates the endpoint's single-outstanding
/// operation rule and panics.
///
/// With the `lock_tracking` feature the adapter remembers its last few transitions and reports
/// them when its lock was contended for over a millisecond.
pub(crate) struct CompletionAdapter<Op> {
    direction: &'static str,
    slot: Mutex<Slot<Op>>,
}

impl<Op> CompletionAdapter<Op> {
    pub(crate) fn new(direction: &'static str) -> Self {
        Self {
            direction,
            slot: Mutex::new(Slot {
                phase: Phase::Idle,
                #[cfg(feature = "lock_tracking")]
                transitions: VecDeque::new(),
            }),
        }
    }

    /// Acquire the slot on behalf of `purpose`
    ///
    /// A panic while the lock was held leaves the phase consistent, so poisoning is ignored.
    fn lock(&self, purpose: &'static str) -> MutexGuard<'_, Slot<Op>> {
        #[cfg(feature = "lock_tracking")]
        let requested = Instant::now();
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        #[cfg(feature = "lock_tracking")]
        {
            let waited = requested.elapsed();
            if waited > LOCK_WAIT_WARN {
                warn!(
                    direction = self.direction,
                    purpose,
                    ?waited,
                    recent = ?slot
                        .transitions
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>(),
                    "adapter lock contended"
                );
            }
        }
        #[cfg(not(feature = "lock_tracking"))]
        let _ = purpose;
        slot
    }

    pub(crate) fn state(&self) -> AdapterState {
        self.lock("state").phase.state()
    }

    /// Bind `op` to this adapter
    pub(crate) fn prime(&self, op: Op) {
        let mut slot = self.lock("prime");
        if !matches!(slot.phase, Phase::Idle) {
            drop(slot);
            panic!("{} already outstanding on this endpoint", self.direction);
        }
        slot.phase = Phase::Primed(op);
        slot.record("prime", AdapterState::Idle);
    }

    /// Mark the primed operation as handed to the socket, returning what `f` extracts from it
    ///
    /// Must happen before the socket sees the operation, since its completion may fire the
    /// adapter on another thread right away.
    pub(crate) fn submit_with<R>(&self, f: impl FnOnce(&mut Op) -> R) -> R {
        let mut slot = self.lock("submit");
        let out = match mem::replace(&mut slot.phase, Phase::Idle) {
            Phase::Primed(mut op) => {
                let out = f(&mut op);
                slot.phase = Phase::Submitted(op);
                out
            }
            other => {
                slot.phase = other;
                drop(slot);
                panic!("{} submitted without being primed", self.direction);
            }
        };
        slot.record("submit", AdapterState::Primed);
        out
    }

    /// Return to idle, handing back the bound operation if there was one
    ///
    /// Resetting an idle adapter does nothing and returns `None`.
    pub(crate) fn reset(&self) -> Option<Op> {
        let mut slot = self.lock("reset");
        let from = slot.phase.state();
        let op = match mem::replace(&mut slot.phase, Phase::Idle) {
            Phase::Idle => return None,
            Phase::Primed(op) | Phase::Submitted(op) => op,
        };
        slot.record("reset", from);
        Some(op)
    }

    /// Reset after the socket delivered a completion
    fn fire(&self) -> Op {
        match self.reset() {
            Some(op) => op,
            None => panic!("{} completion delivered twice", self.direction),
        }
    }

    /// Recent transitions, oldest first
    #[cfg(all(test, feature = "lock_tracking"))]
    fn transitions(&self) -> Vec<String> {
        let slot = self.lock("transitions");
        slot.transitions.iter().rev().map(ToString::to_string).collect()
    }
}

/// A read bound to the read adapter
pub(crate) struct PendingRead {
    /// Keeps the socket and adapters alive until this read completes
    pub(crate) io_state: Arc<AsyncIoState>,
    pub(crate) buffer: SliceBuffer,
    pub(crate) reservation: Reservation,
    pub(crate) on_read: ReadCallback,
}

/// A write bound to the write adapter, possibly spanning several socket submissions
pub(crate) struct PendingWrite {
    /// Keeps the socket and adapters alive until the whole buffer is written
    pub(crate) io_state: Arc<AsyncIoState>,
    pub(crate) data: SliceBuffer,
    /// Bytes of `data` the socket has accepted so far
    pub(crate) written: usize,
    /// Consecutive submissions the socket accepted nothing from
    pub(crate) zero_writes: u32,
    pub(crate) max_frame_size: usize,
    pub(crate) reservation: Reservation,
    pub(crate) on_written: WriteCallback,
}

impl PendingWrite {
    fn remaining(&self) -> usize {
        self.data.len() - self.written
    }

    /// The part of `data` to hand to the socket next
    pub(crate) fn next_slices(&self) -> Vec<Bytes> {
        self.data.slices_from(self.written, MAX_WRITE_SLICES, self.max_frame_size)
    }
}

/// Fire the read adapter with `outcome`
///
/// Runs on the executor. The adapter is idle and the operation's share of `state` is released
/// before the user callback runs, so the callback may issue another read or drop the endpoint.
pub(crate) fn complete_read(state: Arc<AsyncIoState>, outcome: Outcome<Bytes>) {
    let PendingRead {
        io_state,
        mut buffer,
        reservation,
        on_read,
    } = state.handle_read.fire();
    drop(reservation);

    let result = match outcome {
        Outcome::Completed(Ok(data)) => {
            buffer.append(data);
            Ok(buffer.len())
        }
        Outcome::Completed(Err(e)) => {
            state.log_io_error("read", &e);
            Err(EndpointError::from_io(e))
        }
        Outcome::Cancelled => Err(EndpointError::Cancelled),
    };
    trace!(peer = %state.peer, ?result, "read complete");

    drop(io_state);
    drop(state);
    on_read(result, buffer);
}

/// Fire the write adapter with `outcome`
///
/// A partial write re-primes the adapter with the rest of the buffer and resubmits it; only a
/// fully drained buffer or an error reaches the user callback.
pub(crate) fn complete_write(state: Arc<AsyncIoState>, outcome: Outcome<usize>) {
    let mut op = state.handle_write.fire();

    let result = match outcome {
        Outcome::Completed(Ok(0)) if op.remaining() > 0 => {
            op.zero_writes += 1;
            if op.zero_writes > MAX_ZERO_WRITE_RETRIES {
                Err(EndpointError::Backend(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "socket repeatedly accepted no data",
                )))
            } else {
                let delay = zero_write_backoff(op.zero_writes);
                debug!(
                    peer = %state.peer,
                    retry = op.zero_writes,
                    ?delay,
                    "socket accepted no data, backing off"
                );
                state.handle_write.prime(op);
                let executor = state.executor.clone();
                let posted = Posted::new(state, Direction::Write);
                executor.run_after(
                    delay,
                    Box::new(move || {
                        if let Some(state) = posted.run() {
                            state.submit_write();
                        }
                    }),
                );
                return;
            }
        }
        Outcome::Completed(Ok(n)) => {
            op.written += n.min(op.remaining());
            op.zero_writes = 0;
            if op.remaining() > 0 {
                trace!(
                    peer = %state.peer,
                    written = op.written,
                    remaining = op.remaining(),
                    "partial write"
                );
                state.handle_write.prime(op);
                state.submit_write();
                return;
            }
            Ok(op.written)
        }
        Outcome::Completed(Err(e)) => {
            state.log_io_error("write", &e);
            Err(EndpointError::from_io(e))
        }
        Outcome::Cancelled => Err(EndpointError::Cancelled),
    };
    trace!(peer = %state.peer, ?result, "write complete");

    let PendingWrite {
        io_state,
        data,
        reservation,
        on_written,
        ..
    } = op;
    drop(reservation);
    drop(io_state);
    drop(state);
    on_written(result, data);
}

fn zero_write_backoff(retry: u32) -> Duration {
    let exp = retry.saturating_sub(1).min(16);
    ZERO_WRITE_BACKOFF_START
        .saturating_mul(1 << exp)
        .min(ZERO_WRITE_BACKOFF_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycles_through_phases() {
        let adapter = CompletionAdapter::new("read");
        assert_eq!(adapter.state(), AdapterState::Idle);
        adapter.prime(7u32);
        assert_eq!(adapter.state(), AdapterState::Primed);
        assert_eq!(adapter.submit_with(|op| *op), 7);
        assert_eq!(adapter.state(), AdapterState::Submitted);
        assert_eq!(adapter.fire(), 7);
        assert_eq!(adapter.state(), AdapterState::Idle);
        adapter.prime(8);
        assert_eq!(adapter.state(), AdapterState::Primed);
    }

    #[test]
    fn reset_from_idle_is_a_no_op() {
        let adapter = CompletionAdapter::<u32>::new("write");
        assert_eq!(adapter.reset(), None);
        assert_eq!(adapter.reset(), None);
        assert_eq!(adapter.state(), AdapterState::Idle);

        adapter.prime(1);
        assert_eq!(adapter.reset(), Some(1));
        assert_eq!(adapter.reset(), None);
        assert_eq!(adapter.state(), AdapterState::Idle);
    }

    #[test]
    #[should_panic(expected = "read already outstanding")]
    fn prime_while_primed() {
        let adapter = CompletionAdapter::new("read");
        adapter.prime(1u32);
        adapter.prime(2);
    }

    #[test]
    #[should_panic(expected = "write already outstanding")]
    fn prime_while_submitted() {
        let adapter = CompletionAdapter::new("write");
        adapter.prime(1u32);
        adapter.submit_with(|_| ());
        adapter.prime(2);
    }

    #[test]
    #[should_panic(expected = "submitted without being primed")]
    fn submit_while_idle() {
        let adapter = CompletionAdapter::<u32>::new("read");
        adapter.submit_with(|_| ());
    }

    #[test]
    #[should_panic(expected = "completion delivered twice")]
    fn fire_twice() {
        let adapter = CompletionAdapter::new("read");
        adapter.prime(1u32);
        adapter.submit_with(|_| ());
        adapter.fire();
        adapter.fire();
    }

    #[cfg(feature = "lock_tracking")]
    #[test]
    fn records_recent_transitions() {
        let adapter = CompletionAdapter::new("write");
        for op in 0..5u32 {
            adapter.prime(op);
            adapter.submit_with(|_| ());
            adapter.fire();
        }
        assert_eq!(adapter.reset(), None);

        let transitions = adapter.transitions();
        assert_eq!(transitions.len(), 8);
        assert_eq!(transitions[5], "prime: Idle -> Primed");
        assert_eq!(transitions[6], "submit: Primed -> Submitted");
        assert_eq!(transitions[7], "reset: Submitted -> Idle");
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        assert_eq!(zero_write_backoff(1), Duration::from_millis(1));
        assert_eq!(zero_write_backoff(2), Duration::from_millis(2));
        assert_eq!(zero_write_backoff(4), Duration::from_millis(8));
        assert_eq!(zero_write_backoff(7), Duration::from_millis(64));
        assert_eq!(zero_write_backoff(30), ZERO_WRITE_BACKOFF_MAX);
    }
}
