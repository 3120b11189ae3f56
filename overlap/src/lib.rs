//! Completion-based socket endpoints
//!
//! This crate turns an already-connected stream socket into a callback-driven byte stream. The
//! socket itself performs overlapped (completion-based) I/O: a submission returns immediately and
//! its outcome is delivered later, on a thread owned by an [`Executor`].
//!
//! The entry point of this crate is the [`Endpoint`].
//!
//! # Lifetime of in-flight operations
//!
//! A read or write handed to the kernel may complete after the [`Endpoint`] that issued it has
//! been dropped. Everything such a completion needs (the socket, the buffer and the user's
//! callback) therefore lives in shared state that is kept alive by every outstanding operation,
//! not by the endpoint. Dropping an endpoint shuts the socket down and releases its share; it
//! never waits for outstanding I/O. Each [`Endpoint::read`] and [`Endpoint::write`] invokes its
//! callback exactly once, even when the endpoint is already gone.
//!
//! Buffers move into an operation by value and are handed back to its callback, so a stale
//! completion can only ever touch memory owned by that operation.
//!
//! # Collaborators
//!
//! The endpoint is generic over the [`SocketBackend`] performing the actual I/O and the
//! [`Executor`] delivering completions. With the `runtime-tokio` feature (enabled by default),
//! [`TokioSocket`] and [`TokioExecutor`] provide both on top of Tokio.
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![warn(clippy::use_self)]

use std::time::Duration;

mod adapter;
mod address;
mod allocator;
mod buffer;
mod config;
mod endpoint;
mod error;
mod io_state;
mod runtime;
mod socket;

pub use crate::adapter::AdapterState;
pub use crate::address::ResolvedAddress;
pub use crate::allocator::{MemoryAllocator, MemoryQuota, Reservation};
pub use crate::buffer::SliceBuffer;
pub use crate::config::{EndpointConfig, ReadArgs, WriteArgs};
pub use crate::endpoint::Endpoint;
pub use crate::error::EndpointError;
pub use crate::io_state::{ReadNotification, WriteNotification};
#[cfg(feature = "runtime-tokio")]
pub use crate::runtime::TokioExecutor;
pub use crate::runtime::{default_executor, Executor, Work};
#[cfg(feature = "runtime-tokio")]
pub use crate::socket::TokioSocket;
pub use crate::socket::SocketBackend;


/// Callback receiving the outcome of [`Endpoint::read`] along with the buffer it filled
pub type ReadCallback = Box<dyn FnOnce(Result<usize, EndpointError>, SliceBuffer) + Send>;

/// Callback receiving the outcome of [`Endpoint::write`] along with the buffer it drained
pub type WriteCallback = Box<dyn FnOnce(Result<usize, EndpointError>, SliceBuffer) + Send>;

/// Number of bytes requested from the socket by a read when the caller gives no hint
const DEFAULT_TARGET_READ_SIZE: usize = 8192;

/// Largest region a single read asks the socket to fill, whatever the hint or configuration
pub const MAX_READ_SIZE: usize = 4 * 1024 * 1024;

/// Maximum number of slices handed to the socket in a single write submission
pub const MAX_WRITE_SLICES: usize = 16;

/// Number of consecutive zero-byte write completions tolerated before the write fails
const MAX_ZERO_WRITE_RETRIES: u32 = 8;

/// Delay before resubmitting the first zero-byte write; doubles on every further retry
const ZERO_WRITE_BACKOFF_START: Duration = Duration::from_millis(1);

/// Upper bound for the zero-byte write backoff
const ZERO_WRITE_BACKOFF_MAX: Duration = Duration::from_millis(64);

/// Log at most 1 socket error per minute and endpoint
const IO_ERROR_LOG_INTERVAL: Duration = Duration::from_secs(60);
