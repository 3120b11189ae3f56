use std::{fmt::Debug, io, net::SocketAddr};

use bytes::{Bytes, BytesMut};

use crate::io_state::{ReadNotification, WriteNotification};

/// A connected stream socket performing completion-based I/O
///
/// Submissions must not block. The outcome of each one is reported later, from any thread, by
/// completing the notification that came with it; the endpoint then delivers it through its
/// [`Executor`](crate::Executor). A backend that abandons an operation simply drops its
/// notification, which reports the operation as cancelled.
///
/// At most one read and one write are outstanding at any time.
pub trait SocketBackend: Send + Sync + Debug + 'static {
    /// Read into `buf`, reporting the number of bytes placed at its start
    ///
    /// `buf` is owned by the operation until `done` is completed, so it stays valid even if the
    /// endpoint is dropped in the meantime.
    fn submit_read(&self, buf: BytesMut, done: ReadNotification);

    /// Write from `data` in order, reporting the number of bytes accepted
    ///
    /// Accepting only a prefix of `data` is fine; the endpoint resubmits the rest.
    fn submit_write(&self, data: Vec<Bytes>, done: WriteNotification);

    /// Look up the address of the connected peer
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Look up the local address the socket is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Shut down both directions of the connection
    ///
    /// Must be safe to call while operations are outstanding. Those still complete, typically
    /// with an error or an end of stream.
    fn shutdown(&self);
}

#[cfg(feature = "runtime-tokio")]
mod tokio;
#[cfg(feature = "runtime-tokio")]
pub use self::tokio::TokioSocket;
