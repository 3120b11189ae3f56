use std::io;

use thiserror::Error;

/// Errors reported to the callback of a read or write
///
/// Any of these ends the operation; callers should treat them as fatal for the connection. A
/// clean end of stream is not an error: reads report it as `Ok(0)`.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The connection was closed, either locally or by the peer
    #[error("connection closed")]
    ConnectionClosed,
    /// The peer reset the connection
    #[error("connection reset by peer")]
    ConnectionReset,
    /// The socket backend abandoned the operation before it completed
    #[error("operation cancelled")]
    Cancelled,
    /// The socket reported an error not covered by the other variants
    ///
    /// The platform error code, if any, is available through [`EndpointError::raw_os_error()`].
    #[error("socket error: {0}")]
    Backend(#[source] io::Error),
}

impl EndpointError {
    /// The platform error code behind a [`EndpointError::Backend`] error
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::Backend(e) => e.raw_os_error(),
            _ => None,
        }
    }

    pub(crate) fn from_io(err: io::Error) -> Self {
        use io::ErrorKind::*;
        match err.kind() {
            ConnectionReset => Self::ConnectionReset,
            ConnectionAborted | BrokenPipe | NotConnected | UnexpectedEof => {
                Self::ConnectionClosed
            }
            _ => Self::Backend(err),
        }
    }
}

impl From<EndpointError> for io::Error {
    fn from(x: EndpointError) -> Self {
        use self::EndpointError::*;
        let kind = match x {
            ConnectionClosed => io::ErrorKind::NotConnected,
            ConnectionReset => io::ErrorKind::ConnectionReset,
            Cancelled => io::ErrorKind::Interrupted,
            Backend(e) => return e,
        };
        Self::new(kind, x)
    }
}
