use std::time::Duration;

use crate::{DEFAULT_TARGET_READ_SIZE, MAX_READ_SIZE};

/// Parameters governing an [`Endpoint`](crate::Endpoint) and its socket
///
/// Default values should be suitable for most stream transports.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub(crate) target_read_size: usize,
    pub(crate) tcp_nodelay: bool,
    pub(crate) keepalive: Option<Duration>,
}

impl EndpointConfig {
    /// Number of bytes a read requests from the socket when the caller gives no hint
    ///
    /// Values are clamped to between one byte and [`MAX_READ_SIZE`].
    pub fn target_read_size(&mut self, value: usize) -> &mut Self {
        self.target_read_size = value.clamp(1, MAX_READ_SIZE);
        self
    }

    /// Whether to disable Nagle's algorithm on the socket
    pub fn tcp_nodelay(&mut self, value: bool) -> &mut Self {
        self.tcp_nodelay = value;
        self
    }

    /// Idle time before TCP keepalive probes are sent, or `None` to leave keepalive off
    pub fn keepalive(&mut self, value: Option<Duration>) -> &mut Self {
        self.keepalive = value;
        self
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            target_read_size: DEFAULT_TARGET_READ_SIZE,
            tcp_nodelay: true,
            keepalive: None,
        }
    }
}

/// Per-call parameters of [`Endpoint::read`](crate::Endpoint::read)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadArgs {
    /// Number of bytes the caller expects to need, overriding the configured target read size
    ///
    /// Advisory: a read never requests more than [`MAX_READ_SIZE`](crate::MAX_READ_SIZE) bytes.
    pub read_hint_bytes: Option<usize>,
}

/// Per-call parameters of [`Endpoint::write`](crate::Endpoint::write)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteArgs {
    /// Largest number of bytes offered to the socket in a single submission
    pub max_frame_size: Option<usize>,
}
