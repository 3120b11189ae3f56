use std::{fmt, io, sync::Arc};

use tracing::{debug, trace};

use crate::{
    adapter::{AdapterState, PendingRead, PendingWrite},
    address::ResolvedAddress,
    allocator::MemoryAllocator,
    buffer::SliceBuffer,
    config::{EndpointConfig, ReadArgs, WriteArgs},
    error::EndpointError,
    io_state::AsyncIoState,
    runtime::Executor,
    socket::SocketBackend,
    MAX_READ_SIZE,
};
#[cfg(feature = "runtime-tokio")]
use crate::{runtime::default_executor, socket::TokioSocket};

/// A connected stream socket exposed as a callback-driven byte stream
///
/// At most one read and one write may be outstanding at a time; issuing a second one of the same
/// direction before the first one's callback ran is a programming error and panics. Reads and
/// writes are independent of each other.
///
/// Callbacks run on the endpoint's [`Executor`], never inside [`read()`](Self::read) or
/// [`write()`](Self::write). Dropping the endpoint shuts the socket down without waiting for
/// outstanding operations; their callbacks still run exactly once.
pub struct Endpoint {
    peer_address: ResolvedAddress,
    peer_address_string: String,
    local_address: ResolvedAddress,
    local_address_string: String,
    allocator: MemoryAllocator,
    target_read_size: usize,
    io_state: Arc<AsyncIoState>,
}

impl Endpoint {
    /// Wrap a connected `socket`, delivering completions through `executor`
    ///
    /// Fails if the socket's addresses cannot be looked up.
    pub fn new(
        socket: Box<dyn SocketBackend>,
        allocator: MemoryAllocator,
        config: &EndpointConfig,
        executor: Arc<dyn Executor>,
    ) -> io::Result<Self> {
        let peer_address = ResolvedAddress::new(socket.peer_addr()?);
        let local_address = ResolvedAddress::new(socket.local_addr()?);
        let peer_address_string = peer_address.to_uri_string();
        let local_address_string = local_address.to_uri_string();
        debug!(
            peer = %peer_address_string,
            local = %local_address_string,
            "endpoint created"
        );
        let io_state = AsyncIoState::new(socket, executor, peer_address_string.clone());
        Ok(Self {
            peer_address,
            peer_address_string,
            local_address,
            local_address_string,
            allocator,
            target_read_size: config.target_read_size,
            io_state,
        })
    }

    /// Wrap a connected TCP stream, using the Tokio runtime this function is called from
    #[cfg(feature = "runtime-tokio")]
    pub fn from_tcp_stream(
        stream: std::net::TcpStream,
        config: &EndpointConfig,
    ) -> io::Result<Self> {
        let executor = default_executor()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "no async runtime found"))?;
        let socket = TokioSocket::from_std(stream, config)?;
        Self::new(Box::new(socket), MemoryAllocator::unlimited(), config, executor)
    }

    /// Read from the socket into `buffer`
    ///
    /// `buffer` is cleared, then filled with up to [`ReadArgs::read_hint_bytes`] bytes (or the
    /// configured target read size), but never more than [`MAX_READ_SIZE`] per read. `on_read`
    /// receives the buffer back along with the number of bytes it now holds; `Ok(0)` means the
    /// peer closed its sending side.
    ///
    /// # Panics
    ///
    /// If a read is already outstanding on this endpoint.
    pub fn read<F>(&self, mut buffer: SliceBuffer, on_read: F, args: ReadArgs)
    where
        F: FnOnce(Result<usize, EndpointError>, SliceBuffer) + Send + 'static,
    {
        buffer.clear();
        let size = args
            .read_hint_bytes
            .unwrap_or(self.target_read_size)
            .clamp(1, MAX_READ_SIZE);
        self.io_state.handle_read.prime(PendingRead {
            io_state: self.io_state.clone(),
            buffer,
            reservation: self.allocator.reserve(size),
            on_read: Box::new(on_read),
        });
        self.io_state.submit_read(self.allocator.make_slice(size));
    }

    /// Write all of `data` to the socket
    ///
    /// The socket may take several submissions to accept everything; `on_written` only runs
    /// once the whole buffer was written or an error ended the write. On success it receives the
    /// number of bytes written, which is `data.len()`. The buffer is handed back either way.
    ///
    /// # Panics
    ///
    /// If a write is already outstanding on this endpoint.
    pub fn write<F>(&self, data: SliceBuffer, on_written: F, args: WriteArgs)
    where
        F: FnOnce(Result<usize, EndpointError>, SliceBuffer) + Send + 'static,
    {
        trace!(peer = %self.peer_address_string, len = data.len(), "write requested");
        self.io_state.handle_write.prime(PendingWrite {
            io_state: self.io_state.clone(),
            reservation: self.allocator.reserve(data.len()),
            data,
            written: 0,
            zero_writes: 0,
            max_frame_size: args.max_frame_size.unwrap_or(usize::MAX).max(1),
            on_written: Box::new(on_written),
        });
        self.io_state.submit_write();
    }

    /// The address of the connected peer
    pub fn peer_address(&self) -> &ResolvedAddress {
        &self.peer_address
    }

    /// The local address of the socket
    pub fn local_address(&self) -> &ResolvedAddress {
        &self.local_address
    }

    /// Display form of [`peer_address()`](Self::peer_address)
    pub fn peer_address_string(&self) -> &str {
        &self.peer_address_string
    }

    /// Display form of [`local_address()`](Self::local_address)
    pub fn local_address_string(&self) -> &str {
        &self.local_address_string
    }

    /// The allocator charged for this endpoint's buffers
    pub fn allocator(&self) -> &MemoryAllocator {
        &self.allocator
    }

    /// Whether a read is outstanding
    pub fn read_state(&self) -> AdapterState {
        self.io_state.handle_read.state()
    }

    /// Whether a write is outstanding
    pub fn write_state(&self) -> AdapterState {
        self.io_state.handle_write.state()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("peer", &self.peer_address_string)
            .field("local", &self.local_address_string)
            .field("io_state", &self.io_state)
            .finish_non_exhaustive()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        debug!(peer = %self.peer_address_string, "endpoint dropped");
        self.io_state.socket.shutdown();
    }
}
