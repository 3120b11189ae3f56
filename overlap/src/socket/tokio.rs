use std::{
    io::{self, IoSlice},
    net::{Shutdown, SocketAddr},
    sync::Arc,
};

use bytes::{Bytes, BytesMut};
use socket2::{SockRef, TcpKeepalive};
use tokio::{net::TcpStream, runtime::Handle};
use tracing::trace;

use super::SocketBackend;
use crate::{
    config::EndpointConfig,
    io_state::{ReadNotification, WriteNotification},
};

/// A [`SocketBackend`] emulating overlapped I/O on a Tokio TCP stream
///
/// Every submission runs as a task on the runtime that completes the notification once the
/// kernel finished the operation.
#[derive(Debug)]
pub struct TokioSocket {
    io: Arc<TcpStream>,
    handle: Handle,
    peer: SocketAddr,
    local: SocketAddr,
}

impl TokioSocket {
    /// Take over a connected `stream`, running its I/O on the current Tokio runtime
    pub fn from_std(stream: std::net::TcpStream, config: &EndpointConfig) -> io::Result<Self> {
        let handle = Handle::try_current().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Self::with_handle(stream, config, handle)
    }

    /// Take over a connected `stream`, running its I/O on the runtime behind `handle`
    pub fn with_handle(
        stream: std::net::TcpStream,
        config: &EndpointConfig,
        handle: Handle,
    ) -> io::Result<Self> {
        let sock = SockRef::from(&stream);
        sock.set_nodelay(config.tcp_nodelay)?;
        if let Some(idle) = config.keepalive {
            sock.set_tcp_keepalive(&TcpKeepalive::new().with_time(idle))?;
        }
        stream.set_nonblocking(true)?;
        let peer = stream.peer_addr()?;
        let local = stream.local_addr()?;

        let io = {
            let _guard = handle.enter();
            TcpStream::from_std(stream)?
        };
        Ok(Self {
            io: Arc::new(io),
            handle,
            peer,
            local,
        })
    }
}

impl SocketBackend for TokioSocket {
    fn submit_read(&self, mut buf: BytesMut, done: ReadNotification) {
        let io = self.io.clone();
        self.handle.spawn(async move {
            let result = loop {
                if let Err(e) = io.readable().await {
                    break Err(e);
                }
                match io.try_read(&mut buf) {
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    res => break res,
                }
            };
            done.complete(buf, result);
        });
    }

    fn submit_write(&self, data: Vec<Bytes>, done: WriteNotification) {
        let io = self.io.clone();
        self.handle.spawn(async move {
            let result = loop {
                if let Err(e) = io.writable().await {
                    break Err(e);
                }
                let slices = data.iter().map(|s| IoSlice::new(s)).collect::<Vec<_>>();
                match io.try_write_vectored(&slices) {
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                    res => break res,
                }
            };
            done.complete(result);
        });
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.peer)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn shutdown(&self) {
        // Fails with `NotConnected` once the peer is gone, which is fine here
        if let Err(e) = SockRef::from(&*self.io).shutdown(Shutdown::Both) {
            trace!(peer = %self.peer, "shutdown failed: {}", e);
        }
    }
}
