use std::{
    io::{self, Read, Write},
    net::{TcpListener, TcpStream},
    str,
    time::Duration,
};

use overlap::{
    AdapterState, Endpoint, EndpointConfig, EndpointError, ReadArgs, SliceBuffer, WriteArgs,
};
use rand::RngCore;
use tokio::{sync::oneshot, task, time::timeout};
use tracing_subscriber::EnvFilter;

#[tokio::test(flavor = "multi_thread")]
async fn ping_pong() {
    let _guard = subscribe();
    let (local, mut peer) = connected_pair();
    let endpoint = Endpoint::from_tcp_stream(local, &EndpointConfig::default()).unwrap();
    assert_eq!(
        endpoint.peer_address().socket_addr(),
        peer.local_addr().unwrap()
    );
    assert_eq!(
        endpoint.local_address().socket_addr(),
        peer.peer_addr().unwrap()
    );

    peer.write_all(b"PING").unwrap();
    let mut received = Vec::new();
    while received.len() < 4 {
        let hint = ReadArgs {
            read_hint_bytes: Some(4 - received.len()),
        };
        let (result, buf) = read(&endpoint, hint).await;
        assert!(result.unwrap() > 0);
        received.extend(buf.copy_to_vec());
    }
    assert_eq!(received, b"PING");

    let (result, _) = write(&endpoint, "PONG".into(), WriteArgs::default()).await;
    assert_eq!(result.unwrap(), 4);
    let reply = task::spawn_blocking(move || {
        let mut reply = [0; 4];
        peer.read_exact(&mut reply).map(|()| reply)
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(&reply, b"PONG");
}

#[tokio::test(flavor = "multi_thread")]
async fn large_write() {
    let _guard = subscribe();
    let (local, mut peer) = connected_pair();
    let endpoint = Endpoint::from_tcp_stream(local, &EndpointConfig::default()).unwrap();

    let mut payload = vec![0; 4 << 20];
    rand::thread_rng().fill_bytes(&mut payload);
    let mut data = SliceBuffer::new();
    for chunk in payload.chunks(64 * 1024) {
        data.extend_from_slice(chunk);
    }
    let reader = task::spawn_blocking(move || {
        let mut received = Vec::new();
        peer.read_to_end(&mut received).map(|_| received)
    });

    let (result, data) = write(&endpoint, data, WriteArgs::default()).await;
    assert_eq!(result.unwrap(), payload.len());
    assert_eq!(data.len(), payload.len());
    drop(endpoint);

    let received = reader.await.unwrap().unwrap();
    assert_eq!(received.len(), payload.len());
    assert!(received == payload, "payload corrupted in transit");
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_close_reads_zero() {
    let (local, peer) = connected_pair();
    let endpoint = Endpoint::from_tcp_stream(local, &EndpointConfig::default()).unwrap();
    drop(peer);

    let (result, buf) = read(&endpoint, ReadArgs::default()).await;
    assert!(matches!(result, Ok(0)), "expected end of stream, got {result:?}");
    assert!(buf.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn drop_with_read_outstanding() {
    let _guard = subscribe();
    let (local, _peer) = connected_pair();
    let mut config = EndpointConfig::default();
    config.keepalive(Some(Duration::from_secs(30)));
    let endpoint = Endpoint::from_tcp_stream(local, &config).unwrap();

    let (tx, rx) = oneshot::channel();
    endpoint.read(
        SliceBuffer::new(),
        move |result, buf| {
            let _ = tx.send((result, buf));
        },
        ReadArgs::default(),
    );
    assert_eq!(endpoint.read_state(), AdapterState::Submitted);
    drop(endpoint);

    let (result, _) = timeout(Duration::from_secs(5), rx)
        .await
        .expect("read callback never ran")
        .unwrap();
    // Shutting down the socket ends the read with either an end of stream or an error
    if let Ok(n) = result {
        assert_eq!(n, 0);
    }
}

#[test]
fn requires_runtime() {
    let (local, _peer) = connected_pair();
    let err = Endpoint::from_tcp_stream(local, &EndpointConfig::default()).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Other);
}

fn connected_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

async fn read(endpoint: &Endpoint, args: ReadArgs) -> (Result<usize, EndpointError>, SliceBuffer) {
    let (tx, rx) = oneshot::channel();
    endpoint.read(
        SliceBuffer::new(),
        move |result, buf| {
            let _ = tx.send((result, buf));
        },
        args,
    );
    rx.await.unwrap()
}

async fn write(
    endpoint: &Endpoint,
    data: SliceBuffer,
    args: WriteArgs,
) -> (Result<usize, EndpointError>, SliceBuffer) {
    let (tx, rx) = oneshot::channel();
    endpoint.write(
        data,
        move |result, buf| {
            let _ = tx.send((result, buf));
        },
        args,
    );
    rx.await.unwrap()
}

fn subscribe() -> tracing::subscriber::DefaultGuard {
    let sub = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(|| TestWriter)
        .finish();
    tracing::subscriber::set_default(sub)
}

struct TestWriter;

impl Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        print!(
            "{}",
            str::from_utf8(buf).expect("tried to log invalid UTF-8")
        );
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}
