//! Concurrency and lifecycle rules for clients and servers.

#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use pvhotwater_ipc::core::packet::Packet;
use pvhotwater_ipc::{
    Client, IpcConfig, Message, ProtocolError, RequestOptions, Response, Server, ServerState,
    Variant,
};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

fn config(dir: &TempDir) -> IpcConfig {
    IpcConfig::default_with_overrides(|c| {
        c.endpoint.socket_path = dir.path().join("core.sock");
        c.endpoint.secret = "SuperSecret123".into();
        c.server.recv_timeout = Duration::from_millis(200);
        c.client.retries = 20;
        c.client.retry_delay = Duration::from_millis(20);
    })
}

async fn wait_for_state(server: &Server, state: ServerState) {
    for _ in 0..200 {
        if server.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("server never reached {state}, stuck at {}", server.state());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_serve_call_is_concurrent_use() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(Server::new(&config(&dir)).unwrap());

    let first = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve_once(None).await }
    });
    wait_for_state(&server, ServerState::Serving).await;

    assert!(matches!(
        server.serve_once(None).await,
        Err(ProtocolError::ConcurrentUse(_))
    ));
    assert!(matches!(
        server.serve_forever().await,
        Err(ProtocolError::ConcurrentUse(_))
    ));
    assert!(matches!(server.bind(), Err(ProtocolError::ConcurrentUse(_))));

    // A pending shutdown ends the wait for a connection
    server.shutdown().await.unwrap();
    first.await.unwrap().unwrap();
    assert_eq!(server.state(), ServerState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_during_serve_forever_then_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(Server::new(&config(&dir)).unwrap());

    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve_forever().await }
    });
    wait_for_state(&server, ServerState::Serving).await;
    assert!(server.socket_path().exists());

    server.shutdown().await.unwrap();
    serving.await.unwrap().unwrap();
    assert!(!server.socket_path().exists());

    assert!(matches!(
        server.serve_forever().await,
        Err(ProtocolError::Lifecycle(_))
    ));
    assert!(matches!(
        server.serve_once(Some(Duration::from_millis(10))).await,
        Err(ProtocolError::Lifecycle(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_client_rejects_overlapping_requests() {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(Client::new(&config(&dir)).unwrap());

    // Nothing is listening, so this request stays busy retrying for a while
    let slow = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            let options = RequestOptions {
                retries: 10,
                retry_delay: Duration::from_millis(50),
                ..RequestOptions::default()
            };
            client.request_with(&Message::ping(), options).await
        }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(matches!(
        client.request(&Message::ping()).await,
        Err(ProtocolError::ConcurrentUse(_))
    ));
    assert!(matches!(client.close(), Err(ProtocolError::Lifecycle(_))));
    assert!(!client.is_closed());

    assert!(matches!(
        slow.await.unwrap(),
        Err(ProtocolError::Transport { attempts: 11, .. })
    ));

    client.close().unwrap();
    assert!(matches!(
        client.request(&Message::ping()).await,
        Err(ProtocolError::Lifecycle(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handler_error_terminates_serve_forever() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);

    let mut server = Server::new(&config).unwrap();
    server
        .on_message(Variant::Ping, |_| Ok(Response::simple(true)))
        .on_message(Variant::Push, |_| {
            Err(ProtocolError::Custom("water heater offline".into()))
        });
    server.bind().unwrap();
    let server = Arc::new(server);

    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve_forever().await }
    });

    let client = Client::new(&config).unwrap();
    assert!(client.request(&Message::ping()).await.unwrap().is_ack());
    assert!(matches!(
        client.request(&Message::push(1)).await,
        Err(ProtocolError::NoResponse)
    ));

    match serving.await.unwrap() {
        Err(ProtocolError::Handler(inner)) => {
            assert!(matches!(*inner, ProtocolError::Custom(_)));
        }
        other => panic!("expected handler error, got {other:?}"),
    }

    // Still bound and usable until shut down
    assert_eq!(server.state(), ServerState::Bound);
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_recv_timeout_is_an_idle_tick() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(Server::new(&config(&dir)).unwrap());
    server.bind().unwrap();

    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve_once(Some(Duration::from_millis(100))).await }
    });

    // Connect but never send anything
    let silent = UnixStream::connect(server.socket_path()).await.unwrap();
    serving.await.unwrap().unwrap();
    drop(silent);

    assert_eq!(server.metrics().snapshot().idle_ticks, 1);
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_mid_stream_disconnect_is_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);

    let mut server = Server::new(&config).unwrap();
    server.on_message(Variant::Ping, |_| Ok(Response::simple(true)));
    server.bind().unwrap();
    let server = Arc::new(server);

    // serve_once reports the broken cycle
    let once = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve_once(None).await }
    });
    let frame = Packet::new(vec![0xAB; 64]).to_bytes().unwrap();
    let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();
    stream.write_all(&frame[..20]).await.unwrap();
    drop(stream);

    let err = once.await.unwrap().unwrap_err();
    assert!(!err.terminates_serving());

    // serve_forever logs it and keeps going
    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve_forever().await }
    });
    let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();
    stream.write_all(&frame[..20]).await.unwrap();
    drop(stream);

    let client = Client::new(&config).unwrap();
    assert!(client.request(&Message::ping()).await.unwrap().is_ack());

    server.shutdown().await.unwrap();
    serving.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unauthenticated_frame_fails_serve_once() {
    let dir = tempfile::tempdir().unwrap();
    let server = Arc::new(Server::new(&config(&dir)).unwrap());
    server.bind().unwrap();

    let once = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve_once(None).await }
    });

    let frame = Packet::new(vec![0x5A; 80]).to_bytes().unwrap();
    let mut stream = UnixStream::connect(server.socket_path()).await.unwrap();
    stream.write_all(&frame).await.unwrap();

    assert!(matches!(
        once.await.unwrap(),
        Err(ProtocolError::Authentication(_))
    ));
    server.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_waits_for_in_flight_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir);

    let mut server = Server::new(&config).unwrap();
    server.on_message(Variant::Query, |msg| {
        std::thread::sleep(Duration::from_millis(400));
        Ok(Response::ack(msg.payload().clone()))
    });
    server.bind().unwrap();
    let server = Arc::new(server);

    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve_forever().await }
    });

    let client = Client::new(&config).unwrap();
    let in_flight = tokio::spawn(async move { client.request(&Message::query("Hello!")).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    server.shutdown().await.unwrap();
    let waited = started.elapsed();
    assert!(
        waited >= Duration::from_millis(200),
        "shutdown returned after {waited:?}, before the handler finished"
    );

    let response = in_flight.await.unwrap().unwrap();
    assert!(response.is_ack());
    assert_eq!(response.payload.as_text(), Some("Hello!"));

    serving.await.unwrap().unwrap();
    assert_eq!(server.state(), ServerState::Closed);
    assert!(matches!(
        server.serve_once(None).await,
        Err(ProtocolError::Lifecycle(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handler_panic_terminates_threaded_serve_forever() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir);
    config.server.threaded = true;

    let mut server = Server::new(&config).unwrap();
    server
        .on_message(Variant::Ping, |_| Ok(Response::simple(true)))
        .on_message(Variant::Push, |_| panic!("relay driver bug"));
    server.bind().unwrap();
    let server = Arc::new(server);

    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve_forever().await }
    });

    let client = Client::new(&config).unwrap();
    assert!(client.request(&Message::ping()).await.unwrap().is_ack());
    assert!(matches!(
        client.request(&Message::push(1)).await,
        Err(ProtocolError::NoResponse)
    ));

    let joined = tokio::time::timeout(Duration::from_secs(5), serving)
        .await
        .expect("serve_forever kept running after a handler panic");
    assert!(joined.unwrap_err().is_panic());

    assert_eq!(server.state(), ServerState::Bound);
    server.shutdown().await.unwrap();
    assert!(!server.socket_path().exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_threaded_shutdown_at_capacity_leaves_queued_client_unserved() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir);
    config.server.threaded = true;
    config.server.max_connections = 1;

    let mut server = Server::new(&config).unwrap();
    server
        .on_message(Variant::Ping, |_| Ok(Response::simple(true)))
        .on_message(Variant::Query, |msg| {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Response::ack(msg.payload().clone()))
        });
    server.bind().unwrap();
    let server = Arc::new(server);

    let serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve_forever().await }
    });

    let busy = tokio::spawn({
        let config = config.clone();
        async move {
            let client = Client::new(&config).unwrap();
            client.request(&Message::query("busy")).await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Connects into the backlog; the only slot is taken
    let queued = tokio::spawn({
        let config = config.clone();
        async move {
            let client = Client::new(&config).unwrap();
            let options = RequestOptions {
                retries: 0,
                ..RequestOptions::default()
            };
            client.request_with(&Message::ping(), options).await
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stopping = tokio::time::timeout(Duration::from_secs(5), server.shutdown())
        .await
        .expect("shutdown stalled at capacity");
    stopping.unwrap();

    let response = busy.await.unwrap().unwrap();
    assert_eq!(response.payload.as_text(), Some("busy"));

    let queued = tokio::time::timeout(Duration::from_secs(5), queued)
        .await
        .expect("queued client never heard back");
    assert!(queued.unwrap().is_err());

    serving.await.unwrap().unwrap();
    assert_eq!(server.metrics().snapshot().messages_dispatched, 1);
}
