//! End-to-end tests: real signaling server, real broadcaster and viewer
//! sessions over loopback WebSockets.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use aula::engine::MediaKind;
use aula::session::{
    Broadcaster, NoopLifecycle, SessionConfig, SessionEvent, SignalingClient, SyntheticSource,
    Viewer, ViewerPhase,
};
use aula::signaling::{PushEvent, ServerConfig, SignalingServer};
use tokio_test::assert_ok;

async fn start_server() -> (String, Arc<SignalingServer>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let config = ServerConfig::default().worker_pool_size(2);
    let server = Arc::new(SignalingServer::new(config).unwrap());

    let running = Arc::clone(&server);
    tokio::spawn(async move {
        let _ = running.run_on(listener).await;
    });

    (format!("ws://{}", addr), server)
}

fn session_config(url: &str) -> SessionConfig {
    SessionConfig::new(url).reconnect_backoff(Duration::from_millis(10))
}

#[tokio::test]
async fn viewer_waits_then_connects_on_first_produce() {
    let (url, server) = start_server().await;

    // Viewer joins an empty room and waits
    let mut viewer = Viewer::new(session_config(&url), "abc123");
    viewer.connect().await.unwrap();
    assert_eq!(viewer.phase(), ViewerPhase::Waiting);
    assert!(viewer.tracks().is_empty());
    assert!(viewer.recv_transport_id().is_none());

    // Broadcaster goes live with one audio and one video track
    let mut broadcaster = Broadcaster::new(
        session_config(&url),
        Arc::new(SyntheticSource),
        Arc::new(NoopLifecycle),
    );
    let room = broadcaster.go_live("abc123").await.unwrap();
    assert_eq!(room, "abc123");
    assert_eq!(broadcaster.producers().len(), 2);

    // Two pushes arrive; the receive transport is created on the first
    // one only
    assert!(viewer.process_one().await.unwrap());
    let transport = viewer.recv_transport_id().unwrap();
    assert!(viewer.process_one().await.unwrap());

    assert_eq!(viewer.phase(), ViewerPhase::Connected);
    assert_eq!(viewer.tracks().len(), 2);
    assert_eq!(viewer.recv_transport_id().unwrap(), transport);

    let kinds: HashSet<MediaKind> = viewer.tracks().iter().map(|t| t.kind).collect();
    assert!(kinds.contains(&MediaKind::Audio));
    assert!(kinds.contains(&MediaKind::Video));

    let stats = server.relay().stats().await;
    assert_eq!(stats.producers, 2);
    assert_eq!(stats.consumers, 2);
}

#[tokio::test]
async fn late_joiner_bulk_consumes_live_producers() {
    let (url, _server) = start_server().await;

    let mut broadcaster = Broadcaster::new(
        session_config(&url),
        Arc::new(SyntheticSource),
        Arc::new(NoopLifecycle),
    );
    broadcaster.go_live("course-7").await.unwrap();

    let mut viewer = Viewer::new(session_config(&url), "course-7");
    viewer.connect().await.unwrap();

    assert_eq!(viewer.phase(), ViewerPhase::Connected);
    assert_eq!(viewer.tracks().len(), 2);
}

#[tokio::test]
async fn end_lecture_prunes_viewer_tracks() {
    let (url, server) = start_server().await;

    let mut broadcaster = Broadcaster::new(
        session_config(&url),
        Arc::new(SyntheticSource),
        Arc::new(NoopLifecycle),
    );
    broadcaster.go_live("course-9").await.unwrap();

    let mut viewer = Viewer::new(session_config(&url), "course-9");
    viewer.connect().await.unwrap();
    assert_eq!(viewer.tracks().len(), 2);

    let closed = broadcaster.end_lecture().await.unwrap();
    assert_eq!(closed, 2);
    assert!(!broadcaster.is_live());

    // One producerClosed push per track
    assert!(viewer.process_one().await.unwrap());
    assert!(viewer.process_one().await.unwrap());
    assert!(viewer.tracks().is_empty());
    assert_eq!(viewer.phase(), ViewerPhase::Waiting);

    let stats = server.relay().stats().await;
    assert_eq!(stats.producers, 0);
    assert_eq!(stats.consumers, 0);
}

#[tokio::test]
async fn viewer_exhausts_reconnects_into_terminal_failure() {
    // The server runs on its own runtime so it can be torn down hard,
    // dropping every open socket.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    runtime.spawn(async move {
        let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
        let config = ServerConfig::default().worker_pool_size(1);
        let server = SignalingServer::new(config).unwrap();
        let _ = server.run_on(listener).await;
    });

    let url = format!("ws://{}", addr);
    let mut viewer = Viewer::new(session_config(&url), "doomed");
    viewer.connect().await.unwrap();
    assert_eq!(viewer.phase(), ViewerPhase::Waiting);

    // Simulated server drop
    runtime.shutdown_background();

    // Disconnect, then three failed attempts, then terminal failure
    let alive = viewer.process_one().await.unwrap();
    assert!(!alive);
    assert_eq!(viewer.phase(), ViewerPhase::Failed);

    // No infinite retry loop: the session stays down until a manual retry
    assert!(!viewer.process_one().await.unwrap());

    // Manual retry against a dead server fails and stays terminal
    assert!(viewer.retry().await.is_err());
    assert_eq!(viewer.phase(), ViewerPhase::Failed);
}

#[tokio::test]
async fn chat_fans_out_to_other_members() {
    let (url, _server) = start_server().await;

    let (speaker, _speaker_events) = SignalingClient::connect(&url).await.unwrap();
    tokio_test::assert_ok!(speaker.join_room("abc123").await);

    let (listener, mut listener_events) = SignalingClient::connect(&url).await.unwrap();
    tokio_test::assert_ok!(listener.join_room("abc123").await);

    speaker.chat("hello class").await.unwrap();

    match listener_events.recv().await {
        Some(SessionEvent::Push(PushEvent::Chat { text, .. })) => {
            assert_eq!(text, "hello class");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn stale_transport_id_is_rejected_not_fatal() {
    let (url, _server) = start_server().await;

    let (client, _events) = SignalingClient::connect(&url).await.unwrap();
    client.join_room("abc123").await.unwrap();

    let result = client
        .connect_transport(
            uuid::Uuid::new_v4(),
            aula::engine::DtlsParameters::generate(aula::engine::DtlsRole::Client),
        )
        .await;
    assert!(matches!(result, Err(aula::Error::Rejected(_))));

    // The connection survives the rejected request
    tokio_test::assert_ok!(client.get_router_capabilities().await);
}
