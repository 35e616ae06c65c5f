//! End-to-end relay tests over loopback

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use image_relay::client::{ClientConfig, RelayConnector, RelayPublisher, RelaySubscriber};
use image_relay::protocol::constants::*;
use image_relay::server::{RelayServer, ServerConfig, StaticToken};
use image_relay::{Envelope, Error, Role, Status};

const TOKEN: &str = "test-token";

struct TestRelay {
    server: Arc<RelayServer>,
    addr: SocketAddr,
    task: JoinHandle<image_relay::Result<()>>,
}

impl TestRelay {
    async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(RelayServer::new(
            config.shutdown_timeout(Duration::from_secs(2)),
            StaticToken::new(TOKEN),
        ));

        let serving = Arc::clone(&server);
        let task = tokio::spawn(async move { serving.serve(listener, std::future::pending()).await });

        Self { server, addr, task }
    }

    fn config(&self) -> ClientConfig {
        ClientConfig::new(format!("ws://{}", self.addr)).reply_timeout(Duration::from_secs(5))
    }

    async fn publisher(&self) -> RelayPublisher {
        let (mut publisher, _events) = RelayPublisher::new(self.config().token(TOKEN));
        publisher.connect().await.unwrap();
        publisher
    }

    async fn subscriber(&self) -> RelaySubscriber {
        RelaySubscriber::connect(self.config()).await.unwrap()
    }

    async fn wait_for_subscribers(&self, count: usize) {
        let registry = self.server.registry();
        for _ in 0..200 {
            if registry.subscriber_count().await == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} subscribers", count);
    }

    async fn wait_for_publisher(&self, present: bool) {
        let registry = self.server.registry();
        for _ in 0..200 {
            if registry.has_publisher().await == present {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected publisher present = {}", present);
    }

    /// Plain HTTP GET, returns the raw response
    async fn http_get(&self, path: &str) -> String {
        let mut stream = TcpStream::connect(self.addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, self.addr
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
            .await
            .unwrap()
            .unwrap();
        response
    }

    async fn stop(self) {
        self.server.shutdown_token().cancel();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

fn envelope(pairs: &[(&str, &str)]) -> Envelope {
    let mut envelope = Envelope::new();
    for (key, value) in pairs {
        envelope.insert(*key, *value);
    }
    envelope
}

#[tokio::test]
async fn test_ping_pong() {
    let relay = TestRelay::start(ServerConfig::default()).await;
    let mut publisher = relay.publisher().await;

    let reply = publisher.ping().await.unwrap();
    assert_eq!(reply.status(), Some(Status::Ok));
    assert_eq!(reply.get_str(KEY_MESSAGE), Some(MSG_PONG));

    // Type matching ignores case
    publisher
        .send_envelope(&envelope(&[("type", "ping")]))
        .await
        .unwrap();
    let reply = publisher.next_reply().await.unwrap();
    assert_eq!(reply.get_str(KEY_MESSAGE), Some(MSG_PONG));

    relay.stop().await;
}

#[tokio::test]
async fn test_image_fans_out_to_subscribers_only() {
    let relay = TestRelay::start(ServerConfig::default()).await;
    let mut first = relay.subscriber().await;
    let mut second = relay.subscriber().await;
    relay.wait_for_subscribers(2).await;

    let mut publisher = relay.publisher().await;
    relay.wait_for_publisher(true).await;

    let image = b"\x89PNG\r\n\x1a\n fake image body".to_vec();
    let reply = publisher.publish(&image).await.unwrap();
    assert_eq!(reply.status(), Some(Status::Ok));
    assert_eq!(reply.get_str(KEY_TYPE), Some("IMAGE"));
    assert_eq!(reply.get_str(KEY_MESSAGE), Some(MSG_IMAGE_RECEIVED));

    assert_eq!(first.next_image().await.unwrap(), image);
    assert_eq!(second.next_image().await.unwrap(), image);

    // The publisher's next message is its own pong, not the relayed image
    publisher.ping().await.unwrap();

    let stats = relay.server.stats().snapshot();
    assert_eq!(stats.images_received, 1);
    assert!(stats.encoded_bytes > 0);

    relay.stop().await;
}

#[tokio::test]
async fn test_relayed_envelope_is_verbatim() {
    let relay = TestRelay::start(ServerConfig::default()).await;
    let mut subscriber = relay.subscriber().await;
    relay.wait_for_subscribers(1).await;
    let mut publisher = relay.publisher().await;

    let sent = envelope(&[("frame", "42"), ("type", "IMAGE"), ("image", "aGVsbG8=")]);
    publisher.send_envelope(&sent).await.unwrap();
    let reply = publisher.next_reply().await.unwrap();
    assert_eq!(reply.status(), Some(Status::Ok));

    let received = subscriber.next_envelope().await.unwrap();
    assert_eq!(received.keys().collect::<Vec<_>>(), vec!["frame", "type", "image"]);
    assert_eq!(received, sent);
    assert!(!received.contains_key(KEY_STATUS));

    relay.stop().await;
}

#[tokio::test]
async fn test_subscriber_sees_frames_in_publish_order() {
    let relay = TestRelay::start(ServerConfig::default()).await;
    let mut subscriber = relay.subscriber().await;
    relay.wait_for_subscribers(1).await;
    let mut publisher = relay.publisher().await;

    // Acks arrive before fan-out finishes, so frames overlap in flight
    for frame in 0..50u32 {
        publisher.send_image(&frame.to_be_bytes()).await.unwrap();
    }
    for _ in 0..50 {
        let reply = publisher.next_reply().await.unwrap();
        assert_eq!(reply.get_str(KEY_MESSAGE), Some(MSG_IMAGE_RECEIVED));
    }

    for frame in 0..50u32 {
        assert_eq!(subscriber.next_image().await.unwrap(), frame.to_be_bytes());
    }

    relay.stop().await;
}

#[tokio::test]
async fn test_malformed_json_answered_over_raw_connector() {
    let relay = TestRelay::start(ServerConfig::default()).await;
    let mut connector = RelayConnector::connect(relay.config(), Role::Subscriber)
        .await
        .unwrap();
    assert_eq!(connector.role(), Role::Subscriber);
    assert_eq!(connector.config().url, format!("ws://{}", relay.addr));

    connector.send_text("{not json").await.unwrap();
    let reply = connector.next_envelope().await.unwrap();
    assert_eq!(reply.status(), Some(Status::Error));
    assert!(reply.get_str(KEY_MESSAGE).unwrap().starts_with("invalid JSON"));

    connector.send_text("[1, 2, 3]").await.unwrap();
    let reply = connector.next_envelope().await.unwrap();
    assert_eq!(reply.status(), Some(Status::Error));

    connector.close().await.unwrap();
    relay.stop().await;
}

#[tokio::test]
async fn test_protocol_errors_answered() {
    let relay = TestRelay::start(ServerConfig::default()).await;
    let mut subscriber = relay.subscriber().await;
    relay.wait_for_subscribers(1).await;
    let mut publisher = relay.publisher().await;

    // Unknown type
    publisher
        .send_envelope(&envelope(&[("type", "VIDEO")]))
        .await
        .unwrap();
    let reply = publisher.next_reply().await.unwrap();
    assert_eq!(reply.status(), Some(Status::Error));
    assert_eq!(reply.get_str(KEY_MESSAGE), Some(MSG_TYPE_REQUIRED));

    // Missing type is dropped, so the next reply is the pong
    publisher
        .send_envelope(&envelope(&[("image", "aGk=")]))
        .await
        .unwrap();
    publisher.ping().await.unwrap();

    // Image without payload
    publisher
        .send_envelope(&envelope(&[("type", "IMAGE")]))
        .await
        .unwrap();
    let reply = publisher.next_reply().await.unwrap();
    assert_eq!(reply.status(), Some(Status::Error));
    assert_eq!(reply.get_str(KEY_MESSAGE), Some(MSG_IMAGE_REQUIRED));

    // Subscribers may not publish
    subscriber
        .send_envelope(&envelope(&[("type", "IMAGE"), ("image", "aGk=")]))
        .await
        .unwrap();
    let reply = subscriber.next_envelope().await.unwrap();
    assert_eq!(reply.status(), Some(Status::Error));
    assert_eq!(reply.get_str(KEY_MESSAGE), Some(MSG_PUBLISHER_ONLY));

    assert_eq!(relay.server.stats().snapshot().images_received, 0);

    relay.stop().await;
}

#[tokio::test]
async fn test_oversized_message_rejected_and_session_survives() {
    let relay = TestRelay::start(ServerConfig::default().max_message_size(256)).await;
    let mut publisher = relay.publisher().await;

    let err = publisher.publish(&[7u8; 1024]).await.unwrap_err();
    match err {
        Error::UnexpectedReply(message) => assert!(message.contains("exceeds"), "{}", message),
        other => panic!("unexpected {:?}", other),
    }

    publisher.ping().await.unwrap();
    publisher.publish(&[7u8; 16]).await.unwrap();

    relay.stop().await;
}

#[tokio::test]
async fn test_publisher_credentials() {
    let relay = TestRelay::start(ServerConfig::default()).await;

    let (mut missing, _events) = RelayPublisher::new(relay.config());
    let err = missing.connect().await.unwrap_err();
    assert!(matches!(err, Error::Rejected { status: 400 }), "{:?}", err);

    let (mut wrong, _events) = RelayPublisher::new(relay.config().token("not-the-token"));
    let err = wrong.connect().await.unwrap_err();
    assert!(matches!(err, Error::Rejected { status: 401 }), "{:?}", err);

    assert!(!relay.server.registry().has_publisher().await);
    assert_eq!(relay.server.stats().snapshot().connections_rejected, 2);

    relay.stop().await;
}

#[tokio::test]
async fn test_invalid_socket_type_rejected() {
    let relay = TestRelay::start(ServerConfig::default()).await;

    for query in ["", "?socket_type=3", "?socket_type=abc"] {
        let url = format!("ws://{}{}{}", relay.addr, STREAM_PATH, query);
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 400, "{}", url);
            }
            Err(other) => panic!("unexpected error for {}: {:?}", url, other),
            Ok(_) => panic!("upgrade accepted for {}", url),
        }
    }

    relay.stop().await;
}

#[tokio::test]
async fn test_plain_http_requests() {
    let relay = TestRelay::start(ServerConfig::default()).await;

    let health = relay.http_get(HEALTH_PATH).await;
    assert!(health.starts_with("HTTP/1.1 200"), "{}", health);
    assert!(health.ends_with("ok"), "{}", health);

    let stream = relay
        .http_get(&format!("{}?socket_type=1", STREAM_PATH))
        .await;
    assert!(stream.starts_with("HTTP/1.1 400"), "{}", stream);

    relay.stop().await;
}

#[tokio::test]
async fn test_second_publisher_closed_with_policy_violation() {
    let relay = TestRelay::start(ServerConfig::default()).await;
    let mut first = relay.publisher().await;
    relay.wait_for_publisher(true).await;

    let mut second = relay.publisher().await;
    let err = second.next_reply().await.unwrap_err();
    assert_eq!(err.close_code(), Some(CLOSE_POLICY_VIOLATION));
    assert!(!second.is_connected());

    // The slot holder is unaffected
    first.ping().await.unwrap();
    first.publish(b"still streaming").await.unwrap();

    relay.stop().await;
}

#[tokio::test]
async fn test_publisher_slot_reused_after_disconnect() {
    let relay = TestRelay::start(ServerConfig::default()).await;

    let mut first = relay.publisher().await;
    relay.wait_for_publisher(true).await;
    first.disconnect().await.unwrap();
    relay.wait_for_publisher(false).await;

    let mut second = relay.publisher().await;
    relay.wait_for_publisher(true).await;
    second.ping().await.unwrap();

    relay.stop().await;
}

#[tokio::test]
async fn test_subscriber_departure_does_not_block_relay() {
    let relay = TestRelay::start(ServerConfig::default()).await;
    let leaving = relay.subscriber().await;
    let mut staying = relay.subscriber().await;
    relay.wait_for_subscribers(2).await;

    leaving.close().await.unwrap();
    relay.wait_for_subscribers(1).await;

    let mut publisher = relay.publisher().await;
    publisher.publish(b"frame").await.unwrap();
    assert_eq!(staying.next_image().await.unwrap(), b"frame");

    relay.stop().await;
}

#[tokio::test]
async fn test_connection_limit() {
    let relay = TestRelay::start(ServerConfig::default().max_connections(1)).await;
    let holder = relay.subscriber().await;

    let err = RelaySubscriber::connect(relay.config()).await.err().unwrap();
    assert!(matches!(err, Error::Rejected { status: 503 }), "{:?}", err);

    holder.close().await.unwrap();
    relay.wait_for_subscribers(0).await;

    // The permit is released once the session has finished
    let mut admitted = None;
    for _ in 0..200 {
        if let Ok(subscriber) = RelaySubscriber::connect(relay.config()).await {
            admitted = Some(subscriber);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(admitted.is_some());

    relay.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_sessions_with_going_away() {
    let relay = TestRelay::start(ServerConfig::default()).await;
    let mut subscriber = relay.subscriber().await;
    let mut publisher = relay.publisher().await;
    relay.wait_for_subscribers(1).await;
    relay.wait_for_publisher(true).await;

    let server = Arc::clone(&relay.server);
    relay.stop().await;

    let err = subscriber.next_envelope().await.unwrap_err();
    assert_eq!(err.close_code(), Some(CLOSE_GOING_AWAY));
    let err = publisher.next_reply().await.unwrap_err();
    assert_eq!(err.close_code(), Some(CLOSE_GOING_AWAY));

    assert!(!server.registry().has_publisher().await);
    assert_eq!(server.registry().subscriber_count().await, 0);
}
