use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::any;
use axum::Router;
use chrono::Utc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use whatsapp_mcp::config::WebhookConfig;
use whatsapp_mcp::store::models::{Chat, Message, WebhookRegistration};
use whatsapp_mcp::store::MessageStore;
use whatsapp_mcp::webhook::{sign_payload, WebhookManager};

#[derive(Clone, Default)]
struct Receiver {
    requests: Arc<Mutex<Vec<(HeaderMap, Bytes)>>>,
    responses: Arc<Mutex<VecDeque<u16>>>,
}

impl Receiver {
    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn capture(State(receiver): State<Receiver>, headers: HeaderMap, body: Bytes) -> StatusCode {
    receiver.requests.lock().unwrap().push((headers, body));
    let status = receiver
        .responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(200);
    StatusCode::from_u16(status).unwrap()
}

/// Spawns a throwaway HTTP endpoint that records every request and answers
/// with the scripted status codes (200 once the script runs out).
async fn spawn_receiver(responses: Vec<u16>) -> (SocketAddr, Receiver) {
    let receiver = Receiver {
        requests: Arc::new(Mutex::new(Vec::new())),
        responses: Arc::new(Mutex::new(responses.into())),
    };
    let router = Router::new()
        .route("/hook", any(capture))
        .with_state(receiver.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (addr, receiver)
}

async fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

fn test_config() -> WebhookConfig {
    WebhookConfig {
        retry_backoff: vec![
            Duration::ZERO,
            Duration::from_millis(50),
            Duration::from_millis(100),
        ],
        ..Default::default()
    }
}

struct Fixture {
    store: Arc<MessageStore>,
    manager: Arc<WebhookManager>,
    _dir: TempDir,
}

fn fixture(config: WebhookConfig) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(
        MessageStore::open(dir.path().join("messages.db").to_str().unwrap()).unwrap(),
    );
    let manager =
        WebhookManager::start(store.clone(), config, CancellationToken::new()).unwrap();
    Fixture {
        store,
        manager,
        _dir: dir,
    }
}

fn register(store: &MessageStore, id: &str, url: String, secret: &str, active: bool) {
    let now = Utc::now().timestamp();
    store
        .create_webhook(&WebhookRegistration {
            id: id.to_string(),
            url,
            secret: secret.to_string(),
            event_types: vec!["message".to_string()],
            active,
            created_at: now,
            updated_at: now,
        })
        .unwrap();
}

fn seed_message(store: &MessageStore, id: &str) -> whatsapp_mcp::store::MessageWithNames {
    let jid = "5511999999999@s.whatsapp.net";
    store
        .save_chat(&Chat {
            jid: jid.to_string(),
            push_name: "Maria".to_string(),
            last_message_time: 1_735_639_200,
            ..Default::default()
        })
        .unwrap();
    store
        .save_message(&Message {
            id: id.to_string(),
            chat_jid: jid.to_string(),
            sender_jid: jid.to_string(),
            text: "hi".to_string(),
            timestamp: 1_735_639_200,
            is_from_me: false,
            message_type: "text".to_string(),
        })
        .unwrap();
    store.get_message_with_names(id).unwrap().unwrap()
}

#[tokio::test]
async fn delivery_posts_signed_payload_and_records_attempt() {
    let (addr, receiver) = spawn_receiver(vec![200]).await;
    let fx = fixture(test_config());
    register(
        &fx.store,
        "wh-1",
        format!("http://{addr}/hook"),
        "s3cret",
        true,
    );

    let msg = seed_message(&fx.store, "M1");
    fx.manager.emit_message_event(&msg, None).unwrap();

    assert!(wait_until(Duration::from_secs(5), || receiver.request_count() >= 1).await);

    let (headers, body) = receiver.requests.lock().unwrap()[0].clone();
    assert_eq!(headers.get("content-type").unwrap(), "application/json");
    assert_eq!(headers.get("user-agent").unwrap(), "WhatsApp-MCP-Webhook/1.0");
    assert_eq!(headers.get("x-webhook-id").unwrap(), "wh-1");
    let event_id = headers.get("x-event-id").unwrap().to_str().unwrap();
    assert_eq!(
        headers.get("x-webhook-signature").unwrap().to_str().unwrap(),
        sign_payload(&body, "s3cret")
    );

    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(payload["id"], event_id);
    assert_eq!(payload["event_type"], "message.received");
    assert_eq!(payload["data"]["message_id"], "M1");
    assert_eq!(payload["data"]["chat_name"], "Maria");
    assert_eq!(payload["data"]["is_group"], false);

    assert!(
        wait_until(Duration::from_secs(5), || {
            fx.store
                .list_deliveries("wh-1")
                .map(|rows| rows.iter().any(|(_, _, success, _)| *success))
                .unwrap_or(false)
        })
        .await
    );
    let rows = fx.store.list_deliveries("wh-1").unwrap();
    assert_eq!(rows[0].3, Some(200));
}

#[tokio::test]
async fn failed_deliveries_retry_until_success() {
    let (addr, receiver) = spawn_receiver(vec![500, 500, 200]).await;
    let fx = fixture(test_config());
    register(&fx.store, "wh-1", format!("http://{addr}/hook"), "", true);

    let msg = seed_message(&fx.store, "M1");
    fx.manager.emit_message_event(&msg, None).unwrap();

    assert!(wait_until(Duration::from_secs(5), || receiver.request_count() >= 3).await);
    assert!(
        wait_until(Duration::from_secs(5), || {
            fx.store.list_deliveries("wh-1").map(|r| r.len()).unwrap_or(0) >= 3
        })
        .await
    );

    let rows = fx.store.list_deliveries("wh-1").unwrap();
    assert_eq!(rows.len(), 3);
    // Same payload id across all attempts; attempt numbers 1..=3.
    assert!(rows.iter().all(|(payload_id, _, _, _)| payload_id == &rows[0].0));
    let attempts: Vec<i32> = rows.iter().map(|(_, attempt, _, _)| *attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(rows[0].2, false);
    assert_eq!(rows[1].2, false);
    assert!(rows[2].2);
    assert_eq!(rows[2].3, Some(200));
}

#[tokio::test]
async fn retries_are_capped_by_backoff_table() {
    let (addr, receiver) = spawn_receiver(vec![500; 10]).await;
    let fx = fixture(test_config());
    register(&fx.store, "wh-1", format!("http://{addr}/hook"), "", true);

    let msg = seed_message(&fx.store, "M1");
    fx.manager.emit_message_event(&msg, None).unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || {
            fx.store.list_deliveries("wh-1").map(|r| r.len()).unwrap_or(0) >= 3
        })
        .await
    );
    // Give any over-eager fourth attempt a chance to show up.
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(receiver.request_count(), 3);
    let rows = fx.store.list_deliveries("wh-1").unwrap();
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|(_, _, success, _)| !success));
}

#[tokio::test]
async fn inactive_webhooks_are_skipped() {
    let (addr, receiver) = spawn_receiver(Vec::new()).await;
    let fx = fixture(test_config());
    register(&fx.store, "wh-off", format!("http://{addr}/hook"), "", false);

    let msg = seed_message(&fx.store, "M1");
    fx.manager.emit_message_event(&msg, None).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(receiver.request_count(), 0);
}

#[tokio::test]
async fn each_webhook_gets_its_own_payload_id() {
    let (addr, receiver) = spawn_receiver(Vec::new()).await;
    let fx = fixture(test_config());
    register(&fx.store, "wh-1", format!("http://{addr}/hook"), "", true);
    register(&fx.store, "wh-2", format!("http://{addr}/hook"), "", true);

    let msg = seed_message(&fx.store, "M1");
    fx.manager.emit_message_event(&msg, None).unwrap();

    assert!(wait_until(Duration::from_secs(5), || receiver.request_count() >= 2).await);
    let requests = receiver.requests.lock().unwrap();
    let id_of = |i: usize| {
        requests[i]
            .0
            .get("x-event-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string()
    };
    assert_ne!(id_of(0), id_of(1));
}

#[tokio::test]
async fn test_delivery_bypasses_queue() {
    let (addr, _receiver) = spawn_receiver(vec![200]).await;
    let fx = fixture(test_config());
    register(&fx.store, "wh-1", format!("http://{addr}/hook"), "", true);
    let webhook = fx.store.get_webhook("wh-1").unwrap();

    let msg = seed_message(&fx.store, "M1");
    let payload = whatsapp_mcp::webhook::manager::build_message_payload(&msg, None);
    fx.manager.test_delivery(&webhook, &payload).await.unwrap();

    // Failure path: endpoint now answers 500.
    let (addr2, _receiver2) = spawn_receiver(vec![500]).await;
    register(&fx.store, "wh-2", format!("http://{addr2}/hook"), "", true);
    let webhook2 = fx.store.get_webhook("wh-2").unwrap();
    assert!(fx.manager.test_delivery(&webhook2, &payload).await.is_err());
}

#[tokio::test]
async fn shutdown_drains_workers() {
    let fx = fixture(test_config());
    tokio::time::timeout(Duration::from_secs(5), fx.manager.shutdown())
        .await
        .expect("shutdown must complete promptly with idle workers");
}
