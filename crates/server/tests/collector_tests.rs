use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::{Duration, Utc};
use tower::ServiceExt;
use uuid::Uuid;

use argus_core::{BatchReport, ConnectionReport, IpMetadata, Node, UpstreamError, User};
use argus_detector::{ConnectionMonitor, ViolationDetector};
use argus_enrich::IpEnricher;
use argus_notify::{Dispatcher, Messenger, NotifyConfig, NotifyError};
use argus_server::api;
use argus_server::state::AppState;
use argus_store::{LedgerStore, NewConnection};
use argus_store_memory::{MemoryLedgerStore, fixtures};
use argus_sync::SyncWorker;

// -- Test doubles ---------------------------------------------------------

#[derive(Default)]
struct RecordingMessenger {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(
        &self,
        _chat_id: i64,
        _thread_id: Option<i64>,
        text: String,
    ) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }
}

struct TableEnricher {
    table: HashMap<String, IpMetadata>,
}

impl TableEnricher {
    fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    fn with_countries(entries: &[(&str, &str)]) -> Self {
        let mut table = HashMap::new();
        for (ip, country) in entries {
            let mut meta = IpMetadata::private(*ip);
            meta.country_code = Some((*country).to_owned());
            table.insert((*ip).to_owned(), meta);
        }
        Self { table }
    }
}

#[async_trait]
impl IpEnricher for TableEnricher {
    async fn lookup(&self, ip: &str) -> Result<Option<IpMetadata>, UpstreamError> {
        Ok(self.table.get(ip).cloned())
    }
}

// -- Harness --------------------------------------------------------------

struct Harness {
    router: Router,
    store: Arc<MemoryLedgerStore>,
    messenger: Arc<RecordingMessenger>,
    user: User,
    node: Node,
    token: String,
}

async fn harness_with_enricher(enricher: Arc<dyn IpEnricher>) -> Harness {
    let store = Arc::new(MemoryLedgerStore::new());
    let user = fixtures::user("154", "alice@example.com");
    let node = fixtures::node("edge-1", Some("agent-token-1"));
    store.upsert_user(&user).await.unwrap();
    store.upsert_node(&node).await.unwrap();

    let messenger = Arc::new(RecordingMessenger::default());
    let dispatcher = Arc::new(Dispatcher::new(
        messenger.clone(),
        NotifyConfig {
            chat_id: Some(-100),
            violations_topic_id: Some(7),
            ..NotifyConfig::default()
        },
    ));

    let ledger: Arc<dyn LedgerStore> = store.clone();
    let state = AppState {
        store: ledger.clone(),
        monitor: Arc::new(ConnectionMonitor::new(ledger.clone())),
        detector: Arc::new(ViolationDetector::new(ledger.clone(), enricher)),
        dispatcher,
        sync: Some(Arc::new(SyncWorker::event_only(ledger))),
        webhook_secret: Some("shared-secret".to_owned()),
        database_connected: false,
    };

    Harness {
        router: api::router(state),
        store,
        messenger,
        user,
        node,
        token: "agent-token-1".to_owned(),
    }
}

async fn harness() -> Harness {
    harness_with_enricher(Arc::new(TableEnricher::empty())).await
}

fn report(h: &Harness, ip: &str, secs_ago: i64) -> ConnectionReport {
    ConnectionReport {
        user_email: "user_154".to_owned(),
        ip_address: ip.to_owned(),
        node_uuid: h.node.uuid,
        connected_at: Utc::now() - Duration::seconds(secs_ago),
        disconnected_at: None,
        bytes_sent: 0,
        bytes_received: 0,
    }
}

async fn post_batch(
    router: &Router,
    token: Option<&str>,
    batch: &BatchReport,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/connections/batch")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(batch).unwrap()))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

// -- Authentication -------------------------------------------------------

#[tokio::test]
async fn missing_header_is_401_and_inserts_nothing() {
    let h = harness().await;
    let batch = BatchReport::new(h.node.uuid, vec![report(&h, "203.0.113.1", 10)]);
    let (status, _) = post_batch(&h.router, None, &batch).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(h.store.open_connections(h.user.uuid, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_token_is_403() {
    let h = harness().await;
    let batch = BatchReport::new(h.node.uuid, vec![report(&h, "203.0.113.1", 10)]);
    let (status, _) = post_batch(&h.router, Some("wrong-token"), &batch).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(h.store.open_connections(h.user.uuid, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn token_pinned_to_another_node_is_403() {
    let h = harness().await;
    // A second node exists; the batch claims it while using node 1's token.
    let other = fixtures::node("edge-2", Some("agent-token-2"));
    h.store.upsert_node(&other).await.unwrap();

    let batch = BatchReport::new(other.uuid, vec![report(&h, "203.0.113.1", 10)]);
    let (status, _) = post_batch(&h.router, Some(&h.token), &batch).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(h.store.open_connections(h.user.uuid, 10).await.unwrap().is_empty());
}

// -- Batch processing -----------------------------------------------------

#[tokio::test]
async fn empty_batch_is_accepted() {
    let h = harness().await;
    let batch = BatchReport::new(h.node.uuid, Vec::new());
    let (status, body) = post_batch(&h.router, Some(&h.token), &batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 0);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unresolved_identity_counts_as_error_without_aborting() {
    let h = harness().await;
    let mut unknown = report(&h, "203.0.113.9", 10);
    unknown.user_email = "user_99999".to_owned();
    let batch = BatchReport::new(h.node.uuid, vec![unknown, report(&h, "203.0.113.1", 10)]);

    let (status, body) = post_batch(&h.router, Some(&h.token), &batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 1);
    assert_eq!(body["errors"], 1);
}

#[tokio::test]
async fn normal_handoff_closes_the_stale_row_without_a_violation() {
    let h = harness().await;

    // One open row with IP A, six minutes old.
    let stale_id = h
        .store
        .insert_connection(NewConnection {
            user_uuid: h.user.uuid,
            ip_address: "203.0.113.65".to_owned(),
            node_uuid: h.node.uuid,
            connected_at: Utc::now() - Duration::minutes(6),
            device_info: serde_json::Value::Null,
        })
        .await
        .unwrap();

    // A batch arrives with a single connection from IP B.
    let batch = BatchReport::new(h.node.uuid, vec![report(&h, "203.0.113.66", 5)]);
    let (status, body) = post_batch(&h.router, Some(&h.token), &batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 1);

    // The A row is closed, the B row is the whole active set.
    let open = h.store.open_connections(h.user.uuid, 10).await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].ip_address, "203.0.113.66");
    assert!(open.iter().all(|c| c.id != stale_id));

    // No violation for a plain handoff.
    assert!(h.messenger.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn true_simultaneity_dispatches_one_throttled_violation() {
    let h = harness().await;

    // Five distinct IPs spaced ten seconds apart, device allowance 1.
    let connections: Vec<ConnectionReport> = (0..5)
        .map(|i| report(&h, &format!("203.0.113.{i}"), 100 - i * 10))
        .collect();
    let batch = BatchReport::new(h.node.uuid, connections);

    let (status, body) = post_batch(&h.router, Some(&h.token), &batch).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed"], 5);

    {
        let sent = h.messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 1, "exactly one violation dispatched");
        assert!(sent[0].contains("Violation detected"));
    }

    // An identical batch a moment later is throttled.
    let again = BatchReport::new(
        h.node.uuid,
        (0..5)
            .map(|i| report(&h, &format!("203.0.113.{i}"), 40 - i * 5))
            .collect(),
    );
    let (status, _) = post_batch(&h.router, Some(&h.token), &again).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.messenger.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn impossible_travel_shows_up_in_the_score() {
    let enricher = Arc::new(TableEnricher::with_countries(&[
        ("198.51.100.1", "RU"),
        ("198.51.100.2", "US"),
        ("198.51.100.3", "US"),
    ]));
    let h = harness_with_enricher(enricher).await;

    // Three overlapping IPs across two countries: the temporal factor
    // fires too and the simultaneity floor applies.
    let batch = BatchReport::new(
        h.node.uuid,
        vec![
            report(&h, "198.51.100.1", 50),
            report(&h, "198.51.100.2", 30),
            report(&h, "198.51.100.3", 10),
        ],
    );
    let (status, _) = post_batch(&h.router, Some(&h.token), &batch).await;
    assert_eq!(status, StatusCode::OK);

    let sent = h.messenger.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("different countries"));
}

// -- Health ---------------------------------------------------------------

#[tokio::test]
async fn health_reports_database_state() {
    let h = harness().await;
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/connections/health")
        .body(Body::empty())
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database_connected"], false);
}

// -- Webhook --------------------------------------------------------------

async fn post_webhook(
    router: &Router,
    signature: Option<&str>,
    body: &serde_json::Value,
) -> StatusCode {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(sig) = signature {
        builder = builder.header("X-Remnawave-Signature", sig);
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    router.clone().oneshot(request).await.unwrap().status()
}

#[tokio::test]
async fn signed_user_event_updates_the_mirror() {
    let h = harness().await;
    let uuid = Uuid::new_v4();
    let event = serde_json::json!({
        "event": "user.created",
        "data": {"uuid": uuid.to_string(), "shortUuid": "777", "username": "bob"}
    });

    let status = post_webhook(&h.router, Some("shared-secret"), &event).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.store.user_by_short_uuid("777").await.unwrap().is_some());
}

#[tokio::test]
async fn bad_webhook_signature_is_rejected() {
    let h = harness().await;
    let event = serde_json::json!({"event": "user.created", "data": {}});
    assert_eq!(
        post_webhook(&h.router, Some("not-the-secret"), &event).await,
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        post_webhook(&h.router, None, &event).await,
        StatusCode::UNAUTHORIZED
    );
}
