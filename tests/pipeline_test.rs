//! 通知管线端到端测试：NDJSON 输入 → 过滤 → 防抖 → 发布

use anyhow::Result;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use notif_bridge::{
    BridgeConfig, BridgeService, BrokerClient, ConnectionConfig, ConnectionObserver, Disposition,
    FilterReason, NotificationEvent, QoS, SendResult,
};

#[derive(Default)]
struct RecordingBroker {
    published: Mutex<Vec<(String, Vec<u8>, QoS)>>,
}

impl RecordingBroker {
    fn payloads(&self) -> Vec<Value> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, bytes, _)| serde_json::from_slice(bytes).unwrap())
            .collect()
    }
}

impl BrokerClient for RecordingBroker {
    async fn connect(
        &self,
        _config: &ConnectionConfig,
        _observer: Arc<dyn ConnectionObserver>,
    ) -> Result<()> {
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload, qos));
        Ok(())
    }

    async fn disconnect(&self) {}
}

fn config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.broker_uri = "tcp://localhost:1883".to_string();
    config.client_id = Some("pipeline-test".to_string());
    config
}

async fn connected_service(config: &BridgeConfig) -> BridgeService<RecordingBroker> {
    let service = BridgeService::new(config, RecordingBroker::default()).unwrap();
    service.manager().connect_async().await;
    assert!(service.manager().is_connected());
    service
}

#[tokio::test]
async fn test_ndjson_input_is_published() {
    let service_config = config();
    let mut service = connected_service(&service_config).await;

    let input = concat!(
        r#"{"source_id":"com.example.chat","app_name":"Chat","title":"Alice","body":"Hello","importance":4,"category":"msg","posted_at":"2026-01-02T03:04:05Z"}"#,
        "\n",
        r#"{"source_id":"com.example.mail","title":"Inbox","body":"1 new message","importance":2,"icon":"aWNvbg=="}"#,
        "\n",
    );
    let stats = service.run_lines(input.as_bytes()).await.unwrap();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.sent, 2);

    let broker = service.manager().client();
    let published = broker.published.lock().unwrap();
    assert_eq!(published[0].0, "notif2mqtt/notifications");
    assert_eq!(published[0].2, QoS::AtLeastOnce);
    drop(published);

    let payloads = broker.payloads();
    assert_eq!(payloads[0]["package"], "com.example.chat");
    assert_eq!(payloads[0]["app"], "Chat");
    assert_eq!(payloads[0]["title"], "Alice");
    assert_eq!(payloads[0]["text"], "Hello");
    assert_eq!(payloads[0]["timestamp"], 1767323045000i64);
    assert_eq!(payloads[0]["importance"], 4);
    assert_eq!(payloads[0]["category"], "msg");
    assert_eq!(payloads[0]["urgency"], "high");
    assert!(payloads[0].get("icon").is_none());
    assert!(payloads[0].get("previewImage").is_none());

    assert_eq!(payloads[1]["app"], "com.example.mail");
    assert_eq!(payloads[1]["category"], "");
    assert_eq!(payloads[1]["urgency"], "low");
    assert_eq!(payloads[1]["icon"], "aWNvbg==");

    service.shutdown().await;
}

#[tokio::test]
async fn test_malformed_lines_do_not_stop_processing() {
    let mut service = connected_service(&config()).await;

    let input = concat!(
        "{ not json\n",
        r#"{"source_id":"com.a","body":"first"}"#,
        "\n",
        "\n",
        r#"{"source_id":"","body":"empty source"}"#,
        "\n",
        r#"{"source_id":"com.b","importance":9}"#,
        "\n",
        r#"{"source_id":"com.c","body":"last"}"#,
        "\n",
    );
    let stats = service.run_lines(input.as_bytes()).await.unwrap();

    assert_eq!(stats.malformed, 3);
    assert_eq!(stats.sent, 2);

    let payloads = service.manager().client().payloads();
    assert_eq!(payloads[0]["package"], "com.a");
    assert_eq!(payloads[1]["package"], "com.c");
}

#[tokio::test]
async fn test_burst_is_debounced() {
    let mut service = connected_service(&config()).await;

    let line = r#"{"source_id":"com.example.dl","title":"Download","body":"Download complete - 100%"}"#;
    let variant = r#"{"source_id":"com.example.dl","title":"Download","body":"Download complete • 100%"}"#;
    let input = format!("{line}\n{line}\n{variant}\n{line}\n");

    let stats = service.run_lines(input.as_bytes()).await.unwrap();
    assert_eq!(stats.sent, 1);
    assert_eq!(stats.suppressed, 3);
    assert_eq!(service.manager().client().payloads().len(), 1);
}

#[tokio::test]
async fn test_filtered_sources_are_not_published() {
    let mut config = config();
    config.self_source_id = Some("notif.bridge".to_string());
    config.excluded_apps.insert("com.spam".to_string());
    let mut service = connected_service(&config).await;

    let now = Instant::now();
    let pipeline = service.pipeline_mut();
    assert_eq!(
        pipeline.handle(&NotificationEvent::new("notif.bridge").with_body("x"), now),
        Disposition::Filtered(FilterReason::SelfSource)
    );
    assert_eq!(
        pipeline.handle(&NotificationEvent::new("com.spam").with_body("x"), now),
        Disposition::Filtered(FilterReason::Excluded)
    );
    assert_eq!(
        pipeline.handle(&NotificationEvent::new("com.ham").with_body("x"), now),
        Disposition::Published(SendResult::Sent)
    );
    assert_eq!(pipeline.stats().filtered, 2);
    assert_eq!(service.manager().client().payloads().len(), 1);
}

#[tokio::test]
async fn test_disabled_bridge_forwards_nothing() {
    let mut config = config();
    config.enabled = false;
    let mut service = connected_service(&config).await;

    let stats = service
        .run_lines(r#"{"source_id":"com.a","body":"x"}"#.as_bytes())
        .await
        .unwrap();
    assert_eq!(stats.filtered, 1);
    assert_eq!(service.manager().client().payloads().len(), 0);
}

#[tokio::test]
async fn test_filtered_events_do_not_enter_cache() {
    let mut config = config();
    config.excluded_apps.insert("com.spam".to_string());
    let mut service = connected_service(&config).await;

    let event = NotificationEvent::new("com.spam").with_body("x");
    service.pipeline_mut().handle(&event, Instant::now());
    assert!(service.pipeline().deduplicator().cache().is_empty());
}

#[tokio::test]
async fn test_disconnected_events_are_dropped_not_queued() {
    let config = config();
    let mut service = BridgeService::new(&config, RecordingBroker::default()).unwrap();

    let t0 = Instant::now();
    let first = NotificationEvent::new("com.a").with_title("t").with_body("one");
    let second = NotificationEvent::new("com.a").with_title("t").with_body("two");

    let disposition = service.pipeline_mut().handle(&first, t0);
    assert!(matches!(disposition, Disposition::Published(SendResult::Skipped(_))));

    service.manager().connect_async().await;
    let disposition = service.pipeline_mut().handle(&second, t0 + Duration::from_millis(10));
    assert_eq!(disposition, Disposition::Published(SendResult::Sent));

    // only the event seen after connecting reaches the broker
    let payloads = service.manager().client().payloads();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["text"], "two");
    assert_eq!(service.pipeline().stats().dropped, 1);
}

#[tokio::test]
async fn test_debounce_timeline_through_pipeline() {
    let mut service = connected_service(&config()).await;
    let pipeline = service.pipeline_mut();

    let t0 = Instant::now();
    let ms = Duration::from_millis;
    let event = NotificationEvent::new("com.example").with_title("Sync").with_body("Syncing");

    assert_eq!(pipeline.handle(&event, t0), Disposition::Published(SendResult::Sent));
    assert_eq!(pipeline.handle(&event, t0 + ms(1500)), Disposition::Suppressed);
    assert_eq!(pipeline.handle(&event, t0 + ms(2600)), Disposition::Suppressed);
    assert_eq!(
        pipeline.handle(&event, t0 + ms(4600)),
        Disposition::Published(SendResult::Sent)
    );
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = config();
    config.broker_uri = "http://localhost".to_string();
    assert!(BridgeService::new(&config, RecordingBroker::default()).is_err());

    let mut config = self::config();
    config.qos = 7;
    assert!(BridgeService::new(&config, RecordingBroker::default()).is_err());
}

#[tokio::test(start_paused = true)]
async fn test_wait_connected() {
    let service = BridgeService::new(&config(), RecordingBroker::default()).unwrap();
    assert!(!service.wait_connected(Duration::from_secs(1)).await);

    service.start(None);
    assert!(service.wait_connected(Duration::from_secs(1)).await);
    service.shutdown().await;
    assert!(!service.manager().is_connected());
}
