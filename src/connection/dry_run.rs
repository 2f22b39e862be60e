//! Dry-run broker: always connects, writes payloads to stdout

use anyhow::Result;
use std::io::Write;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use super::broker::{BrokerClient, ConnectionObserver, QoS};
use crate::config::ConnectionConfig;

#[derive(Default)]
pub struct DryRunClient {
    observer: Mutex<Option<Arc<dyn ConnectionObserver>>>,
    next_id: AtomicU16,
}

impl DryRunClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BrokerClient for DryRunClient {
    async fn connect(
        &self,
        config: &ConnectionConfig,
        observer: Arc<dyn ConnectionObserver>,
    ) -> Result<()> {
        eprintln!("[DRY-RUN] Would connect to {} as {}", config.broker_uri, config.client_id);
        *self.observer.lock().unwrap_or_else(|e| e.into_inner()) = Some(observer);
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(
            stdout,
            "{}",
            serde_json::json!({
                "topic": topic,
                "qos": qos.level(),
                "payload": serde_json::from_slice::<serde_json::Value>(&payload)?,
            })
        )?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        if let Some(observer) = self.observer.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            observer.on_delivered(id);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.observer.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}
