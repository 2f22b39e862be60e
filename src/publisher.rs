//! 发布器 - 把放行的事件格式化为消息并交给连接管理器

use std::sync::Arc;
use tracing::{debug, warn};

use crate::connection::{BrokerClient, ConnectionManager, QoS, SendResult};
use crate::notification::{NotificationEvent, NotificationPayload};

pub struct Publisher<C: BrokerClient> {
    manager: Arc<ConnectionManager<C>>,
    topic: String,
    qos: QoS,
}

impl<C: BrokerClient> Publisher<C> {
    pub fn new(manager: Arc<ConnectionManager<C>>, topic: impl Into<String>, qos: QoS) -> Self {
        Self {
            manager,
            topic: topic.into(),
            qos,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// 发布事件；未连接时返回 `Skipped`，不报错
    pub fn publish(&self, event: &NotificationEvent) -> SendResult {
        let payload = NotificationPayload::from_event(event);
        let bytes = match payload.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(source_id = %event.source_id, error = %e, "Failed to encode payload");
                return SendResult::Failed(e.to_string());
            }
        };

        let result = self.manager.publish(&self.topic, bytes, self.qos);
        debug!(
            app = %payload.app,
            title = %payload.title,
            urgency = %payload.urgency,
            result = ?result,
            "Notification published"
        );
        result
    }
}
