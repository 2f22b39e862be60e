//! 通知处理管线
//!
//! 每条事件依次经过：来源过滤 → 防抖去重 → 发布。
//! 去重内部出错时放行（宁可重复也不丢通知）。

use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::connection::{BrokerClient, SendResult};
use crate::notification::{NotificationDeduplicator, NotificationEvent};
use crate::publisher::Publisher;

/// Why an event was not considered for forwarding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Disabled,
    SelfSource,
    Excluded,
}

/// What the pipeline did with an event
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Filtered(FilterReason),
    Suppressed,
    Published(SendResult),
}

/// 来源过滤
#[derive(Debug, Clone, Default)]
pub struct SourceFilter {
    disabled: bool,
    self_source_id: Option<String>,
    excluded: BTreeSet<String>,
}

impl SourceFilter {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            disabled: !config.enabled,
            self_source_id: config.self_source_id.clone(),
            excluded: config.excluded_apps.clone(),
        }
    }

    pub fn check(&self, event: &NotificationEvent) -> Option<FilterReason> {
        if self.disabled {
            return Some(FilterReason::Disabled);
        }
        if self.self_source_id.as_deref() == Some(event.source_id.as_str()) {
            return Some(FilterReason::SelfSource);
        }
        if self.excluded.contains(&event.source_id) {
            return Some(FilterReason::Excluded);
        }
        None
    }
}

/// Running totals for one pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub malformed: u64,
    pub filtered: u64,
    pub suppressed: u64,
    pub sent: u64,
    pub dropped: u64,
}

pub struct NotificationPipeline<C: BrokerClient> {
    filter: SourceFilter,
    dedup: NotificationDeduplicator,
    publisher: Publisher<C>,
    stats: PipelineStats,
}

impl<C: BrokerClient> NotificationPipeline<C> {
    pub fn new(filter: SourceFilter, dedup: NotificationDeduplicator, publisher: Publisher<C>) -> Self {
        Self {
            filter,
            dedup,
            publisher,
            stats: PipelineStats::default(),
        }
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn deduplicator(&self) -> &NotificationDeduplicator {
        &self.dedup
    }

    /// 处理一条事件，`now` 为到达时间
    pub fn handle(&mut self, event: &NotificationEvent, now: Instant) -> Disposition {
        self.stats.received += 1;

        if let Some(reason) = self.filter.check(event) {
            debug!(source_id = %event.source_id, reason = ?reason, "Notification filtered");
            self.stats.filtered += 1;
            return Disposition::Filtered(reason);
        }

        if self.dedup.should_suppress_or_forward(event, now) {
            self.stats.suppressed += 1;
            return Disposition::Suppressed;
        }

        let result = self.publisher.publish(event);
        match &result {
            SendResult::Sent => self.stats.sent += 1,
            SendResult::Skipped(_) | SendResult::Failed(_) => self.stats.dropped += 1,
        }
        Disposition::Published(result)
    }

    /// 处理一行 JSON；无法解析的行记录警告后丢弃
    pub fn handle_line(&mut self, line: &str, now: Instant) -> Option<Disposition> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        match NotificationEvent::from_json_line(line) {
            Ok(event) => Some(self.handle(&event, now)),
            Err(e) => {
                warn!(error = %e, "Dropping malformed notification line");
                self.stats.malformed += 1;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionManager, DryRunClient, QoS};
    use std::sync::Arc;
    use std::time::Duration;

    fn event(source: &str) -> NotificationEvent {
        NotificationEvent::new(source).with_title("t").with_body("b")
    }

    #[test]
    fn test_filter_passes_by_default() {
        let filter = SourceFilter::from_config(&BridgeConfig::default());
        assert_eq!(filter.check(&event("com.chat")), None);
    }

    #[test]
    fn test_filter_disabled() {
        let mut config = BridgeConfig::default();
        config.enabled = false;
        let filter = SourceFilter::from_config(&config);
        assert_eq!(filter.check(&event("com.chat")), Some(FilterReason::Disabled));
    }

    #[test]
    fn test_filter_self_and_excluded() {
        let mut config = BridgeConfig::default();
        config.self_source_id = Some("notif.bridge".to_string());
        config.excluded_apps.insert("com.spam".to_string());
        let filter = SourceFilter::from_config(&config);

        assert_eq!(filter.check(&event("notif.bridge")), Some(FilterReason::SelfSource));
        assert_eq!(filter.check(&event("com.spam")), Some(FilterReason::Excluded));
        assert_eq!(filter.check(&event("com.chat")), None);
    }

    #[test]
    fn test_debounce_panic_forwards_and_pipeline_continues() {
        let mut config = BridgeConfig::default();
        config.broker_uri = "tcp://localhost:1883".to_string();
        config.client_id = Some("pipeline-unit".to_string());

        let manager = Arc::new(ConnectionManager::new(
            DryRunClient::new(),
            config.connection(),
            config.retry_policy(),
        ));
        let publisher = Publisher::new(manager, config.topic.clone(), QoS::AtLeastOnce);
        let mut pipeline = NotificationPipeline::new(
            SourceFilter::from_config(&config),
            config.deduplicator().with_fault_source("com.broken"),
            publisher,
        );

        let t0 = Instant::now();
        // not connected, so a forwarded event ends as a silent drop
        let broken = pipeline.handle(&event("com.broken"), t0);
        assert!(matches!(broken, Disposition::Published(SendResult::Skipped(_))));

        let next = event("com.chat");
        let first = pipeline.handle(&next, t0 + Duration::from_millis(1));
        assert!(matches!(first, Disposition::Published(SendResult::Skipped(_))));
        assert_eq!(
            pipeline.handle(&next, t0 + Duration::from_millis(2)),
            Disposition::Suppressed
        );

        let stats = pipeline.stats();
        assert_eq!(stats.received, 3);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(stats.dropped, 2);
    }
}
