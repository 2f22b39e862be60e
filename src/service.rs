//! 桥接服务 - 组装连接管理器、网络监控和通知管线

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::connection::{BrokerClient, ConnectionManager, ConnectionState};
use crate::pipeline::{NotificationPipeline, PipelineStats, SourceFilter};
use crate::publisher::Publisher;
use crate::network::NetworkEvent;

pub struct BridgeService<C: BrokerClient> {
    manager: Arc<ConnectionManager<C>>,
    pipeline: NotificationPipeline<C>,
}

impl<C: BrokerClient> BridgeService<C> {
    /// 校验配置并组装服务（不启动任何后台任务）
    pub fn new(config: &BridgeConfig, client: C) -> Result<Self> {
        config.validate()?;

        let manager = Arc::new(ConnectionManager::new(
            client,
            config.connection(),
            config.retry_policy(),
        ));
        let publisher = Publisher::new(manager.clone(), config.topic.clone(), config.qos_level()?);
        let pipeline = NotificationPipeline::new(
            SourceFilter::from_config(config),
            config.deduplicator(),
            publisher,
        );

        Ok(Self { manager, pipeline })
    }

    pub fn manager(&self) -> &Arc<ConnectionManager<C>> {
        &self.manager
    }

    pub fn pipeline(&self) -> &NotificationPipeline<C> {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut NotificationPipeline<C> {
        &mut self.pipeline
    }

    /// 启动重试循环；提供网络事件流时同时响应网络变化
    pub fn start(&self, network: Option<mpsc::Receiver<NetworkEvent>>) {
        self.manager.start();
        if let Some(events) = network {
            self.manager.watch_network(events);
        }
    }

    /// 等待首次连接成功，超时返回 `false`
    pub async fn wait_connected(&self, limit: Duration) -> bool {
        let mut rx = self.manager.subscribe();
        let connected = matches!(
            timeout(limit, rx.wait_for(|state| *state == ConnectionState::Connected)).await,
            Ok(Ok(_))
        );
        connected
    }

    /// 逐行读取 NDJSON 事件直到 EOF
    pub async fn run_lines<R: AsyncBufRead + Unpin>(&mut self, reader: R) -> Result<PipelineStats> {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            self.pipeline.handle_line(&line, Instant::now());
        }
        let stats = self.pipeline.stats();
        info!(
            received = stats.received,
            sent = stats.sent,
            suppressed = stats.suppressed,
            filtered = stats.filtered,
            dropped = stats.dropped,
            malformed = stats.malformed,
            "Notification input closed"
        );
        Ok(stats)
    }

    pub async fn shutdown(&self) {
        let stats = self.pipeline.stats();
        if stats.dropped > 0 {
            warn!(dropped = stats.dropped, "Some notifications were dropped while disconnected");
        }
        self.manager.shutdown().await;
        info!(delivered = self.manager.delivered_count(), "Bridge service stopped");
    }
}
