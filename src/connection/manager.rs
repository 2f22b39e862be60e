//! 连接管理器 - 维护到 broker 的单一发布连接
//!
//! ## 状态机
//! - `DISCONNECTED|ERROR → CONNECTING`：发起连接（原子检查，同一时刻最多一个握手）
//! - `CONNECTING → CONNECTED`：握手成功
//! - `CONNECTING → ERROR`：握手失败或超时，由重试循环按固定间隔重试
//! - `CONNECTED → DISCONNECTED`：broker 报告连接丢失，或网络丢失（立即）
//!
//! 网络恢复时不立即重连，而是等待一个短暂的稳定期后再尝试。
//! 网络丢失会中止正在进行的握手；握手锁在状态被重置后仍然持有，
//! 直到被中止的握手真正退出，保证任何时刻最多一个握手。
//! 未连接时发布的消息直接丢弃，不做缓存。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::broker::{BrokerClient, ConnectionObserver, QoS, SendResult};
use super::state::{ConnectionState, ConnectionStateHolder};
use crate::config::ConnectionConfig;
use crate::network::NetworkEvent;

/// Reconnect timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 重试循环的固定间隔（默认 30 秒）
    pub retry_delay: Duration,
    /// 网络恢复后的稳定等待（默认 5 秒）
    pub network_settle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(30),
            network_settle_delay: Duration::from_secs(5),
        }
    }
}

/// Result of a single connection attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    Connected,
    /// 已有握手在进行或已连接，本次不发起
    AlreadyInProgress,
    Failed(String),
}

/// 会话回调的接收方
struct Shared {
    state: ConnectionStateHolder,
    delivered: AtomicU64,
    /// 当前握手的中止信号
    attempt: Mutex<CancellationToken>,
}

impl Shared {
    fn begin_attempt(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.attempt.lock().unwrap_or_else(|e| e.into_inner()) = token.clone();
        token
    }

    fn abandon_attempt(&self) {
        self.attempt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }
}

impl ConnectionObserver for Shared {
    fn on_lost(&self, reason: &str) {
        warn!(reason = %reason, "Broker connection lost");
        self.state.mark_lost();
    }

    fn on_delivered(&self, id: u16) {
        debug!(id = id, "Message delivered");
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
}

struct Inner<C> {
    client: C,
    config: ConnectionConfig,
    policy: RetryPolicy,
    shared: Arc<Shared>,
    /// 握手互斥：持有期间不会发起第二次 `client.connect`
    handshake: tokio::sync::Mutex<()>,
}

impl<C: BrokerClient> Inner<C> {
    async fn connect_once(&self) -> ConnectOutcome {
        let Ok(_handshake) = self.handshake.try_lock() else {
            debug!("Handshake still in flight, connection attempt skipped");
            return ConnectOutcome::AlreadyInProgress;
        };
        // installed before CONNECTING so a network loss right after still aborts it
        let abandoned = self.shared.begin_attempt();
        if !self.shared.state.try_begin_connect() {
            debug!(state = %self.shared.state.get(), "Connection attempt skipped");
            return ConnectOutcome::AlreadyInProgress;
        }

        info!(
            broker = %self.config.broker_uri,
            client_id = %self.config.client_id,
            "Connecting to broker"
        );

        let observer: Arc<dyn ConnectionObserver> = self.shared.clone();
        let attempt = tokio::select! {
            _ = abandoned.cancelled() => {
                warn!("Connection reset during handshake, abandoning attempt");
                self.client.disconnect().await;
                return ConnectOutcome::Failed("connection reset during handshake".to_string());
            }
            attempt = timeout(
                self.config.connect_timeout,
                self.client.connect(&self.config, observer),
            ) => attempt,
        };

        match attempt {
            Ok(Ok(())) => {
                if self.shared.state.mark_connected() {
                    info!(broker = %self.config.broker_uri, "Connected to broker");
                    ConnectOutcome::Connected
                } else {
                    // network loss reset the state mid-handshake
                    warn!("Handshake finished after connection was reset, dropping session");
                    self.client.disconnect().await;
                    ConnectOutcome::Failed("connection reset during handshake".to_string())
                }
            }
            Ok(Err(e)) => {
                warn!(broker = %self.config.broker_uri, error = %e, "Failed to connect to broker");
                self.shared.state.mark_failed();
                ConnectOutcome::Failed(e.to_string())
            }
            Err(_) => {
                warn!(
                    broker = %self.config.broker_uri,
                    timeout_secs = self.config.connect_timeout.as_secs(),
                    "Broker connect timed out"
                );
                self.shared.state.mark_failed();
                self.client.disconnect().await;
                ConnectOutcome::Failed("connect timed out".to_string())
            }
        }
    }

    /// 连接尝试，服务关闭时中止
    async fn connect_unless_cancelled(&self, cancel: &CancellationToken) -> Option<ConnectOutcome> {
        tokio::select! {
            _ = cancel.cancelled() => None,
            outcome = self.connect_once() => Some(outcome),
        }
    }
}

/// 连接管理器
pub struct ConnectionManager<C: BrokerClient> {
    inner: Arc<Inner<C>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl<C: BrokerClient> ConnectionManager<C> {
    pub fn new(client: C, config: ConnectionConfig, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                policy,
                shared: Arc::new(Shared {
                    state: ConnectionStateHolder::new(),
                    delivered: AtomicU64::new(0),
                    attempt: Mutex::new(CancellationToken::new()),
                }),
                handshake: tokio::sync::Mutex::new(()),
            }),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.shared.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.shared.state.is_connected()
    }

    /// 订阅状态变化（用于状态展示）
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.shared.state.subscribe()
    }

    /// broker 已确认投递的消息数
    pub fn delivered_count(&self) -> u64 {
        self.inner.shared.delivered.load(Ordering::Relaxed)
    }

    pub fn client(&self) -> &C {
        &self.inner.client
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    /// 发起一次连接尝试
    ///
    /// 已有尝试在进行或已连接时直接返回 `AlreadyInProgress`，不会发起第二次握手。
    pub async fn connect_async(&self) -> ConnectOutcome {
        self.inner.connect_once().await
    }

    /// 启动后台重试循环（重复调用无效）
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner = self.inner.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            info!(
                retry_secs = inner.policy.retry_delay.as_secs(),
                "Connection retry loop started"
            );
            loop {
                if !inner.shared.state.is_connected() {
                    match inner.connect_unless_cancelled(&cancel).await {
                        Some(outcome) => debug!(outcome = ?outcome, "Retry loop connect attempt"),
                        None => break,
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(inner.policy.retry_delay) => {}
                }
            }
            debug!("Connection retry loop stopped");
        });
        self.track(handle);
    }

    /// 网络恢复：未连接时在稳定期后尝试连接
    pub fn on_network_available(&self) {
        network_available(&self.inner, &self.cancel);
    }

    /// 网络丢失：立即标记为断开
    pub fn on_network_lost(&self) {
        network_lost(&self.inner);
    }

    /// 消费网络事件流
    pub fn watch_network(&self, mut events: mpsc::Receiver<NetworkEvent>) {
        let inner = self.inner.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(NetworkEvent::Available) => network_available(&inner, &cancel),
                        Some(NetworkEvent::Lost) => network_lost(&inner),
                        None => break,
                    },
                }
            }
            debug!("Network event watcher stopped");
        });
        self.track(handle);
    }

    /// 发布消息
    ///
    /// 只有状态恰为 `CONNECTED` 时才交给 broker 客户端；否则静默丢弃。
    pub fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> SendResult {
        let state = self.state();
        if state != ConnectionState::Connected {
            debug!(state = %state, topic = %topic, "Not connected, dropping message");
            return SendResult::Skipped(format!("not connected ({})", state));
        }

        match self.inner.client.publish(topic, payload, qos) {
            Ok(()) => {
                debug!(topic = %topic, "Published message");
                SendResult::Sent
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Failed to publish message");
                SendResult::Failed(e.to_string())
            }
        }
    }

    /// 关闭：取消重试循环和待执行的重连，释放连接
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.inner.shared.abandon_attempt();

        let handles = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            let _ = handle.await;
        }

        self.inner.client.disconnect().await;
        self.inner.shared.state.force_disconnected();
        info!("Connection manager stopped");
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }
}

fn network_available<C: BrokerClient>(inner: &Arc<Inner<C>>, cancel: &CancellationToken) {
    if inner.shared.state.is_connected() {
        debug!("Network available, already connected");
        return;
    }

    let settle = inner.policy.network_settle_delay;
    info!(settle_secs = settle.as_secs(), "Network available, scheduling reconnect");

    let inner = inner.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = sleep(settle) => {}
        }
        if inner.shared.state.is_connected() {
            return;
        }
        if let Some(outcome) = inner.connect_unless_cancelled(&cancel).await {
            debug!(outcome = ?outcome, "Network reconnect attempt");
        }
    });
}

fn network_lost<C: BrokerClient>(inner: &Arc<Inner<C>>) {
    warn!("Network lost");
    inner.shared.state.force_disconnected();
    inner.shared.abandon_attempt();
}
