//! Broker client trait 定义
//!
//! 实际的 pub/sub 线协议客户端（MQTT 等）实现 `BrokerClient`；
//! 客户端产生的回调事件通过 `ConnectionObserver` 送回连接管理器。

use anyhow::{bail, Result};
use std::future::Future;
use std::sync::Arc;

use crate::config::ConnectionConfig;

/// Delivery guarantee requested from the broker (opaque pass-through)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub fn from_level(level: u8) -> Result<Self> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => bail!("invalid QoS level {}, expected 0, 1 or 2", other),
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 已交给 broker 客户端
    Sent,
    /// 跳过（未连接时静默丢弃）
    Skipped(String),
    /// broker 客户端拒绝
    Failed(String),
}

/// Callbacks raised by a broker client session
pub trait ConnectionObserver: Send + Sync {
    /// 连接丢失
    fn on_lost(&self, reason: &str);

    /// 消息投递完成（broker 确认）
    fn on_delivered(&self, id: u16);
}

/// Pub/sub wire client
///
/// One logical session at a time: `connect` replaces any previous session.
pub trait BrokerClient: Send + Sync + 'static {
    /// 建立连接，等待 broker 握手完成后返回
    fn connect(
        &self,
        config: &ConnectionConfig,
        observer: Arc<dyn ConnectionObserver>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// 发布消息（fire-and-forget，不等待确认）
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<()>;

    /// 断开并释放当前会话
    fn disconnect(&self) -> impl Future<Output = ()> + Send;
}
