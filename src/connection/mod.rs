//! Broker 连接层
//!
//! - `ConnectionManager`：状态机 + 重试循环 + 网络事件响应
//! - `BrokerClient`：线协议客户端抽象，`MqttClient` 为默认实现
//! - `ConnectionStateHolder`：可观察的共享连接状态

pub mod broker;
pub mod state;
pub mod manager;
pub mod mqtt;
pub mod dry_run;

pub use broker::{BrokerClient, ConnectionObserver, QoS, SendResult};
pub use state::{ConnectionState, ConnectionStateHolder};
pub use manager::{ConnectOutcome, ConnectionManager, RetryPolicy};
pub use mqtt::MqttClient;
pub use dry_run::DryRunClient;
