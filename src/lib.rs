//! Notification Bridge - 把系统通知去重后转发到 MQTT broker

pub mod config;
pub mod connection;
pub mod network;
pub mod notification;
pub mod pipeline;
pub mod publisher;
pub mod service;

pub use config::{BridgeConfig, BrokerAddress, ConnectionConfig, TransportKind};
pub use connection::{
    BrokerClient, ConnectOutcome, ConnectionManager, ConnectionObserver, ConnectionState,
    DryRunClient, MqttClient, QoS, RetryPolicy, SendResult,
};
pub use network::{NetworkEvent, SysfsNetworkMonitor};
pub use notification::{
    Importance, NotificationDeduplicator, NotificationEvent, NotificationPayload, Urgency,
};
pub use pipeline::{Disposition, FilterReason, NotificationPipeline, PipelineStats, SourceFilter};
pub use publisher::Publisher;
pub use service::BridgeService;
