//! 配置加载 - `~/.config/notif-bridge/config.json`
//!
//! 所有字段都有默认值，配置文件可以只写需要覆盖的部分。

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::{QoS, RetryPolicy};
use crate::notification::NotificationDeduplicator;

pub const DEFAULT_TOPIC: &str = "notif2mqtt/notifications";
const PLAIN_PORT: u16 = 1883;
const TLS_PORT: u16 = 8883;

/// Broker transport selected by the URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Plain,
    Tls,
}

/// Parsed broker URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
}

impl BrokerAddress {
    /// 解析 `tcp://host:1883`、`ssl://host:8883` 等形式
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| anyhow!("broker URI '{}' has no scheme", uri))?;

        let transport = match scheme.to_ascii_lowercase().as_str() {
            "tcp" | "mqtt" => TransportKind::Plain,
            "ssl" | "mqtts" | "tls" => TransportKind::Tls,
            other => bail!("unsupported broker URI scheme '{}'", other),
        };

        let authority = rest.split('/').next().unwrap_or_default();
        if authority.is_empty() {
            bail!("broker URI '{}' has no host", uri);
        }

        let default_port = match transport {
            TransportKind::Plain => PLAIN_PORT,
            TransportKind::Tls => TLS_PORT,
        };

        let (host, port) = match authority.rsplit_once(':') {
            // bracketed IPv6 without port, e.g. [::1]
            Some((_, tail)) if tail.ends_with(']') => (authority, default_port),
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .with_context(|| format!("invalid port in broker URI '{}'", uri))?;
                (host, port)
            }
            None => (authority, default_port),
        };

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            bail!("broker URI '{}' has no host", uri);
        }

        Ok(Self {
            host: host.to_string(),
            port,
            transport,
        })
    }

    pub fn is_tls(&self) -> bool {
        self.transport == TransportKind::Tls
    }
}

/// Connection settings read by the connection manager at connect time
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub broker_uri: String,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Skip server certificate verification on TLS transports
    pub accept_self_signed_certs: bool,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    pub fn address(&self) -> Result<BrokerAddress> {
        BrokerAddress::parse(&self.broker_uri)
    }

    /// 用户名为空时不发送凭据；密码只在有用户名时发送
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let username = self.username.as_deref().filter(|u| !u.is_empty())?;
        Some((username, self.password.as_deref().unwrap_or("")))
    }
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}
fn default_true() -> bool {
    true
}
fn default_keep_alive_secs() -> u64 {
    60
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_qos() -> u8 {
    1
}
fn default_debounce_window_ms() -> u64 {
    2000
}
fn default_cleanup_interval_ms() -> u64 {
    60_000
}
fn default_similarity_threshold() -> f64 {
    0.9
}
fn default_retry_delay_secs() -> u64 {
    30
}
fn default_network_settle_secs() -> u64 {
    5
}

/// 桥接服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub broker_uri: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// 未设置时根据主机名生成
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default = "default_true")]
    pub accept_self_signed_certs: bool,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default = "default_debounce_window_ms")]
    pub debounce_window_ms: u64,
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default = "default_network_settle_secs")]
    pub network_settle_secs: u64,
    /// 总开关
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 不转发的来源
    #[serde(default)]
    pub excluded_apps: BTreeSet<String>,
    /// 本服务自己的来源标识，其通知不转发
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_source_id: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker_uri: String::new(),
            topic: default_topic(),
            username: None,
            password: None,
            client_id: None,
            accept_self_signed_certs: true,
            keep_alive_secs: default_keep_alive_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            qos: default_qos(),
            debounce_window_ms: default_debounce_window_ms(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            similarity_threshold: default_similarity_threshold(),
            retry_delay_secs: default_retry_delay_secs(),
            network_settle_secs: default_network_settle_secs(),
            enabled: true,
            excluded_apps: BTreeSet::new(),
            self_source_id: None,
        }
    }
}

impl BridgeConfig {
    /// 默认配置文件路径
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notif-bridge")
            .join("config.json")
    }

    /// 读取配置文件，文件不存在时返回默认配置
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// 写入配置文件（自动创建目录）
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write config {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.broker_uri.trim().is_empty() {
            bail!("broker_uri is required");
        }
        BrokerAddress::parse(&self.broker_uri)?;
        if self.topic.is_empty() {
            bail!("topic must not be empty");
        }
        self.validate_debounce()?;
        QoS::from_level(self.qos)?;
        Ok(())
    }

    /// 只校验防抖参数（离线回放不需要 broker 配置）
    pub fn validate_debounce(&self) -> Result<()> {
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            bail!(
                "similarity_threshold must be in (0, 1], got {}",
                self.similarity_threshold
            );
        }
        Ok(())
    }

    pub fn is_excluded(&self, source_id: &str) -> bool {
        self.excluded_apps.contains(source_id)
    }

    pub fn qos_level(&self) -> Result<QoS> {
        QoS::from_level(self.qos)
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            broker_uri: self.broker_uri.clone(),
            client_id: self.client_id.clone().unwrap_or_else(generate_client_id),
            username: self.username.clone(),
            password: self.password.clone(),
            accept_self_signed_certs: self.accept_self_signed_certs,
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            network_settle_delay: Duration::from_secs(self.network_settle_secs),
        }
    }

    pub fn deduplicator(&self) -> NotificationDeduplicator {
        NotificationDeduplicator::new()
            .with_window(Duration::from_millis(self.debounce_window_ms))
            .with_cleanup_interval(Duration::from_millis(self.cleanup_interval_ms))
            .with_similarity_threshold(self.similarity_threshold)
    }

    /// 用于展示的副本（密码打码）
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        if copy.password.as_deref().is_some_and(|p| !p.is_empty()) {
            copy.password = Some("********".to_string());
        }
        copy
    }
}

/// `notif_bridge_<host>_<epoch ms>`
pub fn generate_client_id() -> String {
    let host = sysinfo::System::host_name()
        .unwrap_or_else(|| "unknown".to_string())
        .replace(|c: char| !c.is_ascii_alphanumeric(), "_");
    format!("notif_bridge_{}_{}", host, chrono::Utc::now().timestamp_millis())
}
