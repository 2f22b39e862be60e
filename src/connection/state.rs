//! 连接状态 - 单一共享状态值及其原子转换
//!
//! 状态由 `watch` 通道持有：写入方通过下面的转换方法修改，
//! 状态展示方通过 `subscribe()` 观察变化。

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

/// Broker connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Error => "ERROR",
        }
    }

    /// States from which a new connection attempt may begin
    pub fn can_begin_connect(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 连接状态持有者
#[derive(Debug)]
pub struct ConnectionStateHolder {
    tx: watch::Sender<ConnectionState>,
}

impl ConnectionStateHolder {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// `DISCONNECTED|ERROR → CONNECTING`，原子地检查并设置
    ///
    /// 返回 `false` 表示已有连接尝试在进行或已连接，调用方不得再发起握手。
    pub fn try_begin_connect(&self) -> bool {
        let began = self.tx.send_if_modified(|state| {
            if state.can_begin_connect() {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if began {
            info!(state = %ConnectionState::Connecting, "Connection state changed");
        }
        began
    }

    /// `CONNECTING → CONNECTED`
    pub fn mark_connected(&self) -> bool {
        self.transition(ConnectionState::Connecting, ConnectionState::Connected)
    }

    /// `CONNECTING → ERROR`
    pub fn mark_failed(&self) -> bool {
        self.transition(ConnectionState::Connecting, ConnectionState::Error)
    }

    /// `CONNECTED → DISCONNECTED`（broker 通知连接丢失）
    pub fn mark_lost(&self) -> bool {
        self.transition(ConnectionState::Connected, ConnectionState::Disconnected)
    }

    /// 无条件写入 DISCONNECTED（网络丢失、关闭服务）
    pub fn force_disconnected(&self) {
        let previous = self.tx.send_replace(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            info!(from = %previous, state = %ConnectionState::Disconnected, "Connection state changed");
        }
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if changed {
            info!(from = %from, state = %to, "Connection state changed");
        }
        changed
    }
}

impl Default for ConnectionStateHolder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let holder = ConnectionStateHolder::new();
        assert_eq!(holder.get(), ConnectionState::Disconnected);
        assert!(!holder.is_connected());
    }

    #[test]
    fn test_begin_connect_only_once() {
        let holder = ConnectionStateHolder::new();
        assert!(holder.try_begin_connect());
        assert!(!holder.try_begin_connect());
        assert_eq!(holder.get(), ConnectionState::Connecting);
    }

    #[test]
    fn test_happy_path() {
        let holder = ConnectionStateHolder::new();
        assert!(holder.try_begin_connect());
        assert!(holder.mark_connected());
        assert!(holder.is_connected());
        assert!(!holder.try_begin_connect());

        assert!(holder.mark_lost());
        assert_eq!(holder.get(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_failure_allows_retry() {
        let holder = ConnectionStateHolder::new();
        assert!(holder.try_begin_connect());
        assert!(holder.mark_failed());
        assert_eq!(holder.get(), ConnectionState::Error);
        assert!(holder.try_begin_connect());
    }

    #[test]
    fn test_lost_ignored_unless_connected() {
        let holder = ConnectionStateHolder::new();
        assert!(holder.try_begin_connect());
        assert!(!holder.mark_lost());
        assert_eq!(holder.get(), ConnectionState::Connecting);
    }

    #[test]
    fn test_force_disconnected_is_unconditional() {
        let holder = ConnectionStateHolder::new();
        holder.try_begin_connect();
        holder.force_disconnected();
        assert_eq!(holder.get(), ConnectionState::Disconnected);
        // a late success from the abandoned attempt must not flip it back
        assert!(!holder.mark_connected());
    }

    #[test]
    fn test_subscribers_see_changes() {
        let holder = ConnectionStateHolder::new();
        let mut rx = holder.subscribe();
        holder.try_begin_connect();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connecting);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "CONNECTED");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Disconnected).unwrap(),
            "\"DISCONNECTED\""
        );
    }
}
