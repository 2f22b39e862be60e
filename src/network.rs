//! 网络可用性监控 - 轮询 `/sys/class/net` 并在状态变化时发出事件

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Network availability signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    Available,
    Lost,
}

/// 任一非回环网卡处于 up 状态即视为网络可用
pub fn any_interface_up(sys_class_net: &Path) -> bool {
    let Ok(entries) = fs::read_dir(sys_class_net) else {
        return false;
    };

    entries.flatten().any(|entry| {
        if entry.file_name() == "lo" {
            return false;
        }
        fs::read_to_string(entry.path().join("operstate"))
            .map(|state| state.trim() == "up")
            .unwrap_or(false)
    })
}

/// sysfs 网络监控器
pub struct SysfsNetworkMonitor {
    root: PathBuf,
    interval: Duration,
}

impl SysfsNetworkMonitor {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/sys/class/net"),
            interval: Duration::from_secs(5),
        }
    }

    /// 指定 sysfs 根目录（用于测试）
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 开始监控，只在可用性变化时发送事件
    ///
    /// 初始状态不发送事件（启动时由重试循环负责首次连接）。
    pub async fn run(self, tx: mpsc::Sender<NetworkEvent>, cancel: CancellationToken) {
        let mut available = any_interface_up(&self.root);
        info!(
            root = %self.root.display(),
            available = available,
            "Network monitor started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.interval) => {}
            }

            let now_available = any_interface_up(&self.root);
            if now_available == available {
                continue;
            }
            available = now_available;

            let event = if available {
                NetworkEvent::Available
            } else {
                NetworkEvent::Lost
            };
            debug!(event = ?event, "Network availability changed");
            if tx.send(event).await.is_err() {
                break;
            }
        }
        debug!("Network monitor stopped");
    }
}

impl Default for SysfsNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}
