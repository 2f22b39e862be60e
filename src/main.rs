//! Notification Bridge CLI
//!
//! 从 stdin 读取 NDJSON 通知事件，去重后发布到 MQTT broker

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use notif_bridge::{
    BridgeConfig, BridgeService, BrokerClient, DryRunClient, MqttClient, NotificationEvent,
    SysfsNetworkMonitor,
};

#[derive(Parser)]
#[command(name = "notif-bridge")]
#[command(about = "Notification Bridge - 把系统通知去重后转发到 MQTT broker")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 从 stdin 读取通知事件并转发
    Run {
        /// 配置文件路径
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// 覆盖 broker URI
        #[arg(long)]
        broker: Option<String>,
        /// 覆盖发布主题
        #[arg(long)]
        topic: Option<String>,
        /// Dry-run 模式（消息输出到 stdout，不连接 broker）
        #[arg(long)]
        dry_run: bool,
        /// 不监控网络状态
        #[arg(long)]
        no_network_monitor: bool,
    },
    /// 离线评估防抖：按 posted_at 回放 stdin 中的事件，输出每条的判定
    Debounce {
        /// 配置文件路径
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// 防抖窗口（毫秒）
        #[arg(long)]
        window_ms: Option<u64>,
        /// 相似度阈值
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// 生成默认配置文件
    InitConfig {
        /// 配置文件路径
        #[arg(long)]
        path: Option<PathBuf>,
        /// 覆盖已存在的文件
        #[arg(long)]
        force: bool,
    },
    /// 显示当前配置（密码打码）
    ShowConfig {
        /// 配置文件路径
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("notif_bridge=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            broker,
            topic,
            dry_run,
            no_network_monitor,
        } => {
            let mut config = load_config(config)?;
            if let Some(broker) = broker {
                config.broker_uri = broker;
            }
            if let Some(topic) = topic {
                config.topic = topic;
            }
            if dry_run && config.broker_uri.is_empty() {
                config.broker_uri = "tcp://localhost:1883".to_string();
            }

            let monitor = !no_network_monitor;
            if dry_run {
                run_bridge(&config, DryRunClient::new(), monitor).await?;
            } else {
                run_bridge(&config, MqttClient::new(), monitor).await?;
            }
        }
        Commands::Debounce {
            config,
            window_ms,
            threshold,
        } => {
            let mut config = load_config(config)?;
            if let Some(window_ms) = window_ms {
                config.debounce_window_ms = window_ms;
            }
            if let Some(threshold) = threshold {
                config.similarity_threshold = threshold;
            }
            config.validate_debounce()?;
            replay_debounce(&config)?;
        }
        Commands::InitConfig { path, force } => {
            let path = path.unwrap_or_else(BridgeConfig::default_path);
            if path.exists() && !force {
                bail!("{} already exists, use --force to overwrite", path.display());
            }
            BridgeConfig::default().save(&path)?;
            println!("已写入配置: {}", path.display());
        }
        Commands::ShowConfig { config } => {
            let config = load_config(config)?;
            println!("{}", serde_json::to_string_pretty(&config.masked())?);
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<BridgeConfig> {
    let path = path.unwrap_or_else(BridgeConfig::default_path);
    BridgeConfig::load(&path)
}

async fn run_bridge<C: BrokerClient>(config: &BridgeConfig, client: C, monitor: bool) -> Result<()> {
    let mut service = BridgeService::new(config, client)?;
    let cancel = CancellationToken::new();

    let network = if monitor {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(SysfsNetworkMonitor::new().run(tx, cancel.clone()));
        Some(rx)
    } else {
        None
    };

    service.start(network);
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
    if !service.wait_connected(connect_timeout).await {
        warn!(
            broker = %config.broker_uri,
            "Broker not reachable yet, notifications are dropped until connected"
        );
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let interrupted = tokio::select! {
        result = service.run_lines(stdin) => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            true
        }
    };

    cancel.cancel();
    service.shutdown().await;

    if interrupted {
        // the blocking stdin reader would keep the runtime alive
        std::process::exit(0);
    }
    Ok(())
}

/// 按 posted_at 的相对间隔回放事件
fn replay_debounce(config: &BridgeConfig) -> Result<()> {
    let mut dedup = config.deduplicator();
    let base = Instant::now();
    let mut origin: Option<DateTime<Utc>> = None;

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event = match NotificationEvent::from_json_line(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Skipping malformed line");
                continue;
            }
        };

        let start = *origin.get_or_insert(event.posted_at);
        let offset = (event.posted_at - start).to_std().unwrap_or(Duration::ZERO);
        let suppress = dedup.should_suppress_or_forward(&event, base + offset);

        println!(
            "{}",
            serde_json::json!({
                "decision": if suppress { "suppress" } else { "forward" },
                "offset_ms": offset.as_millis() as u64,
                "source_id": event.source_id,
                "title": event.title,
            })
        );
    }
    Ok(())
}
