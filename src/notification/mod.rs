//! 通知处理层 - 事件模型、防抖和消息格式
//!
//! # 数据流
//! 1. `NotificationEvent`：外部监听器产生的原始事件
//! 2. `NotificationDeduplicator`：精确 + 模糊两层防抖，决定放行或抑制
//! 3. `NotificationPayload`：放行的事件格式化为固定字段的 JSON 消息
//!
//! # 使用示例
//! ```ignore
//! use notif_bridge::notification::{NotificationDeduplicator, NotificationEvent};
//! use std::time::Instant;
//!
//! let mut dedup = NotificationDeduplicator::new();
//! let event = NotificationEvent::new("com.example").with_body("Download complete - 100%");
//! assert!(!dedup.should_suppress(&event, Instant::now()));
//! ```

pub mod event;
pub mod urgency;
pub mod payload;
pub mod normalizer;
pub mod similarity;
pub mod dedup_cache;
pub mod deduplicator;

pub use event::{Importance, NotificationEvent};
pub use urgency::{Urgency, get_urgency};
pub use payload::NotificationPayload;
pub use normalizer::{normalize, tokenize};
pub use similarity::jaccard;
pub use dedup_cache::{CacheEntry, DedupCache, NotificationKey};
pub use deduplicator::{NotificationDeduplicator, SuppressReason};
