//! Payload 构建模块 - 把通知事件转换为发布到 broker 的 JSON 消息
//!
//! 字段名固定，接收端（如桌面端 notify-send 脚本）依赖这些名字：
//! ```json
//! {
//!   "package": "com.example.chat",
//!   "app": "Chat",
//!   "title": "Alice",
//!   "text": "Hello",
//!   "timestamp": 1767323045000,
//!   "importance": 4,
//!   "category": "msg",
//!   "urgency": "high",
//!   "icon": "<base64>",
//!   "previewImage": "<base64>"
//! }
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::event::NotificationEvent;
use super::urgency::{get_urgency, Urgency};

/// 发布到 broker 的通知消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// 来源应用标识
    pub package: String,
    pub app: String,
    pub title: String,
    pub text: String,
    /// epoch 毫秒
    pub timestamp: i64,
    pub importance: u8,
    pub category: String,
    pub urgency: Urgency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(rename = "previewImage", skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
}

impl NotificationPayload {
    /// 从事件构建 payload，缺省的文本字段输出为空字符串
    pub fn from_event(event: &NotificationEvent) -> Self {
        Self {
            package: event.source_id.clone(),
            app: event.resolved_app_name().to_string(),
            title: event.title.clone().unwrap_or_default(),
            text: event.body.clone().unwrap_or_default(),
            timestamp: event.posted_at.timestamp_millis(),
            importance: event.importance.value(),
            category: event.category.clone().unwrap_or_default(),
            urgency: get_urgency(event.importance),
            icon: event.icon.clone(),
            preview_image: event.preview_image.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
