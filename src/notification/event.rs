//! 通知事件结构
//!
//! 由外部监听器（OS 通知源）产生，创建后不可变。

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification importance ordinal (0 = none .. 5 = max)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Importance(u8);

impl Importance {
    pub const MAX: u8 = 5;
    /// Default for sources that do not report a channel importance
    pub const DEFAULT: Importance = Importance(3);

    pub fn new(value: u8) -> Result<Self> {
        if value > Self::MAX {
            return Err(anyhow!("importance {} out of range 0..={}", value, Self::MAX));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Importance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for Importance {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Importance::new(value).map_err(|e| e.to_string())
    }
}

impl From<Importance> for u8 {
    fn from(importance: Importance) -> Self {
        importance.0
    }
}

/// 平台通知事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// 来源应用标识（如 Android 包名）
    pub source_id: String,
    /// 应用显示名（未解析时为空）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// 预编码的图标（base64，原样透传）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// 预编码的预览图（base64，原样透传）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
    /// 到达时间
    #[serde(default = "Utc::now")]
    pub posted_at: DateTime<Utc>,
}

impl NotificationEvent {
    /// 创建新的事件
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            app_name: None,
            title: None,
            body: None,
            importance: Importance::DEFAULT,
            category: None,
            icon: None,
            preview_image: None,
            posted_at: Utc::now(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }

    /// 解析后的应用名，未知时回退到 source_id
    pub fn resolved_app_name(&self) -> &str {
        self.app_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.source_id)
    }

    /// 从一行 JSON 解析事件
    pub fn from_json_line(line: &str) -> Result<Self> {
        let event: NotificationEvent =
            serde_json::from_str(line).context("malformed notification event")?;
        if event.source_id.is_empty() {
            return Err(anyhow!("notification event has empty source_id"));
        }
        Ok(event)
    }
}
