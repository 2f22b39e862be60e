//! Urgency classification for forwarded notifications
//!
//! Urgency is derived from the platform importance ordinal and published as a
//! helper field so receivers can pick a display style without knowing the
//! platform's importance scale:
//! - high: importance 4 (HIGH) or 5 (MAX)
//! - normal: importance 3 (DEFAULT)
//! - low: importance 2 (LOW)
//! - minimal: importance 0 (NONE) or 1 (MIN)

use super::event::Importance;

/// Urgency level for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    High,
    Normal,
    Low,
    Minimal,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::High => "high",
            Urgency::Normal => "normal",
            Urgency::Low => "low",
            Urgency::Minimal => "minimal",
        }
    }
}

/// Classify urgency from the importance ordinal
pub fn get_urgency(importance: Importance) -> Urgency {
    match importance.value() {
        4.. => Urgency::High,
        3 => Urgency::Normal,
        2 => Urgency::Low,
        _ => Urgency::Minimal,
    }
}
