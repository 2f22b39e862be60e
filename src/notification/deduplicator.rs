//! 通知防抖引擎 - 抑制短时间内重复或近似重复的通知
//!
//! 很多应用会在短时间内反复重发同一条通知（进度更新、重新触发的提醒），
//! 此模块按 (来源, 标题, 归一化正文) 识别同一逻辑事件。
//!
//! ## 去重策略
//! 1. 精确层：同一键在窗口内再次出现 → 抑制，并把条目时间刷新为当前时间
//! 2. 模糊层：同来源同标题、窗口内的条目中，token 集合 Jaccard 相似度
//!    ≥ 阈值（默认 0.9）→ 抑制，并刷新被匹配的条目
//! 3. 都未命中 → 记录并放行
//!
//! 窗口为 0 时关闭全部抑制。

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::dedup_cache::{DedupCache, NotificationKey, DEFAULT_CLEANUP_INTERVAL};
use super::event::NotificationEvent;
use super::normalizer::{normalize_opt, tokenize};
use super::similarity::{jaccard, DEFAULT_SIMILARITY_THRESHOLD};

/// Default debounce window
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(2000);

/// Which tier decided to suppress an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SuppressReason {
    /// Identical key seen within the window
    Exact,
    /// Same source/title with near-identical body tokens
    Similar(f64),
}

/// 防抖引擎
pub struct NotificationDeduplicator {
    cache: DedupCache,
    /// 防抖窗口（默认 2 秒）
    window: Duration,
    /// 相似度阈值（0.0 - 1.0）
    similarity_threshold: f64,
    /// 来自该来源的事件在判定时 panic
    #[cfg(test)]
    fault_source: Option<String>,
}

impl NotificationDeduplicator {
    /// 创建新的防抖引擎，使用默认 2 秒窗口和 0.9 相似度阈值
    pub fn new() -> Self {
        Self {
            cache: DedupCache::with_cleanup_interval(DEFAULT_CLEANUP_INTERVAL),
            window: DEFAULT_DEBOUNCE_WINDOW,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            #[cfg(test)]
            fault_source: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_fault_source(mut self, source_id: &str) -> Self {
        self.fault_source = Some(source_id.to_string());
        self
    }

    /// 设置防抖窗口
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// 设置相似度阈值
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// 设置缓存清理间隔
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cache = DedupCache::with_cleanup_interval(interval);
        self
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn similarity_threshold(&self) -> f64 {
        self.similarity_threshold
    }

    pub fn cache(&self) -> &DedupCache {
        &self.cache
    }

    /// 是否应抑制此事件
    ///
    /// 返回 `true` 表示抑制，`false` 表示放行（放行时事件被记录进缓存）。
    pub fn should_suppress(&mut self, event: &NotificationEvent, now: Instant) -> bool {
        let reason = self.evaluate(event, now);
        self.cache.cleanup(now, self.window);

        if let Some(reason) = reason {
            debug!(
                source_id = %event.source_id,
                title = ?event.title,
                reason = ?reason,
                "Notification suppressed"
            );
            return true;
        }
        false
    }

    /// Fail-open variant: a panic while deciding forwards the event
    pub fn should_suppress_or_forward(&mut self, event: &NotificationEvent, now: Instant) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.should_suppress(event, now))) {
            Ok(suppress) => suppress,
            Err(_) => {
                warn!(
                    source_id = %event.source_id,
                    "Debounce check panicked, forwarding notification"
                );
                false
            }
        }
    }

    fn evaluate(&mut self, event: &NotificationEvent, now: Instant) -> Option<SuppressReason> {
        #[cfg(test)]
        if self.fault_source.as_deref() == Some(event.source_id.as_str()) {
            panic!("injected debounce fault for {}", event.source_id);
        }

        let normalized_body = normalize_opt(event.body.as_deref());
        let key = NotificationKey::new(event.source_id.as_str(), event.title.clone(), normalized_body);
        let tokens = tokenize(&key.normalized_body);

        // 精确层
        if let Some(entry) = self.cache.get(&key) {
            if now.saturating_duration_since(entry.last_seen) < self.window {
                self.cache.touch(&key, now);
                return Some(SuppressReason::Exact);
            }
        }

        // 模糊层（空白正文只走精确层）
        if !key.normalized_body.trim().is_empty() {
            if let Some((matched, similarity)) = self.best_similar(&key, &tokens, now) {
                self.cache.touch(&matched, now);
                return Some(SuppressReason::Similar(similarity));
            }
        }

        self.cache.insert(key, now, tokens);
        None
    }

    /// 窗口内同线程候选中相似度最高且达到阈值的条目
    fn best_similar(
        &self,
        key: &NotificationKey,
        tokens: &HashSet<String>,
        now: Instant,
    ) -> Option<(NotificationKey, f64)> {
        self.cache
            .recent_in_thread(key, now, self.window)
            .filter_map(|(candidate, entry)| {
                jaccard(tokens, &entry.tokens).map(|similarity| (candidate, similarity))
            })
            .filter(|(_, similarity)| *similarity >= self.similarity_threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(candidate, similarity)| (candidate.clone(), similarity))
    }
}

impl Default for NotificationDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}
