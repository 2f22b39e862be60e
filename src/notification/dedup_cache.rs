//! 去重缓存 - 记录最近见过的通知
//!
//! 键为 (source_id, title, normalized_body)。原始正文不同但归一化结果相同的通知
//! 会落在同一条目上。条目通过周期性清理淘汰，清理由事件处理顺带触发，不依赖定时器。

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default minimum spacing between two cleanup passes
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Identity of a notification for debouncing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub source_id: String,
    pub title: Option<String>,
    pub normalized_body: String,
}

impl NotificationKey {
    pub fn new(
        source_id: impl Into<String>,
        title: Option<String>,
        normalized_body: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            title,
            normalized_body: normalized_body.into(),
        }
    }

    /// Same source and title (fuzzy-tier candidate)
    pub fn same_thread(&self, other: &NotificationKey) -> bool {
        self.source_id == other.source_id && self.title == other.title
    }
}

/// 缓存条目
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub last_seen: Instant,
    pub tokens: HashSet<String>,
}

/// 去重缓存
pub struct DedupCache {
    entries: HashMap<NotificationKey, CacheEntry>,
    cleanup_interval: Duration,
    last_cleanup: Option<Instant>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::with_cleanup_interval(DEFAULT_CLEANUP_INTERVAL)
    }

    pub fn with_cleanup_interval(cleanup_interval: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            cleanup_interval,
            last_cleanup: None,
        }
    }

    pub fn get(&self, key: &NotificationKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// 插入或覆盖条目
    pub fn insert(&mut self, key: NotificationKey, last_seen: Instant, tokens: HashSet<String>) {
        self.entries.insert(key, CacheEntry { last_seen, tokens });
    }

    /// 刷新已存在条目的时间戳，返回条目是否存在
    pub fn touch(&mut self, key: &NotificationKey, now: Instant) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// 遍历与 `key` 同来源同标题、且在窗口内的条目
    pub fn recent_in_thread<'a>(
        &'a self,
        key: &'a NotificationKey,
        now: Instant,
        window: Duration,
    ) -> impl Iterator<Item = (&'a NotificationKey, &'a CacheEntry)> + 'a {
        self.entries.iter().filter(move |(candidate, entry)| {
            candidate.same_thread(key) && now.saturating_duration_since(entry.last_seen) < window
        })
    }

    /// 清理过期条目
    ///
    /// 距上次清理不足 `cleanup_interval` 时不做任何事；否则删除
    /// `now - last_seen >= 2 * window` 的条目。返回删除数量。
    pub fn cleanup(&mut self, now: Instant, window: Duration) -> usize {
        if let Some(last) = self.last_cleanup {
            if now.saturating_duration_since(last) < self.cleanup_interval {
                return 0;
            }
        }

        let max_age = window.saturating_mul(2);
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) < max_age);
        self.last_cleanup = Some(now);

        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(
                removed = removed,
                remaining = self.entries.len(),
                "Dedup cache cleanup"
            );
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DedupCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(body: &str) -> NotificationKey {
        NotificationKey::new("com.example", Some("Title".to_string()), body)
    }

    #[test]
    fn test_key_equality_uses_normalized_body() {
        assert_eq!(key("hello world"), key("hello world"));
        assert_ne!(key("hello world"), key("hello"));
        assert_ne!(
            NotificationKey::new("a", None, "x"),
            NotificationKey::new("a", Some(String::new()), "x")
        );
    }

    #[test]
    fn test_touch_missing_entry() {
        let mut cache = DedupCache::new();
        assert!(!cache.touch(&key("x"), Instant::now()));
    }

    #[test]
    fn test_cleanup_removes_entries_older_than_twice_window() {
        let mut cache = DedupCache::new();
        let t0 = Instant::now();
        let window = Duration::from_millis(2000);

        cache.insert(key("old"), t0, HashSet::new());
        cache.insert(key("fresh"), t0 + Duration::from_millis(3000), HashSet::new());

        let removed = cache.cleanup(t0 + Duration::from_millis(4000), window);
        assert_eq!(removed, 1);
        assert!(cache.get(&key("old")).is_none());
        assert!(cache.get(&key("fresh")).is_some());
    }

    #[test]
    fn test_cleanup_respects_interval() {
        let mut cache = DedupCache::with_cleanup_interval(Duration::from_secs(60));
        let t0 = Instant::now();
        let window = Duration::from_millis(100);

        // first call always runs
        assert_eq!(cache.cleanup(t0, window), 0);

        cache.insert(key("a"), t0, HashSet::new());
        // too soon: entry is stale but the pass is skipped
        assert_eq!(cache.cleanup(t0 + Duration::from_secs(10), window), 0);
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.cleanup(t0 + Duration::from_secs(60), window), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_recent_in_thread_filters_source_title_and_window() {
        let mut cache = DedupCache::new();
        let t0 = Instant::now();
        let window = Duration::from_secs(2);

        cache.insert(key("same thread"), t0, HashSet::new());
        cache.insert(
            NotificationKey::new("com.example", Some("Other".to_string()), "other title"),
            t0,
            HashSet::new(),
        );
        cache.insert(
            NotificationKey::new("com.other", Some("Title".to_string()), "other source"),
            t0,
            HashSet::new(),
        );

        let probe = key("probe");
        let hits: Vec<_> = cache
            .recent_in_thread(&probe, t0 + Duration::from_secs(1), window)
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.normalized_body, "same thread");

        let hits = cache
            .recent_in_thread(&probe, t0 + Duration::from_secs(2), window)
            .count();
        assert_eq!(hits, 0);
    }
}
