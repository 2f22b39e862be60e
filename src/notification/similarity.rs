//! Jaccard similarity over token sets

use std::collections::HashSet;

/// Default threshold at which two bodies count as the same burst
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.9;

/// 计算两个 token 集合的 Jaccard 相似度
///
/// `|A ∩ B| / |A ∪ B|`，返回 0.0 - 1.0。两个集合都为空时相似度未定义，返回 `None`。
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> Option<f64> {
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let intersection = small.iter().filter(|token| large.contains(*token)).count();
    let union = a.len() + b.len() - intersection;

    if union == 0 {
        return None;
    }

    Some(intersection as f64 / union as f64)
}
