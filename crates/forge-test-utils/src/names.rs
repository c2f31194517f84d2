//! Unique names for test resources

use chrono::Utc;

/// Generate a unique cluster name for tests.
///
/// Format: `test-{timestamp_ms}-{counter}`, so names stay unique even when
/// tests start simultaneously.
///
/// # Example
///
/// ```
/// use forge_test_utils::unique_cluster_name;
///
/// let name = unique_cluster_name();
/// assert!(name.starts_with("test-"));
/// ```
pub fn unique_cluster_name() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{}-{}", ts, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_format() {
        let name = unique_cluster_name();
        let parts: Vec<&str> = name.strip_prefix("test-").unwrap().split('-').collect();
        assert_eq!(parts.len(), 2);
        parts[0].parse::<i64>().expect("Should be valid timestamp");
        parts[1].parse::<u32>().expect("Should be valid counter");
    }

    #[test]
    fn test_names_unique() {
        assert_ne!(unique_cluster_name(), unique_cluster_name());
    }
}
