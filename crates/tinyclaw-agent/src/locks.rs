//! Per-session locks — serializing all mutation of one conversation.
//!
//! Each session key maps to one async mutex, created on first use. A turn
//! holds its session's lock across the whole tool-calling state machine;
//! the summarizer takes the same lock around its snapshot and its final
//! splice. Distinct keys never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// `session_key → async mutex` map.
#[derive(Default)]
pub struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock guarding `key`, created on first access.
    pub fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inner.lock().unwrap();
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_same_key_same_lock() {
        let locks = SessionLocks::new();
        let a = locks.lock_for("cli:default");
        let b = locks.lock_for("cli:default");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_distinct_keys_distinct_locks() {
        let locks = SessionLocks::new();
        let a = locks.lock_for("cli:default");
        let b = locks.lock_for("web:s1");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_critical_sections_do_not_overlap() {
        let locks = Arc::new(SessionLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let lock = locks.lock_for("same:key");
                let _guard = lock.lock().await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
