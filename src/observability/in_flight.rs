//! In-flight request counter for dispatched controller routes.
//!
//! The count only moves through [`InFlightGuard`]: `enter` increments,
//! dropping the guard decrements. A method that fails or panics still
//! releases its slot. Purely observational, no limit is enforced.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Shared counter, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct InFlightCounter {
    count: Arc<AtomicUsize>,
}

impl InFlightCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request in until the returned guard drops.
    pub fn enter(&self) -> InFlightGuard {
        let now = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_in_flight(now);
        InFlightGuard {
            count: Arc::clone(&self.count),
        }
    }

    pub fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Releases its slot on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    count: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let now = self.count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::record_in_flight(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_pairs_increment_and_decrement() {
        let counter = InFlightCounter::new();
        let a = counter.enter();
        let b = counter.clone().enter();
        assert_eq!(counter.current(), 2);

        drop(a);
        assert_eq!(counter.current(), 1);
        drop(b);
        assert_eq!(counter.current(), 0);
    }

    #[test]
    fn test_released_on_panic() {
        let counter = InFlightCounter::new();
        let c = counter.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = c.enter();
            panic!("method failed");
        });
        assert!(result.is_err());
        assert_eq!(counter.current(), 0);
    }
}
