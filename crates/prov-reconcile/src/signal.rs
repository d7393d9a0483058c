//! Consistency suspect signalling
//!
//! Raised when the two halves of a non-atomic write (downstream call, local
//! bookkeeping) may have diverged. The signal only flags; the caller still
//! propagates its error.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Metric name of the suspect counter
pub const SUSPECT_COUNTER: &str = "provisioning_consistency_suspect_total";

const EVENT_CAPACITY: usize = 64;

static GLOBAL: Lazy<Arc<ConsistencySignal>> = Lazy::new(|| Arc::new(ConsistencySignal::new()));

/// One suspect notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspectEvent {
    /// Component that raised the suspect
    pub source: &'static str,
    /// Increment carried by this notification
    pub count: u64,
    /// Counter value after the increment
    pub total: u64,
}

/// Accumulator and event channel for consistency suspects
///
/// The counter only grows until an operator calls [`reset`](Self::reset).
/// Increments are atomic, so handlers on different tasks may raise suspects
/// concurrently.
#[derive(Debug)]
pub struct ConsistencySignal {
    count: AtomicU64,
    events: broadcast::Sender<SuspectEvent>,
}

impl ConsistencySignal {
    /// Create a standalone signal
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            count: AtomicU64::new(0),
            events,
        }
    }

    /// Process-wide signal instance
    #[must_use]
    pub fn global() -> Arc<ConsistencySignal> {
        Arc::clone(&GLOBAL)
    }

    /// Record `count` suspected inconsistencies raised by `source`.
    ///
    /// Returns the counter value after the increment.
    pub fn notify_suspect(&self, source: &'static str, count: u64) -> u64 {
        let total = self.count.fetch_add(count, Ordering::SeqCst) + count;
        metrics::counter!(SUSPECT_COUNTER).increment(count);
        tracing::warn!(source, count, total, "consistency suspect raised");
        // no subscribers is fine
        let _ = self.events.send(SuspectEvent {
            source,
            count,
            total,
        });
        total
    }

    /// Current suspect count
    #[inline]
    #[must_use]
    pub fn suspect_count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Operator reset; returns the count that was cleared
    pub fn reset(&self) -> u64 {
        let cleared = self.count.swap(0, Ordering::SeqCst);
        tracing::info!(cleared, "consistency suspect counter reset");
        cleared
    }

    /// Subscribe to suspect notifications raised after this call
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SuspectEvent> {
        self.events.subscribe()
    }
}

impl Default for ConsistencySignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_accumulates() {
        let signal = ConsistencySignal::new();
        signal.notify_suspect("kpi", 1);
        let total = signal.notify_suspect("index", 2);

        assert_eq!(total, 3);
        assert_eq!(signal.suspect_count(), 3);
    }

    #[test]
    fn reset_clears_and_reports() {
        let signal = ConsistencySignal::new();
        signal.notify_suspect("kpi", 4);

        assert_eq!(signal.reset(), 4);
        assert_eq!(signal.suspect_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let signal = ConsistencySignal::new();
        let mut rx = signal.subscribe();

        signal.notify_suspect("augmentation", 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(
            event,
            SuspectEvent {
                source: "augmentation",
                count: 1,
                total: 1
            }
        );
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let signal = Arc::new(ConsistencySignal::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let signal = Arc::clone(&signal);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        signal.notify_suspect("worker", 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(signal.suspect_count(), 800);
    }

    #[test]
    fn global_is_shared() {
        let a = ConsistencySignal::global();
        let b = ConsistencySignal::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
