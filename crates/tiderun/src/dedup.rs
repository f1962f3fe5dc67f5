//! # Deduplication Sequencer
//!
//! At-least-once brokers may hand the same frame over twice. Senders stamp
//! every frame with a strictly increasing sequence number; receivers keep the
//! highest number seen per remote address and drop anything not above it.
//!
//! ## Invariants
//! - **Accept Rule**: `seq` from `remote` is accepted iff `remote` is unseen or
//!   `seq > highest[remote]`. Ties and regressions are rejected.
//! - **Send Order**: `SeqGen::next` must be called under the same lock that
//!   hands the encoded bytes to the broker, so numbers reach the wire in order.
//! - Sequence `0` means "not sequenced" and is never issued by `SeqGen`.
//! - **Restarts**: a node keeps its address across restarts, so `SeqGen`
//!   starts at the wall clock in microseconds. A fresh process then issues
//!   numbers above everything its previous incarnation sent, as long as that
//!   one averaged under a million frames per second.

use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// The local, node-wide sequence counter.
#[derive(Debug)]
pub struct SeqGen {
    next: AtomicI64,
}

impl Default for SeqGen {
    fn default() -> Self {
        Self::new()
    }
}

impl SeqGen {
    /// A counter seeded from the current time.
    pub fn new() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Self::starting_at(micros)
    }

    /// A counter whose first number is `first` (or 1 if `first` is not positive).
    pub fn starting_at(first: i64) -> Self {
        Self { next: AtomicI64::new(first.max(1)) }
    }

    pub fn next(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Highest sequence accepted per remote address.
#[derive(Debug, Default)]
pub struct DedupWindow {
    highest: DashMap<String, i64>,
}

impl DedupWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `seq` from `remote` and reports whether it is new.
    pub fn accept(&self, remote: &str, seq: i64) -> bool {
        if let Some(mut highest) = self.highest.get_mut(remote) {
            if seq > *highest {
                *highest = seq;
                return true;
            }
            return false;
        }

        match self.highest.entry(remote.to_string()) {
            Entry::Occupied(mut e) => {
                if seq > *e.get() {
                    e.insert(seq);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(e) => {
                e.insert(seq);
                true
            }
        }
    }

    /// Forgets a remote, e.g. after it restarted with a fresh counter.
    pub fn forget(&self, remote: &str) {
        self.highest.remove(remote);
    }

    pub fn highest(&self, remote: &str) -> Option<i64> {
        self.highest.get(remote).map(|h| *h)
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn test_duplicate_rejected() {
        let window = DedupWindow::new();
        assert!(window.accept("service.nd.a.1", 5));
        assert!(!window.accept("service.nd.a.1", 5));
    }

    #[test]
    fn test_regression_rejected() {
        let window = DedupWindow::new();
        assert!(window.accept("service.nd.a.1", 5));
        assert!(!window.accept("service.nd.a.1", 3));
        assert_eq!(window.highest("service.nd.a.1"), Some(5));
    }

    #[test]
    fn test_unseen_remote_always_accepted() {
        let window = DedupWindow::new();
        assert!(window.accept("service.nd.a.1", 100));
        assert!(window.accept("service.nd.b.1", 1));
        assert!(window.accept("service.nd.c.1", i64::MIN));
    }

    #[test]
    fn test_forget_resets_remote() {
        let window = DedupWindow::new();
        assert!(window.accept("r", 9));
        window.forget("r");
        assert!(window.accept("r", 1));
    }

    #[test]
    fn test_shuffled_redelivery_accepts_each_peak_once() {
        let mut rng = rand::thread_rng();
        let window = DedupWindow::new();
        let mut highest = 0;
        for _ in 0..1_000 {
            let seq = rng.gen_range(1..200);
            let accepted = window.accept("r", seq);
            assert_eq!(accepted, seq > highest);
            highest = highest.max(seq);
        }
    }

    #[test]
    fn test_seqgen_counts_up_from_seed() {
        let seq = SeqGen::starting_at(1);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(SeqGen::starting_at(0).next(), 1);
        assert_eq!(SeqGen::starting_at(-7).next(), 1);
    }

    #[test]
    fn test_restarted_sender_passes_window() {
        let window = DedupWindow::new();
        let before = SeqGen::new();
        for _ in 0..5 {
            assert!(window.accept("service.nd.beta.b1", before.next()));
        }

        std::thread::sleep(std::time::Duration::from_millis(2));
        let after = SeqGen::new();
        let seq = after.next();
        assert!(seq > 0);
        assert!(window.accept("service.nd.beta.b1", seq));
        assert!(!window.accept("service.nd.beta.b1", seq));
    }
}
