use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Connection counters shared by every worker of a server.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    active: AtomicU64,
    total: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections currently open.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    /// Connections accepted since the server started.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Counts a new connection until the returned guard is deactivated or dropped.
    pub fn activate(self: &Arc<Self>) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::AcqRel);
        self.total.fetch_add(1, Ordering::AcqRel);
        ConnectionGuard { stats: Arc::clone(self), active: AtomicBool::new(true) }
    }
}

/// Holds one connection in [`ConnectionStats::active`].
///
/// The count is released at most once, however often [`ConnectionGuard::deactivate`] is called.
#[derive(Debug)]
pub struct ConnectionGuard {
    stats: Arc<ConnectionStats>,
    active: AtomicBool,
}

impl ConnectionGuard {
    pub fn deactivate(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.stats.active.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deactivation_is_idempotent() {
        let stats = Arc::new(ConnectionStats::new());
        let first = stats.activate();
        let second = stats.activate();
        assert_eq!(stats.active(), 2);

        first.deactivate();
        first.deactivate();
        assert_eq!(stats.active(), 1);

        drop(first);
        assert_eq!(stats.active(), 1);

        drop(second);
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.total(), 2);
    }

    #[test]
    fn concurrent_guards_balance() {
        let stats = Arc::new(ConnectionStats::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let guard = stats.activate();
                        guard.deactivate();
                    }
                })
            })
            .collect();

        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(stats.active(), 0);
        assert_eq!(stats.total(), 800);
    }
}
