use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-room critical sections keyed by room code.
///
/// Entries are created on first use and dropped again once nobody holds or waits on them, so the
/// map only ever contains codes with in-flight transitions.
#[derive(Default)]
pub struct RoomGates {
    gates: DashMap<String, Arc<Mutex<()>>>,
}

impl RoomGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `code`.
    pub async fn acquire(&self, code: &str) -> RoomGateGuard<'_> {
        let gate = self.gates.entry(code.to_string()).or_default().clone();
        let guard = gate.lock_owned().await;
        RoomGateGuard {
            gates: self,
            code: code.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of codes currently tracked.
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}

/// Exclusive access to one room; released on drop.
pub struct RoomGateGuard<'a> {
    gates: &'a RoomGates,
    code: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RoomGateGuard<'_> {
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl Drop for RoomGateGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map still references the gate: nobody holds it or queues on it.
        self.gates
            .gates
            .remove_if(&self.code, |_, gate| Arc::strong_count(gate) == 1);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn gate_is_removed_when_idle() {
        let gates = RoomGates::new();
        {
            let guard = gates.acquire("ABCDEF").await;
            assert_eq!(guard.code(), "ABCDEF");
            assert_eq!(gates.len(), 1);
        }
        assert!(gates.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_code_is_serialised() {
        let gates = Arc::new(RoomGates::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gates = gates.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = gates.acquire("ABCDEF").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(gates.is_empty());
    }

    #[tokio::test]
    async fn distinct_codes_do_not_block_each_other() {
        let gates = RoomGates::new();
        let _first = gates.acquire("AAAAAA").await;
        let second = tokio::time::timeout(Duration::from_millis(100), gates.acquire("BBBBBB")).await;
        assert!(second.is_ok());
    }
}
