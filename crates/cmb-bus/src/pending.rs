//! Pending-request table (spec §4.3): correlates asynchronous responses
//! with their originating request.

use std::time::{Duration, Instant};

use cmb_core::BridgeError;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

/// Default timeouts by operation class (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    ToolDispatch,
    ListPublishedFlows,
    ProcessData,
    FileOperation,
}

impl TimeoutClass {
    #[must_use]
    pub fn default_timeout(self) -> Duration {
        match self {
            Self::ToolDispatch => Duration::from_secs(120),
            Self::ListPublishedFlows => Duration::from_secs(20),
            Self::ProcessData => Duration::from_secs(20),
            Self::FileOperation => Duration::from_secs(30),
        }
    }
}

struct PendingEntry {
    instance_id: String,
    deadline: Instant,
    timeout: Duration,
    tx: oneshot::Sender<Result<Value, BridgeError>>,
}

/// Correlates `requestId`s with the waiter awaiting their response.
#[derive(Default)]
pub struct PendingRequestTable {
    entries: DashMap<String, PendingEntry>,
}

impl PendingRequestTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending entry and return the receiver half the caller
    /// suspends on.
    pub fn enroll(
        &self,
        request_id: String,
        instance_id: String,
        timeout: Duration,
    ) -> oneshot::Receiver<Result<Value, BridgeError>> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            request_id,
            PendingEntry {
                instance_id,
                deadline: Instant::now() + timeout,
                timeout,
                tx,
            },
        );
        rx
    }

    /// Drop an enrollment without resolving its waiter (used when the
    /// outbound write fails before anyone could reasonably expect a
    /// reply).
    pub fn cancel(&self, request_id: &str) {
        self.entries.remove(request_id);
    }

    /// Deliver a success result. No-op if no entry exists (late reply) —
    /// idempotent with a second `complete`/`fail` for the same id, per
    /// spec §8 item 7.
    pub fn complete(&self, response_to_request_id: &str, result: Value) {
        if let Some((_, entry)) = self.entries.remove(response_to_request_id) {
            let _ = entry.tx.send(Ok(result));
        }
    }

    /// Deliver a failure. No-op if no entry exists.
    pub fn fail(&self, response_to_request_id: &str, error: BridgeError) {
        if let Some((_, entry)) = self.entries.remove(response_to_request_id) {
            let _ = entry.tx.send(Err(error));
        }
    }

    /// Release every waiter bound to `instance_id` with
    /// [`BridgeError::ConnectionLost`], called when that instance's
    /// connection drops.
    pub fn fail_all_for_instance(&self, instance_id: &str) {
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.value().instance_id == instance_id)
            .map(|e| e.key().clone())
            .collect();

        for id in ids {
            self.fail(&id, BridgeError::ConnectionLost);
        }
    }

    /// Release every outstanding waiter with [`BridgeError::ShuttingDown`]
    /// (spec §6.5 graceful termination).
    pub fn fail_all(&self) {
        let ids: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.fail(&id, BridgeError::ShuttingDown);
        }
    }

    /// Remove and fail every entry whose deadline has elapsed. Intended
    /// to be invoked periodically by a background sweeper task.
    pub fn sweep(&self) {
        let now = Instant::now();
        let expired: Vec<(String, u64)> = self
            .entries
            .iter()
            .filter(|e| e.value().deadline <= now)
            .map(|e| (e.key().clone(), e.value().timeout.as_millis() as u64))
            .collect();

        for (id, millis) in expired {
            self.fail(&id, BridgeError::Timeout { millis });
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_resolves_the_waiter_exactly_once() {
        let table = PendingRequestTable::new();
        let rx = table.enroll("r1".to_string(), "i1".to_string(), Duration::from_secs(5));
        table.complete("r1", Value::Bool(true));
        // Second completion is a silent no-op.
        table.complete("r1", Value::Bool(false));
        let result = rx.await.unwrap();
        assert_eq!(result.unwrap(), Value::Bool(true));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn fail_all_for_instance_only_touches_that_instance() {
        let table = PendingRequestTable::new();
        let rx_a = table.enroll("a".to_string(), "i1".to_string(), Duration::from_secs(5));
        let rx_b = table.enroll("b".to_string(), "i2".to_string(), Duration::from_secs(5));

        table.fail_all_for_instance("i1");

        assert!(matches!(
            rx_a.await.unwrap(),
            Err(BridgeError::ConnectionLost)
        ));
        assert_eq!(table.len(), 1);
        drop(rx_b);
    }

    #[tokio::test]
    async fn sweep_times_out_expired_entries_only() {
        let table = PendingRequestTable::new();
        let rx_expired = table.enroll(
            "expired".to_string(),
            "i1".to_string(),
            Duration::from_millis(0),
        );
        let rx_fresh = table.enroll("fresh".to_string(), "i1".to_string(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_millis(5)).await;
        table.sweep();

        assert!(matches!(
            rx_expired.await.unwrap(),
            Err(BridgeError::Timeout { .. })
        ));
        assert_eq!(table.len(), 1);
        drop(rx_fresh);
    }

    #[test]
    fn late_complete_after_removal_is_a_noop() {
        let table = PendingRequestTable::new();
        table.complete("never-enrolled", Value::Null);
    }
}
