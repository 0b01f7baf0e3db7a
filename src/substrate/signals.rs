//! SignalBoard - in-process signal queues and query responses
//!
//! Signals delivered before anyone waits are buffered per name and consumed
//! in delivery order. Waiting is cancel-safe: a payload is only removed from
//! its queue by a waiter that returns it.

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::{BraidError, Result};

#[derive(Debug, Default)]
pub struct SignalBoard {
    queues: Mutex<FxHashMap<String, VecDeque<Value>>>,
    changed: Notify,
    queries: DashMap<String, Value>,
}

impl SignalBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer `payload` for the next waiter on `name`
    pub fn deliver(&self, name: &str, payload: Value) {
        self.queues
            .lock()
            .entry(name.to_string())
            .or_default()
            .push_back(payload);
        self.changed.notify_waiters();
    }

    fn take(&self, name: &str) -> Option<Value> {
        self.queues.lock().get_mut(name).and_then(VecDeque::pop_front)
    }

    /// Signals buffered for `name` and not consumed yet
    pub fn pending(&self, name: &str) -> usize {
        self.queues.lock().get(name).map_or(0, VecDeque::len)
    }

    /// Wait for the next `name` signal, or `Cancelled` once `cancel` fires
    pub async fn wait(&self, name: &str, cancel: &CancellationToken) -> Result<Value> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            // Registered before checking the queue so a delivery in between is not lost
            notified.as_mut().enable();

            if let Some(payload) = self.take(name) {
                return Ok(payload);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(BraidError::Cancelled {
                        scope: format!("signal:{name}"),
                    })
                }
                _ = &mut notified => {}
            }
        }
    }

    /// Resolves on the next delivery or query update
    pub async fn changed(&self) {
        self.changed.notified().await;
    }

    pub fn register_query(&self, name: &str, response: Value) {
        self.queries.insert(name.to_string(), response);
        self.changed.notify_waiters();
    }

    pub fn query(&self, name: &str) -> Option<Value> {
        self.queries.get(name).map(|r| r.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_buffered_signal_is_consumed_in_order() {
        let board = SignalBoard::new();
        board.deliver("approve", json!(1));
        board.deliver("approve", json!(2));
        let token = CancellationToken::new();

        assert_eq!(board.wait("approve", &token).await.unwrap(), json!(1));
        assert_eq!(board.wait("approve", &token).await.unwrap(), json!(2));
        assert_eq!(board.pending("approve"), 0);
    }

    #[tokio::test]
    async fn test_wait_wakes_on_delivery() {
        let board = Arc::new(SignalBoard::new());
        let token = CancellationToken::new();
        let waiter = {
            let board = Arc::clone(&board);
            let token = token.clone();
            tokio::spawn(async move { board.wait("go", &token).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        board.deliver("go", json!({"ok": true}));

        let payload = waiter.await.unwrap().unwrap();
        assert_eq!(payload, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_cancelled_wait_keeps_later_signal() {
        let board = SignalBoard::new();
        let token = CancellationToken::new();
        token.cancel();

        let err = board.wait("go", &token).await.unwrap_err();
        assert!(err.is_cancelled());

        board.deliver("go", json!("later"));
        assert_eq!(board.pending("go"), 1);
    }

    #[tokio::test]
    async fn test_dropped_wait_loses_nothing() {
        let board = SignalBoard::new();
        let token = CancellationToken::new();
        let timed_out =
            tokio::time::timeout(Duration::from_millis(10), board.wait("go", &token)).await;
        assert!(timed_out.is_err());

        board.deliver("go", json!(7));
        assert_eq!(board.wait("go", &token).await.unwrap(), json!(7));
    }

    #[test]
    fn test_query_latest_response_wins() {
        let board = SignalBoard::new();
        assert_eq!(board.query("status"), None);
        board.register_query("status", json!("pending"));
        board.register_query("status", json!("done"));
        assert_eq!(board.query("status"), Some(json!("done")));
    }
}
