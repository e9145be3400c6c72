//! The pending-request table (spec §3 "Pending-Request Table"): outbound
//! control requests awaiting a correlated `control_response`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};

use crate::error::SdkError;

pub(crate) type PendingReply = Result<Value, SdkError>;

#[derive(Clone)]
pub(crate) struct PendingTable {
    inner: Arc<Mutex<HashMap<String, oneshot::Sender<PendingReply>>>>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a new outbound request before writing it to the wire.
    pub(crate) async fn insert(&self, request_id: String) -> oneshot::Receiver<PendingReply> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(request_id, tx);
        rx
    }

    /// Remove and complete the entry matching `request_id`, if any is pending.
    /// A response whose id matches no pending entry is dropped per spec invariant 1.
    pub(crate) async fn complete(&self, request_id: &str, reply: PendingReply) {
        if let Some(tx) = self.inner.lock().await.remove(request_id) {
            let _ = tx.send(reply);
        }
    }

    /// Remove a pending entry without completing it (used by timeout/cancel
    /// paths, which resolve the receiver side directly).
    pub(crate) async fn evict(&self, request_id: &str) {
        self.inner.lock().await.remove(request_id);
    }

    /// Fail every outstanding entry with the same error (propagation policy,
    /// spec §7): used when the record loop or stdin writer poisons the session.
    pub(crate) async fn fail_all(&self, make_error: impl Fn() -> SdkError) {
        let mut guard = self.inner.lock().await;
        for (_, tx) in guard.drain() {
            let _ = tx.send(Err(make_error()));
        }
    }
}
