//! Single-slot asynchronous write queue.
//!
//! Serializes persistence of one document payload at a time without blocking
//! the caller, and reports the outcome through observable status flags and
//! optional per-request hooks.
//!
//! ```text
//! enqueue(request) ──► slot guard ──► mpsc channel ──► worker ──► store.set
//!                                                        │
//!                                            watch channel (WriteStatus)
//! ```
//!
//! At most one request exists at a time: `enqueue` reserves the slot before
//! sending, and a second call while the slot is occupied is rejected with
//! [`Error::WriteInProgress`]. The worker marks `writing` on pickup, performs
//! the write, runs the matching hook, publishes the terminal status (success
//! xor error), and only then releases the slot, so every accepted request is
//! processed exactly once and the slot is observably free before the next
//! request can be accepted.
//!
//! Failures are terminal; there is no retry policy. The caller retries by
//! re-invoking the originating action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bon::Builder;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::errors::{Error, Result};
use crate::store::DocumentStore;
use crate::types::DocumentValue;

/// Hook invoked on the worker task after a successful write.
pub type SuccessHook = Box<dyn FnOnce() + Send + 'static>;

/// Hook invoked on the worker task with the write failure.
pub type ErrorHook = Box<dyn FnOnce(&Error) + Send + 'static>;

/// One pending persistence operation.
#[derive(Builder)]
pub struct WriteRequest {
    /// Target collection name.
    #[builder(into)]
    pub collection: String,
    /// Target document id.
    #[builder(into)]
    pub document_id: String,
    /// Full document payload; the write is an overwrite.
    pub payload: DocumentValue,
    /// Runs after a successful write, before the slot is released.
    pub on_success: Option<SuccessHook>,
    /// Runs with the failure, before the slot is released.
    pub on_error: Option<ErrorHook>,
}

impl std::fmt::Debug for WriteRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteRequest")
            .field("collection", &self.collection)
            .field("document_id", &self.document_id)
            .field("payload_fields", &self.payload.len())
            .field("has_on_success", &self.on_success.is_some())
            .field("has_on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Observable state of the queue.
///
/// `writing` is true while a request is being processed. Afterwards exactly
/// one of `success` / `error` reflects the outcome of the most recent request;
/// both reset when the next request starts.
#[derive(Debug, Clone, Default)]
pub struct WriteStatus {
    pub writing: bool,
    pub success: bool,
    pub error: Option<Arc<Error>>,
}

impl WriteStatus {
    /// True once a processed request has settled (success xor error).
    pub fn is_terminal(&self) -> bool {
        !self.writing && (self.success || self.error.is_some())
    }
}

/// Handle to the write queue. Cloning shares the worker.
#[derive(Clone)]
pub struct WriteQueue {
    request_tx: mpsc::Sender<WriteRequest>,
    status_rx: watch::Receiver<WriteStatus>,
    slot_busy: Arc<AtomicBool>,
    shutdown: CancellationToken,
    worker: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl WriteQueue {
    /// Spawn the worker task and return a handle to it.
    pub fn spawn(store: Arc<dyn DocumentStore>, shutdown: CancellationToken) -> Self {
        let (request_tx, request_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = watch::channel(WriteStatus::default());
        let slot_busy = Arc::new(AtomicBool::new(false));

        let worker = tokio::spawn(run_writer(
            request_rx,
            status_tx,
            Arc::clone(&slot_busy),
            store,
            shutdown.clone(),
        ));

        Self {
            request_tx,
            status_rx,
            slot_busy,
            shutdown,
            worker: Arc::new(tokio::sync::Mutex::new(Some(worker))),
        }
    }

    /// Register a pending write.
    ///
    /// Never blocks on the store: the write happens on the worker task.
    ///
    /// # Errors
    /// - [`Error::WriteInProgress`] when a previous request has not reached
    ///   its terminal state yet
    /// - [`Error::Internal`] when the queue has been shut down
    pub fn enqueue(&self, request: WriteRequest) -> Result<()> {
        if self.slot_busy.swap(true, Ordering::AcqRel) {
            return Err(Error::WriteInProgress);
        }

        // Slot reserved above; with channel capacity 1 the send only fails
        // once the worker is gone.
        if let Err(err) = self.request_tx.try_send(request) {
            self.slot_busy.store(false, Ordering::Release);
            let request = match err {
                TrySendError::Full(request) | TrySendError::Closed(request) => request,
            };
            return Err(Error::Internal {
                operation: format!(
                    "enqueue write to {}/{}: queue is shut down",
                    request.collection, request.document_id
                ),
            });
        }

        Ok(())
    }

    /// Current status snapshot.
    pub fn status(&self) -> WriteStatus {
        self.status_rx.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<WriteStatus> {
        self.status_rx.clone()
    }

    /// Whether a request currently occupies the slot.
    pub fn is_busy(&self) -> bool {
        self.slot_busy.load(Ordering::Acquire)
    }

    /// Stop the worker and wait for it to exit. An in-flight write finishes
    /// first; a request still sitting in the channel is dropped.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(worker) = self.worker.lock().await.take() {
            if let Err(err) = worker.await {
                tracing::error!("Write queue worker task panicked: {err}");
            }
        }
    }
}

// --- Worker task ---

/// Long-lived task that receives write requests and performs them one at a
/// time against the injected store.
#[instrument(skip(request_rx, status_tx, slot_busy, store, shutdown))]
async fn run_writer(
    mut request_rx: mpsc::Receiver<WriteRequest>,
    status_tx: watch::Sender<WriteStatus>,
    slot_busy: Arc<AtomicBool>,
    store: Arc<dyn DocumentStore>,
    shutdown: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            req = request_rx.recv() => {
                match req {
                    Some(r) => r,
                    None => {
                        tracing::debug!("Write queue channel closed, shutting down");
                        break;
                    }
                }
            }
            _ = shutdown.cancelled() => {
                tracing::debug!("Write queue worker received shutdown signal");
                break;
            }
        };

        let WriteRequest {
            collection,
            document_id,
            payload,
            on_success,
            on_error,
        } = request;

        // Entering the write: writing on, previous outcome flags cleared.
        status_tx.send_replace(WriteStatus {
            writing: true,
            success: false,
            error: None,
        });

        let outcome = store.set(&collection, &document_id, payload).await;

        // Hooks run before the terminal status is published and before the
        // slot is released, so the slot is never observably free while a
        // hook is still pending.
        match outcome {
            Ok(()) => {
                tracing::debug!(collection = %collection, document_id = %document_id, "Write completed");
                if let Some(on_success) = on_success {
                    on_success();
                }
                status_tx.send_replace(WriteStatus {
                    writing: false,
                    success: true,
                    error: None,
                });
            }
            Err(err) => {
                tracing::warn!(
                    collection = %collection,
                    document_id = %document_id,
                    "Write failed: {err}"
                );
                if let Some(on_error) = on_error {
                    on_error(&err);
                }
                status_tx.send_replace(WriteStatus {
                    writing: false,
                    success: false,
                    error: Some(Arc::new(err)),
                });
            }
        }

        slot_busy.store(false, Ordering::Release);
    }

    tracing::debug!("Write queue worker exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::{oneshot, Notify};
    use tokio_test::assert_ok;

    use crate::types::DocumentId;

    /// Test store wrapping the in-memory one with an optional gate that holds
    /// writes until released and a list of document ids whose writes fail.
    #[derive(Default)]
    struct TestStore {
        inner: InMemoryStore,
        gate: Option<Arc<Notify>>,
        fail_ids: Vec<String>,
    }

    impl TestStore {
        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::default()
            }
        }

        fn failing_ids(ids: &[&str]) -> Self {
            Self {
                fail_ids: ids.iter().map(|id| id.to_string()).collect(),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl DocumentStore for TestStore {
        async fn get(&self, collection: &str, id: &str) -> crate::errors::Result<Option<DocumentValue>> {
            self.inner.get(collection, id).await
        }

        async fn set(&self, collection: &str, id: &str, document: DocumentValue) -> crate::errors::Result<()> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail_ids.iter().any(|fail_id| fail_id == id) {
                return Err(Error::Store {
                    message: "simulated write failure".to_string(),
                });
            }
            self.inner.set(collection, id, document).await
        }

        async fn merge(&self, collection: &str, id: &str, patch: DocumentValue) -> crate::errors::Result<()> {
            self.inner.merge(collection, id, patch).await
        }

        async fn add(&self, collection: &str, document: DocumentValue) -> crate::errors::Result<DocumentId> {
            self.inner.add(collection, document).await
        }

        async fn delete(&self, collection: &str, id: &str) -> crate::errors::Result<()> {
            self.inner.delete(collection, id).await
        }

        async fn query_eq(
            &self,
            collection: &str,
            field: &str,
            value: &Value,
        ) -> crate::errors::Result<Vec<(DocumentId, DocumentValue)>> {
            self.inner.query_eq(collection, field, value).await
        }
    }

    fn start_queue(store: Arc<dyn DocumentStore>) -> WriteQueue {
        WriteQueue::spawn(store, CancellationToken::new())
    }

    fn request(collection: &str, id: &str, payload: Value) -> WriteRequest {
        WriteRequest::builder()
            .collection(collection)
            .document_id(id)
            .payload(DocumentValue::try_from(payload).unwrap())
            .build()
    }

    /// Poll until the slot is free and a terminal status is visible.
    async fn wait_idle(queue: &WriteQueue) -> WriteStatus {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if !queue.is_busy() {
                    let status = queue.status();
                    if status.is_terminal() {
                        return status;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("queue did not reach a terminal state in time")
    }

    #[tokio::test]
    async fn test_successful_write_ends_with_success_flags() {
        let store = Arc::new(InMemoryStore::new());
        let queue = start_queue(store.clone());

        assert_ok!(queue.enqueue(request("users", "u1", json!({"a": 1}))));

        let status = wait_idle(&queue).await;
        assert!(!status.writing);
        assert!(status.success);
        assert!(status.error.is_none());

        let written = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(written.get("a"), Some(&json!(1)));
    }

    #[test_log::test(tokio::test)]
    async fn test_failed_write_ends_with_error() {
        let store = Arc::new(TestStore::failing_ids(&["u1"]));
        let queue = start_queue(store);

        queue.enqueue(request("users", "u1", json!({"a": 1}))).unwrap();

        let status = wait_idle(&queue).await;
        assert!(!status.writing);
        assert!(!status.success);
        let error = status.error.expect("error should be set");
        assert!(error.to_string().contains("simulated write failure"));
    }

    #[tokio::test]
    async fn test_success_hook_fires_before_slot_clears() {
        let queue = start_queue(Arc::new(InMemoryStore::new()));
        let (seen_tx, seen_rx) = oneshot::channel();

        let observer = queue.clone();
        let mut req = request("users", "u1", json!({"a": 1}));
        req.on_success = Some(Box::new(move || {
            // Captured from inside the hook: the slot must still be occupied
            // and the terminal status not yet published.
            let _ = seen_tx.send((observer.is_busy(), observer.status().writing));
        }));
        queue.enqueue(req).unwrap();

        let (busy_during_hook, writing_during_hook) = seen_rx.await.unwrap();
        assert!(busy_during_hook);
        assert!(writing_during_hook);

        let status = wait_idle(&queue).await;
        assert!(status.success);
    }

    #[tokio::test]
    async fn test_error_hook_receives_underlying_error() {
        let queue = start_queue(Arc::new(TestStore::failing_ids(&["u1"])));
        let (seen_tx, seen_rx) = oneshot::channel();

        let observer = queue.clone();
        let mut req = request("users", "u1", json!({"a": 1}));
        req.on_error = Some(Box::new(move |err| {
            let _ = seen_tx.send((err.to_string(), observer.is_busy()));
        }));
        queue.enqueue(req).unwrap();

        let (message, busy_during_hook) = seen_rx.await.unwrap();
        assert_eq!(message, "document store error: simulated write failure");
        assert!(busy_during_hook);

        let status = wait_idle(&queue).await;
        assert!(!status.success);
        assert!(status.error.is_some());
    }

    #[tokio::test]
    async fn test_enqueue_while_busy_is_rejected() {
        let gate = Arc::new(Notify::new());
        let store = Arc::new(TestStore::gated(gate.clone()));
        let queue = start_queue(store.clone());

        queue.enqueue(request("users", "u1", json!({"first": true}))).unwrap();

        // First request is gated inside the store; the slot is occupied.
        let rejected = queue.enqueue(request("users", "u2", json!({"second": true})));
        assert!(matches!(rejected, Err(Error::WriteInProgress)));

        // The in-flight request is unaffected by the rejection.
        gate.notify_one();
        let status = wait_idle(&queue).await;
        assert!(status.success);
        assert!(store.get("users", "u1").await.unwrap().is_some());
        assert!(store.get("users", "u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sequential_enqueues_each_process_exactly_once() {
        let store = Arc::new(InMemoryStore::new());
        let queue = start_queue(store.clone());
        let completions = Arc::new(AtomicUsize::new(0));

        for i in 0..3 {
            let completions = completions.clone();
            let mut req = request("users", &format!("u{i}"), json!({"n": i}));
            req.on_success = Some(Box::new(move || {
                completions.fetch_add(1, Ordering::SeqCst);
            }));

            // Slot is observably free before each subsequent enqueue.
            assert!(!queue.is_busy());
            queue.enqueue(req).unwrap();
            let status = wait_idle(&queue).await;
            assert!(status.success);
        }

        assert_eq!(completions.load(Ordering::SeqCst), 3);
        assert_eq!(store.collection_len("users"), 3);
    }

    #[test_log::test(tokio::test)]
    async fn test_next_request_clears_previous_outcome_flags() {
        let store = Arc::new(TestStore::failing_ids(&["bad-doc"]));
        let queue = start_queue(store);

        queue.enqueue(request("users", "ok-doc", json!({"a": 1}))).unwrap();
        let first = wait_idle(&queue).await;
        assert!(first.success);
        assert!(first.error.is_none());

        queue.enqueue(request("users", "bad-doc", json!({"a": 2}))).unwrap();
        let second = wait_idle(&queue).await;
        assert!(!second.success);
        assert!(second.error.is_some());

        queue.enqueue(request("users", "ok-doc", json!({"a": 3}))).unwrap();
        let third = wait_idle(&queue).await;
        assert!(third.success);
        assert!(third.error.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker_and_rejects_new_requests() {
        let queue = start_queue(Arc::new(InMemoryStore::new()));

        tokio::time::timeout(Duration::from_secs(1), queue.shutdown())
            .await
            .expect("worker should exit promptly");

        let rejected = queue.enqueue(request("users", "u1", json!({"a": 1})));
        assert!(matches!(rejected, Err(Error::Internal { .. })));
        // The failed enqueue must not leave the slot reserved.
        assert!(!queue.is_busy());
    }
}
