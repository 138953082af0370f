//! Hot-update coordination.
//!
//! Owns the pending-update queue and the subscriber set. The protocol:
//! a change produces a [`PendingUpdate`] whose summary (no payloads) is
//! broadcast to every subscriber; a client POSTs `apply{id}` and the
//! dispatcher consumes the entry exactly once to assemble the payload.
//! A stalled sink (full channel) is dropped so the client reconnects
//! rather than buffering unbounded messages.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::DevError;

/// Why a module appears in an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateReason {
    Changed,
    Dependent,
    Deleted,
}

/// One module inside an update summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub abs_path: PathBuf,
    pub url: String,
    /// `None` for deleted modules.
    pub content_hash: Option<String>,
    pub reason: UpdateReason,
}

/// A queued update awaiting a client `apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub id: String,
    pub modules: Vec<ModuleSummary>,
    pub created_at_ms: u64,
}

/// Events delivered over the long-lived channel.
#[derive(Debug, Clone, PartialEq)]
pub enum HmrEvent {
    Ready,
    Update { id: String, modules: Vec<ModuleSummary> },
    Error { id: Option<String>, message: String },
}

impl HmrEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            HmrEvent::Ready => "ready",
            HmrEvent::Update { .. } => "update",
            HmrEvent::Error { .. } => "error",
        }
    }

    /// SSE payload.
    pub fn payload(&self) -> String {
        match self {
            HmrEvent::Ready => "ok".to_string(),
            HmrEvent::Update { id, modules } => serde_json::json!({
                "id": id,
                "modules": modules,
            })
            .to_string(),
            HmrEvent::Error { id, message } => serde_json::json!({
                "id": id,
                "message": message,
            })
            .to_string(),
        }
    }
}

/// Per-subscriber buffer. A subscriber that falls this far behind is
/// dropped.
const SINK_BUFFER: usize = 64;

/// The coordinator. Thread-safe; shared across all request handlers.
pub struct HmrCoordinator {
    subscribers: Mutex<FxHashMap<u64, mpsc::Sender<HmrEvent>>>,
    pending: Mutex<FxHashMap<String, PendingUpdate>>,
    next_subscriber_id: AtomicU64,
    next_update_id: AtomicU64,
    closed: AtomicBool,
}

impl Default for HmrCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl HmrCoordinator {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(FxHashMap::default()),
            pending: Mutex::new(FxHashMap::default()),
            next_subscriber_id: AtomicU64::new(0),
            next_update_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a sink. The initial `ready` event is already queued on
    /// the returned receiver.
    pub fn subscribe(&self) -> Result<(u64, mpsc::Receiver<HmrEvent>), DevError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DevError::HmrClosed);
        }
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(SINK_BUFFER);
        tx.try_send(HmrEvent::Ready)
            .expect("fresh sink accepts the ready event");
        self.subscribers.lock().insert(id, tx);
        debug!(subscriber = id, "hmr subscribe");
        Ok((id, rx))
    }

    /// Remove a sink (client disconnected).
    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Queue an update and broadcast its summary. Returns the assigned
    /// id.
    pub fn queue_update(&self, modules: Vec<ModuleSummary>) -> Result<String, DevError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DevError::HmrClosed);
        }
        let id = self.next_update_id.fetch_add(1, Ordering::SeqCst).to_string();
        let update = PendingUpdate {
            id: id.clone(),
            modules: modules.clone(),
            created_at_ms: now_ms(),
        };
        self.pending.lock().insert(id.clone(), update);
        self.broadcast(HmrEvent::Update { id: id.clone(), modules });
        Ok(id)
    }

    /// Exactly-once removal of a pending update.
    pub fn consume(&self, id: &str) -> Option<PendingUpdate> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.pending.lock().remove(id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Broadcast a transform failure so overlays can render.
    pub fn broadcast_error(&self, id: Option<String>, message: impl Into<String>) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.broadcast(HmrEvent::Error {
            id,
            message: message.into(),
        });
    }

    /// End all sinks and clear pending state. Further operations fail
    /// fast.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the senders ends every subscriber stream.
        self.subscribers.lock().clear();
        self.pending.lock().clear();
    }

    fn broadcast(&self, event: HmrEvent) {
        let mut subscribers = self.subscribers.lock();
        let mut stalled = Vec::new();
        for (id, tx) in subscribers.iter() {
            if tx.try_send(event.clone()).is_err() {
                stalled.push(*id);
            }
        }
        for id in stalled {
            warn!(subscriber = id, "dropping stalled hmr sink");
            subscribers.remove(&id);
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(path: &str, reason: UpdateReason) -> ModuleSummary {
        ModuleSummary {
            abs_path: PathBuf::from(path),
            url: path.to_string(),
            content_hash: (reason != UpdateReason::Deleted).then(|| "abc123".to_string()),
            reason,
        }
    }

    #[tokio::test]
    async fn test_subscribe_receives_ready_first() {
        let hmr = HmrCoordinator::new();
        let (_, mut rx) = hmr.subscribe().unwrap();
        assert_eq!(rx.recv().await, Some(HmrEvent::Ready));
    }

    #[tokio::test]
    async fn test_updates_delivered_in_queue_order() {
        let hmr = HmrCoordinator::new();
        let (_, mut rx) = hmr.subscribe().unwrap();
        assert_eq!(rx.recv().await, Some(HmrEvent::Ready));

        let first = hmr
            .queue_update(vec![summary("/a.ts", UpdateReason::Changed)])
            .unwrap();
        let second = hmr
            .queue_update(vec![summary("/b.ts", UpdateReason::Changed)])
            .unwrap();
        assert_ne!(first, second);

        match rx.recv().await.unwrap() {
            HmrEvent::Update { id, .. } => assert_eq!(id, first),
            other => panic!("expected update, got {:?}", other),
        }
        match rx.recv().await.unwrap() {
            HmrEvent::Update { id, .. } => assert_eq!(id, second),
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_consume_exactly_once() {
        let hmr = HmrCoordinator::new();
        let id = hmr
            .queue_update(vec![summary("/a.ts", UpdateReason::Changed)])
            .unwrap();

        let entry = hmr.consume(&id).expect("first consume succeeds");
        assert_eq!(entry.modules.len(), 1);
        assert!(hmr.consume(&id).is_none(), "second consume finds nothing");
    }

    #[tokio::test]
    async fn test_consume_unknown_id() {
        let hmr = HmrCoordinator::new();
        assert!(hmr.consume("999").is_none());
    }

    #[tokio::test]
    async fn test_deleted_module_has_no_hash() {
        let hmr = HmrCoordinator::new();
        let id = hmr
            .queue_update(vec![summary("/gone.ts", UpdateReason::Deleted)])
            .unwrap();
        let entry = hmr.consume(&id).unwrap();
        assert_eq!(entry.modules[0].reason, UpdateReason::Deleted);
        assert!(entry.modules[0].content_hash.is_none());
    }

    #[tokio::test]
    async fn test_stalled_sink_dropped() {
        let hmr = HmrCoordinator::new();
        let (_, rx) = hmr.subscribe().unwrap();
        // Never drain rx: after enough broadcasts the sink stalls.
        for _ in 0..(SINK_BUFFER + 4) {
            let _ = hmr.queue_update(vec![summary("/a.ts", UpdateReason::Changed)]);
        }
        assert_eq!(hmr.subscriber_count(), 0);
        drop(rx);
    }

    #[tokio::test]
    async fn test_close_fails_fast() {
        let hmr = HmrCoordinator::new();
        let id = hmr
            .queue_update(vec![summary("/a.ts", UpdateReason::Changed)])
            .unwrap();
        hmr.close();

        assert!(hmr.subscribe().is_err());
        assert!(hmr
            .queue_update(vec![summary("/b.ts", UpdateReason::Changed)])
            .is_err());
        assert!(hmr.consume(&id).is_none(), "pending cleared on close");
    }

    #[tokio::test]
    async fn test_concurrent_subscribers_independent() {
        let hmr = HmrCoordinator::new();
        let (_, mut rx1) = hmr.subscribe().unwrap();
        let (_, mut rx2) = hmr.subscribe().unwrap();
        assert_eq!(rx1.recv().await, Some(HmrEvent::Ready));
        assert_eq!(rx2.recv().await, Some(HmrEvent::Ready));

        hmr.queue_update(vec![summary("/a.ts", UpdateReason::Changed)])
            .unwrap();

        assert!(matches!(rx1.recv().await, Some(HmrEvent::Update { .. })));
        assert!(matches!(rx2.recv().await, Some(HmrEvent::Update { .. })));
    }

    #[test]
    fn test_event_payloads() {
        assert_eq!(HmrEvent::Ready.payload(), "ok");

        let update = HmrEvent::Update {
            id: "7".into(),
            modules: vec![summary("/a.ts", UpdateReason::Dependent)],
        };
        let payload: serde_json::Value = serde_json::from_str(&update.payload()).unwrap();
        assert_eq!(payload["id"], "7");
        assert_eq!(payload["modules"][0]["reason"], "dependent");

        let error = HmrEvent::Error {
            id: None,
            message: "boom".into(),
        };
        assert_eq!(error.name(), "error");
    }
}
