use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use scout_core::notifications::Notification;
use scout_core::SessionId;

/// Serializes the turns of one session in reservation order.
#[derive(Clone, Debug, Default)]
pub struct TurnGate {
    tail: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
}

impl TurnGate {
    /// Take the next place in line. Reservation is synchronous, so turns run
    /// in the order they were reserved regardless of task scheduling.
    pub fn reserve(&self) -> TurnSlot {
        let (release, next) = oneshot::channel();
        let previous = self.tail.lock().replace(next);
        TurnSlot {
            previous,
            _release: release,
        }
    }
}

/// A place in a session's turn line. Dropping it lets the next turn start.
#[derive(Debug)]
pub struct TurnSlot {
    previous: Option<oneshot::Receiver<()>>,
    _release: oneshot::Sender<()>,
}

impl TurnSlot {
    /// Wait until every earlier slot has been dropped.
    pub async fn ready(&mut self) {
        if let Some(previous) = self.previous.take() {
            // Err means the holder was dropped, which is the release signal
            let _ = previous.await;
        }
    }
}

/// Everything the engine holds for one connected session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    pub id: SessionId,
    pub outbound: mpsc::Sender<Notification>,
    /// Cancelled when the session is removed.
    pub cancel: CancellationToken,
    pub gate: TurnGate,
}

impl SessionHandle {
    pub fn new(id: SessionId, outbound: mpsc::Sender<Notification>) -> Self {
        Self {
            id,
            outbound,
            cancel: CancellationToken::new(),
            gate: TurnGate::default(),
        }
    }
}

/// Concurrent map of connected sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh session with a bounded outbound channel and return
    /// its id and the receiving end.
    pub fn register(&self, max_send_queue: usize) -> (SessionId, mpsc::Receiver<Notification>) {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(max_send_queue.max(1));
        self.insert(SessionHandle::new(id.clone(), tx));
        (id, rx)
    }

    /// Insert a handle. A previous entry under the same id is cancelled.
    pub fn insert(&self, handle: SessionHandle) {
        debug!(session_id = %handle.id, "session registered");
        if let Some(previous) = self.sessions.insert(handle.id.clone(), handle) {
            previous.cancel.cancel();
        }
    }

    /// Remove a session and cancel its in-flight turns.
    pub fn unregister(&self, id: &SessionId) -> Option<SessionHandle> {
        let (_, handle) = self.sessions.remove(id)?;
        handle.cancel.cancel();
        debug!(session_id = %id, "session unregistered");
        Some(handle)
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cancel every session without removing it. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut count = 0;
        for entry in self.sessions.iter() {
            entry.value().cancel.cancel();
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister() {
        let registry = SessionRegistry::new();
        let (id, _rx) = registry.register(8);
        assert!(registry.get(&id).is_some());
        assert_eq!(registry.len(), 1);

        let handle = registry.get(&id).unwrap();
        let removed = registry.unregister(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(handle.cancel.is_cancelled());
        assert!(registry.is_empty());
        assert!(registry.unregister(&id).is_none());
    }

    #[tokio::test]
    async fn outbound_closes_after_receiver_drop() {
        let registry = SessionRegistry::new();
        let (id, rx) = registry.register(1);
        drop(rx);
        let handle = registry.get(&id).unwrap();
        let sent = handle
            .outbound
            .send(Notification::Connected { session_id: id.clone() })
            .await;
        assert!(sent.is_err());
    }

    #[test]
    fn replacing_a_session_cancels_the_old_one() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let id = SessionId::from_raw("sess_fixed");
        let first = SessionHandle::new(id.clone(), tx.clone());
        let first_cancel = first.cancel.clone();
        registry.insert(first);
        registry.insert(SessionHandle::new(id, tx));
        assert!(first_cancel.is_cancelled());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cancel_all_keeps_entries() {
        let registry = SessionRegistry::new();
        let (a, _ra) = registry.register(1);
        let (b, _rb) = registry.register(1);
        assert_eq!(registry.cancel_all(), 2);
        assert!(registry.get(&a).unwrap().cancel.is_cancelled());
        assert!(registry.get(&b).unwrap().cancel.is_cancelled());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn gate_releases_in_reservation_order() {
        let gate = TurnGate::default();
        let first = gate.reserve();
        let mut second = gate.reserve();
        let mut third = gate.reserve();

        let waiter = tokio::spawn(async move {
            second.ready().await;
            second
        });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(first);
        let second = waiter.await.unwrap();
        drop(second);
        third.ready().await;
    }

    #[test]
    fn concurrent_register_unregister() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        let (id, _rx) = registry.register(1);
                        assert!(registry.get(&id).is_some());
                        registry.unregister(&id);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
