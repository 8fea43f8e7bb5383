//! Program event listeners.
//!
//! Listeners are registered explicitly and removed explicitly; there is no
//! global registry. A listener buffers every log published after it was
//! registered, so registering before submitting an instruction guarantees
//! its event is not missed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use marketdeploy_sdk::InitializedEvent;
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

/// Identifier of a registered listener.
pub type ListenerId = u64;

/// Log data emitted by the exchange program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramLog {
    /// Signature of the emitting transaction.
    pub signature: String,
    /// Slot of the emitting transaction.
    pub slot: u64,
    /// Raw event bytes.
    pub data: Vec<u8>,
}

/// A registered listener.
#[derive(Debug)]
pub struct Listener {
    id: ListenerId,
    receiver: mpsc::UnboundedReceiver<ProgramLog>,
}

impl Listener {
    /// Returns the listener id.
    #[must_use]
    pub const fn id(&self) -> ListenerId {
        self.id
    }

    /// Waits for the next log.
    ///
    /// Returns `None` once the listener has been removed.
    pub async fn next_log(&mut self) -> Option<ProgramLog> {
        self.receiver.recv().await
    }

    /// Waits for the next `InitializedEvent`, skipping other events.
    ///
    /// Returns `None` once the listener has been removed.
    pub async fn next_initialized(&mut self) -> Option<(InitializedEvent, ProgramLog)> {
        while let Some(log) = self.receiver.recv().await {
            match InitializedEvent::from_log_data(&log.data) {
                Ok(Some(event)) => return Some((event, log)),
                Ok(None) => {}
                Err(e) => warn!("Malformed event in {}: {}", log.signature, e),
            }
        }
        None
    }
}

/// Registry delivering program logs to listeners.
#[derive(Debug, Default)]
pub struct InitializationNotifier {
    listeners: Mutex<HashMap<ListenerId, mpsc::UnboundedSender<ProgramLog>>>,
    next_id: AtomicU64,
}

impl InitializationNotifier {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new listener.
    pub async fn subscribe(&self) -> Listener {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.listeners.lock().await.insert(id, sender);
        Listener { id, receiver }
    }

    /// Removes a listener. Returns false if it was not registered.
    pub async fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.lock().await.remove(&id).is_some()
    }

    /// Delivers a log to every listener and returns how many received it.
    pub async fn publish(&self, log: &ProgramLog) -> usize {
        let mut listeners = self.listeners.lock().await;
        listeners.retain(|_, sender| !sender.is_closed());
        listeners
            .values()
            .filter(|sender| sender.send(log.clone()).is_ok())
            .count()
    }

    /// Returns the number of registered listeners.
    pub async fn listener_count(&self) -> usize {
        self.listeners.lock().await.len()
    }
}
