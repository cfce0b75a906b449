//! Per-session delivery channels. At most one listener per session; sends to a missing or
//! departed listener are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info};

use crate::core::events::{EventSink, LifecycleEvent};

/// Identifies one `connect` call. Only the holder of the current token can disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerToken(u64);

struct Listener {
    token: ListenerToken,
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

#[derive(Clone, Default)]
pub struct DeliveryHub {
    listeners: Arc<Mutex<HashMap<String, Listener>>>,
    next_token: Arc<AtomicU64>,
}

impl DeliveryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a listener to `session_id`, replacing any previous one.
    pub async fn connect(
        &self,
        session_id: &str,
    ) -> (ListenerToken, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let replaced = self
            .listeners
            .lock()
            .await
            .insert(session_id.to_string(), Listener { token, tx })
            .is_some();
        if replaced {
            info!("Delivery channel for session {} replaced", session_id);
        } else {
            info!("Delivery channel for session {} connected", session_id);
        }
        (token, rx)
    }

    /// Detaches the listener registered under `token`. A listener that has since been
    /// replaced by a newer `connect` stays attached.
    pub async fn disconnect(&self, session_id: &str, token: ListenerToken) {
        let mut listeners = self.listeners.lock().await;
        match listeners.get(session_id) {
            Some(current) if current.token == token => {
                listeners.remove(session_id);
                info!("Delivery channel for session {} disconnected", session_id);
            }
            Some(_) => debug!(
                "Stale disconnect for session {}; newer listener kept",
                session_id
            ),
            None => {}
        }
    }

    /// Returns whether the event reached a listener.
    pub async fn send(&self, session_id: &str, event: LifecycleEvent) -> bool {
        let mut listeners = self.listeners.lock().await;
        let Some(listener) = listeners.get(session_id) else {
            debug!("No listener for session {}; dropping {}", session_id, event.kind());
            return false;
        };
        if listener.tx.send(event).is_err() {
            listeners.remove(session_id);
            debug!("Listener for session {} went away", session_id);
            return false;
        }
        true
    }

    pub async fn active_count(&self) -> usize {
        self.listeners.lock().await.len()
    }

    pub fn sink(&self, session_id: &str) -> SessionSink {
        SessionSink {
            hub: self.clone(),
            session_id: session_id.to_string(),
        }
    }
}

/// [`EventSink`] bound to one session's delivery channel.
#[derive(Clone)]
pub struct SessionSink {
    hub: DeliveryHub,
    session_id: String,
}

#[async_trait]
impl EventSink for SessionSink {
    async fn emit(&self, event: LifecycleEvent) {
        self.hub.send(&self.session_id, event).await;
    }
}
