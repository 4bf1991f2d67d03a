use async_trait::async_trait;
use citybite_shared::NotificationEvent;
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::{CoreError, CoreResult};

/// Receives abstract notification events. Transport is the implementor's concern.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: NotificationEvent) -> CoreResult<()>;
}

/// Writes events to the log only.
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn dispatch(&self, event: NotificationEvent) -> CoreResult<()> {
        tracing::info!(
            kind = event.kind.as_str(),
            audience = ?event.audience,
            order_id = ?event.order_id,
            "Notification dispatched"
        );
        Ok(())
    }
}

/// Fans events out to in-process subscribers (the SSE stream).
#[derive(Clone)]
pub struct BroadcastDispatcher {
    tx: broadcast::Sender<NotificationEvent>,
}

impl BroadcastDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NotificationDispatcher for BroadcastDispatcher {
    async fn dispatch(&self, event: NotificationEvent) -> CoreResult<()> {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
        Ok(())
    }
}

/// Sends each event to several dispatchers; the first failure is reported
/// after all of them were tried.
pub struct FanoutDispatcher {
    targets: Vec<std::sync::Arc<dyn NotificationDispatcher>>,
}

impl FanoutDispatcher {
    pub fn new(targets: Vec<std::sync::Arc<dyn NotificationDispatcher>>) -> Self {
        Self { targets }
    }
}

#[async_trait]
impl NotificationDispatcher for FanoutDispatcher {
    async fn dispatch(&self, event: NotificationEvent) -> CoreResult<()> {
        let mut first_error = None;
        for target in &self.targets {
            if let Err(e) = target.dispatch(event.clone()).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Keeps every event in memory. Used by tests.
#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn kinds(&self) -> Vec<citybite_shared::NotificationKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: NotificationEvent) -> CoreResult<()> {
        self.events
            .lock()
            .map_err(|_| CoreError::InternalError("recording dispatcher poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}
