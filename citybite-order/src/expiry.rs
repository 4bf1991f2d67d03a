use citybite_core::Actor;
use std::collections::HashMap;
use std::sync::{Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::machine::OrderEvent;
use crate::service::{Inner, OrderService};

/// Auto-expire timers for orders waiting on the restaurant.
///
/// A fired timer only sends `AutoExpire` through the order's mailbox; the
/// state machine decides whether it still applies, so a timer that loses the
/// race against `accept` is harmless.
#[derive(Default)]
pub(crate) struct ExpiryTimers {
    handles: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl ExpiryTimers {
    fn handles(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, JoinHandle<()>>> {
        match self.handles.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn schedule(&self, service: Weak<Inner>, order_id: Uuid, after: Duration) {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let Some(inner) = service.upgrade() else {
                return;
            };
            inner.timers.forget(order_id);

            let service = OrderService::from_inner(inner);
            match service.apply(order_id, OrderEvent::AutoExpire, Actor::System).await {
                Ok(applied) if applied.changed => {
                    tracing::info!(%order_id, "Order auto-expired");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(%order_id, error = %e, "Auto-expire failed"),
            }
        });

        if let Some(previous) = self.handles().insert(order_id, handle) {
            previous.abort();
        }
    }

    pub fn cancel(&self, order_id: Uuid) {
        if let Some(handle) = self.handles().remove(&order_id) {
            handle.abort();
        }
    }

    fn forget(&self, order_id: Uuid) {
        self.handles().remove(&order_id);
    }

    pub fn pending(&self) -> usize {
        self.handles().len()
    }
}

impl Drop for ExpiryTimers {
    fn drop(&mut self) {
        for (_, handle) in self.handles().drain() {
            handle.abort();
        }
    }
}
