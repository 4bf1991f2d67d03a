//! One mailbox per live order.
//!
//! Every event for an order goes through that order's mailbox, so reads and
//! writes of one order never interleave inside a process. The task exits once
//! the order reaches a terminal state; a later event simply spawns a new one.

use citybite_core::Actor;
use std::collections::HashMap;
use std::sync::{Mutex, Weak};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::machine::{OrderError, OrderEvent};
use crate::service::{Applied, Inner, ServiceError};

const MAILBOX_CAPACITY: usize = 32;

pub(crate) struct Envelope {
    pub event: OrderEvent,
    pub actor: Actor,
    pub respond_to: oneshot::Sender<Result<Applied, ServiceError>>,
}

#[derive(Default)]
pub(crate) struct Mailboxes {
    senders: Mutex<HashMap<Uuid, mpsc::Sender<Envelope>>>,
}

impl Mailboxes {
    /// Sender for the order's mailbox, spawning the order task when none is running.
    pub fn sender_for(&self, order_id: Uuid, service: &Weak<Inner>) -> mpsc::Sender<Envelope> {
        let mut senders = match self.senders.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(tx) = senders.get(&order_id) {
            if !tx.is_closed() {
                return tx.clone();
            }
        }

        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        senders.insert(order_id, tx.clone());
        tokio::spawn(run(service.clone(), order_id, rx));
        tracing::debug!(%order_id, "Order mailbox started");
        tx
    }

    pub fn retire(&self, order_id: Uuid) {
        let mut senders = match self.senders.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        senders.remove(&order_id);
    }

    pub fn live(&self) -> usize {
        match self.senders.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

async fn run(service: Weak<Inner>, order_id: Uuid, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        let Some(inner) = service.upgrade() else {
            break;
        };

        let result = inner.handle_event(order_id, envelope.event, &envelope.actor).await;
        let finished = match &result {
            Ok(applied) => applied.order.status.is_terminal(),
            Err(ServiceError::Order(OrderError::NotFound(_))) => true,
            Err(_) => false,
        };

        // The caller may have given up waiting; the event is applied regardless.
        let _ = envelope.respond_to.send(result);

        if finished {
            inner.mailboxes.retire(order_id);
            break;
        }
    }
    tracing::debug!(%order_id, "Order mailbox stopped");
}
