use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use courier_types::events::GatewayEvent;
use courier_types::models::MessageRecord;

use crate::handle::{EmitError, PendingEmit};
use crate::notify::{NotificationDispatcher, PushOutcome};
use crate::presence::Presence;

/// Default wait for a live connection to confirm a write.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a routed message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the recipient's live connection.
    Live,
    /// Handed to the push transport.
    Pushed,
    /// Push was attempted and failed; the stored record remains.
    PushFailed,
    /// No live connection and nothing to push to; the stored record is the
    /// only copy the recipient will see.
    Stored,
}

/// Single decision point for online vs offline delivery of a persisted
/// message.
#[derive(Clone)]
pub struct DeliveryRouter {
    presence: Presence,
    notifier: NotificationDispatcher,
    ack_timeout: Duration,
}

impl DeliveryRouter {
    pub fn new(presence: Presence, notifier: NotificationDispatcher) -> Self {
        Self {
            presence,
            notifier,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Route a message that has already been persisted.
    ///
    /// The live emit is queued before this returns, so messages routed in
    /// persistence order reach a connection in that order. Waiting for the
    /// write confirmation and any push fallback happen on a spawned task;
    /// callers may drop the handle.
    pub fn route(&self, message: MessageRecord) -> JoinHandle<Delivery> {
        let receiver = message.receiver.id;
        let emit = self
            .presence
            .connection(receiver)
            .map(|conn| conn.emit(GatewayEvent::Message(message.clone())));

        let router = self.clone();
        tokio::spawn(async move { router.complete(message, emit).await })
    }

    async fn complete(
        self,
        message: MessageRecord,
        emit: Option<Result<PendingEmit, EmitError>>,
    ) -> Delivery {
        let receiver = message.receiver.id;

        match emit {
            Some(Ok(pending)) => match pending.confirmed(self.ack_timeout).await {
                Ok(()) => {
                    debug!("message {} delivered live to {}", message.id, receiver);
                    return Delivery::Live;
                }
                Err(e) => warn!(
                    "live delivery of {} to {} failed ({}), falling back to push",
                    message.id, receiver, e
                ),
            },
            Some(Err(e)) => warn!(
                "live delivery of {} to {} failed ({}), falling back to push",
                message.id, receiver, e
            ),
            None => debug!("{} is offline", receiver),
        }

        self.fall_back(&message).await
    }

    async fn fall_back(&self, message: &MessageRecord) -> Delivery {
        let receiver = message.receiver.id;

        let Some(subscription) = self.presence.subscription(receiver) else {
            debug!("no push subscription for {}, message {} stays stored", receiver, message.id);
            return Delivery::Stored;
        };

        let outcome = self
            .notifier
            .notify(
                &subscription,
                &message.sender.name,
                &message.content,
                message.sender.id,
            )
            .await;

        match outcome {
            PushOutcome::Sent => Delivery::Pushed,
            PushOutcome::Failed => Delivery::PushFailed,
            PushOutcome::Disabled => Delivery::Stored,
        }
    }
}
