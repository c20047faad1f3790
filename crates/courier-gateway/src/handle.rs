use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use courier_types::events::GatewayEvent;

/// An event queued for a live connection, with a slot for the connection
/// task to report whether the socket write succeeded.
#[derive(Debug)]
pub struct Outbound {
    pub event: GatewayEvent,
    pub ack: oneshot::Sender<bool>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmitError {
    #[error("connection is closed")]
    Closed,
    #[error("connection dropped the event before writing it")]
    Dropped,
    #[error("socket write failed")]
    WriteFailed,
    #[error("no write confirmation within {0:?}")]
    Timeout(Duration),
}

/// Cloneable reference to one live connection's outbound queue.
///
/// Two handles are the same binding iff their ids match; the registry uses
/// this to tell a stale disconnect from the current one.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end the connection task drains.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue an event. Fails immediately when the connection task is gone;
    /// otherwise the returned [`PendingEmit`] resolves once the frame was
    /// written (or not).
    pub fn emit(&self, event: GatewayEvent) -> Result<PendingEmit, EmitError> {
        let (ack, confirm) = oneshot::channel();
        self.tx
            .send(Outbound { event, ack })
            .map_err(|_| EmitError::Closed)?;
        Ok(PendingEmit { confirm })
    }
}

/// Write confirmation for an event already queued on a connection.
#[derive(Debug)]
pub struct PendingEmit {
    confirm: oneshot::Receiver<bool>,
}

impl PendingEmit {
    pub async fn confirmed(self, timeout: Duration) -> Result<(), EmitError> {
        match tokio::time::timeout(timeout, self.confirm).await {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err(EmitError::WriteFailed),
            Ok(Err(_)) => Err(EmitError::Dropped),
            Err(_) => Err(EmitError::Timeout(timeout)),
        }
    }
}
