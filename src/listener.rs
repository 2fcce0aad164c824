use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::keys::EphemeralKey;
use crate::operation::Operation;

/// key: key-update-listener
/// Sink for manager results. Exactly one callback fires per executed operation.
pub trait KeyUpdateListener: Send + Sync {
    fn on_key_update(&self, key: &EphemeralKey, operation: &Operation);

    fn on_key_error(&self, operation_id: &str, code: i32, message: &str);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyEvent {
    Updated {
        key: EphemeralKey,
        operation: Operation,
    },
    Failed {
        operation_id: String,
        code: i32,
        message: String,
    },
}

impl KeyEvent {
    pub fn operation_id(&self) -> &str {
        match self {
            KeyEvent::Updated { operation, .. } => &operation.id,
            KeyEvent::Failed { operation_id, .. } => operation_id,
        }
    }
}

/// Forwards listener callbacks into a channel so results can be consumed as messages.
#[derive(Clone, Debug)]
pub struct ChannelListener {
    tx: UnboundedSender<KeyEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, UnboundedReceiver<KeyEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn stream() -> (Self, UnboundedReceiverStream<KeyEvent>) {
        let (listener, rx) = Self::new();
        (listener, UnboundedReceiverStream::new(rx))
    }

    fn forward(&self, event: KeyEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("key event receiver dropped; discarding event");
        }
    }
}

impl KeyUpdateListener for ChannelListener {
    fn on_key_update(&self, key: &EphemeralKey, operation: &Operation) {
        self.forward(KeyEvent::Updated {
            key: key.clone(),
            operation: operation.clone(),
        });
    }

    fn on_key_error(&self, operation_id: &str, code: i32, message: &str) {
        self.forward(KeyEvent::Failed {
            operation_id: operation_id.to_string(),
            code,
            message: message.to_string(),
        });
    }
}
