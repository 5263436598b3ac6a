//! In-process messenger.
//!
//! Inbound messages are injected with [`LocalMessenger::deliver`]. Each
//! channel gets a dedicated delivery task fed by an unbounded queue:
//!
//! ```text
//! deliver("a") ─┐
//! deliver("a") ─┴─► mpsc ─► Delivery Task "a" ─► ChannelHandler "a"
//! deliver("b") ───► mpsc ─► Delivery Task "b" ─► ChannelHandler "b"
//! ```
//!
//! A delivery task awaits the handler's future before taking the next
//! message, so messages on one channel are handled one at a time, in order.
//!
//! Outbound messages from [`BinaryMessenger::send`] are pushed onto the queue
//! returned by [`LocalMessenger::new`] and answered with an empty reply; no
//! response from the other side is ever correlated back.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};

use super::{BinaryMessenger, ChannelHandler, ResponseSender};
use crate::error::{ChannelError, Result};

/// A message sent through [`BinaryMessenger::send`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub channel: String,
    pub message: Bytes,
}

/// An inbound message waiting for its channel's delivery task.
struct Inbound {
    message: Bytes,
    sender: ResponseSender,
}

struct Shared {
    handlers: RwLock<HashMap<String, ChannelHandler>>,
    queues: Mutex<HashMap<String, mpsc::UnboundedSender<Inbound>>>,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
}

impl Shared {
    fn handler(&self, channel: &str) -> Option<ChannelHandler> {
        self.handlers.read().get(channel).cloned()
    }
}

/// In-process [`BinaryMessenger`].
#[derive(Clone)]
pub struct LocalMessenger {
    shared: Arc<Shared>,
}

impl LocalMessenger {
    /// Create a messenger and the receiving end of its outbound queue.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let messenger = Self {
            shared: Arc::new(Shared {
                handlers: RwLock::new(HashMap::new()),
                queues: Mutex::new(HashMap::new()),
                outbound,
            }),
        };
        (messenger, outbound_rx)
    }

    /// Deliver an inbound message on `channel` and return a receiver for the reply.
    ///
    /// The receiver yields an error if the reply is abandoned.
    /// Must be called within a Tokio runtime.
    pub fn deliver(&self, channel: &str, message: Bytes) -> oneshot::Receiver<Bytes> {
        let (sender, rx) = ResponseSender::oneshot();
        self.deliver_with(channel, message, sender);
        rx
    }

    /// Deliver an inbound message with a caller-supplied response sender.
    ///
    /// Must be called within a Tokio runtime.
    pub fn deliver_with(&self, channel: &str, message: Bytes, sender: ResponseSender) {
        let mut queues = self.shared.queues.lock();
        let queue = queues.entry(channel.to_string()).or_insert_with(|| {
            spawn_delivery_task(Arc::downgrade(&self.shared), channel.to_string())
        });

        if queue.send(Inbound { message, sender }).is_err() {
            // The delivery task died with its runtime; start over next time.
            tracing::warn!(channel = %channel, "Delivery task gone, dropping message");
            queues.remove(channel);
        }
    }

    /// Whether a handler is set for `channel`.
    pub fn has_channel_handler(&self, channel: &str) -> bool {
        self.shared.handlers.read().contains_key(channel)
    }
}

#[async_trait]
impl BinaryMessenger for LocalMessenger {
    fn set_channel_handler(&self, channel: &str, handler: Option<ChannelHandler>) {
        let mut handlers = self.shared.handlers.write();
        match handler {
            Some(handler) => {
                handlers.insert(channel.to_string(), handler);
            }
            None => {
                handlers.remove(channel);
            }
        }
    }

    async fn send(&self, channel: &str, message: Bytes) -> Result<Bytes> {
        self.shared
            .outbound
            .send(OutboundMessage {
                channel: channel.to_string(),
                message,
            })
            .map_err(|_| {
                ChannelError::Messenger(format!("outbound queue closed for channel '{}'", channel))
            })?;

        Ok(Bytes::new())
    }
}

fn spawn_delivery_task(shared: Weak<Shared>, channel: String) -> mpsc::UnboundedSender<Inbound> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(delivery_loop(shared, channel, rx));
    tx
}

/// Hands inbound messages for one channel to its handler, one at a time.
async fn delivery_loop(
    shared: Weak<Shared>,
    channel: String,
    mut rx: mpsc::UnboundedReceiver<Inbound>,
) {
    while let Some(Inbound { message, sender }) = rx.recv().await {
        let handler = match shared.upgrade() {
            Some(shared) => shared.handler(&channel),
            None => break,
        };

        let Some(handler) = handler else {
            tracing::debug!(channel = %channel, "No handler set for channel, sending empty reply");
            sender.send(Bytes::new());
            continue;
        };

        if let Err(e) = handler(message, sender).await {
            tracing::error!(channel = %channel, "Handling message failed: {}", e);
        }
    }
}
