//! Messenger module - the binary transport a channel runs over.
//!
//! A [`BinaryMessenger`] moves raw bytes per channel name. Inbound messages
//! are handed to the [`ChannelHandler`] registered for their channel together
//! with a one-shot [`ResponseSender`]; outbound messages go out through
//! [`BinaryMessenger::send`].
//!
//! [`LocalMessenger`] is an in-process implementation, useful for tests and
//! for hosting channels without a real transport.

mod local;

pub use local::{LocalMessenger, OutboundMessage};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::error::Result;

/// Receiver for inbound messages on one channel.
///
/// The messenger awaits the returned future before delivering the next
/// message on the same channel. An `Err` is a dispatch-level failure (the
/// message could not be handled at all); the messenger logs it.
pub type ChannelHandler =
    Arc<dyn Fn(Bytes, ResponseSender) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Binary transport with per-channel demultiplexing.
#[async_trait]
pub trait BinaryMessenger: Send + Sync {
    /// Set (or with `None`, clear) the handler for inbound messages on `channel`.
    fn set_channel_handler(&self, channel: &str, handler: Option<ChannelHandler>);

    /// Send a message on `channel` and return the raw reply.
    async fn send(&self, channel: &str, message: Bytes) -> Result<Bytes>;
}

type ReplyFn = Box<dyn FnOnce(Bytes) + Send>;

/// One-shot capability for answering an inbound message.
///
/// `send` consumes the sender, so a message is answered at most once.
/// Dropping it without sending abandons the reply.
pub struct ResponseSender {
    reply: Option<ReplyFn>,
}

impl ResponseSender {
    /// Create a sender that hands the reply to `f`.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Bytes) + Send + 'static,
    {
        Self {
            reply: Some(Box::new(f)),
        }
    }

    /// Create a sender whose reply arrives on the returned receiver.
    ///
    /// The receiver yields an error if the reply is abandoned.
    pub fn oneshot() -> (Self, oneshot::Receiver<Bytes>) {
        let (tx, rx) = oneshot::channel();
        let sender = Self::new(move |reply| {
            // Receiver gone means nobody is waiting for this reply anymore.
            let _ = tx.send(reply);
        });
        (sender, rx)
    }

    /// Deliver the reply.
    pub fn send(mut self, reply: Bytes) {
        if let Some(reply_fn) = self.reply.take() {
            reply_fn(reply);
        }
    }
}

impl Drop for ResponseSender {
    fn drop(&mut self) {
        if self.reply.is_some() {
            tracing::debug!("Response sender dropped without a reply");
        }
    }
}

impl std::fmt::Debug for ResponseSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSender")
            .field("pending", &self.reply.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_send_invokes_callback_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let sender = ResponseSender::new(move |reply| {
            assert_eq!(reply.as_ref(), b"pong");
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        sender.send(Bytes::from_static(b"pong"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_without_send_skips_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let sender = ResponseSender::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        drop(sender);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oneshot_sender() {
        let (sender, rx) = ResponseSender::oneshot();
        sender.send(Bytes::from_static(b"reply"));
        assert_eq!(rx.await.unwrap().as_ref(), b"reply");
    }

    #[tokio::test]
    async fn test_oneshot_abandoned() {
        let (sender, rx) = ResponseSender::oneshot();
        drop(sender);
        assert!(rx.await.is_err());
    }
}
