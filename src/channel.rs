//! Method channel: handler registration, inbound dispatch and outbound calls.
//!
//! A [`MethodChannel`] binds a channel name to a [`BinaryMessenger`] and a
//! [`MethodCodec`]. For every inbound message it:
//! 1. Decodes a [`MethodCall`]
//! 2. Looks up the registration for the method (or the fallback)
//! 3. Runs the handler inline (synchronous) or on its own task (concurrent)
//! 4. Encodes the outcome into an envelope and sends it back
//!
//! Calls with no registration and no fallback are answered with an empty
//! reply. A panicking handler is contained: it is logged and its reply is
//! abandoned.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use method_channel::{LocalMessenger, MethodChannel};
//!
//! let (messenger, _outbound) = LocalMessenger::new();
//! let channel = MethodChannel::builder(Arc::new(messenger), "samples/echo")
//!     .handle_fn_sync("echo", |args| async move { Ok(args) })
//!     .catch_all_fn(|call| async move {
//!         Err(format!("unknown method {}", call.method).into())
//!     })
//!     .build();
//!
//! channel.invoke_method("ready", true).await?;
//! ```

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::codec::{MethodCall, MethodCodec, MsgPackMethodCodec};
use crate::error::{ChannelError, Result};
use crate::handler::{
    run_contained, ExecutionMode, FallbackHandler, HandlerError, HandlerRegistry, HandlerResult,
    MethodHandler, Outcome, Registration, Route, TypedHandler,
};
use crate::messenger::{BinaryMessenger, ChannelHandler, ResponseSender};

/// Error code used for every error envelope produced by a handler failure.
pub const GENERIC_ERROR_CODE: &str = "error";

/// Builder for configuring and binding a [`MethodChannel`].
///
/// Handlers registered here are in place before the channel is bound to the
/// messenger, so no inbound message can observe a half-configured channel.
pub struct MethodChannelBuilder {
    messenger: Arc<dyn BinaryMessenger>,
    channel_name: String,
    codec: Arc<dyn MethodCodec>,
    registry: HandlerRegistry,
}

impl MethodChannelBuilder {
    /// Create a builder using the MsgPack codec.
    pub fn new(messenger: Arc<dyn BinaryMessenger>, channel_name: impl Into<String>) -> Self {
        Self {
            messenger,
            channel_name: channel_name.into(),
            codec: Arc::new(MsgPackMethodCodec),
            registry: HandlerRegistry::new(),
        }
    }

    /// Set the codec.
    ///
    /// Default: [`MsgPackMethodCodec`]
    pub fn codec<C: MethodCodec + 'static>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Register a concurrent method handler.
    pub fn handle<H: MethodHandler>(self, method: &str, handler: H) -> Self {
        self.registry
            .register(method, Some(Arc::new(handler)), ExecutionMode::Concurrent);
        self
    }

    /// Register a synchronous method handler.
    pub fn handle_sync<H: MethodHandler>(self, method: &str, handler: H) -> Self {
        self.registry
            .register(method, Some(Arc::new(handler)), ExecutionMode::Synchronous);
        self
    }

    /// Register a concurrent handler closure over dynamic arguments.
    pub fn handle_fn<F, Fut>(self, method: &str, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle(method, f)
    }

    /// Register a synchronous handler closure over dynamic arguments.
    pub fn handle_fn_sync<F, Fut>(self, method: &str, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle_sync(method, f)
    }

    /// Register a concurrent handler closure over typed arguments and reply.
    pub fn handle_typed<F, T, R, Fut>(self, method: &str, f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.handle(method, TypedHandler::new(f))
    }

    /// Register a synchronous handler closure over typed arguments and reply.
    pub fn handle_typed_sync<F, T, R, Fut>(self, method: &str, f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.handle_sync(method, TypedHandler::new(f))
    }

    /// Set the fallback handler.
    pub fn catch_all<H: FallbackHandler>(self, handler: H) -> Self {
        self.registry.register_fallback(Some(Arc::new(handler)));
        self
    }

    /// Set the fallback handler from a closure.
    pub fn catch_all_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(MethodCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.catch_all(f)
    }

    /// Bind the channel to the messenger.
    pub fn build(self) -> MethodChannel {
        MethodChannel::bind(self.messenger, self.channel_name, self.codec, self.registry)
    }
}

/// Inbound side of a channel. Shared with the messenger's channel handler
/// and with every spawned handler task.
struct Dispatcher {
    channel_name: String,
    codec: Arc<dyn MethodCodec>,
    registry: HandlerRegistry,
}

impl Dispatcher {
    async fn dispatch(self: Arc<Self>, message: Bytes, reply: ResponseSender) -> Result<()> {
        let call = self
            .codec
            .decode_method_call(&message)
            .map_err(|e| ChannelError::Decode {
                channel: self.channel_name.clone(),
                source: Box::new(e),
            })?;

        let MethodCall { method, arguments } = call;

        match self.registry.route(&method) {
            Route::Method(Registration {
                handler,
                mode: ExecutionMode::Synchronous,
            }) => {
                tracing::debug!(method = %method, channel = %self.channel_name, "Handling method call inline");
                self.invoke(method, async move { handler.handle(arguments).await }, reply)
                    .await;
            }
            Route::Method(Registration {
                handler,
                mode: ExecutionMode::Concurrent,
            }) => {
                tracing::debug!(method = %method, channel = %self.channel_name, "Spawning method call");
                tokio::spawn(async move {
                    self.invoke(method, async move { handler.handle(arguments).await }, reply)
                        .await;
                });
            }
            Route::Fallback(handler) => {
                tracing::debug!(method = %method, channel = %self.channel_name, "Spawning fallback for method call");
                tokio::spawn(async move {
                    let call = MethodCall::new(method.clone(), arguments);
                    self.invoke(method, async move { handler.handle(call).await }, reply)
                        .await;
                });
            }
            Route::Unhandled => {
                tracing::warn!(
                    method = %method,
                    channel = %self.channel_name,
                    "No method handler registered, sending empty reply"
                );
                reply.send(Bytes::new());
            }
        }

        Ok(())
    }

    /// Run one handler invocation and answer it.
    async fn invoke<F>(&self, method: String, call: F, reply: ResponseSender)
    where
        F: Future<Output = HandlerResult>,
    {
        let encoded = match run_contained(call).await {
            Outcome::Success(value) => self.codec.encode_success_envelope(&value),
            Outcome::Failure(message) => {
                tracing::warn!(
                    method = %method,
                    channel = %self.channel_name,
                    "Handler returned an error: {}",
                    message
                );
                self.codec
                    .encode_error_envelope(GENERIC_ERROR_CODE, &message, &Value::Null)
            }
            Outcome::Crashed { message, backtrace } => {
                match backtrace {
                    Some(backtrace) => tracing::error!(
                        method = %method,
                        channel = %self.channel_name,
                        "Recovered from panic while handling method call: {}\n{}",
                        message,
                        backtrace
                    ),
                    None => tracing::error!(
                        method = %method,
                        channel = %self.channel_name,
                        "Recovered from panic while handling method call: {} (no backtrace, panic hook not installed)",
                        message
                    ),
                }
                return;
            }
        };

        match encoded {
            Ok(envelope) => reply.send(envelope),
            Err(e) => {
                tracing::error!(
                    method = %method,
                    channel = %self.channel_name,
                    "Failed to encode reply envelope: {}",
                    e
                );
            }
        }
    }
}

/// A named channel for method calls over a [`BinaryMessenger`].
///
/// Cloning is cheap; clones share the registry and the messenger binding.
#[derive(Clone)]
pub struct MethodChannel {
    messenger: Arc<dyn BinaryMessenger>,
    dispatcher: Arc<Dispatcher>,
}

impl MethodChannel {
    /// Create a channel and register it as the messenger's handler for
    /// `channel_name`.
    pub fn new(
        messenger: Arc<dyn BinaryMessenger>,
        channel_name: impl Into<String>,
        codec: Arc<dyn MethodCodec>,
    ) -> Self {
        Self::bind(messenger, channel_name.into(), codec, HandlerRegistry::new())
    }

    /// Create a builder for a channel.
    pub fn builder(
        messenger: Arc<dyn BinaryMessenger>,
        channel_name: impl Into<String>,
    ) -> MethodChannelBuilder {
        MethodChannelBuilder::new(messenger, channel_name)
    }

    fn bind(
        messenger: Arc<dyn BinaryMessenger>,
        channel_name: String,
        codec: Arc<dyn MethodCodec>,
        registry: HandlerRegistry,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher {
            channel_name,
            codec,
            registry,
        });

        let inbound = dispatcher.clone();
        let handler: ChannelHandler = Arc::new(
            move |message: Bytes, reply: ResponseSender| -> BoxFuture<'static, Result<()>> {
                Box::pin(inbound.clone().dispatch(message, reply))
            },
        );
        messenger.set_channel_handler(&dispatcher.channel_name, Some(handler));

        Self {
            messenger,
            dispatcher,
        }
    }

    /// Channel name.
    pub fn name(&self) -> &str {
        &self.dispatcher.channel_name
    }

    /// Invoke a method on the other side.
    ///
    /// The reply is decoded, but the other side of this protocol does not
    /// answer calls made from here: expect `Value::Null` rather than the
    /// remote handler's result.
    pub async fn invoke_method<A: Serialize>(&self, method: &str, arguments: A) -> Result<Value> {
        let call = MethodCall::new(method, serde_json::to_value(arguments)?);
        let encoded = self.dispatcher.codec.encode_method_call(&call)?;

        tracing::debug!(method = %method, channel = %self.name(), "Invoking method");
        let reply = self.messenger.send(self.name(), encoded).await?;

        self.dispatcher.codec.decode_envelope(&reply)
    }

    /// Handle one raw inbound message, answering through `reply`.
    ///
    /// This is what the messenger calls for the bound channel. An `Err` means
    /// the message could not be decoded; no reply is sent in that case.
    pub async fn handle_message(&self, message: Bytes, reply: ResponseSender) -> Result<()> {
        self.dispatcher.clone().dispatch(message, reply).await
    }

    /// Register or (with `None`) unregister the handler for `method`.
    ///
    /// Consecutive calls replace the previous registration. Calls already in
    /// flight keep running with the handler they started with.
    pub fn register(
        &self,
        method: &str,
        handler: Option<Arc<dyn MethodHandler>>,
        mode: ExecutionMode,
    ) {
        self.dispatcher.registry.register(method, handler, mode);
    }

    /// Register a concurrent method handler.
    pub fn handle<H: MethodHandler>(&self, method: &str, handler: H) {
        self.register(method, Some(Arc::new(handler)), ExecutionMode::Concurrent);
    }

    /// Register a synchronous method handler.
    ///
    /// Calls run inline, one at a time: the channel accepts no further
    /// messages until the handler returns.
    pub fn handle_sync<H: MethodHandler>(&self, method: &str, handler: H) {
        self.register(method, Some(Arc::new(handler)), ExecutionMode::Synchronous);
    }

    /// Shorthand for `handle(method, f)` with a closure.
    pub fn handle_fn<F, Fut>(&self, method: &str, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle(method, f);
    }

    /// Shorthand for `handle_sync(method, f)` with a closure.
    pub fn handle_fn_sync<F, Fut>(&self, method: &str, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.handle_sync(method, f);
    }

    /// Register a concurrent handler over typed arguments and reply.
    pub fn handle_typed<F, T, R, Fut>(&self, method: &str, f: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.handle(method, TypedHandler::new(f));
    }

    /// Register a synchronous handler over typed arguments and reply.
    pub fn handle_typed_sync<F, T, R, Fut>(&self, method: &str, f: F)
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.handle_sync(method, TypedHandler::new(f));
    }

    /// Remove the registration for `method`.
    pub fn unhandle(&self, method: &str) {
        self.register(method, None, ExecutionMode::default());
    }

    /// Replace or (with `None`) clear the fallback handler.
    pub fn register_fallback(&self, handler: Option<Arc<dyn FallbackHandler>>) {
        self.dispatcher.registry.register_fallback(handler);
    }

    /// Set the fallback handler, used when no registration matches.
    ///
    /// The fallback always runs on its own task.
    pub fn catch_all<H: FallbackHandler>(&self, handler: H) {
        self.register_fallback(Some(Arc::new(handler)));
    }

    /// Shorthand for `catch_all(f)` with a closure.
    pub fn catch_all_fn<F, Fut>(&self, f: F)
    where
        F: Fn(MethodCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.catch_all(f);
    }

    /// Remove the fallback handler.
    pub fn clear_catch_all(&self) {
        self.register_fallback(None);
    }

    /// Whether `method` has a registration.
    pub fn is_registered(&self, method: &str) -> bool {
        self.dispatcher.registry.contains(method)
    }

    /// Execution mode of a registered method.
    pub fn execution_mode(&self, method: &str) -> Option<ExecutionMode> {
        self.dispatcher.registry.get_mode(method)
    }

    /// Whether a fallback handler is set.
    pub fn has_fallback(&self) -> bool {
        self.dispatcher.registry.has_fallback()
    }

    /// Number of registered methods.
    pub fn method_count(&self) -> usize {
        self.dispatcher.registry.len()
    }
}

impl std::fmt::Debug for MethodChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodChannel")
            .field("name", &self.name())
            .field("codec", &self.dispatcher.codec)
            .field("methods", &self.method_count())
            .field("fallback", &self.has_fallback())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonMethodCodec;
    use crate::messenger::LocalMessenger;
    use serde_json::json;

    fn test_channel() -> (MethodChannel, LocalMessenger) {
        let (messenger, _outbound) = LocalMessenger::new();
        let channel = MethodChannel::new(
            Arc::new(messenger.clone()),
            "test.channel",
            Arc::new(JsonMethodCodec),
        );
        (channel, messenger)
    }

    #[test]
    fn test_new_binds_to_messenger() {
        let (channel, messenger) = test_channel();
        assert_eq!(channel.name(), "test.channel");
        assert!(messenger.has_channel_handler("test.channel"));
    }

    #[test]
    fn test_registration_api() {
        let (channel, _messenger) = test_channel();

        channel.handle_fn("a", |args| async move { Ok(args) });
        channel.handle_fn_sync("b", |args| async move { Ok(args) });
        assert_eq!(channel.method_count(), 2);
        assert_eq!(channel.execution_mode("a"), Some(ExecutionMode::Concurrent));
        assert_eq!(channel.execution_mode("b"), Some(ExecutionMode::Synchronous));

        channel.unhandle("a");
        assert!(!channel.is_registered("a"));
        assert_eq!(channel.method_count(), 1);
    }

    #[test]
    fn test_catch_all_api() {
        let (channel, _messenger) = test_channel();
        assert!(!channel.has_fallback());

        channel.catch_all_fn(|call| async move { Ok(Value::String(call.method)) });
        assert!(channel.has_fallback());

        channel.clear_catch_all();
        assert!(!channel.has_fallback());
    }

    #[test]
    fn test_builder_configuration() {
        let (messenger, _outbound) = LocalMessenger::new();
        let channel = MethodChannel::builder(Arc::new(messenger.clone()), "built")
            .codec(JsonMethodCodec)
            .handle_fn("a", |args| async move { Ok(args) })
            .handle_fn_sync("b", |args| async move { Ok(args) })
            .handle_typed("c", |n: i64| async move { Ok::<_, HandlerError>(n + 1) })
            .handle_typed_sync("d", |s: String| async move { Ok::<_, HandlerError>(s.len()) })
            .catch_all_fn(|_call| async move { Ok(Value::Null) })
            .build();

        assert!(messenger.has_channel_handler("built"));
        assert_eq!(channel.method_count(), 4);
        assert_eq!(channel.execution_mode("c"), Some(ExecutionMode::Concurrent));
        assert_eq!(channel.execution_mode("d"), Some(ExecutionMode::Synchronous));
        assert!(channel.has_fallback());
        assert!(format!("{:?}", channel).contains("JsonMethodCodec"));
    }

    #[tokio::test]
    async fn test_handle_message_success() {
        let (channel, _messenger) = test_channel();
        channel.handle_fn_sync("echo", |args| async move { Ok(args) });

        let (reply, rx) = ResponseSender::oneshot();
        channel
            .handle_message(Bytes::from_static(br#"{"method":"echo","args":"hello"}"#), reply)
            .await
            .unwrap();

        assert_eq!(rx.await.unwrap().as_ref(), br#"["hello"]"#);
    }

    #[tokio::test]
    async fn test_handle_message_failure_uses_generic_code() {
        let (channel, _messenger) = test_channel();
        channel.handle_fn_sync("fail", |_args| async move {
            Err(ChannelError::Codec("bad input".to_string()).into())
        });

        let (reply, rx) = ResponseSender::oneshot();
        channel
            .handle_message(Bytes::from_static(br#"{"method":"fail","args":null}"#), reply)
            .await
            .unwrap();

        let envelope: Value = serde_json::from_slice(&rx.await.unwrap()).unwrap();
        assert_eq!(envelope, json!(["error", "Codec error: bad input", null]));
    }

    #[tokio::test]
    async fn test_handle_message_decode_error() {
        let (channel, _messenger) = test_channel();

        let (reply, rx) = ResponseSender::oneshot();
        let err = channel
            .handle_message(Bytes::from_static(b"{not json"), reply)
            .await
            .unwrap_err();

        assert!(matches!(err, ChannelError::Decode { ref channel, .. } if channel == "test.channel"));
        assert!(rx.await.is_err(), "no reply for undecodable messages");
    }

    #[tokio::test]
    async fn test_invoke_method_encodes_call() {
        let (messenger, mut outbound) = LocalMessenger::new();
        let channel = MethodChannel::new(
            Arc::new(messenger),
            "test.channel",
            Arc::new(JsonMethodCodec),
        );

        let result = channel
            .invoke_method("notify", json!({"level": 3}))
            .await
            .unwrap();
        assert_eq!(result, Value::Null);

        let sent = outbound.recv().await.unwrap();
        assert_eq!(sent.channel, "test.channel");
        assert_eq!(
            sent.message.as_ref(),
            br#"{"method":"notify","args":{"level":3}}"#
        );
    }

    #[tokio::test]
    async fn test_invoke_method_messenger_error() {
        let (messenger, outbound) = LocalMessenger::new();
        drop(outbound);
        let channel = MethodChannel::builder(Arc::new(messenger), "closed").build();

        let result = channel.invoke_method("anything", ()).await;
        assert!(matches!(result, Err(ChannelError::Messenger(_))));
    }
}
