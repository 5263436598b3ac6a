//! # method-channel
//!
//! Method-call dispatch over an abstract binary messenger.
//!
//! A [`MethodChannel`] binds a channel name to a [`BinaryMessenger`] and a
//! [`MethodCodec`]. The application registers handlers per method name; the
//! channel decodes inbound calls, runs the matching handler and sends the
//! encoded outcome back. It can also invoke methods on the other side.
//!
//! ## Dispatch policy
//!
//! - **Synchronous** handlers run inline: the channel handles nothing else
//!   until they return, so calls are processed strictly in arrival order.
//! - **Concurrent** handlers run on their own task per call.
//! - The **fallback** handler takes calls with no registration, on its own task.
//! - Calls with no registration and no fallback get an empty reply.
//! - Handler failures become error envelopes; handler panics are logged and
//!   their reply is abandoned.
//! - Call [`install_panic_backtrace_hook`] once at startup to include the
//!   panic site's backtrace in those logs.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use method_channel::{LocalMessenger, MethodChannel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (messenger, _outbound) = LocalMessenger::new();
//!     let messenger = Arc::new(messenger);
//!
//!     let channel = MethodChannel::builder(messenger.clone(), "samples/echo")
//!         .handle_fn_sync("echo", |args| async move { Ok(args) })
//!         .build();
//!
//!     channel.invoke_method("ready", ()).await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod messenger;

mod channel;

pub use channel::{MethodChannel, MethodChannelBuilder, GENERIC_ERROR_CODE};
pub use codec::{JsonMethodCodec, MethodCall, MethodCodec, MsgPackMethodCodec};
pub use error::{ChannelError, PluginError, Result};
pub use handler::{install_panic_backtrace_hook, ExecutionMode, HandlerError, HandlerResult};
pub use messenger::{BinaryMessenger, LocalMessenger, ResponseSender};
