//! Handler module - method handlers, registration and crash containment.
//!
//! Provides:
//! - [`MethodHandler`] - handles calls for one method name
//! - [`FallbackHandler`] - handles calls no registration matched
//! - [`TypedHandler`] - adapts a closure over concrete serde types
//! - [`HandlerRegistry`] - maps method names to handlers and execution modes
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use method_channel::handler::{ExecutionMode, HandlerRegistry, MethodHandler};
//!
//! let registry = HandlerRegistry::new();
//!
//! // Concurrent: every call runs on its own task
//! let echo: Arc<dyn MethodHandler> = Arc::new(|args: Value| async move { Ok(args) });
//! registry.register("echo", Some(echo), ExecutionMode::Concurrent);
//!
//! // Synchronous: calls run one at a time, in arrival order
//! registry.register("append", Some(append_handler), ExecutionMode::Synchronous);
//!
//! // Unregister
//! registry.register("echo", None, ExecutionMode::Concurrent);
//! ```

mod outcome;
mod registry;

pub use outcome::install_panic_backtrace_hook;
pub(crate) use outcome::{run_contained, Outcome};
pub use registry::{HandlerRegistry, Registration, Route};

use std::future::Future;
use std::marker::PhantomData;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::codec::MethodCall;

/// Failure reported by a handler. Any error type converts into it with `?`.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<Value, HandlerError>;

/// How calls for a registered method are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Run inline on the channel's dispatch path. Later messages on the
    /// channel wait until the handler returns.
    Synchronous,
    /// Run on a detached task per call.
    #[default]
    Concurrent,
}

/// Handler for calls to a single method.
pub trait MethodHandler: Send + Sync + 'static {
    /// Handle a call with the decoded arguments.
    fn handle(&self, arguments: Value) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> MethodHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, arguments: Value) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self)(arguments))
    }
}

/// Handler for calls that matched no registration.
///
/// Receives the whole call, since one fallback serves many method names.
pub trait FallbackHandler: Send + Sync + 'static {
    fn handle(&self, call: MethodCall) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> FallbackHandler for F
where
    F: Fn(MethodCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn handle(&self, call: MethodCall) -> BoxFuture<'static, HandlerResult> {
        Box::pin((self)(call))
    }
}

/// Wrapper that deserializes arguments before calling the handler and
/// serializes its reply afterwards.
///
/// Arguments that do not fit `T` are reported as a handler failure.
pub struct TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> (R, Fut)>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> MethodHandler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    fn handle(&self, arguments: Value) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match serde_json::from_value(arguments) {
            Ok(v) => v,
            Err(e) => {
                let err: HandlerError = format!("invalid arguments: {}", e).into();
                return Box::pin(async move { HandlerResult::Err(err) });
            }
        };

        let fut = (self.handler)(parsed);
        Box::pin(async move {
            let reply = fut.await?;
            let value = serde_json::to_value(reply)?;
            HandlerResult::Ok(value)
        })
    }
}
