//! Echo channel - simple request/response example.
//!
//! This example demonstrates:
//! - Creating a method channel with the builder pattern
//! - Registering a typed, synchronous method handler
//! - Delivering a call the way a host transport would and decoding the reply
//! - Invoking a method on the other side
//!
//! # Running
//!
//! ```text
//! RUST_LOG=method_channel=debug cargo run --example echo
//! ```

use std::sync::Arc;

use method_channel::{
    JsonMethodCodec, LocalMessenger, MethodCall, MethodChannel, MethodCodec,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Input structure for the echo method.
#[derive(Deserialize, Debug)]
struct EchoInput {
    message: String,
}

/// Output structure for the echo method.
#[derive(Serialize, Debug)]
struct EchoOutput {
    echo: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (messenger, mut outbound) = LocalMessenger::new();

    let channel = MethodChannel::builder(Arc::new(messenger.clone()), "samples/echo")
        .codec(JsonMethodCodec)
        .handle_typed_sync("echo", |input: EchoInput| async move {
            Ok::<_, method_channel::HandlerError>(EchoOutput {
                echo: input.message,
            })
        })
        .build();

    // Inbound: what the host transport would hand to the channel.
    let call = MethodCall::new("echo", serde_json::json!({ "message": "hello" }));
    let request = JsonMethodCodec.encode_method_call(&call)?;
    let reply = messenger.deliver(channel.name(), request).await?;
    println!("reply envelope: {}", String::from_utf8_lossy(&reply));
    println!("decoded: {}", JsonMethodCodec.decode_envelope(&reply)?);

    // Outbound: the call is posted, the reply carries no value.
    let result = channel.invoke_method("ready", true).await?;
    println!("invoke_method returned: {}", result);
    if let Some(sent) = outbound.recv().await {
        println!(
            "posted on '{}': {}",
            sent.channel,
            String::from_utf8_lossy(&sent.message)
        );
    }

    Ok(())
}
