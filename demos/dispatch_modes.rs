//! Dispatch modes - synchronous, concurrent, fallback and crash containment.
//!
//! This example demonstrates:
//! - A synchronous handler appending to a log in strict arrival order
//! - A concurrent handler whose calls overlap
//! - A fallback answering every unregistered method
//! - A panicking handler that does not take the channel down
//!
//! # Running
//!
//! ```text
//! RUST_LOG=info cargo run --example dispatch_modes
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use method_channel::{LocalMessenger, MethodCall, MethodChannel, MethodCodec, MsgPackMethodCodec};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const CHANNEL: &str = "samples/modes";

fn call(method: &str, arguments: Value) -> Result<Bytes, method_channel::ChannelError> {
    MsgPackMethodCodec.encode_method_call(&MethodCall::new(method, arguments))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    method_channel::install_panic_backtrace_hook();

    let (messenger, _outbound) = LocalMessenger::new();
    let channel = MethodChannel::new(
        Arc::new(messenger.clone()),
        CHANNEL,
        Arc::new(MsgPackMethodCodec),
    );

    // Synchronous: appends land in the order they were delivered.
    let log = Arc::new(Mutex::new(Vec::new()));
    let log_for_handler = log.clone();
    channel.handle_fn_sync("append", move |line| {
        let log = log_for_handler.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            log.lock().push(line);
            Ok(Value::Null)
        }
    });

    // Concurrent: ten 100ms calls finish in roughly 100ms total.
    channel.handle_fn("slow", |args| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(args)
    });

    channel.catch_all_fn(|call| async move {
        Ok(json!({ "unhandled": call.method }))
    });

    channel.handle_fn_sync("refuse", |_args| async move {
        Err::<Value, _>("refusing politely".into())
    });
    channel.handle_fn("panic", |args| async move {
        if args.is_null() {
            panic!("handler crashed");
        }
        Ok(args)
    });

    let appends: Vec<_> = ["first", "second", "third"]
        .iter()
        .map(|line| call("append", json!(line)).map(|msg| messenger.deliver(CHANNEL, msg)))
        .collect::<Result<_, _>>()?;
    for reply in appends {
        reply.await?;
    }
    println!("append log: {:?}", *log.lock());

    let started = Instant::now();
    let slow: Vec<_> = (0..10)
        .map(|i| call("slow", json!(i)).map(|msg| messenger.deliver(CHANNEL, msg)))
        .collect::<Result<_, _>>()?;
    for reply in slow {
        reply.await?;
    }
    println!("10 concurrent calls took {:?}", started.elapsed());

    let reply = messenger.deliver(CHANNEL, call("no.such.method", Value::Null)?).await?;
    println!("fallback: {}", MsgPackMethodCodec.decode_envelope(&reply)?);

    let reply = messenger.deliver(CHANNEL, call("refuse", Value::Null)?).await?;
    println!("failure: {:?}", MsgPackMethodCodec.decode_envelope(&reply));

    let crashed = messenger.deliver(CHANNEL, call("panic", Value::Null)?).await;
    println!("panicking handler replied: {}", crashed.is_ok());

    let reply = messenger.deliver(CHANNEL, call("slow", json!("after the crash"))?).await?;
    println!("still serving: {}", MsgPackMethodCodec.decode_envelope(&reply)?);

    Ok(())
}
