//! Crash containment for handler invocations.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use futures::FutureExt;
use serde_json::Value;

use super::HandlerResult;

/// How a single handler invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outcome {
    /// The handler returned a value.
    Success(Value),
    /// The handler reported a failure; only its message is kept.
    Failure(String),
    /// The handler panicked.
    Crashed {
        message: String,
        /// Stack at the panic site, when the hook is installed.
        backtrace: Option<String>,
    },
}

// Filled by the panic hook on the panicking thread, drained by the
// `catch_unwind` site, which runs on that same thread.
thread_local! {
    static PANIC_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Install a process-wide panic hook that records the backtrace at the panic
/// site, so crash logs show the handler's own frames.
///
/// Without it, crashes are still contained and logged, but without a stack.
/// The previously installed hook keeps running after the capture. Calling
/// this more than once has no further effect.
pub fn install_panic_backtrace_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let backtrace = Backtrace::force_capture().to_string();
            PANIC_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
            previous(info);
        }));
    });
}

fn take_panic_backtrace() -> Option<String> {
    PANIC_BACKTRACE.with(|slot| slot.borrow_mut().take())
}

/// Run a handler future, turning a panic into [`Outcome::Crashed`].
///
/// The future must do all of its work inside `poll`; wrap eager calls in an
/// `async move` block so a panic while building the future is caught too.
pub(crate) async fn run_contained<F>(fut: F) -> Outcome
where
    F: Future<Output = HandlerResult>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Outcome::Success(value),
        Ok(Err(err)) => Outcome::Failure(err.to_string()),
        Err(panic) => Outcome::Crashed {
            message: panic_message(&*panic),
            backtrace: take_panic_backtrace(),
        },
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn crash_message(outcome: Outcome) -> String {
        match outcome {
            Outcome::Crashed { message, .. } => message,
            other => panic!("expected a crash, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_success() {
        let outcome = run_contained(async { HandlerResult::Ok(json!(42)) }).await;
        assert_eq!(outcome, Outcome::Success(json!(42)));
    }

    #[tokio::test]
    async fn test_failure_keeps_message() {
        let outcome = run_contained(async { HandlerResult::Err("boom".into()) }).await;
        assert_eq!(outcome, Outcome::Failure("boom".to_string()));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let outcome = run_contained(async {
            if json!(1) == json!(1) {
                panic!("handler exploded");
            }
            HandlerResult::Ok(Value::Null)
        })
        .await;
        assert_eq!(crash_message(outcome), "handler exploded");
    }

    #[tokio::test]
    async fn test_formatted_panic_message() {
        let code = 7;
        let outcome = run_contained(async move {
            if code == 7 {
                panic!("bad code {}", code);
            }
            HandlerResult::Ok(Value::Null)
        })
        .await;
        assert_eq!(crash_message(outcome), "bad code 7");
    }

    #[inline(never)]
    fn explode_in_named_frame() -> HandlerResult {
        panic!("deep failure");
    }

    #[tokio::test]
    async fn test_hook_captures_backtrace_at_panic_site() {
        install_panic_backtrace_hook();
        let outcome = run_contained(async { explode_in_named_frame() }).await;

        match outcome {
            Outcome::Crashed { message, backtrace } => {
                assert_eq!(message, "deep failure");
                let backtrace = backtrace.expect("hook records a backtrace");
                assert!(backtrace.contains("explode_in_named_frame"));
            }
            other => panic!("expected a crash, got {:?}", other),
        }

        // The slot is drained by the catch site.
        assert!(take_panic_backtrace().is_none());
    }

    #[test]
    fn test_non_string_payload() {
        let payload: Box<dyn Any + Send> = Box::new(17u32);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }
}
