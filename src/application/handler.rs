//! Shared handler plumbing for commands, event listeners and store subscriptions

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::application::errors::BotError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result every handler resolves to
pub type HandlerResult = Result<(), BotError>;

/// Async callback taking an event of type `E`
pub type Listener<E> = Arc<dyn Fn(E) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wrap an async closure into a [`Listener`]
pub fn listener<E, F, Fut>(f: F) -> Listener<E>
where
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Handle returned by an emitter for a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(uuid::Uuid);

impl ListenerId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a handler future to completion on its own task so a panic inside it
/// surfaces as a `HandlerFailure` instead of unwinding through the caller.
pub async fn run_isolated(label: &str, fut: BoxFuture<'static, HandlerResult>) -> HandlerResult {
    match tokio::spawn(fut).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(BotError::HandlerFailure(format!("{} panicked", label))),
        Err(err) => Err(BotError::HandlerFailure(format!("{} was cancelled: {}", label, err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_isolated_catches_panics() {
        async fn explode() -> HandlerResult {
            panic!("boom")
        }
        let fut: BoxFuture<'static, HandlerResult> = Box::pin(explode());
        let result = run_isolated("command ping", fut).await;
        assert!(matches!(result, Err(BotError::HandlerFailure(msg)) if msg.contains("panicked")));
    }

    #[tokio::test]
    async fn test_run_isolated_passes_errors_through() {
        let fut: BoxFuture<'static, HandlerResult> =
            Box::pin(async { Err(BotError::Internal("nope".to_string())) });
        assert!(matches!(run_isolated("x", fut).await, Err(BotError::Internal(_))));
    }
}
