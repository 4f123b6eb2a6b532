//! Handler contract and middleware composition.
//!
//! A [`Handler`] processes one [`Job`] and reports success or a
//! [`HandlerError`]. The same handler instance is invoked concurrently by
//! every worker loop of its type, so implementations must be `Send + Sync`
//! and must not rely on exclusive access to `&self`.
//!
//! # Example
//!
//! ```rust
//! use taskflow::handler::{chain, handler_fn, logging, timeout, Handler};
//! use taskflow::error::HandlerError;
//! use taskflow::cancellation::CancellationToken;
//! use taskflow::job::Job;
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let echo = handler_fn(|_ctx, job: Job| async move {
//!     tracing::info!(payload = %job.payload, "echo");
//!     Ok::<_, HandlerError>(())
//! });
//!
//! let wrapped = chain(echo, &[logging(), timeout(Duration::from_secs(30))]);
//! let job = Job::new("echo", &serde_json::json!({"hello": "world"}))?;
//! wrapped.handle(&CancellationToken::new(), &job).await?;
//! # Ok(())
//! # }
//! ```

use crate::cancellation::CancellationToken;
use crate::error::HandlerError;
use crate::job::Job;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info_span, Instrument};

/// Processes jobs of one type.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Handler: Send + Sync {
    /// Process `job`.
    ///
    /// `ctx` is cancelled when the worker pool shuts down; long-running
    /// handlers should race their I/O against
    /// [`CancellationToken::cancelled`].
    ///
    /// # Errors
    ///
    /// Any error marks the attempt as failed. The message is stored on the
    /// job record.
    async fn handle(&self, ctx: &CancellationToken, job: &Job) -> Result<(), HandlerError>;
}

/// Shared, type-erased handler as stored in the registry.
pub type BoxedHandler = Arc<dyn Handler>;

#[async_trait]
impl<H> Handler for Arc<H>
where
    H: Handler + ?Sized,
{
    async fn handle(&self, ctx: &CancellationToken, job: &Job) -> Result<(), HandlerError> {
        (**self).handle(ctx, job).await
    }
}

/// Handler backed by an async closure. Built with [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

/// Wrap an async closure as a [`Handler`].
///
/// The closure receives its own clone of the token and job so the returned
/// future can be `'static`.
pub const fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(CancellationToken, Job) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    HandlerFn { f }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(CancellationToken, Job) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, ctx: &CancellationToken, job: &Job) -> Result<(), HandlerError> {
        (self.f)(ctx.clone(), job.clone()).await
    }
}

/// Wraps a handler in another handler.
pub type Middleware = Arc<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync>;

/// Apply `middlewares` to `handler`, first middleware outermost.
///
/// `chain(h, &[a, b])` behaves as `a(b(h))`: a call enters `a`, then `b`,
/// then `h`.
pub fn chain<H>(handler: H, middlewares: &[Middleware]) -> BoxedHandler
where
    H: Handler + 'static,
{
    middlewares
        .iter()
        .rev()
        .fold(Arc::new(handler) as BoxedHandler, |inner, middleware| {
            middleware(inner)
        })
}

struct Logged {
    inner: BoxedHandler,
}

#[async_trait]
impl Handler for Logged {
    async fn handle(&self, ctx: &CancellationToken, job: &Job) -> Result<(), HandlerError> {
        let span = info_span!(
            "handler",
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts
        );
        async {
            let started = Instant::now();
            let result = self.inner.handle(ctx, job).await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            match &result {
                Ok(()) => tracing::debug!(elapsed_ms, "handler finished"),
                Err(err) => tracing::debug!(elapsed_ms, error = %err, "handler returned error"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Middleware that runs the handler inside a span and logs its duration.
#[must_use]
pub fn logging() -> Middleware {
    Arc::new(|inner| Arc::new(Logged { inner }) as BoxedHandler)
}

struct Timed {
    inner: BoxedHandler,
    limit: Duration,
}

#[async_trait]
impl Handler for Timed {
    async fn handle(&self, ctx: &CancellationToken, job: &Job) -> Result<(), HandlerError> {
        tokio::time::timeout(self.limit, self.inner.handle(ctx, job))
            .await
            .map_err(|_| HandlerError::new(format!("handler timed out after {:?}", self.limit)))?
    }
}

/// Middleware that fails the attempt if the handler runs longer than `limit`.
#[must_use]
pub fn timeout(limit: Duration) -> Middleware {
    Arc::new(move |inner| Arc::new(Timed { inner, limit }) as BoxedHandler)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn job() -> Job {
        Job::new("test", &json!({})).unwrap()
    }

    struct Tag {
        name: &'static str,
        trace: Arc<Mutex<Vec<String>>>,
        inner: BoxedHandler,
    }

    #[async_trait]
    impl Handler for Tag {
        async fn handle(&self, ctx: &CancellationToken, job: &Job) -> Result<(), HandlerError> {
            self.trace.lock().push(format!("enter {}", self.name));
            let result = self.inner.handle(ctx, job).await;
            self.trace.lock().push(format!("exit {}", self.name));
            result
        }
    }

    fn tag(name: &'static str, trace: &Arc<Mutex<Vec<String>>>) -> Middleware {
        let trace = Arc::clone(trace);
        Arc::new(move |inner| {
            Arc::new(Tag {
                name,
                trace: Arc::clone(&trace),
                inner,
            }) as BoxedHandler
        })
    }

    #[tokio::test]
    async fn test_chain_first_middleware_is_outermost() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let inner_trace = Arc::clone(&trace);
        let handler = handler_fn(move |_ctx, _job| {
            let trace = Arc::clone(&inner_trace);
            async move {
                trace.lock().push("handler".to_string());
                Ok::<_, HandlerError>(())
            }
        });

        let wrapped = chain(handler, &[tag("a", &trace), tag("b", &trace)]);
        wrapped.handle(&CancellationToken::new(), &job()).await.unwrap();

        assert_eq!(
            *trace.lock(),
            vec!["enter a", "enter b", "handler", "exit b", "exit a"]
        );
    }

    #[tokio::test]
    async fn test_chain_without_middleware_calls_handler() {
        let mut mock = MockHandler::new();
        mock.expect_handle().times(1).returning(|_, _| Ok(()));
        chain(mock, &[])
            .handle(&CancellationToken::new(), &job())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_logging_passes_error_through() {
        let mut mock = MockHandler::new();
        mock.expect_handle()
            .returning(|_, _| Err(HandlerError::from("bad gateway")));
        let err = chain(mock, &[logging()])
            .handle(&CancellationToken::new(), &job())
            .await
            .unwrap_err();
        assert_eq!(err.message(), "bad gateway");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fails_slow_handler() {
        let slow = handler_fn(|_ctx, _job| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, HandlerError>(())
        });
        let err = chain(slow, &[timeout(Duration::from_secs(1))])
            .handle(&CancellationToken::new(), &job())
            .await
            .unwrap_err();
        assert!(err.message().contains("timed out"));
    }

    #[tokio::test]
    async fn test_handler_fn_sees_cancellation() {
        let handler = handler_fn(|ctx: CancellationToken, _job| async move {
            if ctx.is_cancelled() {
                Err(HandlerError::from("cancelled"))
            } else {
                Ok::<_, HandlerError>(())
            }
        });
        let token = CancellationToken::new();
        assert!(handler.handle(&token, &job()).await.is_ok());
        token.cancel();
        assert!(handler.handle(&token, &job()).await.is_err());
    }
}
