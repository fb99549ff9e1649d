//! Tie a long-running service's lifetime to the event loop.
//!
//! [`bind`] starts the service immediately and registers a pre-shutdown hook
//! that stops it. The returned [`ShutdownFuture`] resolves with the outcome of
//! `stop`, so a script whose `main` awaits it runs until the loop shuts down:
//!
//! ```no_run
//! # use flocker_script::{bind, LoopHandle, Service};
//! # use std::sync::Arc;
//! # async fn main_for_service<S: Service>(handle: LoopHandle, svc: Arc<S>) -> anyhow::Result<()> {
//! bind(&handle, svc)?.await
//! # }
//! ```

use crate::reactor::LoopHandle;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// A startable, stoppable unit of work.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Begin running. Called exactly once by [`bind`].
    fn start(&self) -> anyhow::Result<()>;

    /// Release resources; awaited during loop shutdown.
    async fn stop(&self) -> anyhow::Result<()>;
}

/// Resolves once the bound service has finished stopping, with `stop`'s outcome.
#[derive(Debug)]
#[must_use = "the service keeps running until the loop shuts down; await this to wait for it"]
pub struct ShutdownFuture {
    rx: oneshot::Receiver<anyhow::Result<()>>,
}

impl Future for ShutdownFuture {
    type Output = anyhow::Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(anyhow::anyhow!(
                "event loop dropped the shutdown hook before stopping the service"
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Start `service` now and stop it when the loop shuts down.
///
/// A failing `start` is returned as-is and nothing is registered.
pub fn bind<S: Service>(handle: &LoopHandle, service: Arc<S>) -> anyhow::Result<ShutdownFuture> {
    service.start()?;
    tracing::info!(service = service.name(), "service started");

    let (tx, rx) = oneshot::channel();
    handle.add_before_shutdown(move || async move {
        tracing::debug!(service = service.name(), "stopping service");
        let outcome = service.stop().await;
        match &outcome {
            Ok(()) => tracing::info!(service = service.name(), "service stopped"),
            Err(e) => tracing::warn!(service = service.name(), error = %e, "service failed to stop"),
        }
        // The caller may have dropped the future; the service is stopped either way.
        let _ = tx.send(outcome);
    });

    Ok(ShutdownFuture { rx })
}
