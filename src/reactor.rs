//! Single-threaded event loop with a pre-shutdown hook list.
//!
//! [`EventLoop`] owns a tokio `current_thread` runtime. [`EventLoop::react`]
//! drives a main future on it, then runs the shutdown sequence and maps the
//! outcome to a process exit code.
//!
//! ## Shutdown
//! ```text
//! trigger: main completes | LoopHandle::stop() | termination signal
//!    └─► take registered hooks (Running → Draining)
//!        └─► run all hooks concurrently, wait for every one
//!            (hooks registered meanwhile join the next round)
//!            └─► Drained: later registrations are queued; the loop drains
//!                again after its last poll of main, until nothing is left
//! ```
//!
//! Each hook runs at most once; triggering shutdown again finds nothing left
//! to run. Without a grace period a hung hook stalls shutdown indefinitely.

use crate::error::ReactorError;
use futures::future::{join_all, BoxFuture, FutureExt};
use std::future::Future;
use std::io::Write;
use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Hook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Event loop settings.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Upper bound on how long pre-shutdown hooks may take. `None` waits forever.
    pub shutdown_grace: Option<Duration>,
    /// Start shutdown on SIGINT/SIGTERM/SIGQUIT (ctrl-c elsewhere).
    pub handle_signals: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: None,
            handle_signals: true,
        }
    }
}

impl LoopConfig {
    pub fn with_shutdown_grace(mut self, grace: Option<Duration>) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_signals(mut self, handle_signals: bool) -> Self {
        self.handle_signals = handle_signals;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    Draining,
    Drained,
}

struct Hooks {
    pending: Vec<Hook>,
    phase: Phase,
}

struct Shared {
    stop: CancellationToken,
    hooks: Mutex<Hooks>,
}

/// Cloneable handle to the loop's shutdown controller.
#[derive(Clone)]
pub struct LoopHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LoopHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hooks = self.hooks();
        f.debug_struct("LoopHandle")
            .field("stopping", &self.is_stopping())
            .field("phase", &hooks.phase)
            .field("pending_hooks", &hooks.pending.len())
            .finish()
    }
}

impl Default for LoopHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                stop: CancellationToken::new(),
                hooks: Mutex::new(Hooks {
                    pending: Vec::new(),
                    phase: Phase::Running,
                }),
            }),
        }
    }

    fn hooks(&self) -> MutexGuard<'_, Hooks> {
        self.shared.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `hook` to run once before shutdown completes.
    ///
    /// Hooks added while shutdown is draining join the next round; hooks
    /// added after it has drained wait for the next [`LoopHandle::shutdown`],
    /// which the event loop runs before it exits.
    pub fn add_before_shutdown<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: Hook = Box::new(move || hook().boxed());
        let mut hooks = self.hooks();
        if hooks.phase == Phase::Drained {
            tracing::debug!("hook registered after shutdown drained; queued for another round");
        }
        hooks.pending.push(hook);
    }

    /// Number of hooks waiting for shutdown.
    pub fn pending_hooks(&self) -> usize {
        self.hooks().pending.len()
    }

    /// Request shutdown. Idempotent.
    pub fn stop(&self) {
        if !self.shared.stop.is_cancelled() {
            tracing::debug!("shutdown requested");
        }
        self.shared.stop.cancel();
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.stop.is_cancelled()
    }

    /// Completes once shutdown has been requested.
    pub async fn stopped(&self) {
        self.shared.stop.cancelled().await
    }

    /// Run every registered hook and wait for all of them.
    pub async fn shutdown(&self) {
        // Without a grace period this cannot fail.
        let _ = self.shutdown_with_grace(None).await;
    }

    /// Like [`LoopHandle::shutdown`], giving up after `grace`.
    pub async fn shutdown_with_grace(&self, grace: Option<Duration>) -> Result<(), ReactorError> {
        self.stop();
        let running = Arc::new(AtomicUsize::new(0));

        let drain = async {
            loop {
                let batch = {
                    let mut hooks = self.hooks();
                    if hooks.phase == Phase::Running {
                        hooks.phase = Phase::Draining;
                    }
                    std::mem::take(&mut hooks.pending)
                };
                if batch.is_empty() {
                    break;
                }
                tracing::debug!(hooks = batch.len(), "running pre-shutdown hooks");
                running.fetch_add(batch.len(), Ordering::SeqCst);
                join_all(batch.into_iter().map(|hook| {
                    let running = running.clone();
                    async move {
                        hook().await;
                        running.fetch_sub(1, Ordering::SeqCst);
                    }
                }))
                .await;
            }
            self.hooks().phase = Phase::Drained;
        };

        match grace {
            Some(grace) => tokio::time::timeout(grace, drain)
                .await
                .map_err(|_| ReactorError::GraceExceeded {
                    grace,
                    pending: running.load(Ordering::SeqCst),
                }),
            None => {
                drain.await;
                Ok(())
            }
        }
    }
}

/// A single-threaded event loop.
pub struct EventLoop {
    runtime: tokio::runtime::Runtime,
    handle: LoopHandle,
    config: LoopConfig,
}

impl EventLoop {
    pub fn new(config: LoopConfig) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self {
            runtime,
            handle: LoopHandle::new(),
            config,
        })
    }

    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Drive `main` to completion, run the shutdown sequence, and return the
    /// exit code: 0 on success, 1 when `main` or shutdown failed. Failures are
    /// logged and written to `stderr` as `ERROR: ...`.
    pub fn react<F, Fut>(self, stderr: &mut dyn Write, main: F) -> i32
    where
        F: FnOnce(LoopHandle) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        match self.run_until_complete(main) {
            Ok(()) => 0,
            Err(e) => {
                tracing::error!("main function encountered error: {e:#}");
                let _ = writeln!(stderr, "ERROR: {e:#}");
                let _ = stderr.flush();
                1
            }
        }
    }

    /// Drive `main` and the shutdown sequence, returning the first failure.
    ///
    /// If shutdown is triggered externally and `main` is still pending once
    /// every hook has finished, `main` is abandoned and the run counts as a
    /// success.
    pub fn run_until_complete<F, Fut>(self, main: F) -> anyhow::Result<()>
    where
        F: FnOnce(LoopHandle) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let EventLoop {
            runtime,
            handle,
            config,
        } = self;
        let main = main(handle.clone());

        runtime.block_on(async move {
            let mut main = pin!(main);
            let signals = async {
                if config.handle_signals {
                    if let Err(e) = crate::signals::wait_for_termination().await {
                        tracing::warn!(error = %e, "failed to install signal handlers");
                        futures::future::pending::<()>().await;
                    }
                } else {
                    futures::future::pending::<()>().await;
                }
            };

            let early = tokio::select! {
                r = &mut main => Some(r),
                _ = handle.stopped() => None,
                _ = signals => None,
            };

            let mut hooks = pin!(handle.shutdown_with_grace(config.shutdown_grace));
            match early {
                Some(result) => combine(result, hooks.await),
                None => {
                    tokio::select! {
                        biased;
                        result = &mut main => combine(result, hooks.await),
                        drained = &mut hooks => {
                            let mut drained = drained;
                            loop {
                                if let Some(result) = main.as_mut().now_or_never() {
                                    break combine(result, drained);
                                }
                                if handle.pending_hooks() == 0 {
                                    tracing::debug!("main still pending after shutdown; abandoning it");
                                    break drained.map_err(Into::into);
                                }
                                // main registered hooks on its last poll (e.g. a late bind).
                                drained = drained
                                    .and(handle.shutdown_with_grace(config.shutdown_grace).await);
                            }
                        }
                    }
                }
            }
        })
    }
}

/// A failing `main` takes precedence over a shutdown failure, which is still logged.
fn combine(main: anyhow::Result<()>, shutdown: Result<(), ReactorError>) -> anyhow::Result<()> {
    match (main, shutdown) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(shutdown)) => {
            tracing::warn!(error = %shutdown, "shutdown also failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    async fn boom() -> anyhow::Result<()> {
        anyhow::bail!("boom")
    }

    fn quiet_loop() -> EventLoop {
        EventLoop::new(LoopConfig::default().with_signals(false)).unwrap()
    }

    #[test]
    fn successful_main_exits_zero() {
        let mut stderr = Vec::new();
        let code = quiet_loop().react(&mut stderr, |_| async { anyhow::Ok(()) });
        assert_eq!(code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn failing_main_exits_one_and_reports() {
        let mut stderr = Vec::new();
        let code = quiet_loop().react(&mut stderr, |_| boom());
        assert_eq!(code, 1);
        assert_eq!(String::from_utf8(stderr).unwrap(), "ERROR: boom\n");
    }

    #[test]
    fn hooks_run_after_main_completes() {
        let ran = Arc::new(AtomicUsize::new(0));
        let seen = ran.clone();
        let result = quiet_loop().run_until_complete(move |handle| async move {
            let counter = seen.clone();
            handle.add_before_shutdown(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            assert_eq!(seen.load(Ordering::SeqCst), 0);
            anyhow::Ok(())
        });
        assert!(result.is_ok());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stop_abandons_pending_main_after_hooks() {
        let ran = Arc::new(AtomicBool::new(false));
        let seen = ran.clone();
        let result = quiet_loop().run_until_complete(move |handle| async move {
            handle.add_before_shutdown(move || async move {
                seen.store(true, Ordering::SeqCst);
            });
            handle.stop();
            futures::future::pending::<()>().await;
            anyhow::Ok(())
        });
        assert!(result.is_ok());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn grace_period_bounds_hung_hooks() {
        let config = LoopConfig::default()
            .with_signals(false)
            .with_shutdown_grace(Some(Duration::from_millis(20)));
        let mut stderr = Vec::new();
        let code = EventLoop::new(config).unwrap().react(&mut stderr, |handle| async move {
            handle.add_before_shutdown(futures::future::pending::<()>);
            anyhow::Ok(())
        });
        assert_eq!(code, 1);
        let stderr = String::from_utf8(stderr).unwrap();
        assert!(stderr.contains("grace period"), "stderr: {stderr}");
    }

    #[tokio::test]
    async fn shutdown_runs_each_hook_once() {
        let handle = LoopHandle::new();
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let ran = ran.clone();
            handle.add_before_shutdown(move || async move {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(handle.pending_hooks(), 3);

        handle.shutdown().await;
        handle.shutdown().await;

        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert!(handle.is_stopping());
        assert_eq!(handle.pending_hooks(), 0);
    }

    #[tokio::test]
    async fn hooks_registered_during_drain_still_run() {
        let handle = LoopHandle::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let (inner_handle, inner_ran) = (handle.clone(), ran.clone());
        handle.add_before_shutdown(move || async move {
            inner_handle.add_before_shutdown(move || async move {
                inner_ran.fetch_add(1, Ordering::SeqCst);
            });
        });

        handle.shutdown().await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hooks_registered_after_drain_wait_for_next_round() {
        let handle = LoopHandle::new();
        handle.shutdown().await;

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        handle.add_before_shutdown(move || async move {
            let _ = tx.send(());
        });
        assert_eq!(handle.pending_hooks(), 1);
        assert!(rx.try_recv().is_err());

        handle.shutdown().await;
        assert!(rx.await.is_ok());
    }
}
