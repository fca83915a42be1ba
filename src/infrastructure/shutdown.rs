//! Graceful Shutdown Handler
//!
//! Coordinates shutdown of the HTTP server and the calls it has in flight.
//! Every request context derives from one root context, so in-flight calls
//! that outlive the drain timeout can be cancelled together.

use crate::infrastructure::call_context::CallContext;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Shutdown coordinator for graceful termination.
#[derive(Clone)]
pub struct ShutdownController {
    /// Whether shutdown has been initiated
    shutdown_initiated: Arc<AtomicBool>,
    /// Fired once when shutdown starts
    signalled: CancellationToken,
    /// Parent of every request context
    root: CallContext,
    /// Number of calls in flight
    in_flight: Arc<AtomicUsize>,
    /// Notify when all calls are drained
    drain_complete: Arc<Notify>,
}

impl ShutdownController {
    /// Create a new shutdown controller.
    pub fn new() -> Self {
        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            signalled: CancellationToken::new(),
            root: CallContext::background(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            drain_complete: Arc::new(Notify::new()),
        }
    }

    /// Initiate graceful shutdown.
    pub fn shutdown(&self) {
        if !self.shutdown_initiated.swap(true, Ordering::SeqCst) {
            tracing::info!("initiating graceful shutdown");
            self.signalled.cancel();
        }
    }

    /// Check if shutdown has been initiated.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Completes once shutdown has been initiated.
    pub async fn wait(&self) {
        self.signalled.cancelled().await
    }

    /// Cancel every call still in flight.
    pub fn abort_in_flight(&self) {
        let pending = self.in_flight();
        if pending > 0 {
            tracing::warn!("cancelling {} in-flight calls", pending);
        }
        self.root.cancel();
    }

    /// Get the number of calls in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Start tracking a call: returns its context, bounded by `timeout`,
    /// and a guard that stops tracking on drop.
    pub fn request_context(&self, timeout: Duration) -> (CallContext, RequestGuard) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let ctx = self.root.child_with_timeout(Some(timeout));
        (
            ctx,
            RequestGuard {
                controller: self.clone(),
            },
        )
    }

    fn request_ended(&self) {
        let prev = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 && self.is_shutdown() {
            self.drain_complete.notify_waiters();
        }
    }

    /// Wait for all calls to drain (with timeout).
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = self.drain_complete.notified();
        if self.in_flight() == 0 {
            return true;
        }

        tokio::select! {
            _ = drained => true,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!("drain timeout: {} calls still in flight", self.in_flight());
                false
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for tracking an in-flight call.
pub struct RequestGuard {
    controller: ShutdownController,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.controller.request_ended();
    }
}

/// Install signal handlers for graceful shutdown.
///
/// Completes when Ctrl+C or SIGTERM is received, after initiating shutdown
/// on `controller`.
#[cfg_attr(coverage_nightly, coverage(off))]
pub async fn shutdown_signal(controller: ShutdownController) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }

    controller.shutdown();
}
