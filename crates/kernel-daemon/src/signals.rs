//! Signal handling for graceful daemon shutdown.
//!
//! SIGINT and SIGTERM set the kernel's stop flag, so the loop finishes its
//! current cycle and the daemon still prints its final report.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(unix)]
use signal_hook::consts::{SIGINT, SIGTERM};
#[cfg(unix)]
use std::thread;

/// Shutdown signal bridge between the OS and the kernel loop.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    stop: Arc<AtomicBool>,
    signal_count: Arc<AtomicU32>,
}

impl SignalHandler {
    /// Create a handler that sets `stop` when shutdown is requested.
    pub fn new(stop: Arc<AtomicBool>) -> Self {
        Self {
            stop,
            signal_count: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Register SIGINT and SIGTERM and watch for them on a helper thread.
    ///
    /// On non-Unix platforms only [`SignalHandler::request_shutdown`] stops
    /// the kernel.
    pub fn install(&self) -> io::Result<()> {
        #[cfg(unix)]
        {
            let mut signals = signal_hook::iterator::Signals::new([SIGINT, SIGTERM])?;
            let handler = self.clone();
            thread::Builder::new()
                .name("kernel-signals".into())
                .spawn(move || {
                    if let Some(sig) = signals.forever().next() {
                        let name = if sig == SIGINT { "SIGINT" } else { "SIGTERM" };
                        info!(signal = name, "Shutdown signal received");
                        handler.signal_count.fetch_add(1, Ordering::Relaxed);
                        handler.request_shutdown();
                    }
                })?;
            debug!("Unix signal handlers registered");
        }
        Ok(())
    }

    /// Ask the kernel to stop after the current cycle.
    pub fn request_shutdown(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Whether shutdown has been requested.
    pub fn shutdown_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Number of shutdown signals received.
    pub fn signal_count(&self) -> u32 {
        self.signal_count.load(Ordering::Relaxed)
    }
}
