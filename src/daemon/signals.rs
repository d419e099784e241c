//! Signal handling: SIGTERM/SIGINT request a graceful daemon shutdown.
//!
//! Uses the `signal-hook` crate for safe signal registration. The foreground
//! thread polls [`SignalHandler::should_shutdown`] and forwards the request to
//! the daemon's cancellation channel.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};

/// Shutdown flag shared between the OS signal hooks and the foreground loop.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler and register SIGTERM/SIGINT hooks.
    ///
    /// Registration is best-effort; failures are logged to stderr but not fatal.
    pub fn new() -> Self {
        let handler = Self::unregistered();
        handler.register_signals();
        handler
    }

    /// Handler with no OS hooks; only [`request_shutdown`](Self::request_shutdown) sets it.
    pub fn unregistered() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Block until shutdown is requested or `done` returns true, checking every
    /// `interval`. Returns `true` when a shutdown request ended the wait.
    pub fn wait_for_shutdown(&self, interval: Duration, mut done: impl FnMut() -> bool) -> bool {
        loop {
            if self.should_shutdown() {
                return true;
            }
            if done() {
                return false;
            }
            std::thread::sleep(interval);
        }
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[PVB-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[PVB-SIGNAL] failed to register SIGINT: {e}");
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
