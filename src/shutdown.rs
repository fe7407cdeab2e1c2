/*
 * This file is part of Thermoreg.
 *
 * Copyright (C) 2025 Thermoreg contributors
 *
 * Thermoreg is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Thermoreg is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Thermoreg. If not, see <https://www.gnu.org/licenses/>.
 */

//! Cooperative termination.
//!
//! [`ShutdownHandle`] is cloned into whatever requests termination (the
//! SIGINT/SIGTERM handler, tests). The control loop holds the
//! [`ShutdownSignal`] and checks it at every suspension point.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

/// Requests termination. Cheap to clone, usable from any thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Observed by the control loop
#[derive(Debug)]
pub struct ShutdownSignal {
    // Keeps the channel open for as long as the loop listens
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle { tx: self.tx.clone() }
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once termination has been requested
    pub async fn requested(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Unreachable while `tx` is held, but never spin
                std::future::pending::<()>().await;
            }
        }
    }

    /// Sleep for `duration` unless termination arrives first.
    /// Returns `true` if termination was requested.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.requested() => true,
        };
        interrupted || self.is_requested()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Route SIGINT/SIGTERM to `handle`
pub fn install_signal_handler(handle: ShutdownHandle) {
    if let Err(e) = ctrlc::set_handler(move || {
        info!("SIGNAL: Received SIGINT/SIGTERM - initiating shutdown");
        handle.request();
    }) {
        warn!("Failed to set signal handler: {}. Heater may not be switched off on termination.", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_runs_full_duration_without_request() {
        let mut signal = ShutdownSignal::new();
        let start = tokio::time::Instant::now();
        assert!(!signal.sleep(Duration::from_secs(2)).await);
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_returns_immediately_when_already_requested() {
        let mut signal = ShutdownSignal::new();
        signal.handle().request();
        let start = tokio::time::Instant::now();
        assert!(signal.sleep(Duration::from_secs(60)).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_interrupts_sleep() {
        let mut signal = ShutdownSignal::new();
        let handle = signal.handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            handle.request();
        });
        let start = tokio::time::Instant::now();
        assert!(signal.sleep(Duration::from_secs(60)).await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_secs(60));
    }

    #[test]
    fn test_handle_reports_request() {
        let signal = ShutdownSignal::new();
        let handle = signal.handle();
        assert!(!handle.is_requested());
        handle.clone().request();
        assert!(handle.is_requested());
        assert!(signal.is_requested());
    }
}
