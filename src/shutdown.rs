//! Cooperative shutdown flag.
//!
//! Termination signals only raise the flag. Schedulers observe it between
//! steps and pacing sleeps wake early when it is raised; in-flight fetches
//! and renders are never interrupted.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    in_flight: Arc<Mutex<Option<String>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is raised.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|raised| *raised).await;
    }

    /// Pacing sleep that wakes early on shutdown.
    ///
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_triggered() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.wait() => false,
        }
    }

    /// Mark `name` as the operation currently in progress until the guard drops.
    pub fn begin(&self, name: &str) -> InFlight<'_> {
        if let Ok(mut slot) = self.in_flight.lock() {
            *slot = Some(name.to_string());
        }
        InFlight { shutdown: self }
    }

    pub fn in_flight(&self) -> Option<String> {
        self.in_flight.lock().ok().and_then(|slot| slot.clone())
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the in-flight marker on drop.
pub struct InFlight<'a> {
    shutdown: &'a Shutdown,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.shutdown.in_flight.lock() {
            *slot = None;
        }
    }
}

/// Raise `shutdown` on SIGINT or SIGTERM.
pub fn listen_for_signals(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let signal = wait_for_signal().await;
        info!(signal, "Received termination signal, shutting down gracefully");
        match shutdown.in_flight() {
            Some(current) => info!(%current, "Waiting for in-progress operation to complete"),
            None => info!("No operation in progress"),
        }
        shutdown.trigger();
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            _ = tokio::signal::ctrl_c() => "SIGINT",
            _ = term.recv() => "SIGTERM",
        },
        Err(e) => {
            warn!(error = %e, "Could not install SIGTERM handler; listening for SIGINT only");
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "SIGINT"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_completes_without_trigger() {
        let shutdown = Shutdown::new();
        assert!(shutdown.sleep(Duration::from_secs(120)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_wakes_on_trigger() {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.trigger();
        });
        let started = tokio::time::Instant::now();
        assert!(!shutdown.sleep(Duration::from_secs(600)).await);
        assert!(started.elapsed() < Duration::from_secs(600));
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn test_sleep_after_trigger_returns_immediately() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        assert!(!shutdown.sleep(Duration::from_secs(3600)).await);
    }

    #[test]
    fn test_in_flight_guard_clears() {
        let shutdown = Shutdown::new();
        {
            let _guard = shutdown.begin("Hacker News");
            assert_eq!(shutdown.in_flight().as_deref(), Some("Hacker News"));
        }
        assert_eq!(shutdown.in_flight(), None);
    }
}
