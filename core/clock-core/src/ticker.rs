//! Repeating callback on a background thread.
//!
//! The ticker stops when it is cancelled or dropped: dropping the cancel
//! sender disconnects the channel the worker is waiting on, so the worker
//! exits without waiting out the current interval.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct Ticker {
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Calls `tick` every `interval` until cancelled. The first call happens
    /// one interval after spawning.
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (cancel, cancelled) = mpsc::channel::<()>();
        let spawned = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || loop {
                match cancelled.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => tick(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        match spawned {
            Ok(handle) => Self {
                cancel: Some(cancel),
                handle: Some(handle),
            },
            Err(err) => {
                tracing::warn!(error = %err, ticker = name, "Failed to spawn ticker thread");
                Self {
                    cancel: None,
                    handle: None,
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Stops the worker and waits for it to exit. Must not be called from
    /// inside the tick callback.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Ticker thread panicked");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}
