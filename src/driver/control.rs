//! Cooperative control of a running driver.
//!
//! A sticky cancel flag plus a `watch` channel carrying the latest requested
//! signal. The driver polls the flag between comparisons and only blocks on the
//! channel while paused or waiting for a retry after a fault.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverSignal {
    Run,
    Pause,
    Cancel,
}

/// Cloneable handle shared by the session controller and the driver task.
#[derive(Debug, Clone)]
pub struct DriverControl {
    cancel_flag: Arc<AtomicBool>,
    signal: watch::Sender<DriverSignal>,
}

impl Default for DriverControl {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverControl {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(DriverSignal::Run);
        Self {
            cancel_flag: Arc::new(AtomicBool::new(false)),
            signal,
        }
    }

    /// Sticky. Takes effect at the next comparison boundary; an in-flight
    /// oracle call still completes and is recorded.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
        self.signal.send_replace(DriverSignal::Cancel);
    }

    pub fn pause(&self) {
        if !self.is_cancelled() {
            self.signal.send_replace(DriverSignal::Pause);
        }
    }

    /// Also wakes a driver that is waiting to retry after a fault.
    pub fn resume(&self) {
        if !self.is_cancelled() {
            self.signal.send_replace(DriverSignal::Run);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::SeqCst)
    }

    pub fn signal(&self) -> DriverSignal {
        *self.signal.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DriverSignal> {
        self.signal.subscribe()
    }
}

/// Block while paused. Returns false once cancelled.
pub(crate) async fn wait_until_runnable(
    signals: &mut watch::Receiver<DriverSignal>,
    control: &DriverControl,
) -> bool {
    loop {
        if control.is_cancelled() {
            return false;
        }
        let current = *signals.borrow_and_update();
        match current {
            DriverSignal::Run => return true,
            DriverSignal::Cancel => return false,
            DriverSignal::Pause => {}
        }
        if signals.changed().await.is_err() {
            return false;
        }
    }
}

/// Block until a fresh `Run` arrives after the last value the receiver saw.
/// The caller marks the current value seen before announcing the fault.
pub(crate) async fn wait_for_retry(
    signals: &mut watch::Receiver<DriverSignal>,
    control: &DriverControl,
) -> bool {
    loop {
        if control.is_cancelled() {
            return false;
        }
        if signals.changed().await.is_err() {
            return false;
        }
        let current = *signals.borrow_and_update();
        match current {
            DriverSignal::Run => return !control.is_cancelled(),
            DriverSignal::Cancel => return false,
            DriverSignal::Pause => {}
        }
    }
}
