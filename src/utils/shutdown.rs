// src/utils/shutdown.rs
//! Closed-once cancellation signal
//!
//! The trigger side owns the only sender of a zero-capacity channel.
//! Dropping it disconnects the channel, which every receiver clone observes,
//! either by polling or inside a `crossbeam_channel::select!`.

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::Mutex;

/// Owner of the cancellation signal
pub struct Shutdown {
    trigger: Mutex<Option<Sender<()>>>,
    signal: ShutdownSignal,
}

/// Observer side of [`Shutdown`], cheap to clone into every worker
#[derive(Clone, Debug)]
pub struct ShutdownSignal {
    receiver: Receiver<()>,
}

impl Shutdown {
    /// Creates an untriggered signal
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Shutdown {
            trigger: Mutex::new(Some(tx)),
            signal: ShutdownSignal { receiver: rx },
        }
    }

    /// Returns a new observer
    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Fires the signal; later calls are no-ops
    pub fn trigger(&self) {
        let mut guard = match self.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.take().is_some() {
            log::info!("Shutdown requested");
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Non-blocking check
    pub fn is_triggered(&self) -> bool {
        matches!(self.receiver.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Receiver that becomes ready (disconnected) once triggered
    pub fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }

    /// Blocks until triggered or `timeout` elapses; returns true if triggered
    pub fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        matches!(
            self.receiver.recv_timeout(timeout),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        )
    }
}
