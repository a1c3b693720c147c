//! Cooperative stop signal.
//!
//! The signal owns the only sender of a single-slot `crossbeam_channel`;
//! nothing is ever sent on it. `StopSignal::stop` drops the sender, and every
//! `StopToken` clone then observes the disconnect, whether it is polling,
//! selecting on `receiver()` or blocked in a timed wait.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};

use crate::retry::Pause;

/// Owner side of the stop signal.
#[derive(Debug)]
pub struct StopSignal {
    tx: Mutex<Option<Sender<()>>>,
    token: StopToken,
}

/// Observer side of the stop signal.
#[derive(Debug, Clone)]
pub struct StopToken {
    rx: Receiver<()>,
}

impl StopSignal {
    /// Create a signal in the running state.
    pub fn new() -> Self {
        let (tx, rx) = bounded::<()>(1);
        Self {
            tx: Mutex::new(Some(tx)),
            token: StopToken { rx },
        }
    }

    /// A token observing this signal.
    pub fn token(&self) -> StopToken {
        self.token.clone()
    }

    /// Request a stop. Calling it again is a no-op.
    pub fn stop(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// True once `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.token.is_stopped()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    /// True once the signal has been stopped.
    pub fn is_stopped(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block for up to `timeout`. Returns `true` if a stop arrived meanwhile.
    pub fn wait(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }

    /// Channel that becomes ready (disconnected) on stop, for `select!`.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

impl Pause for StopToken {
    fn pause(&self, delay: Duration) -> bool {
        !self.wait(delay)
    }
}
