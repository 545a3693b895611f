//! Stop requests delivered by termination signals.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::flag;
use tracing::debug;

use crate::error::ProxyError;

/// Signals that request a stop.
pub const STOP_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Source of stop requests polled once per loop iteration.
pub trait StopSignal {
    /// Returns true once the session should end.
    fn stop_requested(&self) -> bool;
}

impl StopSignal for AtomicBool {
    fn stop_requested(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl<S: StopSignal + ?Sized> StopSignal for Arc<S> {
    fn stop_requested(&self) -> bool {
        (**self).stop_requested()
    }
}

/// Stop flag raised by `SIGTERM`, `SIGINT`, `SIGQUIT` or `SIGHUP`.
///
/// Installing the flag replaces the default action of those signals, so the
/// proxy gets the chance to terminate the server before exiting.
#[derive(Debug, Clone)]
pub struct SignalStop {
    flag: Arc<AtomicBool>,
}

impl SignalStop {
    /// Registers the stop flag for every signal in [`STOP_SIGNALS`].
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::SignalInstall`] when a handler cannot be
    /// registered.
    pub fn install() -> Result<Self, ProxyError> {
        let stop = Arc::new(AtomicBool::new(false));
        for signal in STOP_SIGNALS {
            flag::register(signal, Arc::clone(&stop))
                .map_err(|source| ProxyError::SignalInstall { source })?;
        }
        debug!(
            target: crate::PROXY_TARGET,
            signals = ?STOP_SIGNALS,
            "stop signal handlers installed"
        );
        Ok(Self { flag: stop })
    }

    /// Shared flag, for callers that raise a stop themselves.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

impl StopSignal for SignalStop {
    fn stop_requested(&self) -> bool {
        self.flag.stop_requested()
    }
}
