use std::os::fd::{AsFd, BorrowedFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::backend::PollReadiness;
use crate::error::GpioError;
use crate::gpio::SysfsPin;

/// Blocking readiness primitive over a set of value channels.
///
/// Returns the indices (into `fds`) of every descriptor with an exceptional
/// condition pending, which is how sysfs reports an edge on a GPIO value node.
pub trait ReadinessPoller {
    fn wait_exceptional(&mut self, fds: &[BorrowedFd<'_>]) -> Result<Vec<usize>, GpioError>;
}

/// Cooperative stop signal for a [`WaitLoop`].
///
/// Clones share the same flag; handlers capture one and call
/// [`ResumeHandle::resume`] to end the loop after the current batch.
#[derive(Debug, Clone)]
pub struct ResumeHandle {
    keep_waiting: Arc<AtomicBool>,
}

impl ResumeHandle {
    fn new() -> Self {
        Self {
            keep_waiting: Arc::new(AtomicBool::new(false)),
        }
    }

    fn arm(&self) {
        self.keep_waiting.store(true, Ordering::Relaxed);
    }

    /// Only observed once the poller returns, i.e. after the next edge.
    pub fn resume(&self) {
        self.keep_waiting.store(false, Ordering::Relaxed);
    }

    pub fn is_waiting(&self) -> bool {
        self.keep_waiting.load(Ordering::Relaxed)
    }
}

/// Waits for edges on a set of pins and dispatches each pin's handler.
pub struct WaitLoop<P: ReadinessPoller = PollReadiness> {
    poller: P,
    control: ResumeHandle,
}

impl WaitLoop<PollReadiness> {
    pub fn new() -> Self {
        Self::with_poller(PollReadiness)
    }
}

impl Default for WaitLoop<PollReadiness> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ReadinessPoller> WaitLoop<P> {
    pub fn with_poller(poller: P) -> Self {
        Self {
            poller,
            control: ResumeHandle::new(),
        }
    }

    pub fn resume_handle(&self) -> ResumeHandle {
        self.control.clone()
    }

    /// Blocks until a handler calls [`ResumeHandle::resume`], returning the
    /// number of edges dispatched.
    ///
    /// No debounce is applied. Poller failures are returned as is and the
    /// offending pin is not removed from the set.
    pub fn wait(&mut self, pins: &mut [SysfsPin]) -> Result<usize, GpioError> {
        if pins.is_empty() {
            return Err(GpioError::InvalidState(
                "wait requires at least one pin".into(),
            ));
        }

        // clear edges latched while the pins were being configured
        for pin in pins.iter() {
            pin.is_high()?;
        }

        self.control.arm();
        let mut dispatched = 0;

        while self.control.is_waiting() {
            let ready = {
                let fds: Vec<BorrowedFd<'_>> = pins.iter().map(|p| p.as_fd()).collect();
                self.poller.wait_exceptional(&fds)?
            };

            for idx in ready {
                let pin = pins.get_mut(idx).ok_or_else(|| {
                    GpioError::Poll(format!("readiness reported unknown index {idx}"))
                })?;
                let active = pin.is_high()?;
                debug!("edge on GPIO {}, level {}", pin.pin(), u8::from(active));
                pin.trigger(active);
                dispatched += 1;
            }
        }

        Ok(dispatched)
    }
}
