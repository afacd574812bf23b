use std::collections::VecDeque;
use std::os::fd::BorrowedFd;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GpioError;
use crate::wait::ReadinessPoller;

/// Readiness poller replaying scripted batches instead of blocking.
///
/// Clones share the script, so a test can keep one clone and feed it while
/// the wait loop owns another.
#[derive(Debug, Default, Clone)]
pub struct MockReadiness {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<Vec<usize>>,
    polls: usize,
    last_watched: usize,
}

impl MockReadiness {
    /// Queues one poll result: the indices reported ready.
    pub fn push_ready(&self, indices: impl IntoIterator<Item = usize>) {
        self.state
            .lock()
            .script
            .push_back(indices.into_iter().collect());
    }

    pub fn pending(&self) -> usize {
        self.state.lock().script.len()
    }

    pub fn polls(&self) -> usize {
        self.state.lock().polls
    }

    /// Number of descriptors passed to the most recent poll.
    pub fn last_watched(&self) -> usize {
        self.state.lock().last_watched
    }
}

impl ReadinessPoller for MockReadiness {
    fn wait_exceptional(&mut self, fds: &[BorrowedFd<'_>]) -> Result<Vec<usize>, GpioError> {
        let mut state = self.state.lock();
        state.polls += 1;
        state.last_watched = fds.len();
        state
            .script
            .pop_front()
            .ok_or_else(|| GpioError::Poll("mock readiness script exhausted".into()))
    }
}
