use std::os::fd::BorrowedFd;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};

use crate::error::GpioError;
use crate::wait::ReadinessPoller;

/// `poll(2)` on `POLLPRI`, the kernel's edge notification for sysfs value nodes.
#[derive(Debug, Default, Clone, Copy)]
pub struct PollReadiness;

impl ReadinessPoller for PollReadiness {
    fn wait_exceptional(&mut self, fds: &[BorrowedFd<'_>]) -> Result<Vec<usize>, GpioError> {
        let interest = PollFlags::POLLPRI | PollFlags::POLLERR;
        let mut poll_fds: Vec<PollFd<'_>> =
            fds.iter().map(|fd| PollFd::new(*fd, interest)).collect();

        loop {
            match poll(&mut poll_fds, PollTimeout::NONE) {
                Ok(_) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(GpioError::Poll(format!("poll: {e}"))),
            }
        }

        let mut ready = Vec::new();
        for (idx, poll_fd) in poll_fds.iter().enumerate() {
            let Some(revents) = poll_fd.revents() else {
                continue;
            };
            if revents.contains(PollFlags::POLLNVAL) {
                return Err(GpioError::Poll(format!(
                    "watched descriptor {idx} is not open"
                )));
            }
            if revents.intersects(interest) {
                ready.push(idx);
            }
        }
        Ok(ready)
    }
}
