//! Linux `epoll`-based poller.
//!
//! Thin wrapper over the kernel's edge-triggered readiness primitive.
//! Descriptors are registered once, for every edge we care about
//! (read, write, error, hang-up); the token travels through the kernel
//! and comes back attached to each event.
//!
//! Because registration is edge-triggered, consumers above this layer
//! must drain a ready descriptor until `EAGAIN` before expecting
//! another notification.

use super::event::Event;

use libc::{
    epoll_create1, epoll_ctl, epoll_event, epoll_wait, EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN,
    EPOLLOUT, EPOLLPRI, EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL,
};

use std::io;
use std::os::fd::RawFd;
use std::{mem, process};

/// Largest number of events drained per poll round.
const MAX_EVENTS: usize = 1024;

/// How long one poll round may block. Short enough that a stop request
/// is observed promptly.
const POLL_TIMEOUT_MS: i32 = 100;

/// Linux `epoll` poller. See the [module docs](self).
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,
}

impl EpollPoller {
    /// Creates the epoll instance.
    ///
    /// Failure here is fatal: the reactor cannot run without its
    /// readiness primitive.
    pub(crate) fn new() -> Self {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        assert!(epoll >= 0, "epoll_create1 failed");

        Self { epoll }
    }

    /// Registers `fd` for every edge, tagged with `token`.
    ///
    /// Exits the process on failure, matching the poll-error policy: a
    /// reactor that cannot watch sockets cannot make progress.
    pub(crate) fn add(&self, fd: RawFd, token: usize) {
        let mut event = epoll_event {
            events: (EPOLLIN | EPOLLPRI | EPOLLOUT | EPOLLERR | EPOLLHUP | EPOLLET) as u32,
            u64: token as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_ADD, fd, &mut event) };
        if rc != 0 {
            tracing::error!(fd, error = %io::Error::last_os_error(), "epoll_ctl add failed");
            process::exit(1);
        }
    }

    /// Removes `fd` from the interest set. A descriptor whose fd was
    /// already closed is gone from the set anyway; errors are ignored.
    pub(crate) fn del(&self, fd: RawFd) {
        unsafe {
            epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut());
        }
    }

    /// Polls for readiness, blocking up to [`POLL_TIMEOUT_MS`].
    ///
    /// Signal interruptions are retried transparently. Any other
    /// failure exits the process.
    pub(crate) fn poll(&self, events: &mut Vec<Event>) {
        let mut raw: [epoll_event; MAX_EVENTS] = unsafe { mem::zeroed() };

        let n = loop {
            let n = unsafe {
                epoll_wait(self.epoll, raw.as_mut_ptr(), MAX_EVENTS as i32, POLL_TIMEOUT_MS)
            };

            if n >= 0 {
                break n as usize;
            }

            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }

            tracing::error!(error = %err, "epoll_wait failed");
            process::exit(1);
        };

        events.clear();
        for ev in &raw[..n] {
            events.push(Event {
                token: ev.u64 as usize,
                readable: ev.events & ((EPOLLIN | EPOLLPRI | EPOLLHUP) as u32) != 0,
                writable: ev.events & ((EPOLLOUT | EPOLLHUP) as u32) != 0,
                error: ev.events & (EPOLLERR as u32) != 0,
            });
        }
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll);
        }
    }
}
