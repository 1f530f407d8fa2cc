//! macOS `kqueue`-based poller.
//!
//! Functionally equivalent to the Linux `epoll` backend: descriptors
//! are registered once with `EV_CLEAR` (edge-triggered) read and write
//! filters, and the token rides through the kernel in `udata`.

use super::event::Event;

use libc::{
    kevent, kqueue, timespec, EVFILT_READ, EVFILT_WRITE, EV_ADD, EV_CLEAR, EV_DELETE, EV_EOF,
    EV_ERROR,
};

use std::io;
use std::os::fd::RawFd;
use std::{mem, process, ptr};

/// Largest number of events drained per poll round.
const MAX_EVENTS: usize = 1024;

/// How long one poll round may block, in nanoseconds (100 ms).
const POLL_TIMEOUT_NS: i64 = 100_000_000;

/// macOS `kqueue` poller. See the [module docs](self).
pub(crate) struct KqueuePoller {
    /// Kqueue file descriptor.
    kq: RawFd,
}

impl KqueuePoller {
    /// Creates the kqueue instance. Fatal on failure: the reactor
    /// cannot run without its readiness primitive.
    pub(crate) fn new() -> Self {
        let kq = unsafe { kqueue() };
        assert!(kq >= 0, "kqueue failed");

        Self { kq }
    }

    /// Registers `fd` for edge-triggered read and write readiness,
    /// tagged with `token`. Exits the process on failure.
    pub(crate) fn add(&self, fd: RawFd, token: usize) {
        let changes = [
            Self::change(fd, EVFILT_READ, EV_ADD | EV_CLEAR, token),
            Self::change(fd, EVFILT_WRITE, EV_ADD | EV_CLEAR, token),
        ];

        let rc = unsafe {
            kevent(
                self.kq,
                changes.as_ptr(),
                changes.len() as i32,
                ptr::null_mut(),
                0,
                ptr::null(),
            )
        };
        if rc < 0 {
            tracing::error!(fd, error = %io::Error::last_os_error(), "kevent add failed");
            process::exit(1);
        }
    }

    /// Removes `fd` from the interest set; errors are ignored (a
    /// closed descriptor left the set on its own).
    pub(crate) fn del(&self, fd: RawFd) {
        let changes = [
            Self::change(fd, EVFILT_READ, EV_DELETE, 0),
            Self::change(fd, EVFILT_WRITE, EV_DELETE, 0),
        ];

        unsafe {
            kevent(
                self.kq,
                changes.as_ptr(),
                changes.len() as i32,
                ptr::null_mut(),
                0,
                ptr::null(),
            );
        }
    }

    /// Polls for readiness, blocking up to 100 ms. Signal
    /// interruptions are retried; any other failure exits the process.
    pub(crate) fn poll(&self, events: &mut Vec<Event>) {
        let mut raw: [libc::kevent; MAX_EVENTS] = unsafe { mem::zeroed() };
        let timeout = timespec {
            tv_sec: 0,
            tv_nsec: POLL_TIMEOUT_NS,
        };

        let n = loop {
            let n = unsafe {
                kevent(
                    self.kq,
                    ptr::null(),
                    0,
                    raw.as_mut_ptr(),
                    MAX_EVENTS as i32,
                    &timeout,
                )
            };

            if n >= 0 {
                break n as usize;
            }

            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }

            tracing::error!(error = %err, "kevent wait failed");
            process::exit(1);
        };

        events.clear();
        for ev in &raw[..n] {
            let eof = ev.flags & EV_EOF != 0;
            events.push(Event {
                token: ev.udata as usize,
                readable: ev.filter == EVFILT_READ || eof,
                writable: ev.filter == EVFILT_WRITE || eof,
                error: ev.flags & EV_ERROR != 0,
            });
        }
    }

    fn change(fd: RawFd, filter: i16, flags: u16, token: usize) -> libc::kevent {
        libc::kevent {
            ident: fd as libc::uintptr_t,
            filter,
            flags,
            fflags: 0,
            data: 0,
            udata: token as *mut libc::c_void,
        }
    }
}

impl Drop for KqueuePoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.kq);
        }
    }
}
