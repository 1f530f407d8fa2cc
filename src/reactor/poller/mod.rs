//! OS readiness primitive and syscall plumbing.
//!
//! The poller is used exclusively by the reactor's polling thread; the
//! `sys_*` wrappers in [`unix`] are shared by every layer that touches
//! raw descriptors. The concrete backend is selected at compile time:
//! `epoll` on Linux, `kqueue` on macOS.

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "macos")]
mod kqueue;

pub(crate) mod event;
pub(crate) mod unix;

#[cfg(target_os = "linux")]
pub(crate) use epoll::EpollPoller as Poller;

#[cfg(target_os = "macos")]
pub(crate) use kqueue::KqueuePoller as Poller;
