use crate::reactor::descriptor::{Callback, Descriptor};
use crate::reactor::poller::unix::{
    sys_accept, sys_bind_any, sys_close, sys_listen, sys_set_reuseaddr, sys_socket,
    sys_sockname_port,
};
use crate::reactor::Reactor;

use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Upcall invoked with each accepted socket.
///
/// A negative descriptor reports an accept failure; everything the
/// callback does runs on a pool worker.
pub type AcceptCallback = Arc<dyn Fn(RawFd) + Send + Sync + 'static>;

/// A listening socket wired into the reactor.
///
/// The acceptor's read upcall loops `accept` until the listener would
/// block, handing each new socket to the user callback, then re-arms.
/// `EINTR` and `ECONNABORTED` are retried transparently; any other
/// error surfaces as `fd = -1` through the callback.
pub struct Acceptor {
    reactor: Arc<Reactor>,
    listen_fd: RawFd,
    port: u16,
    accept_cb: AcceptCallback,
    descriptor: Mutex<Option<Arc<Descriptor>>>,
    closed: AtomicBool,
}

impl Acceptor {
    /// Binds `port` (0 picks an ephemeral port) and registers the
    /// listener with the reactor. Accepting starts only with
    /// [`start_accept`](Self::start_accept).
    pub fn new(
        reactor: &Arc<Reactor>,
        port: u16,
        accept_cb: AcceptCallback,
    ) -> io::Result<Arc<Acceptor>> {
        let listen_fd = sys_socket()?;

        let setup = (|| {
            sys_set_reuseaddr(listen_fd)?;
            sys_bind_any(listen_fd, port)?;
            sys_listen(listen_fd)?;
            sys_sockname_port(listen_fd)
        })();

        let bound_port = match setup {
            Ok(p) => p,
            Err(e) => {
                sys_close(listen_fd);
                return Err(e);
            }
        };

        let acceptor = Arc::new(Acceptor {
            reactor: reactor.clone(),
            listen_fd,
            port: bound_port,
            accept_cb,
            descriptor: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&acceptor);
        let read_cb: Callback = Arc::new(move || {
            if let Some(acceptor) = Weak::upgrade(&weak) {
                Self::do_accept(&acceptor);
            }
        });

        let descriptor = reactor.new_descriptor(listen_fd, Some(read_cb), None);
        *acceptor.descriptor.lock().unwrap() = Some(descriptor);

        Ok(acceptor)
    }

    /// The port the listener is actually bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Arms the accept loop.
    pub fn start_accept(acceptor: &Arc<Self>) {
        if let Some(descriptor) = acceptor.descriptor.lock().unwrap().as_ref() {
            descriptor.read_when_ready(Box::new(acceptor.clone()));
        }
    }

    /// Stops accepting. The listening socket closes now; the
    /// descriptor is retired through the reactor's GC, so a callback
    /// already in flight stays safe.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        sys_close(self.listen_fd);
        if let Some(descriptor) = self.descriptor.lock().unwrap().take() {
            self.reactor.del_descriptor(&descriptor);
        }
    }

    fn do_accept(acceptor: &Arc<Self>) {
        loop {
            match sys_accept(acceptor.listen_fd) {
                Ok(fd) => (acceptor.accept_cb)(fd),

                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if let Some(descriptor) = acceptor.descriptor.lock().unwrap().as_ref() {
                        descriptor.read_when_ready(Box::new(acceptor.clone()));
                    }
                    break;
                }

                Err(e) => {
                    if !acceptor.closed.load(Ordering::Acquire) {
                        tracing::warn!(error = %e, "accept failed");
                        (acceptor.accept_cb)(-1);
                    }
                    break;
                }
            }
        }
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::Acquire) {
            sys_close(self.listen_fd);
        }
    }
}
