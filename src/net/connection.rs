use crate::buffer::Buffer;
use crate::reactor::descriptor::{Callback, Descriptor};
use crate::reactor::poller::unix::{
    sys_close, sys_connect, sys_read, sys_so_error, sys_socket, sys_write,
};
use crate::service::IoService;

use std::io;
use std::net::Ipv4Addr;
use std::ops::{Deref, DerefMut};
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Protocol hooks a [`Connection`] drives.
///
/// A protocol is the per-connection state machine: it gets called on a
/// pool worker after every successful socket read and, for client
/// connections, when the connect attempt resolves.
pub trait Protocol: Send + Sync + Sized + 'static {
    /// Called after new bytes landed in the input buffer. Return
    /// `false` to stop reading and let the connection wind down.
    ///
    /// At most one `read_done` runs at a time for a given connection.
    fn read_done(conn: &Arc<Connection<Self>>) -> bool;

    /// Called once the connect attempt started by
    /// [`Connection::start_connect`] resolves, successfully or not.
    fn conn_done(_conn: &Arc<Connection<Self>>) {}
}

struct WriteState {
    out: Buffer,

    /// Is a write loop pending or running?
    writing: bool,
}

/// A session around one non-blocking socket.
///
/// The connection keeps reading the socket for as long as reads don't
/// block, pushing data into the input buffer and invoking the
/// protocol's `read_done`. The write side flushes whatever sits in the
/// output buffer whenever [`Connection::start_write`] is issued.
///
/// # Ownership
///
/// Connections are shared through `Arc`; the operations that arm a
/// continuation are associated functions over that `Arc`. Every armed
/// continuation (a pending read, write, or connect) carries its own
/// clone as the descriptor keepalive, so a connection lives exactly as
/// long as someone still reads, writes, or references it — and is torn
/// down, closing the socket and retiring the descriptor, when the last
/// clone drops.
///
/// # Thread safety
///
/// The read and write halves may run concurrently on different
/// workers. The input buffer is only ever touched by the single
/// in-flight read path; the output buffer and the `writing` flag are
/// guarded by the write lock, which is safe to hold across socket
/// calls because they never block.
pub struct Connection<P: Protocol> {
    proto: P,
    service: Arc<IoService>,

    fd: AtomicI32,
    closed: AtomicBool,
    in_error: AtomicBool,
    error: Mutex<String>,

    descriptor: Mutex<Option<Arc<Descriptor>>>,
    input: Mutex<Buffer>,
    write: Mutex<WriteState>,
}

impl<P: Protocol> Connection<P> {
    /// Wraps an accepted socket (server side). The caller usually
    /// issues [`Connection::start_read`] right away.
    pub fn accepted(service: &Arc<IoService>, fd: RawFd, proto: P) -> Arc<Self> {
        let conn = Arc::new(Self::bare(service, proto, fd, false));

        let descriptor = service.reactor().new_descriptor(
            fd,
            Some(Self::read_upcall(&conn)),
            Some(Self::write_upcall(&conn)),
        );
        *conn.descriptor.lock().unwrap() = Some(descriptor);

        conn
    }

    /// Builds an unconnected client-side connection; follow with
    /// [`Connection::start_connect`].
    pub fn client(service: &Arc<IoService>, proto: P) -> Arc<Self> {
        Arc::new(Self::bare(service, proto, -1, true))
    }

    fn bare(service: &Arc<IoService>, proto: P, fd: RawFd, closed: bool) -> Self {
        Self {
            proto,
            service: service.clone(),
            fd: AtomicI32::new(fd),
            closed: AtomicBool::new(closed),
            in_error: AtomicBool::new(false),
            error: Mutex::new(String::new()),
            descriptor: Mutex::new(None),
            input: Mutex::new(Buffer::new()),
            write: Mutex::new(WriteState {
                out: Buffer::new(),
                writing: false,
            }),
        }
    }

    fn read_upcall(conn: &Arc<Self>) -> Callback {
        let weak = Arc::downgrade(conn);
        Arc::new(move || {
            if let Some(conn) = Weak::upgrade(&weak) {
                Self::do_read(&conn);
            }
        })
    }

    fn write_upcall(conn: &Arc<Self>) -> Callback {
        let weak = Arc::downgrade(conn);
        Arc::new(move || {
            if let Some(conn) = Weak::upgrade(&weak) {
                Self::do_write(&conn);
            }
        })
    }

    //
    // Status
    //

    /// False once any socket or connect error was recorded.
    pub fn ok(&self) -> bool {
        !self.in_error.load(Ordering::Acquire)
    }

    /// Is the underlying socket closed (or not yet connected)?
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Description of the last error, empty when none occurred.
    pub fn error_string(&self) -> String {
        self.error.lock().unwrap().clone()
    }

    /// The service this connection belongs to.
    pub fn io_service(&self) -> &Arc<IoService> {
        &self.service
    }

    /// The protocol state driving this connection.
    pub fn proto(&self) -> &P {
        &self.proto
    }

    /// Locks and returns the input stream. Meant for `read_done`
    /// implementations; the read path is single-flight, so the lock is
    /// uncontended there.
    pub fn input(&self) -> impl DerefMut<Target = Buffer> + '_ {
        self.input.lock().unwrap()
    }

    /// Locks and returns the output stream. Fill it, drop the guard,
    /// then issue [`Connection::start_write`].
    pub fn output(&self) -> OutputGuard<'_> {
        OutputGuard {
            guard: self.write.lock().unwrap(),
        }
    }

    fn fd(&self) -> RawFd {
        self.fd.load(Ordering::Acquire)
    }

    fn fail(&self, message: String) {
        let mut error = self.error.lock().unwrap();
        if !error.is_empty() {
            error.push_str("; ");
        }
        error.push_str(&message);
        drop(error);
        self.in_error.store(true, Ordering::Release);
    }

    fn descriptor(&self) -> Option<Arc<Descriptor>> {
        self.descriptor.lock().unwrap().clone()
    }

    //
    // Connect path (client side)
    //

    /// Starts connecting to `host:port`. The protocol's `conn_done`
    /// runs when the attempt resolves — inline when the outcome is
    /// known immediately, from a worker otherwise.
    ///
    /// May only be issued once per connection; to retry, build a new
    /// instance.
    pub fn start_connect(conn: &Arc<Self>, host: &str, port: u16) {
        let ip: Ipv4Addr = match host.parse() {
            Ok(ip) => ip,
            Err(_) => {
                conn.fail(format!("bad address: {host}"));
                Self::do_connect(conn);
                return;
            }
        };

        let fd = match sys_socket() {
            Ok(fd) => fd,
            Err(e) => {
                conn.fail(format!("socket failed: {e}"));
                Self::do_connect(conn);
                return;
            }
        };
        conn.fd.store(fd, Ordering::Release);

        // One descriptor per connection lifetime. It starts in connect
        // mode — only a write upcall, which fires when the socket
        // settles — and is switched to the live read/write pair by
        // do_connect.
        let weak = Arc::downgrade(conn);
        let connect_cb: Callback = Arc::new(move || {
            if let Some(conn) = Weak::upgrade(&weak) {
                Self::do_connect(&conn);
            }
        });
        let descriptor = conn
            .service
            .reactor()
            .new_descriptor(fd, None, Some(connect_cb));
        *conn.descriptor.lock().unwrap() = Some(descriptor.clone());

        match sys_connect(fd, ip, port) {
            Ok(()) => Self::do_connect(conn),

            Err(e)
                if e.raw_os_error() == Some(libc::EINPROGRESS)
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                descriptor.write_when_ready(Box::new(conn.clone()));
            }

            Err(e) => {
                sys_close(fd);
                conn.fd.store(-1, Ordering::Release);
                conn.fail(format!("connect failed: {e}"));
                Self::do_connect(conn);
            }
        }
    }

    fn do_connect(conn: &Arc<Self>) {
        // Check for errors in the connect process, unless one was
        // already detected synchronously.
        if conn.ok() {
            let error = sys_so_error(conn.fd());
            if error != 0 {
                conn.fail(format!(
                    "connect failed: {}",
                    io::Error::from_raw_os_error(error)
                ));
            } else {
                conn.closed.store(false, Ordering::Release);
                if let Some(descriptor) = conn.descriptor() {
                    descriptor.set_up_calls(
                        Some(Self::read_upcall(conn)),
                        Some(Self::write_upcall(conn)),
                    );
                }
            }
        }

        P::conn_done(conn);
    }

    //
    // Read path
    //

    /// Starts reading continuously. Whether reading continues after
    /// each delivery is up to `read_done`; issue this only once.
    pub fn start_read(conn: &Arc<Self>) {
        let Some(descriptor) = conn.descriptor() else {
            tracing::error!("start_read on a connection without a descriptor");
            return;
        };
        descriptor.read_when_ready(Box::new(conn.clone()));
    }

    fn do_read(conn: &Arc<Self>) {
        loop {
            let fd = conn.fd();

            let outcome = {
                let mut input = conn.input.lock().unwrap();
                input.reserve(1024);
                match read_retry(fd, input.write_slice()) {
                    Ok(n) => {
                        if n > 0 {
                            input.advance(n);
                        }
                        Ok(n)
                    }
                    Err(e) => Err(e),
                }
            };

            match outcome {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if let Some(descriptor) = conn.descriptor() {
                        descriptor.read_when_ready(Box::new(conn.clone()));
                    }
                    break;
                }

                Err(e) => {
                    tracing::warn!(fd, error = %e, "error on read");
                    break;
                }

                // The peer closed the socket.
                Ok(0) => break,

                Ok(_) => {
                    if !P::read_done(conn) {
                        break;
                    }
                }
            }
        }

        // The keepalive that scheduled us drops when this frame
        // returns; if nothing re-armed, that may be the last reference.
    }

    //
    // Write path
    //

    /// Flushes the output buffer to the socket. A no-op when a write
    /// loop is already pending; issue it after every batch of output.
    pub fn start_write(conn: &Arc<Self>) {
        {
            let mut write = conn.write.lock().unwrap();
            if write.writing {
                return;
            }
            write.writing = true;
        }

        Self::do_write(conn);
    }

    fn do_write(conn: &Arc<Self>) {
        loop {
            let mut write = conn.write.lock().unwrap();

            // Only the contiguous head of the stream; there may be
            // more behind it in later chunks.
            let size = write.out.read_size();
            if size == 0 {
                write.writing = false;
                break;
            }

            match write_retry(conn.fd(), write.out.read_slice()) {
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if let Some(descriptor) = conn.descriptor() {
                        descriptor.write_when_ready(Box::new(conn.clone()));
                    }
                    break;
                }

                Err(e) => {
                    tracing::warn!(fd = conn.fd(), error = %e, "error on write");
                    break;
                }

                Ok(0) => {
                    tracing::debug!(fd = conn.fd(), "write made no progress, closing");
                    break;
                }

                Ok(n) => {
                    write.out.consume(n);
                    if n == size && write.out.read_size() == 0 {
                        write.writing = false;
                        break;
                    }
                }
            }
        }
    }

    /// Closes the underlying socket.
    pub fn close(&self) {
        let fd = self.fd.swap(-1, Ordering::AcqRel);
        if fd >= 0 {
            sys_close(fd);
        }
        self.closed.store(true, Ordering::Release);
    }
}

impl<P: Protocol> Drop for Connection<P> {
    fn drop(&mut self) {
        let fd = *self.fd.get_mut();
        if fd >= 0 {
            sys_close(fd);
        }

        if let Some(descriptor) = self.descriptor.get_mut().unwrap().take() {
            self.service.reactor().del_descriptor(&descriptor);
        }
    }
}

/// Write-locked view of a connection's output stream.
pub struct OutputGuard<'a> {
    guard: MutexGuard<'a, WriteState>,
}

impl Deref for OutputGuard<'_> {
    type Target = Buffer;

    fn deref(&self) -> &Buffer {
        &self.guard.out
    }
}

impl DerefMut for OutputGuard<'_> {
    fn deref_mut(&mut self) -> &mut Buffer {
        &mut self.guard.out
    }
}

/// `read(2)`, retrying on signal interruption.
fn read_retry(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    loop {
        let n = sys_read(fd, buffer);
        if n >= 0 {
            return Ok(n as usize);
        }

        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// `write(2)`, retrying on signal interruption.
fn write_retry(fd: RawFd, buffer: &[u8]) -> io::Result<usize> {
    loop {
        let n = sys_write(fd, buffer);
        if n >= 0 {
            return Ok(n as usize);
        }

        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
