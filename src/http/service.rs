use super::connection::{ConnectCallback, HttpClient, HttpServer};
use crate::cache::FileCache;
use crate::net::{AcceptCallback, Connection};
use crate::service::IoService;
use crate::sync::Notification;

use std::io;
use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, Weak};

/// Default file-cache capacity: 50 MB.
pub const DEFAULT_CACHE_SIZE: usize = 50 << 20;

/// HTTP protocol wiring over an [`IoService`].
///
/// Registers the accept path that spawns a server connection per
/// client, owns the file cache those connections serve from, and
/// offers the client-side connect entry points.
pub struct HttpService {
    io_service: Arc<IoService>,
    cache: Arc<FileCache>,
    port: u16,
}

impl HttpService {
    /// Binds the HTTP acceptor on `port` (0 picks one) with the
    /// default cache size.
    pub fn new(port: u16, io_service: &Arc<IoService>) -> io::Result<Self> {
        Self::with_cache_size(port, io_service, DEFAULT_CACHE_SIZE)
    }

    /// Binds the HTTP acceptor with an explicit cache capacity.
    pub fn with_cache_size(
        port: u16,
        io_service: &Arc<IoService>,
        cache_size: usize,
    ) -> io::Result<Self> {
        let cache = Arc::new(FileCache::new(cache_size));

        let weak = Arc::downgrade(io_service);
        let accept_cache = cache.clone();
        let cb: AcceptCallback = Arc::new(move |fd: RawFd| {
            Self::accept_connection(&weak, &accept_cache, fd);
        });

        let port = io_service.register_acceptor(port, cb)?;

        Ok(Self {
            io_service: io_service.clone(),
            cache,
            port,
        })
    }

    fn accept_connection(service: &Weak<IoService>, cache: &Arc<FileCache>, fd: RawFd) {
        let Some(service) = service.upgrade() else {
            return;
        };
        if service.stopped() {
            return;
        }

        if fd < 0 {
            tracing::error!("error accepting connection");
            service.stop();
            return;
        }

        // The connection keeps itself alive through its armed read and
        // dies when the peer closes the socket.
        let conn = Connection::accepted(&service, fd, HttpServer::new(cache.clone()));
        Connection::start_read(&conn);
    }

    /// The port the HTTP acceptor is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The cache backing the file-serving path.
    pub fn cache(&self) -> &Arc<FileCache> {
        &self.cache
    }

    /// Starts a client connection to `host:port`; `cb` runs when the
    /// connect resolves.
    pub fn async_connect(&self, host: &str, port: u16, cb: ConnectCallback) {
        if self.io_service.stopped() {
            return;
        }

        let conn = Connection::client(&self.io_service, HttpClient::new());
        Connection::connect_to(&conn, host, port, cb);
    }

    /// Connects synchronously. The returned connection may have
    /// `ok() == false` when the connect failed; `None` means the
    /// service was already stopped.
    pub fn connect(&self, host: &str, port: u16) -> Option<Arc<Connection<HttpClient>>> {
        if self.io_service.stopped() {
            return None;
        }

        let done = Arc::new(Notification::new());
        let slot: Arc<Mutex<Option<Arc<Connection<HttpClient>>>>> = Arc::new(Mutex::new(None));

        let done2 = done.clone();
        let slot2 = slot.clone();
        self.async_connect(
            host,
            port,
            Box::new(move |conn| {
                *slot2.lock().unwrap() = Some(conn.clone());
                done2.notify();
            }),
        );

        done.wait();
        let conn = slot.lock().unwrap().take();
        conn
    }
}
