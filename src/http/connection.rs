use super::parser::{self, Parse};
use super::request::Request;
use super::response::Response;
use crate::cache::{FileCache, PinError};
use crate::net::{Connection, Protocol};
use crate::pool;
use crate::stats::ticks;
use crate::sync::Notification;

use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};

/// Fixed response headers. The date is deliberately static: the
/// responses carry a minimal, constant header set.
const DATE_HEADER: &[u8] = b"Date: Thu, 01 Jan 2026 00:00:00 GMT\r\n";
const SERVER_HEADER: &[u8] = b"Server: statio\r\n";

/// Server-side HTTP protocol.
///
/// Parses pipelined requests off the input stream one at a time and
/// answers each:
///
/// - `/quit` logs and stops the whole service (no response promised);
/// - `/stats` answers with the current requests-per-second figure;
/// - anything else names a file under the working directory (the empty
///   address means `index.html`), served through the file cache with
///   a direct disk read as the out-of-space fallback, or a 503 when
///   the file cannot be opened.
pub struct HttpServer {
    cache: Arc<FileCache>,
}

impl HttpServer {
    pub fn new(cache: Arc<FileCache>) -> Self {
        Self { cache }
    }

    fn handle_request(conn: &Arc<Connection<Self>>, request: &Request) -> bool {
        // Remote shutdown of the server this connection belongs to.
        if request.address == "quit" {
            tracing::info!("server stop requested");
            conn.io_service().stop();
            return false;
        }

        if request.address == "stats" {
            let reqs = conn.io_service().stats().reqs_last_sec(ticks::now());
            let body = reqs.to_string();

            {
                let mut out = conn.output();
                out.write(b"HTTP/1.1 200 OK\r\n");
                out.write(DATE_HEADER);
                out.write(SERVER_HEADER);
                out.write(b"Accept-Ranges: bytes\r\n");
                out.write(format!("Content-Length: {}\r\n", body.len()).as_bytes());
                out.write(b"Content-Type: text/html\r\n");
                out.write(b"\r\n");
                out.write(body.as_bytes());
            }

            Connection::start_write(conn);
            return true;
        }

        // The root document expands to index.html.
        let path = if request.address.is_empty() {
            "index.html"
        } else {
            request.address.as_str()
        };

        Self::serve_file(conn, path);

        conn.io_service()
            .stats()
            .finished_request(pool::me(), ticks::now());

        Connection::start_write(conn);
        true
    }

    fn serve_file(conn: &Arc<Connection<Self>>, path: &str) {
        match conn.proto().cache.pin(path) {
            Ok(pinned) => {
                let mut out = conn.output();
                Self::write_file_header(&mut out, pinned.size());
                out.copy_from(pinned.buffer());
            }

            // The cache has no room for this file; serve it straight
            // from disk.
            Err(PinError::NoSpace) | Err(PinError::LostRace) => match fs::read(path) {
                Ok(contents) => {
                    let mut out = conn.output();
                    Self::write_file_header(&mut out, contents.len());
                    out.write(&contents);
                }
                Err(_) => Self::write_unavailable(conn),
            },

            Err(PinError::Io(_)) => Self::write_unavailable(conn),
        }
    }

    fn write_file_header(out: &mut crate::net::OutputGuard<'_>, content_length: usize) {
        out.write(b"HTTP/1.1 200 OK\r\n");
        out.write(DATE_HEADER);
        out.write(SERVER_HEADER);
        out.write(b"Accept-Ranges: bytes\r\n");
        out.write(format!("Content-Length: {content_length}\r\n").as_bytes());
        out.write(b"Content-Type: text/html\r\n");
        out.write(b"\r\n");
    }

    fn write_unavailable(conn: &Arc<Connection<Self>>) {
        let body = "<HTML>\r\n\
                    <HEAD><TITLE>503 Service Unavailable</TITLE></HEAD>\r\n\
                    <BODY>Service Unavailable</BODY>\r\n\
                    </HTML>\r\n";

        let mut out = conn.output();
        out.write(b"HTTP/1.1 503 Service Unavailable\r\n");
        out.write(DATE_HEADER);
        out.write(SERVER_HEADER);
        out.write(b"Connection: close\r\n");
        out.write(format!("Content-Length: {}\r\n", body.len()).as_bytes());
        out.write(b"Content-Type: text/html\r\n");
        out.write(b"\r\n");
        out.write(body.as_bytes());
    }
}

impl Protocol for HttpServer {
    fn read_done(conn: &Arc<Connection<Self>>) -> bool {
        let mut request = Request::default();

        loop {
            let outcome = {
                let mut input = conn.input();
                let (outcome, read) = {
                    let mut it = input.iter();
                    let outcome = parser::parse_request(&mut it, &mut request);
                    (outcome, it.bytes_read())
                };
                if outcome == Parse::Complete {
                    input.consume(read);
                }
                outcome
            };

            match outcome {
                Parse::Malformed => {
                    tracing::warn!("error parsing request");
                    return false;
                }
                Parse::Incomplete => return true,
                Parse::Complete => {
                    if !Self::handle_request(conn, &request) {
                        return false;
                    }
                }
            }
        }
    }
}

/// Callback invoked when a client connect attempt resolves. Check
/// `ok()` on the connection to learn the outcome.
pub type ConnectCallback = Box<dyn FnOnce(&Arc<Connection<HttpClient>>) + Send + 'static>;

/// Callback invoked with a parsed response.
pub type ResponseCallback = Box<dyn FnOnce(Response) + Send + 'static>;

/// Client-side HTTP protocol.
///
/// Responses come back in request order, so the pending response
/// callbacks form a simple FIFO.
pub struct HttpClient {
    connect_cb: Mutex<Option<ConnectCallback>>,
    response_cbs: Mutex<VecDeque<ResponseCallback>>,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            connect_cb: Mutex::new(None),
            response_cbs: Mutex::new(VecDeque::new()),
        }
    }

    fn handle_response(conn: &Arc<Connection<Self>>, response: Response) -> bool {
        let cb = conn.proto().response_cbs.lock().unwrap().pop_front();
        if let Some(cb) = cb {
            cb(response);
        }
        true
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Protocol for HttpClient {
    fn conn_done(conn: &Arc<Connection<Self>>) {
        // On success, start pulling the response stream before the
        // user learns they may send.
        if conn.ok() {
            Connection::start_read(conn);
        }

        let cb = conn.proto().connect_cb.lock().unwrap().take();
        if let Some(cb) = cb {
            cb(conn);
        }
    }

    fn read_done(conn: &Arc<Connection<Self>>) -> bool {
        let mut response = Response::default();

        loop {
            let (outcome, drained) = {
                let mut input = conn.input();
                let (outcome, read) = {
                    let mut it = input.iter();
                    let outcome = parser::parse_response(&mut it, &mut response);
                    (outcome, it.bytes_read())
                };
                if outcome == Parse::Complete {
                    input.consume(read);
                }
                (outcome, input.byte_count() == 0)
            };

            match outcome {
                Parse::Malformed => {
                    tracing::warn!("error parsing response");
                    return false;
                }
                Parse::Incomplete => return true,
                Parse::Complete => {
                    if !Self::handle_response(conn, std::mem::take(&mut response)) {
                        return false;
                    }
                    if drained {
                        return true;
                    }
                }
            }
        }
    }
}

impl Connection<HttpClient> {
    /// Starts connecting and registers `cb` for the outcome.
    pub fn connect_to(conn: &Arc<Self>, host: &str, port: u16, cb: ConnectCallback) {
        *conn.proto().connect_cb.lock().unwrap() = Some(cb);
        Connection::start_connect(conn, host, port);
    }

    /// Sends `request` and hands the matching response to `cb`.
    pub fn async_send(conn: &Arc<Self>, request: &Request, cb: ResponseCallback) {
        // The callback must be queued before the request bytes can hit
        // the wire, or a fast response could find the queue empty.
        let mut pending = conn.proto().response_cbs.lock().unwrap();
        pending.push_back(cb);

        {
            let mut out = conn.output();
            request.to_buffer(&mut out);
        }
        drop(pending);

        Connection::start_write(conn);
    }

    /// Sends `request` and blocks for the response.
    pub fn send(conn: &Arc<Self>, request: &Request) -> Response {
        let done = Arc::new(Notification::new());
        let slot = Arc::new(Mutex::new(None));

        let done2 = done.clone();
        let slot2 = slot.clone();
        Self::async_send(
            conn,
            request,
            Box::new(move |response| {
                *slot2.lock().unwrap() = Some(response);
                done2.notify();
            }),
        );

        done.wait();
        let response = slot.lock().unwrap().take();
        response.expect("response delivered with notification")
    }
}
