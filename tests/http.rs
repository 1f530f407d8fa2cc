//! End-to-end HTTP: files, control endpoints, shutdown.
//!
//! The server resolves request paths relative to the working
//! directory, so fixtures live in a scratch directory created inside
//! it and requests address them as `<scratch>/<file>`.

use statio::http::{HttpService, Request};
use statio::net::Connection;
use statio::service::IoService;

use std::fs;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

struct Server {
    service: Arc<IoService>,
    http: HttpService,
    runner: Option<thread::JoinHandle<()>>,
}

impl Server {
    fn start() -> Server {
        let service = IoService::new(2);
        let http = HttpService::new(0, &service).expect("failed to bind http acceptor");

        let runner = {
            let service = service.clone();
            thread::spawn(move || service.start())
        };

        Server {
            service,
            http,
            runner: Some(runner),
        }
    }

    fn request(&self, address: &str) -> statio::http::Response {
        let conn = self
            .http
            .connect("127.0.0.1", self.http.port())
            .expect("service already stopped");
        assert!(conn.ok(), "connect failed: {}", conn.error_string());
        Connection::send(&conn, &Request::get(address))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.service.stop();
        if let Some(runner) = self.runner.take() {
            runner.join().unwrap();
        }
    }
}

/// A scratch directory inside the working directory, plus the request
/// address prefix that reaches it.
fn scratch() -> (TempDir, String) {
    let dir = tempfile::tempdir_in(".").expect("failed to create scratch dir");
    let name = dir
        .path()
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    (dir, name)
}

#[test]
fn serves_a_file_beyond_one_chunk() {
    let (dir, prefix) = scratch();
    fs::write(dir.path().join("a.html"), vec![b'x'; 2500]).unwrap();

    let server = Server::start();
    let response = server.request(&format!("{prefix}/a.html"));

    assert!(response.status_line.contains("200"), "{}", response.status_line);
    assert!(response
        .header_remainder
        .contains("Content-Length: 2500"));
    assert_eq!(response.body, vec![b'x'; 2500]);
}

#[test]
fn serves_a_file_larger_than_one_buffer_chunk_boundary() {
    let (dir, prefix) = scratch();
    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 89) as u8 + b'!').collect();
    fs::write(dir.path().join("big.html"), &payload).unwrap();

    let server = Server::start();
    let response = server.request(&format!("{prefix}/big.html"));

    assert!(response.status_line.contains("200"));
    assert_eq!(response.body, payload);
}

#[test]
fn missing_file_yields_503() {
    let (_dir, prefix) = scratch();

    let server = Server::start();
    let response = server.request(&format!("{prefix}/nope.html"));

    assert!(response.status_line.contains("503"), "{}", response.status_line);
    assert!(!response.body.is_empty());
}

#[test]
fn stats_reports_recent_requests() {
    let (dir, prefix) = scratch();
    fs::write(dir.path().join("a.html"), b"hi").unwrap();

    let server = Server::start();

    const N: u32 = 5;
    for _ in 0..N {
        let response = server.request(&format!("{prefix}/a.html"));
        assert!(response.status_line.contains("200"));
    }

    let response = server.request("stats");
    assert!(response.status_line.contains("200"));

    let text = String::from_utf8(response.body).expect("stats body is ascii");
    let reported: u32 = text.trim().parse().expect("stats body is a number");
    assert!(reported <= N, "reported {reported} of {N} requests");
}

#[test]
fn pipelined_requests_on_one_connection() {
    let (dir, prefix) = scratch();
    fs::write(dir.path().join("a.html"), b"aaaa").unwrap();
    fs::write(dir.path().join("b.html"), b"bb").unwrap();

    let server = Server::start();
    let conn = server
        .http
        .connect("127.0.0.1", server.http.port())
        .expect("service already stopped");
    assert!(conn.ok());

    let first = Connection::send(&conn, &Request::get(&format!("{prefix}/a.html")));
    let second = Connection::send(&conn, &Request::get(&format!("{prefix}/b.html")));

    assert_eq!(first.body, b"aaaa");
    assert_eq!(second.body, b"bb");
}

#[test]
fn quit_stops_the_service() {
    let server = Server::start();

    let conn = server
        .http
        .connect("127.0.0.1", server.http.port())
        .expect("service already stopped");
    assert!(conn.ok());

    // No response is promised for /quit; fire and forget.
    Connection::async_send(&conn, &Request::get("quit"), Box::new(|_| {}));

    // start() returns only once stop() fully drained.
    let mut server = server;
    server.runner.take().unwrap().join().unwrap();
    assert!(server.service.stopped());
}
