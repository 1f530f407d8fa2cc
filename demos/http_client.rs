//! Fetch a document from a local server:
//!
//! ```sh
//! cargo run --example http_client -- 8080 index.html
//! ```

use statio::http::{HttpService, Request};
use statio::net::Connection;
use statio::IoService;

use std::env;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <port> <address>", args[0]);
        process::exit(1);
    }
    let port: u16 = args[1].parse().expect("port must be a number");
    let address = &args[2];

    let io_service = IoService::new(2);
    // Client-only service: no acceptor of our own, port 0.
    let http = HttpService::new(0, &io_service).expect("cannot set up client service");

    let runner = {
        let io_service = io_service.clone();
        std::thread::spawn(move || io_service.start())
    };

    let conn = http
        .connect("127.0.0.1", port)
        .expect("service already stopped");
    if !conn.ok() {
        eprintln!("connect failed: {}", conn.error_string());
        process::exit(1);
    }

    let response = Connection::send(&conn, &Request::get(address));
    println!("{}", response.status_line);
    println!("{}", String::from_utf8_lossy(&response.body));

    io_service.stop();
    runner.join().unwrap();
}
