//! Callback-driven TCP echo server.
//!
//! ```sh
//! cargo run --example echo_server
//! ncat 127.0.0.1 7777
//! ```

use statio::net::{Connection, Protocol};
use statio::service::IoService;

use std::sync::{Arc, Weak};

struct Echo;

impl Protocol for Echo {
    fn read_done(conn: &Arc<Connection<Self>>) -> bool {
        let bytes = {
            let mut input = conn.input();
            let mut it = input.iter();
            let mut bytes = Vec::new();
            while !it.eob() {
                bytes.push(it.peek());
                it.next();
            }
            let n = bytes.len();
            input.consume(n);
            bytes
        };

        {
            let mut out = conn.output();
            out.write(&bytes);
        }
        Connection::start_write(conn);
        true
    }
}

fn main() {
    tracing_subscriber::fmt().compact().init();

    let service = IoService::new(4);

    let weak: Weak<IoService> = Arc::downgrade(&service);
    let port = service
        .register_acceptor(
            7777,
            Arc::new(move |fd| {
                let Some(service) = weak.upgrade() else {
                    return;
                };
                if fd < 0 || service.stopped() {
                    return;
                }
                let conn = Connection::accepted(&service, fd, Echo);
                Connection::start_read(&conn);
            }),
        )
        .expect("cannot bind port 7777");

    tracing::info!(port, "echoing");
    service.start();
}
