//! Serve the working directory over HTTP on port 8080.
//!
//! ```sh
//! cargo run --example http_server
//! curl http://127.0.0.1:8080/index.html
//! curl http://127.0.0.1:8080/stats
//! curl http://127.0.0.1:8080/quit
//! ```

use statio::http::HttpService;
use statio::IoService;

fn main() {
    tracing_subscriber::fmt().compact().init();

    let io_service = IoService::new(4);
    let http = HttpService::new(8080, &io_service).expect("cannot bind port 8080");

    tracing::info!(port = http.port(), "serving the working directory");
    io_service.start();
}
