//! The `server` binary: `server <port> <num-workers>`.
//!
//! Serves files from the working directory over HTTP until a client
//! requests `/quit`. Log lines go to `log.txt` next to the served
//! files.

use statio::http::HttpService;
use statio::IoService;

use std::env;
use std::fs::OpenOptions;
use std::process;
use std::sync::Mutex;

fn bootstrap_logs() {
    let file = match OpenOptions::new().create(true).append(true).open("log.txt") {
        Ok(file) => file,
        Err(e) => {
            eprintln!("cannot open log.txt: {e}");
            process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .compact()
        .init();
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {program} <port> <num-workers>");
    process::exit(1);
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        usage(&args[0]);
    }

    let port: u16 = match args[1].parse() {
        Ok(port) => port,
        Err(_) => usage(&args[0]),
    };

    let num_workers: usize = match args[2].parse() {
        Ok(n) if n > 0 => n,
        _ => usage(&args[0]),
    };

    bootstrap_logs();

    let io_service = IoService::new(num_workers);
    let http = match HttpService::new(port, &io_service) {
        Ok(http) => http,
        Err(e) => {
            tracing::error!(port, error = %e, "cannot set up listener");
            eprintln!("cannot listen on port {port}: {e}");
            process::exit(1);
        }
    };

    tracing::info!(port = http.port(), num_workers, "serving");

    // Blocks until /quit tears the service down.
    io_service.start();
}
