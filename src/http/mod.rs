//! Minimal HTTP/1.1 layer on top of the connection machinery.
//!
//! Enough of the protocol to serve static files and the built-in
//! control endpoints, and to issue requests as a client: request-line
//! plus headers in, fixed-header responses out, serial pipelining on
//! one socket. No chunked transfer, no TLS.

mod connection;
mod parser;
mod request;
mod response;
mod service;

pub use connection::{ConnectCallback, HttpClient, HttpServer, ResponseCallback};
pub use parser::{parse_request, parse_response, Parse};
pub use request::Request;
pub use response::Response;
pub use service::HttpService;
