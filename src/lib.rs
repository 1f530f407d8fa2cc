//! # Statio
//!
//! **Statio** is a small-footprint HTTP serving runtime, built as the
//! request-serving layer of the **Nebula** ecosystem.
//!
//! Instead of pulling in a general-purpose server stack, Statio keeps
//! only the machinery a static-content endpoint needs: a single
//! polling thread multiplexing non-blocking sockets over edge-triggered
//! `epoll`, a worker pool with a free-worker fast path running every
//! upcall, and an in-memory pinned file cache in front of the disk.
//! The same machinery doubles as a client (connect, send, await the
//! response).
//!
//! ## Architecture
//!
//! - [`reactor`] — the polling loop, per-socket descriptors, timers
//! - [`pool`] — worker threads executing the upcalls
//! - [`buffer`] — the chunked byte stream connecting producers and
//!   consumers
//! - [`net`] — acceptors and reference-counted connections
//! - [`service`] — the facade tying a reactor, acceptors and stats
//!   together
//! - [`cache`] — pin/unpin file cache with FIFO eviction
//! - [`stats`] — per-worker rolling request counters
//! - [`http`] — the HTTP/1.1 adapter over all of the above
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use statio::http::HttpService;
//! use statio::IoService;
//!
//! let io_service = IoService::new(4);
//! let http = HttpService::new(8080, &io_service)?;
//!
//! // Blocks until a client requests /quit.
//! io_service.start();
//! ```

pub mod buffer;
pub mod cache;
pub mod http;
pub mod net;
pub mod pool;
pub mod reactor;
pub mod service;
pub mod stats;
pub mod sync;
pub mod task;

mod utils;

pub use buffer::Buffer;
pub use cache::{FileCache, PinError, Pinned};
pub use net::{Acceptor, Connection, Protocol};
pub use reactor::Reactor;
pub use service::IoService;
pub use stats::RequestStats;
pub use task::Task;
