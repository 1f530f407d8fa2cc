//! Non-blocking TCP plumbing: the listening side and the per-socket
//! session.

mod acceptor;
mod connection;

pub use acceptor::{AcceptCallback, Acceptor};
pub use connection::{Connection, OutputGuard, Protocol};
