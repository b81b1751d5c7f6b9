//! A concurrent HTTP/1.1 file server built from three cooperating
//! pieces: a readiness [`multiplexer`], a [`worker`] pool with one
//! mailbox per thread, and a zero-copy [`request`] parser. The
//! [`server`] module wires them into an acceptor loop; [`handlers`]
//! ships the reference leaf handlers (directory listing, static file).

pub mod collections;
pub mod config;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod mime;
pub mod multiplexer;
pub mod request;
pub mod server;
pub mod worker;

pub use config::{Args, ServerConfig};
pub use handler::{Handler, HandlerRegistry};
pub use server::Server;
