//! Concrete leaf handlers shipped as the reference implementation
//! behind the [`crate::handler::Handler`] contract. Neither is part of
//! the reactor/worker core; a caller of the library can register a
//! different set entirely.

pub mod file;
pub mod index;
pub mod resolve;

pub use file::FileHandler;
pub use index::IndexHandler;
