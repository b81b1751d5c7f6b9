//! The handler registry: an ordered set of `(predicate, action)` pairs
//! consulted in registration order. The first handler whose predicate
//! matches wins; if none match, the caller (the worker) renders the
//! canned 501 response itself — see [`crate::server`].
//!
//! This replaces the function-pointer-plus-opaque-context shim of the
//! program this was distilled from with a plain trait object.

use std::net::TcpStream;

use crate::collections::OrderedList;
use crate::error::HandlerError;
use crate::request::Request;

pub trait Handler: Send + Sync {
    fn matches(&self, request: &Request) -> bool;
    fn handle(&self, stream: &mut TcpStream, request: &Request) -> Result<(), HandlerError>;
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: OrderedList<Box<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self { handlers: OrderedList::new() }
    }

    pub fn push(&mut self, handler: impl Handler + 'static) {
        self.handlers.push_back(Box::new(handler));
    }

    pub fn find(&self, request: &Request) -> Option<&dyn Handler> {
        self.handlers.find_first(|h| h.matches(request)).map(|h| h.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always(bool);

    impl Handler for Always {
        fn matches(&self, _request: &Request) -> bool {
            self.0
        }

        fn handle(&self, _stream: &mut TcpStream, _request: &Request) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn first_match_wins() {
        let mut registry = HandlerRegistry::new();
        registry.push(Always(false));
        registry.push(Always(true));
        registry.push(Always(true));

        let request = Request::new();
        assert!(registry.find(&request).is_some());
    }

    #[test]
    fn no_match_returns_none() {
        let mut registry = HandlerRegistry::new();
        registry.push(Always(false));

        let request = Request::new();
        assert!(registry.find(&request).is_none());
    }
}
