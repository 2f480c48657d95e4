#![forbid(unsafe_code)]

mod error;

pub use error::*;

/// Capacidade default do canal de eventos de mutação.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;
