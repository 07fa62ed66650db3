//! FLX routing engine: the peer process behind the request queue.

pub mod alr;
pub mod service;

pub use alr::{route_policy, AlrRecord, AlrStore};
pub use service::Engine;
