//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (raw socket setup, SO_REUSEADDR/SO_REUSEPORT, backlog)
//!     → reactor.rs (readiness loop: accept, read, write, completions)
//!     → conn.rs (line framing in, write queue out)
//!     → Request lines hand off to the worker dispatcher
//! ```

pub mod conn;
pub mod listener;
pub mod reactor;

pub use conn::{ConnId, Connection};
pub use listener::{bind_listener, ListenerError};
pub use reactor::{Reactor, ReactorHandle};
