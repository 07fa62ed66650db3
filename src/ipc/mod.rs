//! Inter-process channel between the router and the FLX engine.

pub mod queue;

pub use queue::{IpcError, MessageQueue, QueueConfig, SendOutcome};
