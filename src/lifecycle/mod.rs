//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Validate → Open queues → Spawn threads → Run reactor
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → flag set → reactor drains → workers join →
//!     demultiplexer joins → queues close
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop the reactor first so no new jobs arrive, then
//!   let workers finish their bounded waits, then stop the demultiplexer

pub mod shutdown;

pub use shutdown::ShutdownFlag;
