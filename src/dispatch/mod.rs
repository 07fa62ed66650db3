//! Request/response fabric between the connection layer and the engine.
//!
//! A worker registers a [`rendezvous::Rendezvous`] in the
//! [`table::CorrelationTable`], ships the request over the IPC channel, and
//! waits with a deadline. The single [`demux`] thread drains the response
//! queue and completes rendezvous objects by correlation id. Exactly one of
//! the two sides removes each table entry.

pub mod demux;
pub mod rendezvous;
pub mod table;
pub mod worker;

pub use rendezvous::{Rendezvous, WaitOutcome};
pub use table::CorrelationTable;
pub use worker::{Dispatcher, Job, WorkerPool};
