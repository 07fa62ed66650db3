//! Response demultiplexer: the single drain of the response queue.
//!
//! Decodes each envelope, takes the matching correlation entry, and
//! completes the rendezvous. A missing entry means the worker already timed
//! out and took ownership; the response is discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::dispatch::table::CorrelationTable;
use crate::ipc::MessageQueue;
use crate::wire::{self, MsgType};

// Polling cadence when the response queue is empty.
const EMPTY_POLL: Duration = Duration::from_millis(1);

pub fn spawn(
    table: Arc<CorrelationTable>,
    responses: Arc<MessageQueue>,
    running: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("resp-demux".into())
        .spawn(move || drain_loop(&table, &responses, &running))
}

fn drain_loop(table: &CorrelationTable, responses: &MessageQueue, running: &AtomicBool) {
    let mut buf = responses.recv_buffer();
    while running.load(Ordering::Acquire) {
        match responses.recv(&mut buf) {
            Ok(Some(len)) => complete_one(table, &buf[..len]),
            Ok(None) => thread::sleep(EMPTY_POLL),
            Err(err) => {
                // The response channel itself is broken; nothing can complete.
                tracing::error!(error = %err, "Response queue unusable");
                std::process::exit(1);
            }
        }
    }
    tracing::debug!("Response demultiplexer stopped");
}

fn complete_one(table: &CorrelationTable, bytes: &[u8]) {
    let (header, payload) = match wire::unpack(bytes) {
        Ok(parts) => parts,
        Err(err) => {
            tracing::warn!(error = %err, "Discarding malformed envelope");
            return;
        }
    };
    if MsgType::from_wire(header.msg_type) != Some(MsgType::Response) {
        tracing::warn!(msg_type = header.msg_type, "Discarding non-response envelope");
        return;
    }

    match table.take(header.corr_id) {
        Some(rendezvous) => {
            if !rendezvous.complete(payload.to_vec()) {
                tracing::trace!(corr_id = header.corr_id, "Waiter already timed out");
            }
        }
        None => {
            tracing::trace!(corr_id = header.corr_id, "No waiter for response");
        }
    }
}
