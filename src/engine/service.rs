//! Engine service loop: one request envelope in, one response envelope out.
//!
//! # Responsibilities
//! - Create both queues at startup; unlink them on shutdown
//! - Decode requests, evaluate lookup + policy, answer with the same corr_id
//! - Measure and report per-query latency (`flx_latency_ms`)
//!
//! # Design Decisions
//! - The request queue is read in non-blocking mode with a 1 ms idle sleep,
//!   mirroring the router's demultiplexer, so a shutdown signal is honored
//!   within a tick regardless of `SA_RESTART` semantics
//! - A full response queue gets a brief retry; a still-full queue drops the
//!   reply and lets the router's deadline answer the client

use std::thread;
use std::time::{Duration, Instant};

use crate::config::IpcConfig;
use crate::lifecycle::ShutdownFlag;
use crate::engine::alr::{route_policy, AlrStore};
use crate::ipc::{IpcError, MessageQueue, SendOutcome};
use crate::protocol::request::RequestEcho;
use crate::protocol::response::{EngineReply, REASON_NOT_IN_ALR, STATUS_NOT_FOUND, STATUS_OK};
use crate::wire::{self, MsgType};

const IDLE_POLL: Duration = Duration::from_millis(1);
const SEND_RETRIES: u32 = 50;
const SEND_RETRY_INTERVAL: Duration = Duration::from_micros(200);

pub struct Engine {
    requests: MessageQueue,
    responses: MessageQueue,
    store: AlrStore,
}

impl Engine {
    /// Create both queues (router opens them pre-created).
    pub fn create(ipc: &IpcConfig) -> Result<Self, IpcError> {
        let requests = MessageQueue::open(&ipc.engine_request_queue())?;
        let responses = MessageQueue::open(&ipc.engine_response_queue())?;
        tracing::info!(
            request_queue = %requests.name(),
            response_queue = %responses.name(),
            "FLX engine queues ready"
        );
        Ok(Self {
            requests,
            responses,
            store: AlrStore::with_seed_data(),
        })
    }

    /// Serve until shutdown is requested. Returns only on a fatal channel
    /// error or shutdown.
    pub fn serve(&self, shutdown: &ShutdownFlag) -> Result<(), IpcError> {
        let mut buf = self.requests.recv_buffer();
        while !shutdown.is_triggered() {
            match self.requests.recv(&mut buf)? {
                Some(len) => self.handle(&buf[..len]),
                None => thread::sleep(IDLE_POLL),
            }
        }
        Ok(())
    }

    fn handle(&self, bytes: &[u8]) {
        let (header, payload) = match wire::unpack(bytes) {
            Ok(parts) => parts,
            Err(err) => {
                tracing::warn!(error = %err, "Discarding malformed request envelope");
                return;
            }
        };
        if MsgType::from_wire(header.msg_type) != Some(MsgType::Request) {
            tracing::warn!(msg_type = header.msg_type, "Discarding unexpected envelope type");
            return;
        }

        let started = Instant::now();
        let echo = RequestEcho::extract(payload);
        let mut reply = evaluate(&self.store, header.corr_id, &echo);
        reply.flx_latency_ms = started.elapsed().as_millis() as u64;

        tracing::debug!(
            corr_id = header.corr_id,
            msisdn = %reply.msisdn,
            status = %reply.status,
            "Routing decision"
        );

        let framed = wire::pack(MsgType::Response, header.corr_id, &reply.to_payload());
        for _ in 0..SEND_RETRIES {
            match self.responses.send(&framed) {
                Ok(SendOutcome::Sent) => return,
                Ok(SendOutcome::Full) => thread::sleep(SEND_RETRY_INTERVAL),
                Err(err) => {
                    tracing::error!(error = %err, "Response queue send failed");
                    return;
                }
            }
        }
        tracing::warn!(corr_id = header.corr_id, "Response queue full; reply dropped");
    }

    /// Remove both queue names; the creator cleans up.
    pub fn unlink_queues(ipc: &IpcConfig) {
        for name in [&ipc.request_queue, &ipc.response_queue] {
            if let Err(err) = MessageQueue::unlink(name) {
                tracing::warn!(queue = %name, error = %err, "Queue unlink failed");
            }
        }
    }
}

/// Lookup + policy for one query.
fn evaluate(store: &AlrStore, corr_id: u64, echo: &RequestEcho) -> EngineReply {
    match store.lookup(&echo.msisdn) {
        Some(record) => EngineReply {
            corr_id,
            op: echo.op.clone(),
            msisdn: echo.msisdn.clone(),
            status: STATUS_OK.into(),
            imsi: Some(record.imsi.clone()),
            serving_msc: Some(record.serving_msc.clone()),
            serving_vlr: Some(record.serving_vlr.clone()),
            route_group: Some(route_policy(record).to_string()),
            reason: None,
            flx_latency_ms: 0,
        },
        None => EngineReply {
            corr_id,
            op: echo.op.clone(),
            msisdn: echo.msisdn.clone(),
            status: STATUS_NOT_FOUND.into(),
            imsi: None,
            serving_msc: None,
            serving_vlr: None,
            route_group: None,
            reason: Some(REASON_NOT_IN_ALR.into()),
            flx_latency_ms: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_carries_subscriber_fields_and_route_group() {
        let store = AlrStore::with_seed_data();
        let echo = RequestEcho {
            msisdn: "+14085551234".into(),
            op: "route".into(),
        };

        let reply = evaluate(&store, 1, &echo);
        assert_eq!(reply.corr_id, 1);
        assert_eq!(reply.status, STATUS_OK);
        assert_eq!(reply.imsi.as_deref(), Some("310150123456789"));
        assert_eq!(reply.route_group.as_deref(), Some("ROUTE_GROUP_SOUTH"));
        assert_eq!(reply.reason, None);
    }

    #[test]
    fn miss_is_not_found_with_reason() {
        let store = AlrStore::with_seed_data();
        let echo = RequestEcho {
            msisdn: "+19998887777".into(),
            op: "route".into(),
        };

        let reply = evaluate(&store, 9, &echo);
        assert_eq!(reply.status, STATUS_NOT_FOUND);
        assert_eq!(reply.reason.as_deref(), Some(REASON_NOT_IN_ALR));
        assert_eq!(reply.imsi, None);
    }

    #[test]
    fn echoed_op_survives_into_the_reply() {
        let store = AlrStore::with_seed_data();
        let echo = RequestEcho {
            msisdn: "+12125550123".into(),
            op: "lookup".into(),
        };
        assert_eq!(evaluate(&store, 3, &echo).op, "lookup");
    }
}
