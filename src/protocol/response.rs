//! Reply payloads: engine decisions and router-synthesized failures.
//!
//! Field declaration order is serialization order, so the wire shape of each
//! reply is stable. Synthesized failures lead with `status`/`reason`.

use serde::{Deserialize, Serialize};

use super::request::RequestEcho;

pub const STATUS_OK: &str = "OK";
pub const STATUS_NOT_FOUND: &str = "NOT_FOUND";
pub const REASON_NOT_IN_ALR: &str = "subscriber_not_in_alr";

/// Routing decision emitted by the engine, correlated by `corr_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineReply {
    pub corr_id: u64,
    pub op: String,
    pub msisdn: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imsi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serving_msc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serving_vlr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub flx_latency_ms: u64,
}

impl EngineReply {
    pub fn to_payload(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("engine reply serialization")
    }
}

/// Router-synthesized failure line.
#[derive(Debug, Serialize)]
struct SynthesizedReply<'a> {
    status: &'a str,
    reason: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    op: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    msisdn: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    corr_id: Option<u64>,
}

fn synthesize(status: &str, reason: &str, echo: &RequestEcho, corr_id: Option<u64>) -> Vec<u8> {
    serde_json::to_vec(&SynthesizedReply {
        status,
        reason,
        op: Some(echo.op.as_str()),
        msisdn: Some(echo.msisdn.as_str()),
        corr_id,
    })
    .expect("synthesized reply serialization")
}

/// Admission rejection: the correlation table is saturated. No correlation
/// id exists on this path.
pub fn busy(echo: &RequestEcho) -> Vec<u8> {
    synthesize("BUSY", "overload", echo, None)
}

/// The request queue stayed full past the retry budget (or the line cannot
/// fit a queue message).
pub fn mq_full(echo: &RequestEcho, corr_id: u64) -> Vec<u8> {
    synthesize("ERROR", "mq_full", echo, Some(corr_id))
}

/// The engine did not answer within the transaction deadline.
pub fn timeout(echo: &RequestEcho, corr_id: u64) -> Vec<u8> {
    synthesize("TIMEOUT", "flx_no_response", echo, Some(corr_id))
}

/// Status label of an arbitrary reply payload, for metrics.
pub fn status_label(payload: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(payload)
        .ok()
        .and_then(|v| v.get("status").and_then(|s| s.as_str()).map(String::from))
        .unwrap_or_else(|| "UNKNOWN".to_string())
}
