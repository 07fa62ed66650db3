//! Echo-field extraction from request lines.
//!
//! # Design Decisions
//! - Real JSON parsing, not substring search; everything beyond the two
//!   fields is forwarded to the engine untouched
//! - A line that is not JSON still routes: the engine answers NOT_FOUND for
//!   an empty subscriber key

use serde_json::Value;

/// Default operation when the request omits `op`.
pub const DEFAULT_OP: &str = "route";

/// The two request fields the router echoes into replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEcho {
    pub msisdn: String,
    pub op: String,
}

impl RequestEcho {
    /// Pull `msisdn` and `op` out of a request line. Missing or non-string
    /// fields degrade to an empty key and the default operation.
    pub fn extract(line: &[u8]) -> Self {
        let parsed: Option<Value> = serde_json::from_slice(line).ok();
        let msisdn = parsed
            .as_ref()
            .and_then(|v| v.get("msisdn"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let op = parsed
            .as_ref()
            .and_then(|v| v.get("op"))
            .and_then(Value::as_str)
            .filter(|op| !op.is_empty())
            .unwrap_or(DEFAULT_OP)
            .to_string();
        Self { msisdn, op }
    }
}
