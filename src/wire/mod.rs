//! Binary framing for the inter-process channel.

pub mod envelope;

pub use envelope::{pack, unpack, EnvelopeError, Header, MsgType, HEADER_LEN, MAGIC, VERSION};
