//! Query and reply payload shapes.
//!
//! The router treats request payloads as opaque lines apart from the two
//! echo fields; the engine owns full interpretation.

pub mod request;
pub mod response;

pub use request::RequestEcho;
pub use response::EngineReply;
