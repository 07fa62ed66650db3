//! Telecom Signalling Router Library
//!
//! A two-process subscriber-routing service. The `router` binary terminates
//! TCP clients and multiplexes their newline-framed queries over POSIX
//! message queues to the `flx-engine` binary, which answers each query with
//! a correlated routing decision.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │                 ROUTER PROCESS                │
//!  Client line    │  ┌─────────┐   ┌──────────┐   ┌───────────┐  │
//!  ───────────────┼─▶│   net   │──▶│ dispatch │──▶│    ipc    │──┼──▶ /tr_mq_req
//!                 │  │ reactor │   │ workers  │   │ send+retry│  │
//!                 │  └────▲────┘   └────▲─────┘   └───────────┘  │
//!                 │       │ completions │ rendezvous             │
//!                 │  ┌────┴─────────────┴─────┐   ┌───────────┐  │
//!  Client line    │  │    correlation table    │◀──│  dispatch │◀─┼─── /tr_mq_resp
//!  ◀──────────────┼──│  (take-once semantics)  │   │   demux   │  │
//!                 │  └─────────────────────────┘   └───────────┘  │
//!                 └──────────────────────────────────────────────┘
//!
//!                 ┌──────────────────────────────────────────────┐
//!                 │               FLX ENGINE PROCESS              │
//!   /tr_mq_req ──▶│  decode envelope → ALR lookup → route policy │──▶ /tr_mq_resp
//!                 └──────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod dispatch;
pub mod ipc;
pub mod net;
pub mod protocol;
pub mod wire;

// Engine peer
pub mod engine;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::RouterConfig;
pub use dispatch::CorrelationTable;
pub use lifecycle::ShutdownFlag;
