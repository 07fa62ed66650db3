//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router
//! and the engine. All types derive Serde traits for deserialization from
//! config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ipc::QueueConfig;

/// Root configuration shared by the `router` and `flx-engine` binaries.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// TCP ingress configuration.
    pub listener: ListenerConfig,

    /// Inter-process queue configuration.
    pub ipc: IpcConfig,

    /// Worker-pool and transaction-deadline tuning.
    pub dispatch: DispatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// TCP ingress configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind host (dotted IPv4).
    pub host: String,

    /// Bind port.
    pub port: u16,

    /// Listen backlog.
    pub backlog: i32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5555,
            backlog: 512,
        }
    }
}

/// Named-queue configuration. The engine creates both queues; the router
/// opens them pre-created.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IpcConfig {
    /// Router → engine queue name.
    pub request_queue: String,

    /// Engine → router queue name.
    pub response_queue: String,

    /// Per-queue capacity in messages.
    pub max_messages: i64,

    /// Maximum message size in bytes (envelope header + payload).
    pub max_message_size: i64,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            request_queue: "/tr_mq_req".to_string(),
            response_queue: "/tr_mq_resp".to_string(),
            max_messages: 2048,
            max_message_size: 8192,
        }
    }
}

impl IpcConfig {
    /// Router side: open existing, non-blocking send.
    pub fn router_request_queue(&self) -> QueueConfig {
        QueueConfig {
            name: self.request_queue.clone(),
            capacity: self.max_messages,
            msg_size: self.max_message_size,
            create: false,
            nonblocking: true,
        }
    }

    /// Router side: open existing, non-blocking receive for the demultiplexer.
    pub fn router_response_queue(&self) -> QueueConfig {
        QueueConfig {
            name: self.response_queue.clone(),
            capacity: self.max_messages,
            msg_size: self.max_message_size,
            create: false,
            nonblocking: true,
        }
    }

    /// Engine side: create, non-blocking receive polled by the service loop.
    pub fn engine_request_queue(&self) -> QueueConfig {
        QueueConfig {
            name: self.request_queue.clone(),
            capacity: self.max_messages,
            msg_size: self.max_message_size,
            create: true,
            nonblocking: true,
        }
    }

    /// Engine side: create, non-blocking send.
    pub fn engine_response_queue(&self) -> QueueConfig {
        QueueConfig {
            name: self.response_queue.clone(),
            capacity: self.max_messages,
            msg_size: self.max_message_size,
            create: true,
            nonblocking: true,
        }
    }
}

/// Worker-pool and transaction tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Worker threads; 0 sizes the pool to hardware parallelism (min 2).
    pub workers: usize,

    /// In-flight transaction bound enforced at admission.
    pub max_pending: usize,

    /// Attempts before a full request queue becomes `ERROR/mq_full`.
    pub send_retry_attempts: u32,

    /// Pause between send attempts, in microseconds.
    pub send_retry_interval_us: u64,

    /// Per-transaction deadline, in milliseconds.
    pub response_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_pending: 100_000,
            send_retry_attempts: 1_000,
            send_retry_interval_us: 200,
            response_timeout_ms: 500,
        }
    }
}

impl DispatchConfig {
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .max(2)
    }

    pub fn send_retry_interval(&self) -> Duration {
        Duration::from_micros(self.send_retry_interval_us)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
