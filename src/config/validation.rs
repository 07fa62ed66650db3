//! Configuration validation logic.

use crate::config::schema::RouterConfig;
use crate::wire::HEADER_LEN;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a RouterConfig for semantic correctness.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // 1. Queue names must be POSIX mq names: "/name", no inner slash
    for name in [&config.ipc.request_queue, &config.ipc.response_queue] {
        if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
            errors.push(ValidationError(format!(
                "queue name '{}' must be of the form /name",
                name
            )));
        }
    }
    if config.ipc.request_queue == config.ipc.response_queue {
        errors.push(ValidationError(
            "request_queue and response_queue must differ".to_string(),
        ));
    }

    // 2. Queue geometry must hold at least one framed envelope
    if config.ipc.max_messages <= 0 {
        errors.push(ValidationError("ipc.max_messages must be > 0".to_string()));
    }
    if config.ipc.max_message_size <= HEADER_LEN as i64 {
        errors.push(ValidationError(format!(
            "ipc.max_message_size must exceed the {}-byte envelope header",
            HEADER_LEN
        )));
    }

    // 3. Dispatch tuning
    if config.dispatch.send_retry_attempts == 0 {
        errors.push(ValidationError(
            "dispatch.send_retry_attempts must be > 0".to_string(),
        ));
    }
    if config.dispatch.response_timeout_ms == 0 {
        errors.push(ValidationError(
            "dispatch.response_timeout_ms must be > 0".to_string(),
        ));
    }
    if config.dispatch.max_pending == 0 {
        errors.push(ValidationError(
            "dispatch.max_pending must be > 0 (0 rejects every request)".to_string(),
        ));
    }

    // 4. Listener
    if config.listener.backlog <= 0 {
        errors.push(ValidationError("listener.backlog must be > 0".to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
