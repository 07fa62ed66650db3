//! Bounded, named POSIX message queues.
//!
//! # Responsibilities
//! - Open (router) or create (engine) the request/response queues
//! - Non-blocking send surfacing queue-full as an outcome, not an error
//! - Blocking or non-blocking receive of one message at a time
//!
//! # Design Decisions
//! - `EAGAIN` is flow control and is typed as `SendOutcome::Full` / `None`;
//!   every other errno is a fatal channel error
//! - An oversized message is a caller-visible error and is never sent
//! - Queues are unlinked by their creator (the engine), not the router

use std::ffi::CString;

use nix::errno::Errno;
use nix::mqueue::{mq_close, mq_open, mq_receive, mq_send, mq_unlink, MQ_OFlag, MqAttr, MqdT};
use nix::sys::stat::Mode;
use thiserror::Error;

/// Fatal channel errors. Queue-full conditions are not errors; see
/// [`SendOutcome`] and the `Option` returned by [`MessageQueue::recv`].
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("invalid queue name {0:?}")]
    BadName(String),
    #[error("mq_open({name}) failed: {source}")]
    Open { name: String, source: Errno },
    #[error("message of {len} bytes exceeds queue message size {max}")]
    TooLarge { len: usize, max: usize },
    #[error("mq_send failed: {0}")]
    Send(Errno),
    #[error("mq_receive failed: {0}")]
    Recv(Errno),
    #[error("mq_unlink({name}) failed: {source}")]
    Unlink { name: String, source: Errno },
}

/// Result of a non-blocking send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The queue is at capacity; the message was not enqueued.
    Full,
}

/// How to open a queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// POSIX queue name, e.g. `/tr_mq_req`.
    pub name: String,
    /// Maximum queued messages.
    pub capacity: i64,
    /// Maximum message size in bytes (header + payload must fit).
    pub msg_size: i64,
    /// Create the queue if absent (engine side).
    pub create: bool,
    /// Open in non-blocking mode.
    pub nonblocking: bool,
}

/// An open POSIX message queue descriptor.
///
/// Send and receive are thread-safe at the kernel boundary; a single
/// `MessageQueue` may be shared across workers behind an `Arc`.
pub struct MessageQueue {
    mqd: Option<MqdT>,
    name: String,
    msg_size: usize,
}

impl MessageQueue {
    pub fn open(cfg: &QueueConfig) -> Result<Self, IpcError> {
        let cname =
            CString::new(cfg.name.as_str()).map_err(|_| IpcError::BadName(cfg.name.clone()))?;

        let mut oflag = MQ_OFlag::O_RDWR;
        if cfg.create {
            oflag |= MQ_OFlag::O_CREAT;
        }
        if cfg.nonblocking {
            oflag |= MQ_OFlag::O_NONBLOCK;
        }

        let attr = MqAttr::new(0, cfg.capacity, cfg.msg_size, 0);
        let mqd = mq_open(
            cname.as_c_str(),
            oflag,
            Mode::from_bits_truncate(0o660),
            cfg.create.then_some(&attr),
        )
        .map_err(|source| IpcError::Open {
            name: cfg.name.clone(),
            source,
        })?;

        Ok(Self {
            mqd: Some(mqd),
            name: cfg.name.clone(),
            msg_size: cfg.msg_size as usize,
        })
    }

    /// Non-blocking enqueue of one message.
    pub fn send(&self, msg: &[u8]) -> Result<SendOutcome, IpcError> {
        if msg.len() > self.msg_size {
            return Err(IpcError::TooLarge {
                len: msg.len(),
                max: self.msg_size,
            });
        }
        match mq_send(self.handle(), msg, 0) {
            Ok(()) => Ok(SendOutcome::Sent),
            Err(Errno::EAGAIN) => Ok(SendOutcome::Full),
            Err(source) => Err(IpcError::Send(source)),
        }
    }

    /// Receive one message into `buf`, which must be at least
    /// [`Self::msg_size`] bytes. Returns `None` when a non-blocking queue is
    /// empty or a blocking receive was interrupted by a signal.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<usize>, IpcError> {
        let mut prio = 0u32;
        match mq_receive(self.handle(), buf, &mut prio) {
            Ok(len) => Ok(Some(len)),
            Err(Errno::EAGAIN) | Err(Errno::EINTR) => Ok(None),
            Err(source) => Err(IpcError::Recv(source)),
        }
    }

    /// Allocate a receive buffer sized for this queue.
    pub fn recv_buffer(&self) -> Vec<u8> {
        vec![0u8; self.msg_size]
    }

    pub fn msg_size(&self) -> usize {
        self.msg_size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove a queue name from the system. Creator-side cleanup.
    pub fn unlink(name: &str) -> Result<(), IpcError> {
        let cname = CString::new(name).map_err(|_| IpcError::BadName(name.to_string()))?;
        mq_unlink(cname.as_c_str()).map_err(|source| IpcError::Unlink {
            name: name.to_string(),
            source,
        })
    }

    fn handle(&self) -> &MqdT {
        // Only vacated by Drop.
        self.mqd.as_ref().expect("message queue already closed")
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        if let Some(mqd) = self.mqd.take() {
            let _ = mq_close(mqd);
        }
    }
}
