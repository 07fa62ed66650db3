//! Worker pool: carries a request line from the connection layer to the
//! engine and a response line back.
//!
//! Per job: admission check against the correlation table, rendezvous
//! registration, envelope send with bounded retry, deadline wait, delivery.
//! Every job ends with exactly one line posted to the connection, whether the
//! engine answered or a failure was synthesized.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::Sender;

use crate::config::DispatchConfig;
use crate::dispatch::rendezvous::WaitOutcome;
use crate::dispatch::table::CorrelationTable;
use crate::ipc::{IpcError, MessageQueue, SendOutcome};
use crate::net::conn::ConnId;
use crate::net::reactor::ReactorHandle;
use crate::observability::metrics;
use crate::protocol::request::RequestEcho;
use crate::protocol::response;
use crate::wire::{self, MsgType};

/// One framed request line from one connection.
pub struct Job {
    pub conn: ConnId,
    pub line: Vec<u8>,
}

/// Shared dispatch state and the per-job protocol.
pub struct Dispatcher {
    table: Arc<CorrelationTable>,
    requests: Arc<MessageQueue>,
    reactor: ReactorHandle,
    tuning: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        table: Arc<CorrelationTable>,
        requests: Arc<MessageQueue>,
        reactor: ReactorHandle,
        tuning: DispatchConfig,
    ) -> Self {
        Self {
            table,
            requests,
            reactor,
            tuning,
        }
    }

    pub fn dispatch(&self, job: Job) {
        let started = Instant::now();
        let echo = RequestEcho::extract(&job.line);

        // Admission: reject before allocating a correlation id, so the
        // table never exceeds max_pending after an insert.
        if self.table.len() >= self.tuning.max_pending {
            tracing::warn!(pending = self.table.len(), "Correlation table saturated");
            metrics::record_reply("BUSY");
            self.reactor.deliver(job.conn, response::busy(&echo));
            return;
        }

        let (corr_id, rendezvous) = self.table.register();
        metrics::record_inflight(self.table.len());

        let framed = wire::pack(MsgType::Request, corr_id, &job.line);
        if !self.send_with_retry(&framed) {
            // Claim our own table entry and complete locally; the shared wait
            // below observes done immediately.
            self.table.take(corr_id);
            rendezvous.complete(response::mq_full(&echo, corr_id));
        }

        let deadline = Instant::now() + self.tuning.response_timeout();
        let payload = match rendezvous.wait_until(deadline) {
            WaitOutcome::Completed(payload) => payload,
            WaitOutcome::TimedOut => {
                // First take wins; if the demultiplexer got here in the same
                // instant it found the rendezvous already done and backed off.
                self.table.take(corr_id);
                tracing::debug!(corr_id, msisdn = %echo.msisdn, "Engine deadline exceeded");
                response::timeout(&echo, corr_id)
            }
        };

        let status = response::status_label(&payload);
        metrics::record_reply(&status);
        metrics::record_transaction(&status, started);
        metrics::record_inflight(self.table.len());

        self.reactor.deliver(job.conn, payload);
    }

    /// Non-blocking send with the configured retry budget. Returns `false`
    /// when the queue stayed full or the envelope cannot fit a message; a
    /// fatal queue error aborts the process (the channel is unusable).
    fn send_with_retry(&self, framed: &[u8]) -> bool {
        for _ in 0..self.tuning.send_retry_attempts {
            match self.requests.send(framed) {
                Ok(SendOutcome::Sent) => return true,
                Ok(SendOutcome::Full) => thread::sleep(self.tuning.send_retry_interval()),
                Err(IpcError::TooLarge { len, max }) => {
                    tracing::warn!(len, max, "Request line exceeds queue message size");
                    return false;
                }
                Err(err) => {
                    tracing::error!(error = %err, "Request queue unusable");
                    std::process::exit(1);
                }
            }
        }
        false
    }
}

/// Fixed-size pool of dispatch threads fed from an unbounded job queue.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    jobs: Sender<Job>,
}

impl WorkerPool {
    pub fn spawn(dispatcher: Arc<Dispatcher>, size: usize) -> io::Result<Self> {
        let (jobs, feed) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(size);
        for idx in 0..size {
            let feed = feed.clone();
            let dispatcher = Arc::clone(&dispatcher);
            let handle = thread::Builder::new()
                .name(format!("dispatch-{idx}"))
                .spawn(move || {
                    while let Ok(job) = feed.recv() {
                        dispatcher.dispatch(job);
                    }
                })?;
            workers.push(handle);
        }
        tracing::info!(workers = size, "Worker pool started");
        Ok(Self { workers, jobs })
    }

    /// Job submission side, handed to the reactor.
    pub fn sender(&self) -> Sender<Job> {
        self.jobs.clone()
    }

    /// Close the job queue and wait for in-flight dispatches to finish.
    pub fn join(self) {
        drop(self.jobs);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::QueueConfig;
    use crate::net::reactor::Completion;
    use crossbeam_channel::Receiver;
    use std::fs::File;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    static NAME_SEQ: AtomicU32 = AtomicU32::new(0);

    fn scratch_queue(capacity: i64) -> (Arc<MessageQueue>, String) {
        let name = format!(
            "/telroute_worker_{}_{}",
            std::process::id(),
            NAME_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        let queue = MessageQueue::open(&QueueConfig {
            name: name.clone(),
            capacity,
            msg_size: 1024,
            create: true,
            nonblocking: true,
        })
        .expect("create scratch queue");
        (Arc::new(queue), name)
    }

    fn tuning(max_pending: usize, retry_attempts: u32, timeout_ms: u64) -> DispatchConfig {
        DispatchConfig {
            workers: 2,
            max_pending,
            send_retry_attempts: retry_attempts,
            send_retry_interval_us: 200,
            response_timeout_ms: timeout_ms,
        }
    }

    struct Rig {
        dispatcher: Dispatcher,
        table: Arc<CorrelationTable>,
        requests: Arc<MessageQueue>,
        completions: Receiver<Completion>,
        queue_name: String,
        _wake_rx: File,
    }

    fn rig(capacity: i64, tuning_cfg: DispatchConfig) -> Rig {
        let (requests, queue_name) = scratch_queue(capacity);
        let table = Arc::new(CorrelationTable::new());
        let (handle, completions, wake_rx) = ReactorHandle::channel().expect("handle");
        let dispatcher = Dispatcher::new(
            Arc::clone(&table),
            Arc::clone(&requests),
            handle,
            tuning_cfg,
        );
        Rig {
            dispatcher,
            table,
            requests,
            completions,
            queue_name,
            _wake_rx: wake_rx,
        }
    }

    fn reply_line(rig: &Rig) -> String {
        let completion = rig
            .completions
            .recv_timeout(Duration::from_secs(5))
            .expect("a line is always delivered");
        String::from_utf8(completion.line).unwrap()
    }

    #[test]
    fn saturated_table_yields_busy_without_an_id() {
        let r = rig(4, tuning(0, 10, 50));
        let (_, _pinned) = r.table.register(); // one in flight > max_pending of zero

        r.dispatcher.dispatch(Job {
            conn: 1,
            line: br#"{"msisdn":"+15550000000"}"#.to_vec(),
        });

        let line = reply_line(&r);
        assert!(line.contains(r#""status":"BUSY","reason":"overload""#));
        assert!(!line.contains("corr_id"));
        assert_eq!(r.table.len(), 1, "no new entry was allocated");

        MessageQueue::unlink(&r.queue_name).unwrap();
    }

    #[test]
    fn full_queue_past_retry_budget_yields_mq_full() {
        let r = rig(2, tuning(100, 3, 50));
        // Saturate the request queue with nobody draining it.
        while r.requests.send(b"fill").unwrap() == SendOutcome::Sent {}

        r.dispatcher.dispatch(Job {
            conn: 2,
            line: br#"{"msisdn":"+15550000001"}"#.to_vec(),
        });

        let line = reply_line(&r);
        assert!(line.contains(r#""status":"ERROR","reason":"mq_full""#));
        assert!(r.table.is_empty(), "worker reclaimed its entry");

        MessageQueue::unlink(&r.queue_name).unwrap();
    }

    #[test]
    fn oversized_line_yields_mq_full_without_retrying() {
        let r = rig(4, tuning(100, 1_000, 50));

        let started = Instant::now();
        r.dispatcher.dispatch(Job {
            conn: 3,
            line: vec![b'x'; 4096], // cannot fit a 1024-byte message
        });

        let line = reply_line(&r);
        assert!(line.contains(r#""reason":"mq_full""#));
        assert!(
            started.elapsed() < Duration::from_millis(100),
            "no retry budget burned"
        );
        assert!(r.table.is_empty());

        MessageQueue::unlink(&r.queue_name).unwrap();
    }

    #[test]
    fn silent_engine_yields_timeout_and_clears_the_table() {
        let r = rig(4, tuning(100, 10, 30));

        r.dispatcher.dispatch(Job {
            conn: 4,
            line: br#"{"msisdn":"+15550000002","op":"route"}"#.to_vec(),
        });

        let line = reply_line(&r);
        assert!(line.contains(r#""status":"TIMEOUT","reason":"flx_no_response""#));
        assert!(line.contains(r#""msisdn":"+15550000002""#));
        assert!(r.table.is_empty());

        MessageQueue::unlink(&r.queue_name).unwrap();
    }

    #[test]
    fn engine_response_is_delivered_to_the_right_connection() {
        let r = rig(8, tuning(100, 10, 2_000));
        let request_line = br#"{"msisdn":"+14085551234","op":"route"}"#.to_vec();

        let engine = {
            let table = Arc::clone(&r.table);
            let requests = Arc::clone(&r.requests);
            thread::spawn(move || {
                let mut buf = requests.recv_buffer();
                loop {
                    if let Some(len) = requests.recv(&mut buf).expect("recv") {
                        let (header, payload) = wire::unpack(&buf[..len]).expect("envelope");
                        assert_eq!(wire::MsgType::from_wire(header.msg_type), Some(MsgType::Request));
                        assert_eq!(payload, br#"{"msisdn":"+14085551234","op":"route"}"#);
                        if let Some(rv) = table.take(header.corr_id) {
                            rv.complete(br#"{"status":"OK","corr_id":1}"#.to_vec());
                        }
                        return;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            })
        };

        r.dispatcher.dispatch(Job {
            conn: 7,
            line: request_line,
        });
        engine.join().unwrap();

        let completion = r
            .completions
            .recv_timeout(Duration::from_secs(5))
            .expect("completion");
        assert_eq!(completion.conn, 7);
        assert_eq!(completion.line, b"{\"status\":\"OK\",\"corr_id\":1}\n".to_vec());
        assert!(r.table.is_empty());

        MessageQueue::unlink(&r.queue_name).unwrap();
    }

    #[test]
    fn admission_fills_to_the_bound_and_rejects_the_overflow() {
        // len < max_pending admits; len == max_pending rejects, so the
        // table never holds more than max_pending entries.
        let r = rig(4, tuning(1, 10, 30));

        r.dispatcher.dispatch(Job {
            conn: 5,
            line: br#"{"msisdn":"+15550000003"}"#.to_vec(),
        });
        let line = reply_line(&r);
        assert!(
            !line.contains("BUSY"),
            "below the bound the request is admitted: {line}"
        );

        let (_, _pinned) = r.table.register(); // table now at max_pending
        r.dispatcher.dispatch(Job {
            conn: 6,
            line: br#"{"msisdn":"+15550000004"}"#.to_vec(),
        });
        let line = reply_line(&r);
        assert!(
            line.contains(r#""status":"BUSY","reason":"overload""#),
            "at the bound the request is rejected: {line}"
        );
        assert_eq!(r.table.len(), 1, "the overflow allocated nothing");

        MessageQueue::unlink(&r.queue_name).unwrap();
    }
}
