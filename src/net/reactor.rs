//! Readiness-driven event thread.
//!
//! # Responsibilities
//! - Accept connections until would-block; register them for read readiness
//! - Drain inbound bytes, frame request lines, submit worker jobs
//! - Drain outbound queues on write readiness with partial-write resumption
//! - Apply worker deliveries posted through the completion queue
//!
//! # Design Decisions
//! - All connection state is owned and mutated by this thread alone. Workers
//!   and the demultiplexer deliver through [`ReactorHandle`]: a channel send
//!   plus one byte into a wakeup pipe registered in the epoll set. No
//!   connection lock exists anywhere.
//! - epoll user data carries a monotonic connection token; a completion for
//!   a token that has been closed is discarded.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use nix::unistd::pipe2;

use crate::dispatch::worker::Job;
use crate::lifecycle::ShutdownFlag;
use crate::net::conn::{ConnId, Connection};
use crate::observability::metrics;

const TOKEN_LISTENER: u64 = 0;
const TOKEN_WAKEUP: u64 = 1;
const FIRST_CONN_TOKEN: u64 = 2;

const MAX_EVENTS: usize = 256;
const TICK_MS: u16 = 1_000;
const READ_CHUNK: usize = 2_048;

/// A response line bound for one connection.
pub struct Completion {
    pub conn: ConnId,
    pub line: Vec<u8>,
}

/// Cloneable delivery side of the reactor: a completion channel plus the
/// wakeup pipe that pulls the reactor out of `epoll_wait`.
#[derive(Clone)]
pub struct ReactorHandle {
    completions: Sender<Completion>,
    wake: Arc<File>,
}

impl ReactorHandle {
    /// Build the delivery channel and wakeup pipe. The receiver halves go to
    /// [`Reactor::new`].
    pub fn channel() -> io::Result<(Self, Receiver<Completion>, File)> {
        let (pipe_rx, pipe_tx) =
            pipe2(OFlag::O_NONBLOCK | OFlag::O_CLOEXEC).map_err(io::Error::from)?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = Self {
            completions: tx,
            wake: Arc::new(File::from(pipe_tx)),
        };
        Ok((handle, rx, File::from(pipe_rx)))
    }

    /// Post one response line for `conn` and wake the reactor. The newline
    /// terminator is appended here so every delivery is exactly one line.
    pub fn deliver(&self, conn: ConnId, mut line: Vec<u8>) {
        if !line.ends_with(b"\n") {
            line.push(b'\n');
        }
        if self.completions.send(Completion { conn, line }).is_ok() {
            // A full pipe already guarantees a pending wakeup.
            let _ = (&*self.wake).write(&[1]);
        }
    }
}

pub struct Reactor {
    epoll: Epoll,
    listener: TcpListener,
    conns: HashMap<ConnId, Connection>,
    next_token: u64,
    jobs: Sender<Job>,
    completions: Receiver<Completion>,
    wake_rx: File,
}

impl Reactor {
    pub fn new(
        listener: TcpListener,
        jobs: Sender<Job>,
        completions: Receiver<Completion>,
        wake_rx: File,
    ) -> io::Result<Self> {
        let epoll = Epoll::new(EpollCreateFlags::empty()).map_err(io::Error::from)?;
        epoll
            .add(&listener, EpollEvent::new(EpollFlags::EPOLLIN, TOKEN_LISTENER))
            .map_err(io::Error::from)?;
        epoll
            .add(&wake_rx, EpollEvent::new(EpollFlags::EPOLLIN, TOKEN_WAKEUP))
            .map_err(io::Error::from)?;

        Ok(Self {
            epoll,
            listener,
            conns: HashMap::new(),
            next_token: FIRST_CONN_TOKEN,
            jobs,
            completions,
            wake_rx,
        })
    }

    /// Run until the shutdown flag trips. The 1 s tick bounds how long a
    /// shutdown request can sit unnoticed.
    pub fn run(&mut self, shutdown: &ShutdownFlag) -> io::Result<()> {
        let mut events = [EpollEvent::empty(); MAX_EVENTS];

        while !shutdown.is_triggered() {
            let ready = match self.epoll.wait(&mut events, EpollTimeout::from(TICK_MS)) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(err) => return Err(io::Error::from(err)),
            };

            for event in &events[..ready] {
                let token = event.data();
                let flags = event.events();
                match token {
                    TOKEN_LISTENER => self.accept_ready(),
                    TOKEN_WAKEUP => self.drain_wakeup(),
                    _ => self.conn_ready(token, flags),
                }
            }

            self.apply_completions();
        }

        tracing::info!(connections = self.conns.len(), "Reactor draining");
        Ok(())
    }

    fn accept_ready(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(err) = stream.set_nonblocking(true) {
                        tracing::warn!(peer = %peer, error = %err, "Dropping connection");
                        continue;
                    }
                    let token = self.next_token;
                    self.next_token += 1;

                    if let Err(err) = self
                        .epoll
                        .add(&stream, EpollEvent::new(EpollFlags::EPOLLIN, token))
                    {
                        tracing::warn!(peer = %peer, error = %err, "epoll registration failed");
                        continue;
                    }
                    tracing::debug!(peer = %peer, token, "Connection accepted");
                    self.conns.insert(token, Connection::new(stream, peer));
                    metrics::record_connections(self.conns.len());
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    // Transient accept failures keep the loop alive.
                    tracing::warn!(error = %err, "Accept failed");
                    break;
                }
            }
        }
    }

    fn drain_wakeup(&mut self) {
        let mut sink = [0u8; 64];
        loop {
            match (&self.wake_rx).read(&mut sink) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::warn!(error = %err, "Wakeup pipe read failed");
                    break;
                }
            }
        }
    }

    fn conn_ready(&mut self, token: ConnId, flags: EpollFlags) {
        if flags.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR) {
            self.close(token);
            return;
        }
        if flags.contains(EpollFlags::EPOLLIN) && !self.read_ready(token) {
            return;
        }
        if flags.contains(EpollFlags::EPOLLOUT) {
            self.write_ready(token);
        }
    }

    /// Drain the socket and submit framed request lines. Returns `false`
    /// when the connection was closed.
    fn read_ready(&mut self, token: ConnId) -> bool {
        let mut lines = Vec::new();
        let mut close = false;
        {
            let conn = match self.conns.get_mut(&token) {
                Some(conn) => conn,
                None => return false,
            };
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                match conn.stream.read(&mut chunk) {
                    Ok(0) => {
                        close = true;
                        break;
                    }
                    Ok(n) => {
                        conn.push_inbound(&chunk[..n]);
                        lines.extend(conn.take_lines());
                    }
                    Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        tracing::debug!(peer = %conn.peer, error = %err, "Read failed");
                        close = true;
                        break;
                    }
                }
            }
        }

        for line in lines {
            // Send fails only when every worker is gone, i.e. during shutdown.
            let _ = self.jobs.send(Job { conn: token, line });
        }

        if close {
            self.close(token);
            return false;
        }
        true
    }

    fn write_ready(&mut self, token: ConnId) {
        let drained = match self.conns.get_mut(&token) {
            Some(conn) => conn.flush(),
            None => return,
        };
        match drained {
            Ok(true) => self.set_write_interest(token, false),
            Ok(false) => {}
            Err(err) => {
                tracing::debug!(token, error = %err, "Write failed");
                self.close(token);
            }
        }
    }

    fn set_write_interest(&mut self, token: ConnId, on: bool) {
        let conn = match self.conns.get_mut(&token) {
            Some(conn) => conn,
            None => return,
        };
        if conn.want_write == on {
            return;
        }
        let mut flags = EpollFlags::EPOLLIN;
        if on {
            flags |= EpollFlags::EPOLLOUT;
        }
        match self.epoll.modify(&conn.stream, &mut EpollEvent::new(flags, token)) {
            Ok(()) => conn.want_write = on,
            Err(err) => tracing::warn!(token, error = %err, "epoll interest change failed"),
        }
    }

    /// Apply worker deliveries. Runs after every wait round so completions
    /// are bounded by one tick even if the wakeup byte raced the wait.
    fn apply_completions(&mut self) {
        loop {
            let Completion { conn, line } = match self.completions.try_recv() {
                Ok(completion) => completion,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            let queued = match self.conns.get_mut(&conn) {
                Some(connection) => {
                    connection.queue_response(line);
                    true
                }
                None => {
                    tracing::trace!(token = conn, "Response for closed connection discarded");
                    false
                }
            };
            if queued {
                self.set_write_interest(conn, true);
            }
        }
    }

    fn close(&mut self, token: ConnId) {
        if let Some(conn) = self.conns.remove(&token) {
            let _ = self.epoll.delete(&conn.stream);
            tracing::debug!(peer = %conn.peer, token, "Connection closed");
            metrics::record_connections(self.conns.len());
        }
    }
}
