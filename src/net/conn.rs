//! Per-connection state: inbound line framing, outbound write queue.
//!
//! # Responsibilities
//! - Accumulate inbound bytes and split complete newline-framed requests
//! - Queue outbound response lines and resume partial writes exactly
//!
//! # Design Decisions
//! - Mutated only by the reactor thread; workers deliver through the
//!   reactor's completion queue, never through this type
//! - Connections are addressed by a monotonic token, not the fd, so a
//!   recycled descriptor can never receive another connection's response

use std::collections::VecDeque;
use std::io::{self, Write};
use std::net::{SocketAddr, TcpStream};

/// Reactor-assigned connection token.
pub type ConnId = u64;

pub struct Connection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    inbuf: Vec<u8>,
    outq: VecDeque<Vec<u8>>,
    pub want_write: bool,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            inbuf: Vec::new(),
            outq: VecDeque::new(),
            want_write: false,
        }
    }

    /// Append freshly read bytes to the inbound buffer.
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbuf.extend_from_slice(bytes);
    }

    /// Split out every complete request line accumulated so far.
    pub fn take_lines(&mut self) -> Vec<Vec<u8>> {
        extract_lines(&mut self.inbuf)
    }

    /// Queue a response line for writing.
    pub fn queue_response(&mut self, line: Vec<u8>) {
        self.outq.push_back(line);
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.outq.is_empty()
    }

    /// Write as much queued data as the socket accepts right now.
    /// `Ok(true)` means the queue drained; `Ok(false)` means the socket would
    /// block (a partial head keeps its unwritten suffix); `Err` closes.
    pub fn flush(&mut self) -> io::Result<bool> {
        write_queue(&mut self.outq, &mut self.stream)
    }
}

/// Split complete lines (newline-terminated) out of `buf`, stripping any
/// surrounding `\r`/`\n` and dropping empty lines. Bytes after the last
/// newline stay buffered for the next read.
pub fn extract_lines(buf: &mut Vec<u8>) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    while let Some(pos) = buf.iter().position(|&b| b == b'\n') {
        let mut line: Vec<u8> = buf.drain(..=pos).collect();
        while matches!(line.last(), Some(b'\r') | Some(b'\n')) {
            line.pop();
        }
        while matches!(line.first(), Some(b'\r') | Some(b'\n')) {
            line.remove(0);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// Drain `outq` into `writer` head-first, resuming partial writes at the
/// exact byte boundary.
fn write_queue<W: Write>(outq: &mut VecDeque<Vec<u8>>, writer: &mut W) -> io::Result<bool> {
    while let Some(head) = outq.front_mut() {
        match writer.write(head) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer stopped accepting bytes",
                ))
            }
            Ok(written) if written < head.len() => {
                head.drain(..written);
                return Ok(false);
            }
            Ok(_) => {
                outq.pop_front();
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_is_framed_and_trimmed() {
        let mut buf = b"{\"msisdn\":\"+1\"}\r\n".to_vec();
        let lines = extract_lines(&mut buf);
        assert_eq!(lines, vec![b"{\"msisdn\":\"+1\"}".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_tail_stays_buffered() {
        let mut buf = b"first\nsecond-without-newline".to_vec();
        let lines = extract_lines(&mut buf);
        assert_eq!(lines, vec![b"first".to_vec()]);
        assert_eq!(buf, b"second-without-newline");
    }

    #[test]
    fn empty_lines_are_ignored() {
        let mut buf = b"\n\r\none\n\n\r\ntwo\n".to_vec();
        let lines = extract_lines(&mut buf);
        assert_eq!(lines, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    // Invariant: N well-formed lines written with arbitrary chunk boundaries
    // yield exactly N requests with the original payloads.
    #[test]
    fn framing_is_independent_of_chunk_boundaries() {
        let originals: Vec<Vec<u8>> = (0..17)
            .map(|i| format!("{{\"msisdn\":\"+1408555{i:04}\",\"op\":\"route\"}}").into_bytes())
            .collect();
        let mut wire = Vec::new();
        for (i, line) in originals.iter().enumerate() {
            wire.extend_from_slice(line);
            wire.extend_from_slice(if i % 3 == 0 { b"\r\n" } else { b"\n" });
        }

        for chunk in [1usize, 2, 3, 5, 7, 16, 64, wire.len()] {
            let mut buf = Vec::new();
            let mut collected = Vec::new();
            for piece in wire.chunks(chunk) {
                buf.extend_from_slice(piece);
                collected.extend(extract_lines(&mut buf));
            }
            assert_eq!(collected, originals, "chunk size {chunk}");
            assert!(buf.is_empty(), "chunk size {chunk}");
        }
    }

    /// Accepts at most `step` bytes per call, recording everything written.
    struct ThrottledWriter {
        step: usize,
        calls: usize,
        accepted: Vec<u8>,
    }

    impl Write for ThrottledWriter {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "try later"));
            }
            let n = data.len().min(self.step);
            self.accepted.extend_from_slice(&data[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    // Invariant: a writer interrupted at any byte boundary resumes exact
    // delivery of the remaining suffix.
    #[test]
    fn partial_writes_resume_at_the_exact_boundary() {
        let lines: Vec<Vec<u8>> = vec![
            b"{\"status\":\"OK\"}\n".to_vec(),
            b"{\"status\":\"TIMEOUT\",\"reason\":\"flx_no_response\"}\n".to_vec(),
            b"x\n".to_vec(),
        ];
        let expected: Vec<u8> = lines.concat();

        for step in 1..=expected.len() {
            let mut outq: VecDeque<Vec<u8>> = lines.iter().cloned().collect();
            let mut writer = ThrottledWriter {
                step,
                calls: 0,
                accepted: Vec::new(),
            };

            loop {
                match write_queue(&mut outq, &mut writer) {
                    Ok(true) => break,
                    Ok(false) => continue,
                    Err(err) => panic!("step {step}: unexpected error {err}"),
                }
            }
            assert_eq!(writer.accepted, expected, "step {step}");
            assert!(outq.is_empty(), "step {step}");
        }
    }

    #[test]
    fn write_zero_is_surfaced_as_an_error() {
        struct DeadWriter;
        impl Write for DeadWriter {
            fn write(&mut self, _data: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let mut outq: VecDeque<Vec<u8>> = VecDeque::from([b"line\n".to_vec()]);
        assert!(write_queue(&mut outq, &mut DeadWriter).is_err());
    }
}
