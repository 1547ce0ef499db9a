//! Streaming HTTP GET connection.
//!
//! The response body is read on its own thread and handed over in chunks, so a
//! stalled server never blocks the fetch worker: `read` waits at most `read_poll`
//! and fails with `TimedOut` once nothing has arrived for `stall_timeout`.

use std::io::{self, Read};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use ureq::BodyReader;

use super::{Connection, Connector};

const BODY_CHUNK: usize = 16 * 1024;
const QUEUED_CHUNKS: usize = 4;

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Time allowed for the response headers to arrive.
    pub response_timeout: Duration,
    /// Longest a single `read` waits for body bytes before returning nothing.
    pub read_poll: Duration,
    /// A body that delivers nothing for this long is treated as failed.
    pub stall_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(10),
            read_poll: Duration::from_millis(50),
            stall_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct HttpConnector {
    config: HttpConfig,
}

impl HttpConnector {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }
}

impl Connector for HttpConnector {
    fn open(&self, uri: &str) -> Result<Box<dyn Connection>> {
        let resp = ureq::get(uri)
            .config()
            .timeout_connect(Some(self.config.connect_timeout))
            .timeout_recv_response(Some(self.config.response_timeout))
            .build()
            .call()
            .with_context(|| format!("GET {uri}"))?;

        let content_length = resp
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        tracing::debug!(uri, content_length, status = %resp.status(), "http stream open");

        let (_, body) = resp.into_parts();
        let (tx, rx) = crossbeam_channel::bounded(QUEUED_CHUNKS);
        let reader = body.into_reader();
        // Detached: a body stalled at the socket keeps this thread until the server
        // closes the connection or sends more data.
        thread::Builder::new()
            .name("http-body".into())
            .spawn(move || pump_body(reader, tx))
            .context("spawn http body reader")?;

        Ok(Box::new(HttpConnection::new(rx, content_length, &self.config)))
    }
}

/// Copy the body into `tx` until it ends, fails, or the connection is dropped.
fn pump_body(mut reader: BodyReader<'static>, tx: Sender<io::Result<Vec<u8>>>) {
    let mut buf = vec![0u8; BODY_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => {
                if tx.send(Ok(buf[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        }
    }
}

struct HttpConnection {
    chunks: Receiver<io::Result<Vec<u8>>>,
    chunk: Vec<u8>,
    chunk_pos: usize,
    remaining: Option<u64>,
    eof: bool,
    last_data: Instant,
    read_poll: Duration,
    stall_timeout: Duration,
}

impl HttpConnection {
    fn new(chunks: Receiver<io::Result<Vec<u8>>>, content_length: Option<u64>, config: &HttpConfig) -> Self {
        Self {
            chunks,
            chunk: Vec::new(),
            chunk_pos: 0,
            remaining: content_length,
            eof: false,
            last_data: Instant::now(),
            read_poll: config.read_poll,
            stall_timeout: config.stall_timeout,
        }
    }
}

impl Connection for HttpConnection {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() || self.is_complete() {
            return Ok(0);
        }
        if self.chunk_pos == self.chunk.len() {
            match self.chunks.recv_timeout(self.read_poll) {
                Ok(Ok(chunk)) => {
                    self.chunk = chunk;
                    self.chunk_pos = 0;
                    self.last_data = Instant::now();
                }
                Ok(Err(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) => {
                    if self.last_data.elapsed() >= self.stall_timeout {
                        return Err(io::Error::new(io::ErrorKind::TimedOut, "http body stalled"));
                    }
                    return Ok(0);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.eof = true;
                    return Ok(0);
                }
            }
        }

        let n = (self.chunk.len() - self.chunk_pos).min(out.len());
        out[..n].copy_from_slice(&self.chunk[self.chunk_pos..self.chunk_pos + n]);
        self.chunk_pos += n;
        if let Some(rem) = self.remaining.as_mut() {
            *rem = rem.saturating_sub(n as u64);
        }
        Ok(n)
    }

    fn is_complete(&self) -> bool {
        self.eof || self.remaining == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HttpConfig {
        HttpConfig {
            read_poll: Duration::from_millis(2),
            stall_timeout: Duration::from_millis(40),
            ..HttpConfig::default()
        }
    }

    #[test]
    fn chunks_are_split_across_reads_until_the_body_ends() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut conn = HttpConnection::new(rx, None, &config());
        tx.send(Ok(vec![1, 2, 3, 4, 5])).unwrap();
        drop(tx);

        let mut buf = [0u8; 3];
        assert_eq!(conn.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(conn.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[4, 5]);
        assert!(!conn.is_complete());
        assert_eq!(conn.read(&mut buf).unwrap(), 0);
        assert!(conn.is_complete());
    }

    #[test]
    fn content_length_completes_the_stream() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut conn = HttpConnection::new(rx, Some(4), &config());
        tx.send(Ok(vec![7; 4])).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(conn.read(&mut buf).unwrap(), 4);
        assert!(conn.is_complete());
        assert_eq!(conn.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn stalled_body_returns_quickly_then_times_out() {
        let (tx, rx) = crossbeam_channel::bounded::<io::Result<Vec<u8>>>(4);
        let mut conn = HttpConnection::new(rx, None, &config());
        let mut buf = [0u8; 8];

        let begun = Instant::now();
        assert_eq!(conn.read(&mut buf).unwrap(), 0);
        assert!(begun.elapsed() < Duration::from_secs(1));

        let deadline = Instant::now() + Duration::from_secs(5);
        let err = loop {
            match conn.read(&mut buf) {
                Ok(n) => assert_eq!(n, 0),
                Err(e) => break e,
            }
            assert!(Instant::now() < deadline, "stalled body never timed out");
        };
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(!conn.is_complete());
        drop(tx);
    }

    #[test]
    fn body_errors_are_passed_through() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let mut conn = HttpConnection::new(rx, None, &config());
        tx.send(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(conn.read(&mut buf).unwrap_err().kind(), io::ErrorKind::ConnectionReset);
    }
}
