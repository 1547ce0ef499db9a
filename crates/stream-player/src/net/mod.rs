//! Byte sources for the fetch stage.

mod http_stream;

use std::io;
use std::sync::Arc;

pub use http_stream::{HttpConfig, HttpConnector};

/// An open byte stream. Closed when dropped.
pub trait Connection: Send {
    /// Read up to `out.len()` bytes. `Ok(0)` means nothing arrived; check
    /// [`is_complete`](Self::is_complete) to tell end of stream apart.
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize>;

    /// `true` once every byte of the stream has been returned.
    fn is_complete(&self) -> bool;
}

/// Opens connections to remote URIs.
pub trait Connector: Send + Sync {
    fn open(&self, uri: &str) -> anyhow::Result<Box<dyn Connection>>;
}

/// Connection over bytes already in memory.
pub struct LocalConnection {
    bytes: Arc<[u8]>,
    pos: usize,
}

impl LocalConnection {
    pub fn new(bytes: Arc<[u8]>) -> Self {
        Self { bytes, pos: 0 }
    }
}

impl Connection for LocalConnection {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let rest = &self.bytes[self.pos..];
        let n = rest.len().min(out.len());
        out[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }

    fn is_complete(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}
