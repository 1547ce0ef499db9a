//! Bounded byte ring shared between two adjacent pipeline stages.
//!
//! One stage writes, the next one reads. The ring carries its own lock so the
//! stages never coordinate beyond it:
//! - `write` is best-effort and never blocks or overwrites unread bytes
//! - `read` waits (bounded) for at least one byte
//! - `reset` is the only way to drop buffered bytes, used on format changes

use std::collections::TryReserveError;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Result of a partial transfer into or out of a buffer.
///
/// Partial progress is never an error; callers loop or reschedule when `has_more` is set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// Bytes actually moved.
    pub consumed: usize,
    /// For writes: bytes of the request were left behind.
    /// For reads: the buffer still holds unread bytes.
    pub has_more: bool,
}

/// Fixed-capacity circular byte store.
///
/// `available() + free() == capacity()` holds after every operation.
pub struct RingBuffer {
    capacity: usize,
    inner: Mutex<RingInner>,
    cv: Condvar,
}

struct RingInner {
    buf: Box<[u8]>,
    head: usize,
    len: usize,
}

impl RingBuffer {
    /// Allocate a ring of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self::from_storage(vec![0u8; capacity])
    }

    /// Allocate a ring, reporting allocation failure instead of aborting.
    pub fn try_new(capacity: usize) -> Result<Self, TryReserveError> {
        let mut storage = Vec::new();
        storage.try_reserve_exact(capacity)?;
        storage.resize(capacity, 0);
        Ok(Self::from_storage(storage))
    }

    fn from_storage(storage: Vec<u8>) -> Self {
        Self {
            capacity: storage.len(),
            inner: Mutex::new(RingInner {
                buf: storage.into_boxed_slice(),
                head: 0,
                len: 0,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Readable bytes (best-effort snapshot).
    pub fn available(&self) -> usize {
        self.inner.lock().unwrap().len
    }

    /// Writable bytes (best-effort snapshot).
    pub fn free(&self) -> usize {
        self.capacity - self.available()
    }

    /// Copy up to `free()` bytes of `data` into the ring without blocking.
    pub fn write(&self, data: &[u8]) -> Outcome {
        let mut g = self.inner.lock().unwrap();
        let n = data.len().min(self.capacity - g.len);
        if n > 0 {
            let tail = (g.head + g.len) % self.capacity;
            let first = n.min(self.capacity - tail);
            g.buf[tail..tail + first].copy_from_slice(&data[..first]);
            g.buf[..n - first].copy_from_slice(&data[first..n]);
            g.len += n;
        }
        drop(g);
        if n > 0 {
            self.cv.notify_all();
        }
        Outcome {
            consumed: n,
            has_more: n < data.len(),
        }
    }

    /// Copy up to `out.len()` bytes out of the ring.
    ///
    /// Blocks until at least one byte is readable or `timeout` elapses. A zero timeout
    /// never blocks.
    pub fn read(&self, out: &mut [u8], timeout: Duration) -> Outcome {
        if out.is_empty() {
            return Outcome {
                consumed: 0,
                has_more: self.available() > 0,
            };
        }

        let mut g = self.inner.lock().unwrap();
        if g.len == 0 && !timeout.is_zero() {
            let (ng, _timeout) = self
                .cv
                .wait_timeout_while(g, timeout, |inner| inner.len == 0)
                .unwrap();
            g = ng;
        }

        let n = out.len().min(g.len);
        if n > 0 {
            let first = n.min(self.capacity - g.head);
            out[..first].copy_from_slice(&g.buf[g.head..g.head + first]);
            out[first..n].copy_from_slice(&g.buf[..n - first]);
            g.head = (g.head + n) % self.capacity;
            g.len -= n;
        }
        let has_more = g.len > 0;
        drop(g);
        if n > 0 {
            self.cv.notify_all();
        }
        Outcome {
            consumed: n,
            has_more,
        }
    }

    /// Drop every buffered byte.
    pub fn reset(&self) {
        let mut g = self.inner.lock().unwrap();
        g.head = 0;
        g.len = 0;
        drop(g);
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn write_is_bounded_by_free_space() {
        let ring = RingBuffer::new(8);
        let out = ring.write(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(out, Outcome { consumed: 8, has_more: true });
        assert_eq!(ring.free(), 0);
        assert_eq!(ring.write(&[11]).consumed, 0);
    }

    #[test]
    fn read_wraps_around_the_end() {
        let ring = RingBuffer::new(6);
        ring.write(&[1, 2, 3, 4]);
        let mut buf = [0u8; 3];
        ring.read(&mut buf, Duration::ZERO);
        assert_eq!(buf, [1, 2, 3]);

        let w = ring.write(&[5, 6, 7, 8, 9]);
        assert_eq!(w.consumed, 5);

        let mut all = [0u8; 8];
        let r = ring.read(&mut all, Duration::ZERO);
        assert_eq!(r, Outcome { consumed: 6, has_more: false });
        assert_eq!(&all[..6], &[4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn available_plus_free_is_capacity_after_every_op() {
        let ring = RingBuffer::new(37);
        let mut seed: u32 = 0x1234_5678;
        let mut next = || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (seed >> 16) as usize
        };
        let data = [0xABu8; 64];
        let mut out = [0u8; 64];

        for _ in 0..2_000 {
            match next() % 5 {
                0 | 1 => {
                    ring.write(&data[..next() % 64]);
                }
                2 | 3 => {
                    let n = next() % 64;
                    ring.read(&mut out[..n], Duration::ZERO);
                }
                _ => ring.reset(),
            }
            assert_eq!(ring.available() + ring.free(), ring.capacity());
        }
    }

    #[test]
    fn reset_discards_bytes_written_before_it() {
        let ring = RingBuffer::new(16);
        ring.write(&[1, 1, 1, 1]);
        ring.reset();
        ring.write(&[2, 2]);

        let mut buf = [0u8; 16];
        let r = ring.read(&mut buf, Duration::ZERO);
        assert_eq!(r.consumed, 2);
        assert_eq!(&buf[..2], &[2, 2]);
    }

    #[test]
    fn read_times_out_when_empty() {
        let ring = RingBuffer::new(4);
        let mut buf = [0u8; 4];
        let start = Instant::now();
        let r = ring.read(&mut buf, Duration::from_millis(15));
        assert_eq!(r.consumed, 0);
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn blocked_read_wakes_on_write() {
        let ring = Arc::new(RingBuffer::new(32));
        let reader = ring.clone();
        let handle = thread::spawn(move || {
            let mut buf = [0u8; 32];
            let r = reader.read(&mut buf, Duration::from_secs(5));
            buf[..r.consumed].to_vec()
        });

        thread::sleep(Duration::from_millis(20));
        ring.write(b"abc");
        let got = handle.join().unwrap();
        assert_eq!(got, b"abc");
    }

    #[test]
    fn concurrent_producer_and_consumer_preserve_order() {
        let ring = Arc::new(RingBuffer::new(13));
        let producer = ring.clone();
        let total = 10_000usize;

        let handle = thread::spawn(move || {
            let data: Vec<u8> = (0..total).map(|i| (i % 251) as u8).collect();
            let mut offset = 0;
            while offset < data.len() {
                let out = producer.write(&data[offset..(offset + 7).min(data.len())]);
                offset += out.consumed;
                if out.consumed == 0 {
                    thread::yield_now();
                }
            }
        });

        let mut received = Vec::with_capacity(total);
        let mut buf = [0u8; 5];
        while received.len() < total {
            let r = ring.read(&mut buf, Duration::from_millis(10));
            received.extend_from_slice(&buf[..r.consumed]);
        }
        handle.join().unwrap();

        assert!(received.iter().enumerate().all(|(i, b)| *b == (i % 251) as u8));
    }

    #[test]
    fn zero_capacity_ring_accepts_nothing() {
        let ring = RingBuffer::new(0);
        assert_eq!(ring.write(&[1, 2]).consumed, 0);
        let mut buf = [0u8; 2];
        assert_eq!(ring.read(&mut buf, Duration::ZERO).consumed, 0);
    }

    #[test]
    fn try_new_allocates_requested_capacity() {
        let ring = RingBuffer::try_new(1024).unwrap();
        assert_eq!(ring.capacity(), 1024);
        assert_eq!(ring.free(), 1024);
    }
}
