//! Single-producer single-consumer byte ring between the capture and
//! analysis threads. The producer accepts as much of each block as fits
//! and never overwrites unread data; the consumer reads through a
//! claim/commit pair, so bytes stay in place until explicitly released.

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

/// Creates the two ends of a PCM byte ring with a fixed capacity.
pub fn pcm_ring(capacity: usize) -> (RingProducer, RingConsumer) {
    let (producer, consumer) = HeapRb::<u8>::new(capacity).split();
    (
        RingProducer { inner: producer },
        RingConsumer { inner: consumer },
    )
}

/// Write half of the ring, owned by the capture thread.
pub struct RingProducer {
    inner: HeapProducer<u8>,
}

impl RingProducer {
    /// Copies as many of `bytes` as currently fit and returns the number
    /// accepted. Never blocks and never overwrites unread data; a full
    /// ring accepts zero.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        self.inner.push_slice(bytes)
    }
}

/// Read half of the ring, owned by the analysis thread.
pub struct RingConsumer {
    inner: HeapConsumer<u8>,
}

impl RingConsumer {
    /// Number of buffered bytes waiting to be read.
    pub fn available(&self) -> usize {
        self.inner.len()
    }

    /// Borrows the contiguous readable region, up to `max` bytes, without
    /// consuming it. The claim may be shorter than both `max` and
    /// `available()` when the buffered data wraps the physical end of the
    /// buffer; a follow-up claim after committing picks up the remainder.
    pub fn read_claim(&self, max: usize) -> &[u8] {
        let (head, _) = self.inner.as_slices();
        let take = head.len().min(max);
        &head[..take]
    }

    /// Releases up to `count` bytes back to the producer and returns the
    /// number actually released.
    pub fn read_commit(&mut self, count: usize) -> usize {
        self.inner.skip(count)
    }
}
