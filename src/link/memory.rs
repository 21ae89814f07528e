use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use super::{ByteSink, ByteSource};

/// In-memory loopback; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    buffer: Arc<Mutex<VecDeque<u8>>>,
}

impl MemoryLink {
    /// Creates an empty loopback
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes as if they had arrived over the air
    pub fn push(&self, bytes: &[u8]) {
        self.lock().extend(bytes.iter().copied());
    }

    /// Number of bytes waiting to be read
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<u8>> {
        // A poisoned buffer is still a valid byte queue
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ByteSource for MemoryLink {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.lock().pop_front())
    }
}

impl ByteSink for MemoryLink {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.push(bytes);
        Ok(())
    }
}

/// Sink that loses or damages writes at configured rates
pub struct LossyLink<S> {
    inner: S,
    rng: StdRng,
    drop_rate: f64,
    corrupt_rate: f64,
    dropped: u64,
    corrupted: u64,
}

impl<S: ByteSink> LossyLink<S> {
    /// Wraps `inner`; rates are probabilities per write in [0, 1]
    pub fn new(inner: S, seed: u64, drop_rate: f64, corrupt_rate: f64) -> Self {
        LossyLink {
            inner,
            rng: StdRng::seed_from_u64(seed),
            drop_rate: drop_rate.clamp(0.0, 1.0),
            corrupt_rate: corrupt_rate.clamp(0.0, 1.0),
            dropped: 0,
            corrupted: 0,
        }
    }

    /// Writes lost so far
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Writes damaged so far
    pub fn corrupted(&self) -> u64 {
        self.corrupted
    }

    /// The wrapped sink
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ByteSink> ByteSink for LossyLink<S> {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        if self.rng.gen_bool(self.drop_rate) {
            self.dropped += 1;
            trace!(len = bytes.len(), "lossy link dropped write");
            return Ok(());
        }
        if self.rng.gen_bool(self.corrupt_rate) {
            self.corrupted += 1;
            let mut damaged = bytes.to_vec();
            let byte = self.rng.gen_range(0..damaged.len());
            let bit = self.rng.gen_range(0..8);
            damaged[byte] ^= 1 << bit;
            trace!(byte, bit, "lossy link flipped a bit");
            return self.inner.write_bytes(&damaged);
        }
        self.inner.write_bytes(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
