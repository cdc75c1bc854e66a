//! Fixed-capacity look-back window over the most recent audio.
//!
//! Holds the last few seconds of audio so a wake-word scan always sees the
//! phrase in context. Oldest samples are evicted first.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Copy of the window taken for a scan, tagged with the stream position of
/// its last sample.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub samples: Vec<f32>,
    /// Total samples ever appended when the snapshot was taken.
    pub end_position: u64,
}

impl Snapshot {
    /// The last `count` samples of the snapshot (or all of them if shorter).
    pub fn tail(&self, count: usize) -> &[f32] {
        let start = self.samples.len().saturating_sub(count);
        &self.samples[start..]
    }
}

#[derive(Debug, Clone)]
pub struct RollingContextBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
    /// Monotonic count of samples ever appended, survives `clear()`.
    position: u64,
}

impl RollingContextBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            position: 0,
        }
    }

    /// Append samples, evicting the oldest beyond capacity.
    pub fn append(&mut self, samples: &[f32]) {
        self.position += samples.len() as u64;
        if samples.len() >= self.capacity {
            self.samples.clear();
            self.samples
                .extend(&samples[samples.len() - self.capacity..]);
            return;
        }
        let overflow = (self.samples.len() + samples.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(samples);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            samples: self.samples.iter().copied().collect(),
            end_position: self.position,
        }
    }

    /// Samples appended after stream position `position` that are still held.
    pub fn tail_since(&self, position: u64) -> Vec<f32> {
        let newer = self.position.saturating_sub(position);
        let count = usize::try_from(newer)
            .unwrap_or(usize::MAX)
            .min(self.samples.len());
        self.samples
            .iter()
            .skip(self.samples.len() - count)
            .copied()
            .collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Rolling buffer shared between the segmenter and anything that observes it.
///
/// Every read and write goes through the one lock, so a snapshot never sees
/// a half-applied append.
#[derive(Debug, Clone)]
pub struct RollingContext {
    inner: Arc<Mutex<RollingContextBuffer>>,
}

impl RollingContext {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RollingContextBuffer::new(capacity))),
        }
    }

    /// Lock the buffer. A poisoned lock still holds consistent samples, so recover it.
    pub fn lock(&self) -> MutexGuard<'_, RollingContextBuffer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, samples: &[f32]) {
        self.lock().append(samples);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    pub fn tail_since(&self, position: u64) -> Vec<f32> {
        self.lock().tail_since(position)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
