//! Bounded chunk queue between the capture callback and the listener worker.
//!
//! The producer side cuts incoming samples into fixed-size chunks and never
//! blocks a live source: when the queue is full the oldest queued chunk is
//! discarded and counted. File replay uses the blocking policy instead so no
//! audio is lost.

use crate::pipeline::types::{AudioChunk, QueueItem};
use crossbeam_channel::{Receiver, RecvError, Sender, TrySendError, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// What the producer does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Discard the oldest queued chunk. Never blocks.
    DropOldest,
    /// Wait for room. Only for sources that are not real-time.
    Block,
}

/// Create a queue holding up to `capacity` chunks of `chunk_samples` samples.
pub fn chunk_queue(
    capacity: usize,
    chunk_samples: usize,
    policy: OverflowPolicy,
) -> (ChunkProducer, ChunkConsumer) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    let consumer_alive = Arc::new(AtomicBool::new(true));

    let evict = match policy {
        OverflowPolicy::DropOldest => Some(rx.clone()),
        OverflowPolicy::Block => None,
    };

    let producer = ChunkProducer {
        tx,
        evict,
        pending: Vec::with_capacity(chunk_samples),
        chunk_samples: chunk_samples.max(1),
        next_sequence: 0,
        dropped: Arc::clone(&dropped),
        consumer_alive: Arc::clone(&consumer_alive),
        disconnected: false,
    };
    let consumer = ChunkConsumer {
        rx,
        dropped,
        alive: consumer_alive,
    };
    (producer, consumer)
}

/// Producer half, owned by the sample source.
pub struct ChunkProducer {
    tx: Sender<QueueItem>,
    /// Receiver clone used to evict the oldest chunk. `None` under `Block`.
    evict: Option<Receiver<QueueItem>>,
    pending: Vec<f32>,
    chunk_samples: usize,
    next_sequence: u64,
    dropped: Arc<AtomicU64>,
    consumer_alive: Arc<AtomicBool>,
    disconnected: bool,
}

impl ChunkProducer {
    /// Append samples; every time a full chunk accumulates it is enqueued.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let mut rest = samples;
        while !rest.is_empty() {
            let room = self.chunk_samples - self.pending.len();
            let take = room.min(rest.len());
            self.pending.extend_from_slice(&rest[..take]);
            rest = &rest[take..];

            if self.pending.len() == self.chunk_samples {
                let full = std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.chunk_samples),
                );
                self.enqueue_chunk(full);
            }
        }
    }

    /// Flush a trailing partial chunk and mark the end of a finite stream.
    pub fn end_of_stream(mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.enqueue_chunk(rest);
        }
        self.enqueue(QueueItem::EndOfStream);
    }

    /// True once the consumer is gone.
    pub fn is_closed(&self) -> bool {
        self.disconnected || !self.consumer_alive.load(Ordering::Acquire)
    }

    /// Chunks discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Handle for injecting the stop sentinel.
    pub fn control(&self) -> QueueControl {
        QueueControl {
            tx: self.tx.clone(),
            evict: self.evict.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    fn enqueue_chunk(&mut self, samples: Vec<f32>) {
        let chunk = AudioChunk::new(samples, self.next_sequence);
        self.next_sequence += 1;
        self.enqueue(QueueItem::Chunk(chunk));
    }

    fn enqueue(&mut self, item: QueueItem) {
        if self.is_closed() {
            return;
        }
        match self.evict.clone() {
            None => {
                if self.tx.send(item).is_err() {
                    self.disconnected = true;
                }
            }
            Some(evict) => self.offer(item, &evict),
        }
    }

    fn offer(&mut self, mut item: QueueItem, evict: &Receiver<QueueItem>) {
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return,
                Err(TrySendError::Disconnected(_)) => {
                    self.disconnected = true;
                    return;
                }
                Err(TrySendError::Full(returned)) => {
                    item = returned;
                    match evict.try_recv() {
                        Ok(QueueItem::Chunk(_)) => {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(control) => {
                            // Never lose a sentinel; the incoming chunk gives way instead.
                            let _ = self.tx.try_send(control);
                            if matches!(item, QueueItem::Chunk(_)) {
                                self.dropped.fetch_add(1, Ordering::Relaxed);
                            }
                            return;
                        }
                        Err(_) => {}
                    }
                }
            }
        }
    }
}

/// Sends the stop sentinel into the queue.
#[derive(Clone)]
pub struct QueueControl {
    tx: Sender<QueueItem>,
    evict: Option<Receiver<QueueItem>>,
    dropped: Arc<AtomicU64>,
}

impl QueueControl {
    /// Queue `Stop` behind any pending chunks. Makes room if the queue is full.
    pub fn stop(&self) {
        let mut item = QueueItem::Stop;
        loop {
            match self.tx.try_send(item) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(returned)) => {
                    item = returned;
                    match &self.evict {
                        Some(evict) => {
                            if let Ok(QueueItem::Chunk(_)) = evict.try_recv() {
                                self.dropped.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        None => {
                            let _ = self.tx.send(item);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Consumer half, owned by the listener worker.
pub struct ChunkConsumer {
    rx: Receiver<QueueItem>,
    dropped: Arc<AtomicU64>,
    alive: Arc<AtomicBool>,
}

impl ChunkConsumer {
    pub fn recv(&self) -> Result<QueueItem, RecvError> {
        self.rx.recv()
    }

    /// Underlying receiver, for `select!`.
    pub fn receiver(&self) -> &Receiver<QueueItem> {
        &self.rx
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Drop for ChunkConsumer {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
    }
}
