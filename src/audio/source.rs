use crate::error::{Result, VoxgateError};
use crate::pipeline::queue::ChunkProducer;

/// Trait for audio sample sources.
///
/// A source pushes normalized mono f32 samples into the [`ChunkProducer`]
/// it is started with. Live sources (microphones) push from the audio
/// driver's callback and must never block it; the producer takes care of
/// cutting fixed-size chunks and of the drop-oldest overflow policy.
pub trait SampleSource: Send {
    /// Start delivering samples to `producer`.
    ///
    /// Returns once delivery is running. Errors here are startup errors.
    fn start(&mut self, producer: ChunkProducer) -> Result<()>;

    /// Stop delivering samples. After this returns the producer is no longer used.
    fn stop(&mut self) -> Result<()>;

    /// True for sources that end on their own (files), false for live capture.
    fn is_finite(&self) -> bool {
        false
    }

    /// Name for logging.
    fn name(&self) -> &str {
        "source"
    }
}

/// Scripted sample source for tests.
///
/// Pushes its blocks synchronously from `start()`, then signals end of
/// stream when configured as finite.
#[derive(Debug, Clone, Default)]
pub struct MockSampleSource {
    blocks: Vec<Vec<f32>>,
    finite: bool,
    should_fail_start: bool,
    started: bool,
}

impl MockSampleSource {
    /// Create an empty live mock source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a block of samples to deliver on start.
    pub fn with_block(mut self, samples: Vec<f32>) -> Self {
        self.blocks.push(samples);
        self
    }

    /// Queue several blocks.
    pub fn with_blocks(mut self, blocks: impl IntoIterator<Item = Vec<f32>>) -> Self {
        self.blocks.extend(blocks);
        self
    }

    /// Signal end of stream after the last block.
    pub fn finite(mut self) -> Self {
        self.finite = true;
        self
    }

    /// Configure the mock to fail on start.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    /// Check if the source was started.
    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl SampleSource for MockSampleSource {
    fn start(&mut self, mut producer: ChunkProducer) -> Result<()> {
        if self.should_fail_start {
            return Err(VoxgateError::AudioCapture {
                message: "mock audio error".to_string(),
            });
        }
        self.started = true;
        for block in self.blocks.drain(..) {
            producer.push_samples(&block);
        }
        if self.finite {
            producer.end_of_stream();
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }

    fn is_finite(&self) -> bool {
        self.finite
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::{OverflowPolicy, chunk_queue};
    use crate::pipeline::types::QueueItem;

    #[test]
    fn test_mock_source_delivers_blocks_as_chunks() {
        let (producer, consumer) = chunk_queue(8, 4, OverflowPolicy::Block);
        let mut source = MockSampleSource::new()
            .with_block(vec![0.1; 4])
            .with_block(vec![0.2; 4])
            .finite();

        source.start(producer).unwrap();
        assert!(source.is_started());

        let first = consumer.recv().unwrap();
        let second = consumer.recv().unwrap();
        let third = consumer.recv().unwrap();
        match (first, second, third) {
            (QueueItem::Chunk(a), QueueItem::Chunk(b), QueueItem::EndOfStream) => {
                assert_eq!(a.samples, vec![0.1; 4]);
                assert_eq!(b.samples, vec![0.2; 4]);
                assert_eq!(a.sequence + 1, b.sequence);
            }
            other => panic!("unexpected queue contents: {:?}", other),
        }
    }

    #[test]
    fn test_mock_source_start_failure() {
        let (producer, _consumer) = chunk_queue(8, 4, OverflowPolicy::Block);
        let mut source = MockSampleSource::new().with_start_failure();
        assert!(source.start(producer).is_err());
        assert!(!source.is_started());
    }

    #[test]
    fn test_mock_source_is_object_safe() {
        let source: Box<dyn SampleSource> = Box::new(MockSampleSource::new());
        assert_eq!(source.name(), "mock");
        assert!(!source.is_finite());
    }
}
