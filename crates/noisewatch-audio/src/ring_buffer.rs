use noisewatch_foundation::AudioError;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::warn;

/// Sample ring buffer using rtrb (real-time safe)
pub struct SampleRing {
    producer: Producer<i16>,
    consumer: Consumer<i16>,
}

impl SampleRing {
    /// Create a new ring buffer with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (producer, consumer) = RingBuffer::new(capacity);
        Self { producer, consumer }
    }

    /// Split into producer and consumer for separate threads
    pub fn split(self) -> (SampleProducer, SampleConsumer) {
        (
            SampleProducer {
                producer: self.producer,
            },
            SampleConsumer {
                consumer: self.consumer,
            },
        )
    }
}

/// Producer half of the ring buffer (for the capture callback)
pub struct SampleProducer {
    producer: Producer<i16>,
}

impl SampleProducer {
    /// Write samples from the capture callback (non-blocking)
    pub fn write(&mut self, samples: &[i16]) -> Result<usize, AudioError> {
        let mut chunk = match self.producer.write_chunk(samples.len()) {
            Ok(chunk) => chunk,
            Err(_) => {
                warn!(
                    "Ring buffer overflow: tried to write {} samples, buffer full",
                    samples.len()
                );
                return Err(AudioError::BufferOverflow {
                    count: samples.len(),
                });
            }
        };

        // Write may wrap; fill both slices
        let (first, second) = chunk.as_mut_slices();
        let split = first.len();
        if split > 0 {
            first.copy_from_slice(&samples[..split]);
        }
        if !second.is_empty() {
            second.copy_from_slice(&samples[split..]);
        }
        chunk.commit_all();
        Ok(samples.len())
    }

    /// Check available space
    pub fn space(&self) -> usize {
        self.producer.slots()
    }
}

/// Consumer half of the ring buffer (for the sampling thread)
pub struct SampleConsumer {
    consumer: Consumer<i16>,
}

impl SampleConsumer {
    /// Read available samples (non-blocking)
    pub fn read(&mut self, buffer: &mut [i16]) -> usize {
        let chunk = match self.consumer.read_chunk(buffer.len()) {
            Ok(chunk) => chunk,
            Err(rtrb::chunks::ChunkError::TooFewSlots(available)) => {
                if available == 0 {
                    return 0;
                }
                match self.consumer.read_chunk(available) {
                    Ok(chunk) => chunk,
                    Err(_) => return 0,
                }
            }
        };

        let len = chunk.len();
        let (first, second) = chunk.as_slices();
        let split = first.len();
        if split > 0 {
            buffer[..split].copy_from_slice(first);
        }
        if !second.is_empty() {
            buffer[split..split + second.len()].copy_from_slice(second);
        }
        chunk.commit_all();
        len
    }

    /// Discard up to `count` of the oldest samples, returning how many
    /// were actually dropped.
    pub fn skip(&mut self, count: usize) -> usize {
        let chunk = match self.consumer.read_chunk(count) {
            Ok(chunk) => chunk,
            Err(rtrb::chunks::ChunkError::TooFewSlots(available)) => {
                if available == 0 {
                    return 0;
                }
                match self.consumer.read_chunk(available) {
                    Ok(chunk) => chunk,
                    Err(_) => return 0,
                }
            }
        };

        let len = chunk.len();
        chunk.commit_all();
        len
    }

    /// Check available samples to read
    pub fn available(&self) -> usize {
        self.consumer.slots()
    }
}
