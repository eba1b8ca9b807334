use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::capture::{CaptureThread, StreamShape};
use crate::ring_buffer::{SampleConsumer, SampleRing};
use noisewatch_foundation::AudioError;
use noisewatch_meter::{AudioFrame, FrameSource, MeterConfig};
use noisewatch_telemetry::MeterMetrics;

/// Frames buffered in the ring between reads. At the default frame size
/// this holds roughly three quarters of a second of audio.
const RING_FRAMES: usize = 32;

const READ_TIMEOUT: Duration = Duration::from_millis(250);
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Live microphone source: a capture thread fills a ring buffer and
/// `read_frame` drains one fixed-size frame per call.
pub struct CpalFrameSource {
    capture: Option<CaptureThread>,
    consumer: SampleConsumer,
    frame_size: usize,
    shape: StreamShape,
    metrics: Option<Arc<MeterMetrics>>,
    discarded: u64,
}

impl CpalFrameSource {
    pub fn open(config: &MeterConfig, device_name: Option<String>) -> Result<Self, AudioError> {
        let ring = SampleRing::new(config.frame_size * RING_FRAMES);
        let (producer, consumer) = ring.split();
        let capture = CaptureThread::spawn(config, producer, device_name)?;
        let shape = capture.shape();
        Ok(Self {
            capture: Some(capture),
            consumer,
            frame_size: config.frame_size,
            shape,
            metrics: None,
            discarded: 0,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MeterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn shape(&self) -> StreamShape {
        self.shape
    }
}

impl FrameSource for CpalFrameSource {
    fn read_frame(&mut self) -> Result<AudioFrame, AudioError> {
        let capture = match &self.capture {
            Some(capture) => capture,
            None => {
                return Err(AudioError::ReadFailed {
                    reason: "source is closed".to_string(),
                })
            }
        };
        if capture.is_failed() {
            return Err(AudioError::ReadFailed {
                reason: "capture stream reported an error".to_string(),
            });
        }

        // Drop backlog beyond one frame so readings stay near-live; a
        // stale frame would be attributed to the wrong moment.
        let backlog = self.consumer.available();
        if backlog > self.frame_size {
            let dropped = self.consumer.skip(backlog - self.frame_size);
            self.discarded += dropped as u64;
            if let Some(m) = &self.metrics {
                m.add_samples_discarded(dropped as u64);
            }
        }

        let mut samples = vec![0i16; self.frame_size];
        let mut filled = 0;
        let deadline = Instant::now() + READ_TIMEOUT;
        while filled < self.frame_size {
            filled += self.consumer.read(&mut samples[filled..]);
            if filled >= self.frame_size {
                break;
            }
            if Instant::now() >= deadline {
                return Err(AudioError::NoDataTimeout {
                    duration: READ_TIMEOUT,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
        Ok(AudioFrame { samples })
    }

    fn close(&mut self) {
        if let Some(capture) = self.capture.take() {
            let stats = capture.stats();
            tracing::info!(
                callbacks = stats.callbacks.load(Ordering::Relaxed),
                samples_captured = stats.samples_captured.load(Ordering::Relaxed),
                samples_dropped = stats.samples_dropped.load(Ordering::Relaxed),
                samples_discarded = self.discarded,
                "Closing audio source"
            );
            capture.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_a_closed_source_fails() {
        let ring = SampleRing::new(64);
        let (_producer, consumer) = ring.split();
        let mut source = CpalFrameSource {
            capture: None,
            consumer,
            frame_size: 4,
            shape: StreamShape {
                sample_rate: 44_100,
                channels: 1,
            },
            metrics: None,
            discarded: 0,
        };

        let err = source.read_frame().expect_err("closed source");
        assert!(matches!(err, AudioError::ReadFailed { .. }));

        // Closing again must not panic with no capture thread to stop
        source.close();
    }
}

#[cfg(all(test, feature = "live-hardware-tests"))]
mod live_tests {
    use super::*;

    #[test]
    fn reads_full_frames_from_the_default_device() {
        let config = MeterConfig::default();
        let mut source = CpalFrameSource::open(&config, None).expect("default device");
        for _ in 0..3 {
            let frame = source.read_frame().expect("frame");
            assert_eq!(frame.samples.len(), config.frame_size);
            std::thread::sleep(config.tick_period());
        }
        source.close();
    }
}
