use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::device::DeviceManager;
use crate::ring_buffer::SampleProducer;
use noisewatch_foundation::AudioError;
use noisewatch_meter::MeterConfig;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Shape the device actually opened with. Samples in the ring are always
/// folded to mono regardless of the channel count reported here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamShape {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Default)]
pub struct CaptureStats {
    pub callbacks: AtomicU64,
    pub samples_captured: AtomicU64,
    pub samples_dropped: AtomicU64,
}

/// Handle to the dedicated capture thread. cpal streams are not `Send`,
/// so the stream is created, played, and dropped entirely on that thread;
/// this handle only carries shared flags and counters.
pub struct CaptureThread {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
    stream_failed: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    shape: StreamShape,
}

impl CaptureThread {
    /// Open the device and start streaming into `producer`. Blocks until
    /// the stream is playing or the open failed; a thread that never
    /// reports back within the startup timeout counts as an open failure.
    pub fn spawn(
        config: &MeterConfig,
        producer: SampleProducer,
        device_name: Option<String>,
    ) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let stream_failed = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(CaptureStats::default());
        let (ready_tx, ready_rx) = bounded::<Result<StreamShape, AudioError>>(1);

        let want_rate = config.sample_rate_hz;
        let want_channels = config.channels;

        let handle = {
            let stats = Arc::clone(&stats);
            let running = Arc::clone(&running);
            let stream_failed = Arc::clone(&stream_failed);
            thread::Builder::new()
                .name("audio-capture".to_string())
                .spawn(move || {
                    run_capture(
                        device_name,
                        want_rate,
                        want_channels,
                        producer,
                        stats,
                        running,
                        stream_failed,
                        ready_tx,
                    );
                })
                .map_err(|e| AudioError::Fatal(format!("Failed to spawn audio thread: {}", e)))?
        };

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(shape)) => Ok(Self {
                handle,
                running,
                stream_failed,
                stats,
                shape,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Leave the thread detached; it may be stuck inside a
                // blocking host call and will exit on its own once that
                // call returns and sees the flag.
                running.store(false, Ordering::SeqCst);
                Err(AudioError::StreamOpen {
                    reason: format!(
                        "no response from the capture thread within {:?}",
                        STARTUP_TIMEOUT
                    ),
                })
            }
        }
    }

    pub fn shape(&self) -> StreamShape {
        self.shape
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    /// True once the stream's error callback has fired. The stream does
    /// not recover; readers should treat the source as gone.
    pub fn is_failed(&self) -> bool {
        self.stream_failed.load(Ordering::SeqCst)
    }

    pub fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}

#[allow(clippy::too_many_arguments)]
fn run_capture(
    device_name: Option<String>,
    want_rate: u32,
    want_channels: u16,
    producer: SampleProducer,
    stats: Arc<CaptureStats>,
    running: Arc<AtomicBool>,
    stream_failed: Arc<AtomicBool>,
    ready_tx: Sender<Result<StreamShape, AudioError>>,
) {
    let manager = DeviceManager::new();
    let device = match manager.open_device(device_name.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Ok(name) = device.name() {
        tracing::info!(
            "Selected input device: {} (host: {:?})",
            name,
            manager.host_id()
        );
    }

    let (config, sample_format) = match negotiate_config(&device, want_rate, want_channels) {
        Ok(pair) => pair,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if config.sample_rate.0 != want_rate || config.channels != want_channels {
        tracing::warn!(
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "Device does not offer the requested shape, capturing natively"
        );
    }

    let producer = Arc::new(Mutex::new(producer));
    let stream = match build_stream(
        &device,
        &config,
        sample_format,
        producer,
        Arc::clone(&stats),
        Arc::clone(&running),
        stream_failed,
    ) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::StreamOpen {
            reason: e.to_string(),
        }));
        return;
    }

    let shape = StreamShape {
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };
    let _ = ready_tx.send(Ok(shape));

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    drop(stream);
    tracing::info!("Audio capture thread shutting down.");
}

fn negotiate_config(
    device: &cpal::Device,
    want_rate: u32,
    want_channels: u16,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    // First preference: the requested shape, ideally in i16. The decoder's
    // amplitude math assumes 16-bit magnitudes, so native i16 avoids a
    // conversion in the callback.
    if let Ok(ranges) = device.supported_input_configs() {
        let wanted = cpal::SampleRate(want_rate);
        let mut exact = None;
        let mut same_shape = None;
        for range in ranges {
            if range.channels() != want_channels
                || range.min_sample_rate() > wanted
                || range.max_sample_rate() < wanted
            {
                continue;
            }
            if range.sample_format() == SampleFormat::I16 && exact.is_none() {
                exact = Some(range.sample_format());
            }
            if same_shape.is_none() {
                same_shape = Some(range.sample_format());
            }
        }
        if let Some(sample_format) = exact.or(same_shape) {
            return Ok((
                StreamConfig {
                    channels: want_channels,
                    sample_rate: wanted,
                    buffer_size: cpal::BufferSize::Default,
                },
                sample_format,
            ));
        }
    }

    // Otherwise take whatever the host considers default; conversion and
    // mono folding in the callback absorb the difference.
    if let Ok(default_config) = device.default_input_config() {
        return Ok((
            StreamConfig {
                channels: default_config.channels(),
                sample_rate: default_config.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            },
            default_config.sample_format(),
        ));
    }

    if let Ok(mut configs) = device.supported_input_configs() {
        if let Some(config) = configs.next() {
            let sample_format = config.sample_format();
            return Ok((config.with_max_sample_rate().into(), sample_format));
        }
    }

    Err(AudioError::FormatNotSupported {
        format: "no supported input configurations".to_string(),
    })
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    producer: Arc<Mutex<SampleProducer>>,
    stats: Arc<CaptureStats>,
    running: Arc<AtomicBool>,
    stream_failed: Arc<AtomicBool>,
) -> Result<Stream, AudioError> {
    let err_fn = move |err: cpal::StreamError| {
        tracing::error!("Audio stream error: {}", err);
        stream_failed.store(true, Ordering::SeqCst);
    };

    // Common handler after converting to i16
    let channels = config.channels as usize;
    let handle_i16 = move |interleaved: &[i16]| {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        stats.callbacks.fetch_add(1, Ordering::Relaxed);
        if channels <= 1 {
            push_samples(&producer, &stats, interleaved);
        } else {
            MONO_BUFFER.with(|buf| {
                let mut mono = buf.borrow_mut();
                fold_to_mono(interleaved, channels, &mut mono);
                push_samples(&producer, &stats, &mono);
            });
        }
    };

    // Thread-local buffers keep allocations out of the audio callback
    thread_local! {
        static CONVERT_BUFFER: std::cell::RefCell<Vec<i16>> = const { std::cell::RefCell::new(Vec::new()) };
        static MONO_BUFFER: std::cell::RefCell<Vec<i16>> = const { std::cell::RefCell::new(Vec::new()) };
    }

    let stream = match sample_format {
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _: &_| {
                handle_i16(data);
            },
            err_fn,
            None,
        ),
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _: &_| {
                CONVERT_BUFFER.with(|buf| {
                    let mut converted = buf.borrow_mut();
                    converted.clear();
                    converted.reserve(data.len());
                    // Clamp [-1.0, 1.0] and scale to i16
                    for &s in data {
                        let clamped = s.clamp(-1.0, 1.0);
                        converted.push((clamped * 32767.0).round() as i16);
                    }
                    handle_i16(&converted);
                });
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            config,
            move |data: &[u16], _: &_| {
                CONVERT_BUFFER.with(|buf| {
                    let mut converted = buf.borrow_mut();
                    converted.clear();
                    converted.reserve(data.len());
                    // Convert unsigned [0,65535] to signed [-32768,32767]
                    for &s in data {
                        converted.push((s as i32 - 32768) as i16);
                    }
                    handle_i16(&converted);
                });
            },
            err_fn,
            None,
        ),
        SampleFormat::U32 => device.build_input_stream(
            config,
            move |data: &[u32], _: &_| {
                CONVERT_BUFFER.with(|buf| {
                    let mut converted = buf.borrow_mut();
                    converted.clear();
                    converted.reserve(data.len());
                    // Center on 2^31, then shift down to 16-bit range
                    for &s in data {
                        let centered = s as i64 - 2_147_483_648i64;
                        converted.push((centered >> 16) as i16);
                    }
                    handle_i16(&converted);
                });
            },
            err_fn,
            None,
        ),
        SampleFormat::F64 => device.build_input_stream(
            config,
            move |data: &[f64], _: &_| {
                CONVERT_BUFFER.with(|buf| {
                    let mut converted = buf.borrow_mut();
                    converted.clear();
                    converted.reserve(data.len());
                    for &s in data {
                        let clamped = s.clamp(-1.0, 1.0);
                        converted.push((clamped * 32767.0).round() as i16);
                    }
                    handle_i16(&converted);
                });
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::FormatNotSupported {
                format: format!("{:?}", other),
            });
        }
    };

    stream.map_err(|e| AudioError::StreamOpen {
        reason: e.to_string(),
    })
}

fn push_samples(producer: &Mutex<SampleProducer>, stats: &CaptureStats, samples: &[i16]) {
    match producer.lock().write(samples) {
        Ok(written) => {
            stats
                .samples_captured
                .fetch_add(written as u64, Ordering::Relaxed);
        }
        Err(_) => {
            stats
                .samples_dropped
                .fetch_add(samples.len() as u64, Ordering::Relaxed);
        }
    }
}

/// Average each interleaved frame down to one sample. A trailing partial
/// frame is dropped.
fn fold_to_mono(interleaved: &[i16], channels: usize, mono: &mut Vec<i16>) {
    mono.clear();
    mono.reserve(interleaved.len() / channels);
    for group in interleaved.chunks_exact(channels) {
        let sum: i32 = group.iter().map(|&s| i32::from(s)).sum();
        mono.push((sum / channels as i32) as i16);
    }
}

#[cfg(test)]
mod convert_tests {
    use super::fold_to_mono;

    #[test]
    fn f32_to_i16_basic() {
        let src = [-1.0f32, -0.5, 0.0, 0.5, 1.0];
        let expected = [-32767i16, -16384, 0, 16384, 32767];
        let mut out = Vec::new();
        for &s in &src {
            out.push((s.clamp(-1.0, 1.0) * 32767.0).round() as i16);
        }
        assert_eq!(&out[..], &expected);
    }

    #[test]
    fn u16_to_i16_centering() {
        let src = [0u16, 32768, 65535];
        let expected = [-32768i16, 0, 32767];
        let out: Vec<i16> = src.iter().map(|&s| (s as i32 - 32768) as i16).collect();
        assert_eq!(&out[..], &expected);
    }

    #[test]
    fn u32_to_i16_scaling() {
        let src = [0u32, 2_147_483_648u32, 4_294_967_295u32];
        let out: Vec<i16> = src
            .iter()
            .map(|&s| ((s as i64 - 2_147_483_648i64) >> 16) as i16)
            .collect();
        assert_eq!(out[1], 0);
        assert!(out[0] < 0 && out[2] > 0);
    }

    #[test]
    fn stereo_fold_averages_each_frame() {
        let mut mono = Vec::new();
        fold_to_mono(&[10, 20, 30, 50], 2, &mut mono);
        assert_eq!(mono, vec![15, 40]);
    }

    #[test]
    fn fold_handles_extreme_amplitudes_without_overflow() {
        let mut mono = Vec::new();
        fold_to_mono(&[i16::MIN, i16::MIN, i16::MAX, i16::MAX], 2, &mut mono);
        assert_eq!(mono, vec![i16::MIN, i16::MAX]);
    }

    #[test]
    fn fold_drops_a_trailing_partial_frame() {
        let mut mono = Vec::new();
        fold_to_mono(&[10, 20, 30], 2, &mut mono);
        assert_eq!(mono, vec![15]);
    }
}
