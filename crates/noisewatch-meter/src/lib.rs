pub mod config;
pub mod decoder;
pub mod interval;
pub mod monitor;
pub mod sample_loop;
pub mod scale;
pub mod types;

// Core exports - grouped and sorted alphabetically
pub use config::MeterConfig;
pub use decoder::FrameDecoder;
pub use interval::IntervalAggregator;
pub use monitor::ThresholdMonitor;
pub use sample_loop::SampleLoop;
pub use scale::{classify, BandColor, IntensityBand};
pub use types::{
    AudioFrame, DisplayUpdate, IntervalAverage, LoopState, LoudnessSample, ViolationRecord,
    WarningUpdate,
};

use noisewatch_foundation::AudioError;

/// Source of raw audio frames, pulled once per sampling tick
pub trait FrameSource: Send {
    /// Read the next frame, blocking briefly until enough samples arrive
    fn read_frame(&mut self) -> Result<AudioFrame, AudioError>;

    /// Release the underlying device; called once on shutdown
    fn close(&mut self);
}

/// Receiver for the display updates emitted by the sample loop
pub trait PresentationSink: Send {
    fn publish(&mut self, update: DisplayUpdate);
}
