pub mod capture;
pub mod device;
pub mod ring_buffer;
pub mod source;

// Public API
pub use capture::{CaptureStats, CaptureThread, StreamShape};
pub use device::{DeviceInfo, DeviceManager};
pub use ring_buffer::{SampleConsumer, SampleProducer, SampleRing};
pub use source::CpalFrameSource;
