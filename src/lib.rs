pub mod drivers;
pub mod engine;
pub mod handshake;
pub mod raster;
pub mod types;

pub use engine::{spawn_thread, AcquisitionConfig, AcquisitionThread};
pub use handshake::{Handshake, ReadyCapture};
pub use types::{CaptureSet, CapturedWaveform, SampleData, SampleKind, StreamId};
