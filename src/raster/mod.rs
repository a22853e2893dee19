//! Intensity-graded waveform rasterization.
pub mod index;
pub mod kernel;
pub mod lanes;
pub mod renderer;
pub mod request;
pub mod ticks;
pub mod variant;

pub use kernel::{AbortReason, DispatchOutcome, KernelInputs, RasterKernel, XPositions, YValues};
pub use renderer::WaveformRenderer;
pub use request::{OutputRaster, RenderRequest};
pub use variant::{KernelVariant, Packing, RenderStyle, TickArithmetic};
