use log::trace;

use crate::drivers::ScopeError;
use crate::raster::index::build_column_index;
use crate::raster::kernel::{DispatchOutcome, KernelInputs, RasterKernel, XPositions, YValues};
use crate::raster::request::{OutputRaster, RenderRequest};
use crate::raster::ticks::split_ticks;
use crate::raster::variant::{KernelVariant, Packing, TickArithmetic};
use crate::types::CapturedWaveform;

/// Host-side companion of one channel's kernel.
///
/// Owns the persistent raster and the scratch buffers derived from each
/// capture (column index, split ticks), so a display loop only hands it
/// waveforms.
pub struct WaveformRenderer {
    kernel: RasterKernel,
    request: RenderRequest,
    raster: OutputRaster,
    column_index: Vec<u32>,
    split_words: Vec<u32>,
}

impl WaveformRenderer {
    pub fn new(variant: KernelVariant, request: RenderRequest) -> Result<Self, ScopeError> {
        request.validate()?;
        Ok(Self {
            kernel: RasterKernel::resolve(variant)?,
            raster: OutputRaster::for_request(&request),
            request,
            column_index: Vec::new(),
            split_words: Vec::new(),
        })
    }

    pub fn variant(&self) -> KernelVariant {
        self.kernel.variant()
    }

    pub fn request(&self) -> &RenderRequest {
        &self.request
    }

    /// Replaces the view parameters. The raster keeps its history unless the
    /// window size changed.
    pub fn set_request(&mut self, request: RenderRequest) -> Result<(), ScopeError> {
        request.validate()?;
        self.raster.ensure_shape(request.height(), request.width());
        self.request = request;
        Ok(())
    }

    pub fn raster(&self) -> &OutputRaster {
        &self.raster
    }

    pub fn clear(&mut self) {
        self.raster.clear();
    }

    pub fn render(&mut self, waveform: &CapturedWaveform) -> Result<DispatchOutcome, ScopeError> {
        waveform.validate()?;
        let variant = self.kernel.variant();
        if waveform.kind() != variant.kind {
            return Err(ScopeError::SampleKindMismatch(variant));
        }
        let dense = waveform.is_dense_packed();
        if dense != (variant.packing == Packing::Dense) {
            return Err(ScopeError::InvalidRequest(format!(
                "{:?} kernel cannot draw a {} capture",
                variant.packing,
                if dense { "dense" } else { "sparse" }
            )));
        }

        let depth = u32::try_from(waveform.len())
            .map_err(|_| ScopeError::InvalidRequest(format!("{} samples", waveform.len())))?;
        self.request.depth = depth;
        let req = self.request;

        let mut inputs = KernelInputs::dense(YValues::from(&waveform.samples));
        if let Some(offsets) = &waveform.offsets {
            self.column_index = build_column_index(offsets, &req);
            let x = match variant.arithmetic {
                TickArithmetic::Native => XPositions::Native(offsets),
                TickArithmetic::Emulated => {
                    self.split_words = split_ticks(offsets);
                    XPositions::Split(&self.split_words)
                }
            };
            inputs.x = Some(x);
            inputs.column_index = Some(&self.column_index);
        }
        if !variant.is_interpolated() {
            match &waveform.durations {
                Some(durations) => inputs.durations = Some(durations),
                None if variant.needs_durations() => {
                    return Err(ScopeError::MissingBinding {
                        variant,
                        binding: "durations",
                    });
                }
                None => {}
            }
        }

        let outcome = self.kernel.dispatch(&req, &inputs, &mut self.raster);
        trace!("rendered {} samples with {:?}: {:?}", depth, variant, outcome);
        Ok(outcome)
    }
}
