use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::drivers::ScopeError;
use crate::raster::lanes::MAX_HEIGHT;
use crate::raster::ticks::SplitTick;

/// Parameter block for one kernel dispatch.
///
/// Column-space x of sample `i` is `(tick(i) + inner_xoff) * xscale + xoff`;
/// row-space y of value `v` is `(v + yoff) * yscale + ybase`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderRequest {
    pub window_height: u32,
    pub window_width: u32,
    /// Total samples in the bound buffers.
    pub depth: u32,
    /// First sample of the visible window, used by dense packing.
    pub offset_samples: u32,
    /// Brightness of one hit.
    pub alpha: f32,
    /// Pixels per tick.
    pub xscale: f32,
    pub xoff: f32,
    pub yscale: f32,
    pub yoff: f32,
    pub ybase: f32,
    /// Weight of the previous frame; zero disables persistence.
    pub persist_scale: f32,
    /// Time origin shift in ticks.
    pub inner_xoff: i64,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self {
            window_height: 256,
            window_width: 1024,
            depth: 0,
            offset_samples: 0,
            alpha: 1.0,
            xscale: 1.0,
            xoff: 0.0,
            yscale: 1.0,
            yoff: 0.0,
            ybase: 0.0,
            persist_scale: 0.0,
            inner_xoff: 0,
        }
    }
}

impl RenderRequest {
    pub fn from_json(json: &str) -> Result<Self, ScopeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Two-word form of `inner_xoff` for the emulated variants.
    pub fn inner_xoff_words(&self) -> SplitTick {
        SplitTick::from_i64(self.inner_xoff)
    }

    pub fn height(&self) -> usize {
        self.window_height as usize
    }

    pub fn width(&self) -> usize {
        self.window_width as usize
    }

    /// Host-side check. The kernel itself silently skips requests that fail
    /// its guards, so callers that want an error call this first.
    pub fn validate(&self) -> Result<(), ScopeError> {
        if self.height() > MAX_HEIGHT {
            return Err(ScopeError::InvalidRequest(format!(
                "window height {} exceeds {MAX_HEIGHT}",
                self.window_height
            )));
        }
        if self.window_height == 0 || self.window_width == 0 {
            return Err(ScopeError::InvalidRequest("empty window".into()));
        }
        if !(self.xscale.is_finite() && self.xscale > 0.0) {
            return Err(ScopeError::InvalidRequest(format!(
                "xscale must be positive, got {}",
                self.xscale
            )));
        }
        let finite = [
            self.alpha,
            self.xoff,
            self.yscale,
            self.yoff,
            self.ybase,
            self.persist_scale,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(ScopeError::InvalidRequest("non-finite coefficient".into()));
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn row_of(&self, value: f32) -> f32 {
        (value + self.yoff) * self.yscale + self.ybase
    }
}

/// Persistent brightness image, indexed `[row, column]`.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputRaster {
    pixels: Array2<f32>,
}

impl OutputRaster {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            pixels: Array2::zeros((height, width)),
        }
    }

    pub fn for_request(request: &RenderRequest) -> Self {
        Self::new(request.height(), request.width())
    }

    /// (height, width)
    pub fn dim(&self) -> (usize, usize) {
        self.pixels.dim()
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.pixels[[row, col]]
    }

    pub fn pixels(&self) -> &Array2<f32> {
        &self.pixels
    }

    /// Reallocates (and so forgets history) only when the window changed.
    pub fn ensure_shape(&mut self, height: usize, width: usize) {
        if self.dim() != (height, width) {
            self.pixels = Array2::zeros((height, width));
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0.0);
    }

    /// Rows of `col` that are nonzero.
    pub fn lit_rows(&self, col: usize) -> Vec<usize> {
        self.pixels
            .column(col)
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(row, _)| row)
            .collect()
    }

    pub(crate) fn write_column(&mut self, col: usize, values: &[f32]) {
        for (dst, src) in self.pixels.column_mut(col).iter_mut().zip(values) {
            *dst = *src;
        }
    }

    /// Raw bit patterns, for exact comparisons between frames.
    pub fn to_bits(&self) -> Vec<u32> {
        self.pixels.iter().map(|v| v.to_bits()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_loads_from_partial_json() {
        let req = RenderRequest::from_json(
            r#"{"window_height": 480, "window_width": 640, "depth": 100, "inner_xoff": -5000000000}"#,
        )
        .unwrap();
        assert_eq!(req.window_height, 480);
        assert_eq!(req.alpha, 1.0);
        assert_eq!(req.inner_xoff_words().to_i64(), -5_000_000_000);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn validate_rejects_tall_windows_and_bad_scale() {
        let tall = RenderRequest {
            window_height: MAX_HEIGHT as u32 + 1,
            ..RenderRequest::default()
        };
        assert!(tall.validate().is_err());
        let flat = RenderRequest {
            xscale: 0.0,
            ..RenderRequest::default()
        };
        assert!(flat.validate().is_err());
        assert!(RenderRequest::from_json("{not json").is_err());
    }

    #[test]
    fn ensure_shape_keeps_history_when_unchanged() {
        let mut raster = OutputRaster::new(4, 3);
        raster.write_column(1, &[0.0, 2.0, 0.0, 1.0]);
        raster.ensure_shape(4, 3);
        assert_eq!(raster.lit_rows(1), vec![1, 3]);
        raster.ensure_shape(5, 3);
        assert!(raster.lit_rows(1).is_empty());
    }
}
