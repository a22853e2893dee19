use serde::{Deserialize, Serialize};

use crate::types::{CapturedWaveform, SampleKind};

/// How sample x positions reach the kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Packing {
    /// Uniform stride; position comes from the index.
    Dense,
    /// One tick per sample plus a column→first-sample index.
    Sparse,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RenderStyle {
    /// Line segments between consecutive samples.
    Interpolated,
    /// Each sample held for its duration (step rendering).
    FixedDuration,
    /// Bars from the baseline, saturating accumulation.
    Histogram,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TickArithmetic {
    Native,
    /// Ticks bound as `(lo, hi)` u32 pairs.
    Emulated,
}

/// One member of the kernel family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelVariant {
    pub kind: SampleKind,
    pub packing: Packing,
    pub style: RenderStyle,
    pub arithmetic: TickArithmetic,
}

impl KernelVariant {
    pub const fn new(
        kind: SampleKind,
        packing: Packing,
        style: RenderStyle,
        arithmetic: TickArithmetic,
    ) -> Self {
        Self {
            kind,
            packing,
            style,
            arithmetic,
        }
    }

    /// Picks kind and packing from the waveform itself.
    pub fn for_waveform(
        waveform: &CapturedWaveform,
        style: RenderStyle,
        arithmetic: TickArithmetic,
    ) -> Self {
        let packing = if waveform.is_dense_packed() {
            Packing::Dense
        } else {
            Packing::Sparse
        };
        Self::new(waveform.kind(), packing, style, arithmetic)
    }

    pub fn is_interpolated(&self) -> bool {
        self.style == RenderStyle::Interpolated
    }

    /// Fewest samples the style can draw anything with.
    pub fn min_depth(&self) -> usize {
        if self.is_interpolated() {
            2
        } else {
            1
        }
    }

    pub fn needs_positions(&self) -> bool {
        self.packing == Packing::Sparse
    }

    /// Dense step rendering falls back to one tick per sample.
    pub fn needs_durations(&self) -> bool {
        !self.is_interpolated() && self.packing == Packing::Sparse
    }

    pub fn is_supported(&self) -> bool {
        !(self.kind == SampleKind::Digital && self.is_interpolated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_requirements_follow_style_and_packing() {
        let v = KernelVariant::new(
            SampleKind::Analog,
            Packing::Sparse,
            RenderStyle::Interpolated,
            TickArithmetic::Emulated,
        );
        assert_eq!(v.min_depth(), 2);
        assert!(v.needs_positions());
        assert!(!v.needs_durations());

        let step = KernelVariant {
            style: RenderStyle::FixedDuration,
            ..v
        };
        assert_eq!(step.min_depth(), 1);
        assert!(step.needs_durations());

        let digital_lines = KernelVariant {
            kind: SampleKind::Digital,
            ..v
        };
        assert!(!digital_lines.is_supported());
    }

    #[test]
    fn variant_roundtrips_through_json_config() {
        let json = r#"{"kind":"Digital","packing":"Sparse","style":"FixedDuration","arithmetic":"Native"}"#;
        let v: KernelVariant = serde_json::from_str(json).unwrap();
        assert_eq!(v.kind, SampleKind::Digital);
        assert!(v.is_supported());
    }
}
