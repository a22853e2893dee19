//! Column rasterizer.
//!
//! One lane group per output column. Lanes stride through the samples that
//! can touch the column, turn each into a vertical extent in row space and
//! accumulate it into the group's row counters; once the scan drains, the
//! counters are tone-mapped into the persistent raster.
//!
//! Every variant of the family runs the same skeleton
//! ([`ColumnProgram::lane_step`]); the variation points are the three traits
//! below and are fixed when [`RasterKernel::dispatch`] picks the
//! monomorphized instance.
use log::debug;
use ndarray::ArrayView1;
use rayon::prelude::*;

use crate::drivers::ScopeError;
use crate::raster::lanes::{LaneGroup, LaneStatus, RowAccumulator, LANES_PER_GROUP, MAX_HEIGHT};
use crate::raster::request::{OutputRaster, RenderRequest};
use crate::raster::ticks::SplitTick;
use crate::raster::variant::{KernelVariant, Packing, RenderStyle, TickArithmetic};
use crate::types::{SampleData, SampleKind};

/// Y-value binding.
#[derive(Clone, Copy, Debug)]
pub enum YValues<'a> {
    Analog(&'a [f32]),
    Digital(&'a [bool]),
}

impl<'a> YValues<'a> {
    pub fn kind(&self) -> SampleKind {
        match self {
            YValues::Analog(_) => SampleKind::Analog,
            YValues::Digital(_) => SampleKind::Digital,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            YValues::Analog(v) => v.len(),
            YValues::Digital(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> From<&'a SampleData> for YValues<'a> {
    fn from(data: &'a SampleData) -> Self {
        match data {
            SampleData::Analog(v) => YValues::Analog(v),
            SampleData::Digital(v) => YValues::Digital(v),
        }
    }
}

/// X-position binding for sparse variants.
#[derive(Clone, Copy, Debug)]
pub enum XPositions<'a> {
    Native(&'a [i64]),
    /// `[lo0, hi0, lo1, hi1, ...]`
    Split(&'a [u32]),
}

/// Buffer bindings for one dispatch. The raster is passed separately.
#[derive(Clone, Copy, Debug)]
pub struct KernelInputs<'a> {
    pub y: YValues<'a>,
    pub x: Option<XPositions<'a>>,
    pub column_index: Option<&'a [u32]>,
    pub durations: Option<&'a [i64]>,
}

impl<'a> KernelInputs<'a> {
    pub fn dense(y: YValues<'a>) -> Self {
        Self {
            y,
            x: None,
            column_index: None,
            durations: None,
        }
    }

    pub fn sparse(y: YValues<'a>, x: XPositions<'a>, column_index: &'a [u32]) -> Self {
        Self {
            y,
            x: Some(x),
            column_index: Some(column_index),
            durations: None,
        }
    }

    pub fn with_durations(mut self, durations: &'a [i64]) -> Self {
        self.durations = Some(durations);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AbortReason {
    HeightExceedsMax,
    InsufficientDepth,
    EmptyWindow,
    RasterShapeMismatch,
    InvalidScale,
    SampleKindMismatch,
    MissingBinding(&'static str),
    BufferTooShort(&'static str),
}

/// Result of a dispatch. An aborted dispatch wrote nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    Aborted(AbortReason),
}

impl DispatchOutcome {
    pub fn is_completed(&self) -> bool {
        *self == DispatchOutcome::Completed
    }
}

trait XFetch: Sync {
    /// Column-space x of sample `i`.
    fn x(&self, i: usize) -> f32;

    /// Last sample whose x lies left of `col`, for fetchers that can invert
    /// their mapping. Sparse fetchers use the column index instead.
    fn dense_start(&self, _col: usize) -> usize {
        0
    }
}

trait YFetch: Sync {
    const DIGITAL: bool;
    fn value(&self, i: usize) -> f32;
}

trait Style: Sync {
    const INTERPOLATED: bool;
    const HISTOGRAM: bool;
}

#[derive(Clone, Copy)]
struct Scale {
    xscale: f32,
    xoff: f32,
}

impl Scale {
    #[inline]
    fn apply(self, ticks: f32) -> f32 {
        ticks * self.xscale + self.xoff
    }

    /// Largest shifted tick that maps strictly left of `col`.
    fn last_tick_before(self, col: usize) -> i64 {
        (((col as f32 - self.xoff) / self.xscale).ceil() as i64).saturating_sub(1)
    }
}

struct DenseX {
    shift: i64,
    scale: Scale,
}

impl XFetch for DenseX {
    fn x(&self, i: usize) -> f32 {
        self.scale.apply((i as i64).wrapping_add(self.shift) as f32)
    }

    fn dense_start(&self, col: usize) -> usize {
        let tick = self.scale.last_tick_before(col).saturating_sub(self.shift);
        usize::try_from(tick).unwrap_or(0)
    }
}

struct DenseSplitX {
    shift: SplitTick,
    scale: Scale,
}

impl XFetch for DenseSplitX {
    fn x(&self, i: usize) -> f32 {
        let tick = SplitTick::from_i64(i as i64).wrapping_add(self.shift);
        self.scale.apply(tick.to_f32())
    }

    fn dense_start(&self, col: usize) -> usize {
        let tick = SplitTick::from_i64(self.scale.last_tick_before(col))
            .wrapping_add(self.shift.wrapping_neg());
        if tick.is_negative() {
            0
        } else if tick.hi != 0 {
            usize::MAX
        } else {
            tick.lo as usize
        }
    }
}

struct NativeX<'a> {
    ticks: &'a [i64],
    shift: i64,
    scale: Scale,
}

impl XFetch for NativeX<'_> {
    fn x(&self, i: usize) -> f32 {
        self.scale
            .apply(self.ticks[i].wrapping_add(self.shift) as f32)
    }
}

struct SplitX<'a> {
    words: &'a [u32],
    shift: SplitTick,
    scale: Scale,
}

impl XFetch for SplitX<'_> {
    fn x(&self, i: usize) -> f32 {
        let tick = SplitTick::new(self.words[2 * i], self.words[2 * i + 1]);
        self.scale.apply(tick.wrapping_add(self.shift).to_f32())
    }
}

struct AnalogY<'a>(&'a [f32]);

impl YFetch for AnalogY<'_> {
    const DIGITAL: bool = false;

    fn value(&self, i: usize) -> f32 {
        self.0[i]
    }
}

struct DigitalY<'a>(&'a [bool]);

impl YFetch for DigitalY<'_> {
    const DIGITAL: bool = true;

    fn value(&self, i: usize) -> f32 {
        if self.0[i] {
            1.0
        } else {
            0.0
        }
    }
}

struct Lines;
struct Steps;
struct Bars;

impl Style for Lines {
    const INTERPOLATED: bool = true;
    const HISTOGRAM: bool = false;
}

impl Style for Steps {
    const INTERPOLATED: bool = false;
    const HISTOGRAM: bool = false;
}

impl Style for Bars {
    const INTERPOLATED: bool = false;
    const HISTOGRAM: bool = true;
}

/// Scratch owned by one worker while it processes columns.
struct ColumnScratch {
    acc: RowAccumulator,
    group: LaneGroup,
}

impl ColumnScratch {
    fn new() -> Self {
        Self {
            acc: RowAccumulator::new(),
            group: LaneGroup::new(LANES_PER_GROUP),
        }
    }
}

/// Everything a lane needs, bound for one dispatch.
struct ColumnProgram<'a, X, Y> {
    req: &'a RenderRequest,
    x: X,
    y: Y,
    column_index: Option<&'a [u32]>,
    durations: Option<&'a [i64]>,
    depth: usize,
    /// Exclusive bound on the first sample of a segment.
    end: usize,
    height: usize,
}

impl<X: XFetch, Y: YFetch> ColumnProgram<'_, X, Y> {
    fn start_index(&self, col: usize) -> usize {
        match self.column_index {
            Some(index) => index[col] as usize,
            None => self
                .x
                .dense_start(col)
                .max(self.req.offset_samples as usize),
        }
    }

    fn right_edge<S: Style>(&self, i: usize, left_x: f32) -> f32 {
        if S::INTERPOLATED {
            self.x.x(i + 1)
        } else {
            let duration = self.durations.map_or(1, |d| d[i]);
            left_x + duration as f32 * self.req.xscale
        }
    }

    /// Vertical extent of sample `i` inside column `[col, col + 1)`, or `None`
    /// when the sample draws nothing.
    fn extent<S: Style>(&self, i: usize, left_x: f32, right_x: f32, col: f32) -> Option<(f32, f32)> {
        let left_y = self.req.row_of(self.y.value(i));

        if S::HISTOGRAM {
            let base = self.req.ybase;
            return (left_y != base).then_some((base, left_y));
        }

        if S::INTERPOLATED {
            let right_y = self.req.row_of(self.y.value(i + 1));
            let mut start = left_y;
            let mut end = right_y;
            if right_x > left_x {
                let slope = (right_y - left_y) / (right_x - left_x);
                if left_x < col {
                    start = left_y + slope * (col - left_x);
                }
                if right_x > col + 1.0 {
                    end = left_y + slope * (col + 1.0 - left_x);
                }
            }
            return Some((start, end));
        }

        // Step rendering holds the level; a digital edge ending inside this
        // column becomes a vertical line to the next level.
        let mut end = left_y;
        if Y::DIGITAL && right_x < col + 1.0 && i + 1 < self.depth {
            end = self.req.row_of(self.y.value(i + 1));
        }
        Some((left_y, end))
    }

    fn accumulate<S: Style>(&self, acc: &RowAccumulator, a: f32, b: f32) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        // Also rejects NaN.
        if !(hi >= 0.0 && lo < self.height as f32) {
            return;
        }
        let top = (self.height - 1) as f32;
        let lo = lo.max(0.0) as usize;
        let hi = hi.min(top) as usize;
        if S::HISTOGRAM {
            acc.mark_span(lo, hi);
        } else {
            acc.add_span(lo, hi);
        }
    }

    fn lane_step<S: Style>(&self, acc: &RowAccumulator, col: usize, i: usize) -> LaneStatus {
        if i >= self.end {
            return LaneStatus::Complete;
        }
        let col = col as f32;
        let left_x = self.x.x(i);
        let right_x = self.right_edge::<S>(i, left_x);

        // The column is the half-open span [col, col + 1). Zero-width
        // segments count where they sit.
        let covers =
            left_x < col + 1.0 && (right_x > col || (right_x == left_x && left_x >= col));
        // A digital edge belongs to the column holding it, even when the
        // level before it ends exactly on the column's left edge.
        let edge = Y::DIGITAL
            && !S::INTERPOLATED
            && !S::HISTOGRAM
            && i + 1 < self.depth
            && right_x >= col
            && right_x < col + 1.0;

        if covers || edge {
            if let Some((a, b)) = self.extent::<S>(i, left_x, right_x, col) {
                self.accumulate::<S>(acc, a, b);
            }
        }

        if right_x > col + 1.0 {
            LaneStatus::Complete
        } else {
            LaneStatus::Continue
        }
    }

    fn run_column<S: Style>(
        &self,
        scratch: &ColumnScratch,
        col: usize,
        previous: ArrayView1<'_, f32>,
    ) -> Vec<f32> {
        let ColumnScratch { acc, group } = scratch;
        group.clear(acc, self.height);

        let start = self.start_index(col);
        let width = group.width();
        group.scan(|lane, iteration| {
            let i = start
                .saturating_add(iteration.saturating_mul(width))
                .saturating_add(lane);
            self.lane_step::<S>(acc, col, i)
        });

        let alpha = self.req.alpha;
        let persist = self.req.persist_scale;
        (0..self.height)
            .map(|row| {
                let hits = acc.load(row) as f32 * alpha;
                if persist != 0.0 {
                    hits + previous[row] * persist
                } else {
                    hits
                }
            })
            .collect()
    }

    fn rasterize<S: Style>(&self, raster: &mut OutputRaster) {
        let width = self.req.width();
        let columns: Vec<Vec<f32>> = {
            let pixels = raster.pixels();
            (0..width)
                .into_par_iter()
                .map_init(ColumnScratch::new, |scratch, col| {
                    self.run_column::<S>(scratch, col, pixels.column(col))
                })
                .collect()
        };
        for (col, values) in columns.iter().enumerate() {
            raster.write_column(col, values);
        }
    }
}

/// A resolved member of the kernel family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterKernel {
    variant: KernelVariant,
}

impl RasterKernel {
    pub fn resolve(variant: KernelVariant) -> Result<Self, ScopeError> {
        if !variant.is_supported() {
            return Err(ScopeError::UnsupportedVariant(variant));
        }
        Ok(Self { variant })
    }

    pub fn variant(&self) -> KernelVariant {
        self.variant
    }

    /// Draws one channel into `raster`.
    ///
    /// Either every column is rewritten or, if a guard trips, nothing is.
    pub fn dispatch(
        &self,
        req: &RenderRequest,
        inputs: &KernelInputs<'_>,
        raster: &mut OutputRaster,
    ) -> DispatchOutcome {
        if let Err(reason) = self.check(req, inputs, raster) {
            debug!("skipping {:?} dispatch: {reason:?}", self.variant);
            return DispatchOutcome::Aborted(reason);
        }

        let scale = Scale {
            xscale: req.xscale,
            xoff: req.xoff,
        };
        match (self.variant.packing, self.variant.arithmetic, inputs.x) {
            (Packing::Dense, TickArithmetic::Native, _) => {
                let x = DenseX {
                    shift: req.inner_xoff,
                    scale,
                };
                self.bind_y(req, inputs, raster, x)
            }
            (Packing::Dense, TickArithmetic::Emulated, _) => {
                let x = DenseSplitX {
                    shift: req.inner_xoff_words(),
                    scale,
                };
                self.bind_y(req, inputs, raster, x)
            }
            (Packing::Sparse, TickArithmetic::Native, Some(XPositions::Native(ticks))) => {
                let x = NativeX {
                    ticks,
                    shift: req.inner_xoff,
                    scale,
                };
                self.bind_y(req, inputs, raster, x)
            }
            (Packing::Sparse, TickArithmetic::Emulated, Some(XPositions::Split(words))) => {
                let x = SplitX {
                    words,
                    shift: req.inner_xoff_words(),
                    scale,
                };
                self.bind_y(req, inputs, raster, x)
            }
            (Packing::Sparse, _, _) => DispatchOutcome::Aborted(AbortReason::MissingBinding("x-positions")),
        }
    }

    fn bind_y<X: XFetch>(
        &self,
        req: &RenderRequest,
        inputs: &KernelInputs<'_>,
        raster: &mut OutputRaster,
        x: X,
    ) -> DispatchOutcome {
        match inputs.y {
            YValues::Analog(values) => self.bind_style(req, inputs, raster, x, AnalogY(values)),
            YValues::Digital(levels) => self.bind_style(req, inputs, raster, x, DigitalY(levels)),
        }
    }

    fn bind_style<X: XFetch, Y: YFetch>(
        &self,
        req: &RenderRequest,
        inputs: &KernelInputs<'_>,
        raster: &mut OutputRaster,
        x: X,
        y: Y,
    ) -> DispatchOutcome {
        let depth = req.depth as usize;
        let program = ColumnProgram {
            req,
            x,
            y,
            column_index: inputs.column_index,
            durations: inputs.durations,
            depth,
            end: depth + 1 - self.variant.min_depth(),
            height: req.height(),
        };
        match self.variant.style {
            RenderStyle::Interpolated => program.rasterize::<Lines>(raster),
            RenderStyle::FixedDuration => program.rasterize::<Steps>(raster),
            RenderStyle::Histogram => program.rasterize::<Bars>(raster),
        }
        DispatchOutcome::Completed
    }

    fn check(
        &self,
        req: &RenderRequest,
        inputs: &KernelInputs<'_>,
        raster: &OutputRaster,
    ) -> Result<(), AbortReason> {
        let variant = self.variant;
        let depth = req.depth as usize;
        if req.height() > MAX_HEIGHT {
            return Err(AbortReason::HeightExceedsMax);
        }
        if depth < variant.min_depth() {
            return Err(AbortReason::InsufficientDepth);
        }
        if req.window_height == 0 {
            return Err(AbortReason::EmptyWindow);
        }
        if raster.dim() != (req.height(), req.width()) {
            return Err(AbortReason::RasterShapeMismatch);
        }
        if !(req.xscale.is_finite() && req.xscale > 0.0) {
            return Err(AbortReason::InvalidScale);
        }
        if inputs.y.kind() != variant.kind {
            return Err(AbortReason::SampleKindMismatch);
        }
        if inputs.y.len() < depth {
            return Err(AbortReason::BufferTooShort("y-values"));
        }

        if variant.needs_positions() {
            let positions = match (variant.arithmetic, inputs.x) {
                (TickArithmetic::Native, Some(XPositions::Native(ticks))) => ticks.len(),
                (TickArithmetic::Emulated, Some(XPositions::Split(words))) => words.len() / 2,
                _ => return Err(AbortReason::MissingBinding("x-positions")),
            };
            if positions < depth {
                return Err(AbortReason::BufferTooShort("x-positions"));
            }
            let index = inputs
                .column_index
                .ok_or(AbortReason::MissingBinding("column index"))?;
            if index.len() < req.width() {
                return Err(AbortReason::BufferTooShort("column index"));
            }
        }

        if !variant.is_interpolated() {
            match inputs.durations {
                Some(durations) if durations.len() < depth => {
                    return Err(AbortReason::BufferTooShort("durations"));
                }
                None if variant.needs_durations() => {
                    return Err(AbortReason::MissingBinding("durations"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
