//! Cooperative lane group used by the column kernel.
//!
//! A group is `width` lanes working on one pixel column. They share a row
//! accumulator and a completion flag, and meet at two barriers:
//!
//! * **clear**: every lane zeroes its share of the accumulator and the flag is
//!   lowered before any lane starts scanning.
//! * **drain**: after each lockstep iteration all lanes wait; if any lane
//!   raised the flag during that iteration the whole group stops there.
//!
//! A group runs inside the task of its column, lanes in order within each
//! iteration. Everything lanes share is atomic.
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Lanes per column.
pub const LANES_PER_GROUP: usize = 128;
/// Rows in the shared accumulator; taller windows are rejected.
pub const MAX_HEIGHT: usize = 2048;

/// Per-column row counters.
pub struct RowAccumulator {
    rows: Vec<AtomicU32>,
}

impl Default for RowAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl RowAccumulator {
    pub fn new() -> Self {
        Self {
            rows: (0..MAX_HEIGHT).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    /// Lane `lane` clears rows `lane, lane + stride, ...` below `height`.
    pub fn clear_share(&self, lane: usize, stride: usize, height: usize) {
        for row in (lane..height.min(MAX_HEIGHT)).step_by(stride.max(1)) {
            self.rows[row].store(0, Ordering::Relaxed);
        }
    }

    /// Intensity grading: every covered row counts one more hit.
    pub fn add_span(&self, lo: usize, hi: usize) {
        for row in &self.rows[lo..=hi] {
            row.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Saturating variant: a covered row is marked, never counted.
    pub fn mark_span(&self, lo: usize, hi: usize) {
        for row in &self.rows[lo..=hi] {
            row.fetch_max(1, Ordering::Relaxed);
        }
    }

    pub fn load(&self, row: usize) -> u32 {
        self.rows[row].load(Ordering::Relaxed)
    }
}

/// What a lane reports at the end of one iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaneStatus {
    Continue,
    /// The lane walked past the column or ran out of samples.
    Complete,
}

/// Completion flag plus the two named barriers.
pub struct LaneGroup {
    width: usize,
    done: AtomicBool,
}

impl LaneGroup {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
            done: AtomicBool::new(false),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Clear barrier. Returns once the accumulator is zero up to `height` and
    /// the completion flag is lowered.
    pub fn clear(&self, acc: &RowAccumulator, height: usize) {
        self.done.store(false, Ordering::Release);
        for lane in 0..self.width {
            acc.clear_share(lane, self.width, height);
        }
    }

    /// Runs lockstep iterations until some lane completes; the group then
    /// stops at the following drain barrier. Returns the number of iterations
    /// executed.
    pub fn scan<F>(&self, body: F) -> usize
    where
        F: Fn(usize, usize) -> LaneStatus,
    {
        let mut iteration = 0;
        loop {
            for lane in 0..self.width {
                if body(lane, iteration) == LaneStatus::Complete {
                    self.done.store(true, Ordering::Release);
                }
            }
            iteration += 1;
            if self.drain() {
                return iteration;
            }
        }
    }

    /// Drain barrier: every lane of the iteration has returned by now, so this
    /// only has to read the flag.
    fn drain(&self) -> bool {
        self.is_done()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn clear_zeroes_only_requested_rows() {
        let acc = RowAccumulator::new();
        acc.add_span(0, 20);
        let group = LaneGroup::new(8);
        group.clear(&acc, 10);
        assert!((0..10).all(|row| acc.load(row) == 0));
        assert!((10..=20).all(|row| acc.load(row) == 1));
    }

    #[test]
    fn saturating_spans_never_exceed_one() {
        let acc = RowAccumulator::new();
        (0..64).into_par_iter().for_each(|_| acc.mark_span(3, 9));
        assert!((3..=9).all(|row| acc.load(row) == 1));
        (0..64).into_par_iter().for_each(|_| acc.add_span(3, 3));
        assert_eq!(acc.load(3), 65);
    }

    #[test]
    fn group_finishes_the_iteration_that_raised_done() {
        let group = LaneGroup::new(16);
        let visits = AtomicUsize::new(0);
        // Lane 5 completes in iteration 2; every lane still runs iteration 2.
        let iterations = group.scan(|lane, iteration| {
            visits.fetch_add(1, Ordering::Relaxed);
            if lane == 5 && iteration == 2 {
                LaneStatus::Complete
            } else {
                LaneStatus::Continue
            }
        });
        assert_eq!(iterations, 3);
        assert_eq!(visits.load(Ordering::Relaxed), 3 * 16);
        assert!(group.is_done());
    }

    #[test]
    fn lanes_of_an_iteration_run_before_the_next_iteration() {
        let group = LaneGroup::new(4);
        let order = std::sync::Mutex::new(Vec::new());
        group.scan(|lane, iteration| {
            order.lock().unwrap().push((iteration, lane));
            if iteration == 1 {
                LaneStatus::Complete
            } else {
                LaneStatus::Continue
            }
        });
        let expected: Vec<_> = (0..2).flat_map(|it| (0..4).map(move |lane| (it, lane))).collect();
        assert_eq!(order.into_inner().unwrap(), expected);
    }

    #[test]
    fn clear_lowers_the_flag_for_reuse() {
        let acc = RowAccumulator::new();
        let group = LaneGroup::new(4);
        group.scan(|_, _| LaneStatus::Complete);
        assert!(group.is_done());
        group.clear(&acc, 4);
        assert!(!group.is_done());
    }
}
