// src/types.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::drivers::ScopeError;

/// Identifies one channel of one instrument.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub instrument: String,
    pub channel: usize,
}

impl StreamId {
    pub fn new(instrument: impl Into<String>, channel: usize) -> Self {
        Self {
            instrument: instrument.into(),
            channel,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleKind {
    Analog,
    Digital,
}

/// Y values of one channel.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleData {
    Analog(Vec<f32>),
    Digital(Vec<bool>),
}

impl SampleData {
    pub fn kind(&self) -> SampleKind {
        match self {
            SampleData::Analog(_) => SampleKind::Analog,
            SampleData::Digital(_) => SampleKind::Digital,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SampleData::Analog(v) => v.len(),
            SampleData::Digital(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self) {
        match self {
            SampleData::Analog(v) => v.clear(),
            SampleData::Digital(v) => v.clear(),
        }
    }
}

/// One channel's captured sample stream.
///
/// `offsets == None` means the samples are dense packed: sample `i` sits at
/// tick `i`. Sparse captures carry one signed tick per sample.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedWaveform {
    /// Femtoseconds per tick.
    pub timescale_fs: i64,
    /// Offset of tick zero from the trigger point.
    pub trigger_phase_fs: i64,
    pub samples: SampleData,
    pub offsets: Option<Vec<i64>>,
    pub durations: Option<Vec<i64>>,
}

impl CapturedWaveform {
    pub fn dense_analog(timescale_fs: i64, values: Vec<f32>) -> Self {
        Self {
            timescale_fs,
            trigger_phase_fs: 0,
            samples: SampleData::Analog(values),
            offsets: None,
            durations: None,
        }
    }

    pub fn sparse_analog(timescale_fs: i64, offsets: Vec<i64>, values: Vec<f32>) -> Self {
        Self {
            timescale_fs,
            trigger_phase_fs: 0,
            samples: SampleData::Analog(values),
            offsets: Some(offsets),
            durations: None,
        }
    }

    /// Digital captures are always stored with explicit offsets and durations.
    pub fn sparse_digital(
        timescale_fs: i64,
        offsets: Vec<i64>,
        durations: Vec<i64>,
        levels: Vec<bool>,
    ) -> Self {
        Self {
            timescale_fs,
            trigger_phase_fs: 0,
            samples: SampleData::Digital(levels),
            offsets: Some(offsets),
            durations: Some(durations),
        }
    }

    pub fn kind(&self) -> SampleKind {
        self.samples.kind()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_dense_packed(&self) -> bool {
        self.offsets.is_none()
    }

    pub fn validate(&self) -> Result<(), ScopeError> {
        if self.timescale_fs <= 0 {
            return Err(ScopeError::InvalidTimescale);
        }
        let count = self.len();
        if let Some(offsets) = &self.offsets {
            if offsets.len() != count {
                return Err(ScopeError::LengthMismatch {
                    buffer: "offset",
                    expected: count,
                    actual: offsets.len(),
                });
            }
        }
        if let Some(durations) = &self.durations {
            if durations.len() != count {
                return Err(ScopeError::LengthMismatch {
                    buffer: "duration",
                    expected: count,
                    actual: durations.len(),
                });
            }
        }
        Ok(())
    }

    /// Empties every buffer but keeps the allocations for the next download.
    pub fn clear(&mut self) {
        self.samples.clear();
        if let Some(offsets) = &mut self.offsets {
            offsets.clear();
        }
        if let Some(durations) = &mut self.durations {
            durations.clear();
        }
    }
}

/// Everything pulled from the instruments in one acquisition iteration.
#[derive(Clone, Debug, Default)]
pub struct CaptureSet {
    /// Bumped once per successful download.
    pub sequence: u64,
    waveforms: BTreeMap<StreamId, Arc<CapturedWaveform>>,
}

impl CaptureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &StreamId) -> Option<&Arc<CapturedWaveform>> {
        self.waveforms.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StreamId, &Arc<CapturedWaveform>)> {
        self.waveforms.iter()
    }

    pub fn len(&self) -> usize {
        self.waveforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waveforms.is_empty()
    }

    /// Stores or replaces a whole waveform.
    pub fn insert(&mut self, id: StreamId, waveform: CapturedWaveform) {
        self.waveforms.insert(id, Arc::new(waveform));
    }

    /// Mutable access for refilling a channel in place.
    ///
    /// If a consumer still holds a handle to the old waveform it keeps its own
    /// copy; the producer never writes through a shared handle.
    pub fn slot_mut(
        &mut self,
        id: &StreamId,
        init: impl FnOnce() -> CapturedWaveform,
    ) -> &mut CapturedWaveform {
        let slot = self
            .waveforms
            .entry(id.clone())
            .or_insert_with(|| Arc::new(init()));
        Arc::make_mut(slot)
    }

    pub fn remove(&mut self, id: &StreamId) -> Option<Arc<CapturedWaveform>> {
        self.waveforms.remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_mismatched_offsets() {
        let wf = CapturedWaveform::sparse_analog(1000, vec![0, 1], vec![0.0, 1.0, 2.0]);
        assert!(matches!(
            wf.validate(),
            Err(ScopeError::LengthMismatch {
                buffer: "offset",
                expected: 3,
                actual: 2
            })
        ));
        let ok = CapturedWaveform::dense_analog(1000, vec![0.0; 4]);
        assert!(ok.validate().is_ok());
        assert!(ok.is_dense_packed());
    }

    #[test]
    fn slot_mut_does_not_write_through_retained_handle() {
        let id = StreamId::new("scope", 0);
        let mut set = CaptureSet::new();
        set.insert(id.clone(), CapturedWaveform::dense_analog(1, vec![1.0, 2.0]));
        let retained = Arc::clone(set.get(&id).unwrap());
        {
            let wf = set.slot_mut(&id, || CapturedWaveform::dense_analog(1, vec![]));
            wf.clear();
            wf.samples = SampleData::Analog(vec![9.0]);
        }
        assert_eq!(retained.samples, SampleData::Analog(vec![1.0, 2.0]));
        assert_eq!(set.get(&id).unwrap().samples, SampleData::Analog(vec![9.0]));
    }
}
