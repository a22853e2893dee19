use std::collections::VecDeque;

use anyhow::Result;

use crate::types::{CaptureSet, CapturedWaveform, StreamId};

/// The two operations the acquisition loop needs from the instrument layer.
pub trait InstrumentSession: Send {
    /// True if any instrument has a completed capture waiting.
    fn check_for_pending_waveforms(&mut self) -> Result<bool>;
    /// Fills `captures` for every instrument with pending data.
    fn download_waveforms(&mut self, captures: &mut CaptureSet) -> Result<()>;
}

impl<S: InstrumentSession + ?Sized> InstrumentSession for Box<S> {
    fn check_for_pending_waveforms(&mut self) -> Result<bool> {
        (**self).check_for_pending_waveforms()
    }

    fn download_waveforms(&mut self, captures: &mut CaptureSet) -> Result<()> {
        (**self).download_waveforms(captures)
    }
}

/// Instrument stand-in that hands out pre-recorded captures, one queued set
/// per trigger, and reports nothing pending once the queue is empty.
pub struct ScriptedSession {
    queue: VecDeque<Vec<(StreamId, CapturedWaveform)>>,
}

impl ScriptedSession {
    pub fn new(batches: impl IntoIterator<Item = Vec<(StreamId, CapturedWaveform)>>) -> Self {
        Self {
            queue: batches.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl InstrumentSession for ScriptedSession {
    fn check_for_pending_waveforms(&mut self) -> Result<bool> {
        Ok(!self.queue.is_empty())
    }

    fn download_waveforms(&mut self, captures: &mut CaptureSet) -> Result<()> {
        let Some(batch) = self.queue.pop_front() else {
            return Ok(());
        };
        for (id, waveform) in batch {
            waveform.validate()?;
            captures.insert(id, waveform);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_session_drains_in_order() {
        let id = StreamId::new("scope", 1);
        let mut session = ScriptedSession::new(vec![
            vec![(id.clone(), CapturedWaveform::dense_analog(1, vec![1.0]))],
            vec![(id.clone(), CapturedWaveform::dense_analog(1, vec![2.0, 3.0]))],
        ]);
        let mut set = CaptureSet::new();
        assert!(session.check_for_pending_waveforms().unwrap());
        session.download_waveforms(&mut set).unwrap();
        assert_eq!(set.get(&id).unwrap().len(), 1);
        session.download_waveforms(&mut set).unwrap();
        assert_eq!(set.get(&id).unwrap().len(), 2);
        assert!(!session.check_for_pending_waveforms().unwrap());
    }

    #[test]
    fn scripted_session_rejects_invalid_waveform() {
        let id = StreamId::new("scope", 0);
        let broken = CapturedWaveform::sparse_analog(1, vec![0], vec![1.0, 2.0]);
        let mut session = ScriptedSession::new(vec![vec![(id, broken)]]);
        let mut set = CaptureSet::new();
        assert!(session.download_waveforms(&mut set).is_err());
        assert!(set.is_empty());
    }
}
