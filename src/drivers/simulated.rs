use std::f32::consts::PI;
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::drivers::InstrumentSession;
use crate::types::{CaptureSet, CapturedWaveform, SampleData, StreamId};

/// Femtoseconds per sample at 1 GS/s.
const TIMESCALE_FS: i64 = 1_000_000;

#[derive(Clone, Debug)]
pub struct SimulatedScopeConfig {
    pub name: String,
    pub analog_channels: usize,
    pub digital_channels: usize,
    pub depth: usize,
    pub trigger_period: Duration,
    pub noise: f32,
}

impl Default for SimulatedScopeConfig {
    fn default() -> Self {
        Self {
            name: "sim".to_owned(),
            analog_channels: 2,
            digital_channels: 1,
            depth: 4096,
            trigger_period: Duration::from_millis(20),
            noise: 0.02,
        }
    }
}

struct SignalGen {
    cycles: f32,
    phase: f32,
    amplitude: f32,
}

/// Free-running fake oscilloscope: sine channels plus square-wave logic
/// channels, one capture per trigger period.
pub struct SimulatedScope {
    config: SimulatedScopeConfig,
    gens: Vec<SignalGen>,
    rng: StdRng,
    last_trigger: Option<Instant>,
    captures: u64,
}

impl SimulatedScope {
    pub fn new(config: SimulatedScopeConfig) -> Self {
        let gens = (0..config.analog_channels)
            .map(|idx| SignalGen {
                cycles: 3.0 + idx as f32 * 1.5,
                phase: idx as f32 * 0.6,
                amplitude: 0.5,
            })
            .collect();
        Self {
            config,
            gens,
            rng: StdRng::seed_from_u64(0x5c0_9e),
            last_trigger: None,
            captures: 0,
        }
    }

    pub fn stream_ids(&self) -> Vec<StreamId> {
        (0..self.config.analog_channels + self.config.digital_channels)
            .map(|ch| StreamId::new(self.config.name.clone(), ch))
            .collect()
    }

    /// Number of captures downloaded so far.
    pub fn captures(&self) -> u64 {
        self.captures
    }

    fn fill_analog(&mut self, idx: usize, wf: &mut CapturedWaveform) {
        let depth = self.config.depth;
        let jitter = self.rng.gen_range(-0.05f32..0.05);
        if !matches!(wf.samples, SampleData::Analog(_)) {
            wf.samples = SampleData::Analog(Vec::with_capacity(depth));
        }
        let SampleData::Analog(values) = &mut wf.samples else {
            return;
        };
        let gen = &self.gens[idx];
        for i in 0..depth {
            let t = i as f32 / depth as f32;
            let base = (2.0 * PI * gen.cycles * t + gen.phase + jitter).sin() * gen.amplitude;
            let noise = self.rng.gen_range(-self.config.noise..=self.config.noise);
            values.push(base + noise);
        }
        wf.trigger_phase_fs = (jitter * TIMESCALE_FS as f32) as i64;
    }

    fn fill_digital(&mut self, idx: usize, wf: &mut CapturedWaveform) {
        let depth = self.config.depth as i64;
        let half_period = 64 << idx;
        let offsets = wf.offsets.get_or_insert_with(Vec::new);
        let durations = wf.durations.get_or_insert_with(Vec::new);
        let mut levels = Vec::new();
        let mut tick = 0;
        let mut level = false;
        while tick < depth {
            let len = half_period.min(depth - tick);
            offsets.push(tick);
            durations.push(len);
            levels.push(level);
            tick += len;
            level = !level;
        }
        wf.samples = SampleData::Digital(levels);
    }
}

impl InstrumentSession for SimulatedScope {
    fn check_for_pending_waveforms(&mut self) -> Result<bool> {
        Ok(match self.last_trigger {
            Some(at) => at.elapsed() >= self.config.trigger_period,
            None => true,
        })
    }

    fn download_waveforms(&mut self, captures: &mut CaptureSet) -> Result<()> {
        for id in self.stream_ids() {
            let wf = captures.slot_mut(&id, || {
                CapturedWaveform::dense_analog(TIMESCALE_FS, Vec::new())
            });
            wf.clear();
            if id.channel < self.config.analog_channels {
                self.fill_analog(id.channel, wf);
            } else {
                self.fill_digital(id.channel - self.config.analog_channels, wf);
            }
            wf.validate()?;
        }
        self.last_trigger = Some(Instant::now());
        self.captures += 1;
        Ok(())
    }
}
