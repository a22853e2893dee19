// src/engine.rs
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::drivers::InstrumentSession;
use crate::handshake::Handshake;
use crate::types::CaptureSet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Sleep between polls while nothing is pending.
    pub idle_quantum_ms: u64,
    pub thread_name: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            idle_quantum_ms: 1,
            thread_name: "WaveformThread".to_owned(),
        }
    }
}

impl AcquisitionConfig {
    pub fn idle_quantum(&self) -> Duration {
        Duration::from_millis(self.idle_quantum_ms.max(1))
    }
}

/// Handle to a running acquisition thread.
pub struct AcquisitionThread {
    handshake: Arc<Handshake>,
    handle: JoinHandle<u64>,
    idle_quantum: Duration,
}

impl AcquisitionThread {
    pub fn handshake(&self) -> &Arc<Handshake> {
        &self.handshake
    }

    /// Stops the loop and joins the thread, returning how many captures were
    /// handed to the consumer.
    ///
    /// A set that was published but never taken is returned to the producer
    /// so it can see the flag. A consumer that took a set and never released
    /// it still blocks this call.
    pub fn shutdown(self) -> Result<u64> {
        self.handshake.request_shutdown();
        while !self.handle.is_finished() {
            if !self.handshake.reclaim_unconsumed() {
                thread::sleep(self.idle_quantum);
            }
        }
        self.handle
            .join()
            .map_err(|_| anyhow!("acquisition thread panicked"))
    }
}

pub fn spawn_thread<S>(
    mut session: S,
    handshake: Arc<Handshake>,
    config: AcquisitionConfig,
) -> Result<AcquisitionThread>
where
    S: InstrumentSession + 'static,
{
    let idle_quantum = config.idle_quantum();
    let shared = Arc::clone(&handshake);
    let handle = thread::Builder::new()
        .name(config.thread_name.clone())
        .spawn(move || run_loop(&mut session, &shared, &config))?;
    Ok(AcquisitionThread {
        handshake,
        handle,
        idle_quantum,
    })
}

/// Body of the acquisition thread.
///
/// Poll, download, publish, then wait for the consumer. Any failure from the
/// instrument layer counts as "nothing pending" and is retried after one idle
/// quantum. The shutdown flag is only looked at between iterations.
pub fn run_loop<S: InstrumentSession + ?Sized>(
    session: &mut S,
    handshake: &Handshake,
    config: &AcquisitionConfig,
) -> u64 {
    let idle_quantum = config.idle_quantum();
    let mut captures = CaptureSet::new();
    let mut completed = 0;
    info!("{}: starting", config.thread_name);

    while !handshake.is_shutting_down() {
        match session.check_for_pending_waveforms() {
            Ok(true) => {}
            Ok(false) => {
                thread::sleep(idle_quantum);
                continue;
            }
            Err(err) => {
                debug!("pending check failed: {err:#}");
                thread::sleep(idle_quantum);
                continue;
            }
        }

        trace!("got a waveform");
        if let Err(err) = session.download_waveforms(&mut captures) {
            debug!("download failed: {err:#}");
            thread::sleep(idle_quantum);
            continue;
        }
        captures.sequence += 1;

        captures = handshake.publish_and_wait(captures);
        completed += 1;
    }

    info!("{}: shutting down after {completed} captures", config.thread_name);
    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CapturedWaveform, StreamId};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    struct CountingSession {
        remaining: usize,
        in_flight: Arc<AtomicBool>,
        violations: Arc<AtomicUsize>,
    }

    impl InstrumentSession for CountingSession {
        fn check_for_pending_waveforms(&mut self) -> Result<bool> {
            Ok(self.remaining > 0)
        }

        fn download_waveforms(&mut self, captures: &mut CaptureSet) -> Result<()> {
            // The previous set must have been released before we touch it.
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            self.remaining -= 1;
            let wf = captures.slot_mut(&StreamId::new("scope", 0), || {
                CapturedWaveform::dense_analog(1, Vec::new())
            });
            wf.clear();
            wf.samples = crate::types::SampleData::Analog(vec![self.remaining as f32; 4]);
            Ok(())
        }
    }

    struct IdleSession;

    impl InstrumentSession for IdleSession {
        fn check_for_pending_waveforms(&mut self) -> Result<bool> {
            Ok(false)
        }

        fn download_waveforms(&mut self, _captures: &mut CaptureSet) -> Result<()> {
            Err(anyhow!("nothing to download"))
        }
    }

    struct FlakySession {
        polls: usize,
        downloads: usize,
    }

    impl InstrumentSession for FlakySession {
        fn check_for_pending_waveforms(&mut self) -> Result<bool> {
            self.polls += 1;
            if self.polls % 2 == 1 {
                Err(anyhow!("instrument timed out"))
            } else {
                Ok(true)
            }
        }

        fn download_waveforms(&mut self, _captures: &mut CaptureSet) -> Result<()> {
            self.downloads += 1;
            if self.downloads % 3 != 0 {
                Err(anyhow!("partial download"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn ready_is_never_observed_twice_without_processed() {
        let in_flight = Arc::new(AtomicBool::new(false));
        let violations = Arc::new(AtomicUsize::new(0));
        let session = CountingSession {
            remaining: 50,
            in_flight: Arc::clone(&in_flight),
            violations: Arc::clone(&violations),
        };
        let handshake = Arc::new(Handshake::new());
        let acq = spawn_thread(session, Arc::clone(&handshake), AcquisitionConfig::default())
            .unwrap();

        for expected in 1..=50u64 {
            let ready = handshake.wait_ready();
            assert_eq!(ready.sequence, expected);
            assert!(in_flight.load(Ordering::SeqCst));
            // Producer is parked: nothing new can become ready meanwhile.
            thread::sleep(Duration::from_micros(200));
            assert!(handshake.try_ready().is_none());
            let wf = ready.get(&StreamId::new("scope", 0)).unwrap();
            assert_eq!(wf.len(), 4);
            in_flight.store(false, Ordering::SeqCst);
            ready.processed();
        }

        assert_eq!(acq.shutdown().unwrap(), 50);
        assert_eq!(violations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_exits_within_idle_quantum_when_idle() {
        let handshake = Arc::new(Handshake::new());
        let acq = spawn_thread(IdleSession, handshake, AcquisitionConfig::default()).unwrap();
        thread::sleep(Duration::from_millis(20));
        let started = Instant::now();
        assert_eq!(acq.shutdown().unwrap(), 0);
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn failures_are_retried_and_never_published() {
        let handshake = Arc::new(Handshake::new());
        let session = FlakySession {
            polls: 0,
            downloads: 0,
        };
        let acq = spawn_thread(session, Arc::clone(&handshake), AcquisitionConfig::default())
            .unwrap();
        for expected in 1..=3u64 {
            let ready = handshake.wait_ready();
            assert_eq!(ready.sequence, expected);
        }
        acq.shutdown().unwrap();
    }

    #[test]
    fn shutdown_reclaims_capture_nobody_consumed() {
        let session = CountingSession {
            remaining: usize::MAX,
            in_flight: Arc::new(AtomicBool::new(false)),
            violations: Arc::new(AtomicUsize::new(0)),
        };
        let handshake = Arc::new(Handshake::new());
        let acq = spawn_thread(session, Arc::clone(&handshake), AcquisitionConfig::default())
            .unwrap();
        thread::sleep(Duration::from_millis(10));
        // Returns at all only because the parked set was handed back.
        assert!(acq.shutdown().unwrap() <= 1);
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: AcquisitionConfig = serde_json::from_str(r#"{"idle_quantum_ms": 5}"#).unwrap();
        assert_eq!(config.idle_quantum(), Duration::from_millis(5));
        assert_eq!(config.thread_name, "WaveformThread");
    }
}
