use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{info, warn};

use scopegrade::drivers::{SimulatedScope, SimulatedScopeConfig};
use scopegrade::raster::{KernelVariant, RenderRequest, RenderStyle, TickArithmetic, WaveformRenderer};
use scopegrade::{spawn_thread, AcquisitionConfig, Handshake, SampleKind, StreamId};

const DEFAULT_FRAMES: u64 = 50;

fn style_for(kind: SampleKind) -> RenderStyle {
    match kind {
        SampleKind::Analog => RenderStyle::Interpolated,
        SampleKind::Digital => RenderStyle::FixedDuration,
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let frames = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<u64>()
            .with_context(|| format!("frame count must be a number, got {arg:?}"))?,
        None => DEFAULT_FRAMES,
    };

    let scope_config = SimulatedScopeConfig::default();
    let depth = scope_config.depth as f32;
    let scope = SimulatedScope::new(scope_config);
    let handshake = Arc::new(Handshake::new());
    let acquisition = spawn_thread(scope, Arc::clone(&handshake), AcquisitionConfig::default())?;

    let base = RenderRequest {
        window_height: 256,
        window_width: 1024,
        xscale: 1024.0 / depth,
        yscale: 100.0,
        ybase: 128.0,
        alpha: 0.25,
        persist_scale: 0.8,
        ..RenderRequest::default()
    };

    let mut renderers: HashMap<StreamId, WaveformRenderer> = HashMap::new();
    let started = Instant::now();
    let mut aborted = 0u64;

    for _ in 0..frames {
        let ready = handshake.wait_ready();
        for (id, waveform) in ready.iter() {
            if !renderers.contains_key(id) {
                let variant = KernelVariant::for_waveform(
                    waveform,
                    style_for(waveform.kind()),
                    TickArithmetic::Emulated,
                );
                let mut request = base;
                if waveform.kind() == SampleKind::Digital {
                    request.yscale = 40.0;
                    request.ybase = 20.0;
                }
                renderers.insert(id.clone(), WaveformRenderer::new(variant, request)?);
            }
            let Some(renderer) = renderers.get_mut(id) else {
                continue;
            };
            match renderer.render(waveform) {
                Ok(outcome) if outcome.is_completed() => {}
                Ok(outcome) => {
                    aborted += 1;
                    warn!("{}/{}: {:?}", id.instrument, id.channel, outcome);
                }
                Err(err) => warn!("{}/{}: {err}", id.instrument, id.channel),
            }
        }
        info!("frame {} rendered {} channels", ready.sequence, ready.len());
        ready.processed();
    }

    let elapsed = started.elapsed();
    let captures = acquisition.shutdown()?;
    info!(
        "{captures} captures in {:.2?} ({:.1} fps), {aborted} aborted dispatches",
        elapsed,
        frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );
    for (id, renderer) in &renderers {
        let peak = renderer.raster().pixels().iter().copied().fold(0.0f32, f32::max);
        info!("{}/{}: peak intensity {peak:.3}", id.instrument, id.channel);
    }
    Ok(())
}
