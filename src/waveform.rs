//! Synthetic ECG used when no peripheral is connected.
//!
//! [`WaveformGenerator`] is an infinite, restartable iterator that tiles one
//! idealised cardiac cycle every [`SAMPLES_PER_CYCLE`] samples (≈ 1 s at
//! 100 Hz).  Every component except the baseline noise is a pure function of
//! the running sample index, see [`deterministic`]:
//!
//! | Component | Cycle samples | Shape | Amplitude (mV) |
//! |-----------|---------------|-------|----------------|
//! | P wave    | 10–20         | half-sine | +0.15 |
//! | Q         | 30–33 (first 20 % of QRS) | half-sine | −0.10 |
//! | R         | 33–39 (next 40 %) | half-sine | +1.20 |
//! | S         | 39–45 (final 40 %) | half-sine | −0.20 |
//! | T wave    | 60–80         | half-sine | +0.25 |
//! | Wander    | whole signal, unbounded index | sine | ±0.03 |
//! | Noise     | every sample  | uniform | ±0.025 |
//!
//! The output is rounded to 3 decimals.

use std::f64::consts::PI;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::protocol::{SAMPLES_PER_CYCLE, SYNTHETIC_PERIOD};
use crate::types::{EcgEvent, Sample};

const NOISE_AMPLITUDE: f64 = 0.025;

const P_WAVE: (u64, u64, f64) = (10, 20, 0.15);
const T_WAVE: (u64, u64, f64) = (60, 80, 0.25);

const QRS_START: u64 = 30;
const QRS_END: u64 = 45;
const Q_AMPLITUDE: f64 = 0.1;
const R_AMPLITUDE: f64 = 1.2;
const S_AMPLITUDE: f64 = 0.2;
/// Fraction of the QRS window where Q ends and R ends.
const Q_END: f64 = 0.2;
const R_END: f64 = 0.6;

const WANDER_AMPLITUDE: f64 = 0.03;
/// Radians of wander phase per sample (one wander period ≈ 628 samples).
const WANDER_RATE: f64 = 0.01;

// ── Noise ─────────────────────────────────────────────────────────────────────

/// Source of the per-sample baseline noise.
pub trait NoiseSource {
    /// Return a value in `[-amplitude, amplitude]`.
    fn next_noise(&mut self, amplitude: f64) -> f64;
}

/// No noise at all; makes the generator fully deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNoise;

impl NoiseSource for SilentNoise {
    fn next_noise(&mut self, _amplitude: f64) -> f64 {
        0.0
    }
}

/// Independent uniform noise drawn from a [`StdRng`].
#[derive(Debug, Clone)]
pub struct UniformNoise {
    rng: StdRng,
}

impl UniformNoise {
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Reproducible noise for tests and demos.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl NoiseSource for UniformNoise {
    fn next_noise(&mut self, amplitude: f64) -> f64 {
        self.rng.gen_range(-amplitude..=amplitude)
    }
}

// ── Waveform ──────────────────────────────────────────────────────────────────

/// Half-sine bump of height `amplitude` over `[start, end]`; zero outside.
fn half_sine(pos: f64, start: f64, end: f64, amplitude: f64) -> f64 {
    if pos < start || pos > end {
        return 0.0;
    }
    amplitude * (PI * (pos - start) / (end - start)).sin()
}

fn qrs(cycle_pos: u64) -> f64 {
    if !(QRS_START..=QRS_END).contains(&cycle_pos) {
        return 0.0;
    }
    let p = (cycle_pos - QRS_START) as f64 / (QRS_END - QRS_START) as f64;
    if p < Q_END {
        -half_sine(p, 0.0, Q_END, Q_AMPLITUDE)
    } else if p < R_END {
        half_sine(p, Q_END, R_END, R_AMPLITUDE)
    } else {
        -half_sine(p, R_END, 1.0, S_AMPLITUDE)
    }
}

/// The noise-free signal at running sample `index`, unrounded.
pub fn deterministic(index: u64) -> f64 {
    let pos = index % SAMPLES_PER_CYCLE;
    let (p_start, p_end, p_amp) = P_WAVE;
    let (t_start, t_end, t_amp) = T_WAVE;

    let p = half_sine(pos as f64, p_start as f64, p_end as f64, p_amp);
    let t = half_sine(pos as f64, t_start as f64, t_end as f64, t_amp);
    let wander = WANDER_AMPLITUDE * (index as f64 * WANDER_RATE).sin();

    p + qrs(pos) + t + wander
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Lazy, infinite synthetic ECG sequence.
#[derive(Debug, Clone)]
pub struct WaveformGenerator<N = UniformNoise> {
    index: u64,
    noise: N,
}

impl WaveformGenerator<UniformNoise> {
    /// Generator with entropy-seeded noise, as used by the CLI.
    pub fn with_noise() -> Self {
        Self::new(UniformNoise::from_entropy())
    }
}

impl WaveformGenerator<SilentNoise> {
    pub fn silent() -> Self {
        Self::new(SilentNoise)
    }
}

impl<N: NoiseSource> WaveformGenerator<N> {
    pub fn new(noise: N) -> Self {
        Self { index: 0, noise }
    }

    /// Running index of the next sample.
    pub fn position(&self) -> u64 {
        self.index
    }

    /// Restart from index 0.  The noise source keeps its state.
    pub fn reset(&mut self) {
        self.index = 0;
    }

    pub fn next_sample(&mut self) -> f64 {
        let noise = self.noise.next_noise(NOISE_AMPLITUDE);
        let value = round3(deterministic(self.index) + noise);
        self.index = self.index.wrapping_add(1);
        value
    }

    pub fn generate_batch(&mut self, n: usize) -> Vec<f64> {
        (0..n).map(|_| self.next_sample()).collect()
    }
}

impl<N: NoiseSource> Iterator for WaveformGenerator<N> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        Some(self.next_sample())
    }
}

// ── Timer-driven source ───────────────────────────────────────────────────────

/// Drive `generator` into the event channel at [`SYNTHETIC_PERIOD`].
///
/// The task stops when `cancel` fires or the receiver is dropped.  It is the
/// fallback producer when no peripheral is connected and shares the channel
/// (and therefore the single consumer) with the BLE sample pump.
pub fn spawn_synthetic_source<N>(
    mut generator: WaveformGenerator<N>,
    events: mpsc::Sender<EcgEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    N: NoiseSource + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SYNTHETIC_PERIOD);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Synthetic source started ({} ms period)", SYNTHETIC_PERIOD.as_millis());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let value = generator.next_sample();
                    if events.send(EcgEvent::Sample(Sample::new(value))).await.is_err() {
                        debug!("Synthetic source: receiver dropped");
                        break;
                    }
                }
            }
        }
        info!("Synthetic source stopped after {} samples", generator.position());
    })
}
