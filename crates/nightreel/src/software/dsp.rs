//! Per-sample generators and filters for the software renderer

use std::f64::consts::TAU;
use std::sync::Arc;

use crate::audio::{FilterKind, Waveform};

#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    frequency: f64,
    phase: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, frequency: f64) -> Self {
        Self {
            waveform,
            frequency,
            phase: 0.0,
        }
    }

    pub fn next_sample(&mut self, sample_rate: f64) -> f32 {
        let p = self.phase;
        let value = match self.waveform {
            Waveform::Sine => (TAU * p).sin(),
            Waveform::Square => {
                if p < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * p - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
        };
        self.phase = (self.phase + self.frequency / sample_rate).fract();
        value as f32
    }
}

/// Plays a buffer once or forever
#[derive(Debug, Clone)]
pub struct BufferPlayer {
    samples: Arc<[f32]>,
    looping: bool,
    position: usize,
}

impl BufferPlayer {
    pub fn new(samples: Arc<[f32]>, looping: bool) -> Self {
        Self {
            samples,
            looping,
            position: 0,
        }
    }

    pub fn next_sample(&mut self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        if self.position >= self.samples.len() {
            if !self.looping {
                return 0.0;
            }
            self.position = 0;
        }
        let value = self.samples[self.position];
        self.position += 1;
        value
    }

    pub fn finished(&self) -> bool {
        !self.looping && self.position >= self.samples.len()
    }
}

/// RBJ cookbook biquad, transposed direct form II
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Biquad {
    pub fn new(kind: FilterKind, frequency: f64, q: f64, sample_rate: f64) -> Self {
        let nyquist = sample_rate / 2.0;
        let f = frequency.clamp(1.0, nyquist * 0.99);
        let q = if q > 0.0 { q } else { 1.0 };

        let w0 = TAU * f / sample_rate;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q);

        let (b0, b1, b2) = match kind {
            FilterKind::Lowpass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
            FilterKind::Highpass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
            FilterKind::Bandpass => (alpha, 0.0, -alpha),
        };
        let a0 = 1.0 + alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
            z1: 0.0,
            z2: 0.0,
        }
    }

    pub fn process(&mut self, input: f32) -> f32 {
        let x = input as f64;
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y as f32
    }
}

pub fn rms(block: &[f32]) -> f32 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f64 = block.iter().map(|s| (*s as f64) * (*s as f64)).sum();
    (sum / block.len() as f64).sqrt() as f32
}
