//! Leaf streams
//!
//! Pre-rendered sample buffers and generated analytic tones. These are the
//! sources that feed a [`StreamAdder`](super::adder::StreamAdder).

use super::hilbert::analytic_signal;
use super::{real_rms, AnalyticSample, AnalyticStream, PresentationConstraints};
use std::f64::consts::TAU;

/// A stream over an owned buffer of analytic samples
///
/// # Example
/// ```
/// use audiometry_core::stream::buffer::SampleBufferStream;
/// use audiometry_core::stream::{AnalyticSample, AnalyticStream};
///
/// let mut stream = SampleBufferStream::new(vec![AnalyticSample::new(1.0, 0.0); 4], 44100.0);
/// let mut data = [AnalyticSample::new(0.0, 0.0); 8];
/// assert_eq!(stream.read(&mut data), 4);
/// assert_eq!(stream.read(&mut data), 0);
/// ```
#[derive(Debug, Clone)]
pub struct SampleBufferStream {
    /// Rendered samples
    samples: Vec<AnalyticSample>,
    /// Sampling rate in Hz
    sampling_rate: f64,
    /// Read cursor
    position: usize,
    /// RMS of the real component, computed once at construction
    rms: f64,
    /// Optional presentation requirements
    constraints: Option<PresentationConstraints>,
}

impl SampleBufferStream {
    /// Wrap an analytic buffer
    pub fn new(samples: Vec<AnalyticSample>, sampling_rate: f64) -> Self {
        let rms = real_rms(&samples);
        Self {
            samples,
            sampling_rate,
            position: 0,
            rms,
            constraints: None,
        }
    }

    /// Build a stream from a real signal via the Hilbert transform
    pub fn from_real(signal: &[f64], sampling_rate: f64) -> Self {
        Self::new(analytic_signal(signal), sampling_rate)
    }

    /// Attach presentation constraints to this stream
    pub fn with_constraints(mut self, constraints: PresentationConstraints) -> Self {
        self.constraints = Some(constraints);
        self
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.position
    }
}

impl AnalyticStream for SampleBufferStream {
    fn samples(&self) -> usize {
        self.samples.len()
    }

    fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    fn read(&mut self, data: &mut [AnalyticSample]) -> usize {
        let start = self.position.min(self.samples.len());
        let count = data.len().min(self.samples.len() - start);
        data[..count].copy_from_slice(&self.samples[start..start + count]);
        self.position = start + count;
        count
    }

    fn reset(&mut self) {
        self.position = 0;
    }

    fn seek(&mut self, position: usize) {
        self.position = position;
    }

    fn rms(&self) -> f64 {
        self.rms
    }

    fn presentation_constraints(&self) -> Option<PresentationConstraints> {
        self.constraints.clone()
    }
}

/// A finite analytic sinusoid `A·e^{i(2πft + φ)}`
///
/// Samples are generated on demand, so long tones cost no memory.
#[derive(Debug, Clone)]
pub struct ToneStream {
    /// Tone frequency in Hz
    frequency: f64,
    /// Peak amplitude
    amplitude: f64,
    /// Initial phase in radians
    phase: f64,
    /// Total length in samples
    length: usize,
    /// Sampling rate in Hz
    sampling_rate: f64,
    /// Read cursor
    position: usize,
}

impl ToneStream {
    /// Create a tone of `duration_secs` seconds
    ///
    /// # Arguments
    /// * `frequency` - Tone frequency in Hz
    /// * `amplitude` - Peak amplitude of the real component
    /// * `duration_secs` - Tone length in seconds
    /// * `sampling_rate` - Sampling rate in Hz
    pub fn new(frequency: f64, amplitude: f64, duration_secs: f64, sampling_rate: f64) -> Self {
        let length = (duration_secs * sampling_rate).round().max(0.0) as usize;
        Self::with_length(frequency, amplitude, length, sampling_rate)
    }

    /// Create a tone with an exact sample count
    pub fn with_length(frequency: f64, amplitude: f64, length: usize, sampling_rate: f64) -> Self {
        Self {
            frequency,
            amplitude,
            phase: 0.0,
            length,
            sampling_rate,
            position: 0,
        }
    }

    /// Set the initial phase in radians
    pub fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase;
        self
    }

    /// Tone frequency in Hz
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    fn sample_at(&self, index: usize) -> AnalyticSample {
        let t = index as f64 / self.sampling_rate;
        AnalyticSample::from_polar(self.amplitude, TAU * self.frequency * t + self.phase)
    }
}

impl AnalyticStream for ToneStream {
    fn samples(&self) -> usize {
        self.length
    }

    fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    fn read(&mut self, data: &mut [AnalyticSample]) -> usize {
        let start = self.position.min(self.length);
        let count = data.len().min(self.length - start);
        for (i, sample) in data[..count].iter_mut().enumerate() {
            *sample = self.sample_at(start + i);
        }
        self.position = start + count;
        count
    }

    fn reset(&mut self) {
        self.position = 0;
    }

    fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// RMS of the real component over exactly `samples()` samples
    ///
    /// Equals `|A|/√2` for whole cycles. Partial cycles and tones at Nyquist
    /// deviate from it.
    fn rms(&self) -> f64 {
        if self.length == 0 {
            return 0.0;
        }
        let n = self.length as f64;
        // Real part is A·cos(ωk + φ); cos² = (1 + cos(2ωk + 2φ)) / 2
        let step = 2.0 * TAU * self.frequency / self.sampling_rate;
        let offset = 2.0 * self.phase;
        let half = step / 2.0;
        let cosine_sum = if half.sin().abs() < 1e-12 {
            n * offset.cos()
        } else {
            (n * half).sin() / half.sin() * (offset + (n - 1.0) * half).cos()
        };
        let mean_square = (0.5 + cosine_sum / (2.0 * n)).max(0.0);
        self.amplitude.abs() * mean_square.sqrt()
    }
}
