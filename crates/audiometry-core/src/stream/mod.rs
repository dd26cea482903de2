//! Analytic stream graph
//!
//! This module contains the pull-based streaming half of the engine:
//! - The analytic sample type and the [`AnalyticStream`] contract
//! - Composite mixing of child streams ([`adder`])
//! - Pre-rendered and generated leaf streams ([`buffer`])
//! - FFT-based conversion from real to analytic signals ([`hilbert`])
//! - RMS normalization used to apply calibration output ([`normalize`])

pub mod adder;
pub mod buffer;
pub mod hilbert;
pub mod normalize;

use std::collections::BTreeSet;
use thiserror::Error;

/// One point of an analytic (Hilbert-transformed) signal.
///
/// The real part is the audible signal, the imaginary part its quadrature.
pub type AnalyticSample = rustfft::num_complex::Complex<f64>;

/// Sampling rate reported by a composite stream with no children
pub const DEFAULT_SAMPLING_RATE: f64 = 44100.0;

/// Errors raised while composing streams
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Sampling rate mismatch: expected {expected} Hz, got {actual} Hz")]
    SamplingRateMismatch { expected: f64, actual: f64 },
}

/// A sequentially readable analytic signal
///
/// Streams are synchronous and pull-based: nothing is computed until
/// [`read`](AnalyticStream::read) is called. Statistics such as
/// [`rms`](AnalyticStream::rms) describe the whole stream and are not
/// affected by the read cursor.
///
/// Dropping a stream releases any child streams it owns.
pub trait AnalyticStream: Send {
    /// Total number of samples this stream can produce
    fn samples(&self) -> usize;

    /// Sampling rate in Hz; fixed for the lifetime of the stream
    fn sampling_rate(&self) -> f64;

    /// Fill `data` with the next samples
    ///
    /// To read `count` samples at `offset` of a larger buffer, pass
    /// `&mut buffer[offset..offset + count]`.
    ///
    /// # Returns
    /// Number of samples written. Fewer than `data.len()` only at the end of
    /// the stream; 0 once the stream is exhausted.
    fn read(&mut self, data: &mut [AnalyticSample]) -> usize;

    /// Rewind to the first sample
    fn reset(&mut self);

    /// Move the read cursor to an absolute sample index
    ///
    /// Seeking past the end is allowed; subsequent reads return 0.
    fn seek(&mut self, position: usize);

    /// Root-mean-square amplitude of the real component over the full stream
    fn rms(&self) -> f64;

    /// Requirements for presenting this stream, or `None` when unconstrained
    fn presentation_constraints(&self) -> Option<PresentationConstraints> {
        None
    }
}

impl<T: AnalyticStream + ?Sized> AnalyticStream for Box<T> {
    fn samples(&self) -> usize {
        (**self).samples()
    }

    fn sampling_rate(&self) -> f64 {
        (**self).sampling_rate()
    }

    fn read(&mut self, data: &mut [AnalyticSample]) -> usize {
        (**self).read(data)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn seek(&mut self, position: usize) {
        (**self).seek(position)
    }

    fn rms(&self) -> f64 {
        (**self).rms()
    }

    fn presentation_constraints(&self) -> Option<PresentationConstraints> {
        (**self).presentation_constraints()
    }
}

/// How a stream may be played back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentationConstraints {
    /// Minimum number of output channels the stream needs
    pub required_channels: Option<u16>,
    /// Transducers allowed to present the stream (`None` = any)
    pub transducers: Option<BTreeSet<String>>,
}

impl PresentationConstraints {
    /// Constraints requiring at least `channels` output channels
    pub fn channels(channels: u16) -> Self {
        Self {
            required_channels: Some(channels),
            transducers: None,
        }
    }

    /// Constraints limiting presentation to the named transducers
    pub fn transducers<I, T>(names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            required_channels: None,
            transducers: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Combine two constraint sets so that both are satisfied
    ///
    /// Channel requirements take the larger value, transducer sets intersect.
    /// An empty transducer set means no device can present the stream.
    pub fn merge(&self, other: &Self) -> Self {
        let required_channels = match (self.required_channels, other.required_channels) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        let transducers = match (&self.transducers, &other.transducers) {
            (Some(a), Some(b)) => Some(a.intersection(b).cloned().collect()),
            (a, b) => a.clone().or_else(|| b.clone()),
        };

        Self {
            required_channels,
            transducers,
        }
    }

    /// Merge a sequence of constraint sets
    ///
    /// Returns `None` if the sequence is empty, i.e. nothing is constrained.
    pub fn merge_all<I>(constraints: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        constraints
            .into_iter()
            .reduce(|acc, next| acc.merge(&next))
    }

    /// Whether any device at all can satisfy these constraints
    pub fn is_presentable(&self) -> bool {
        self.transducers.as_ref().map_or(true, |set| !set.is_empty())
    }

    /// Whether the named transducer is allowed to present the stream
    pub fn allows_transducer(&self, name: &str) -> bool {
        self.transducers
            .as_ref()
            .map_or(true, |set| set.contains(name))
    }
}

/// Root-mean-square of the real component of `samples`
pub fn real_rms(samples: &[AnalyticSample]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| s.re * s.re).sum();
    (sum / samples.len() as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_arithmetic() {
        let a = AnalyticSample::new(1.0, 2.0);
        let b = AnalyticSample::new(0.5, -1.0);

        assert_eq!(a + b, AnalyticSample::new(1.5, 1.0));
        assert_eq!(a * 2.0, AnalyticSample::new(2.0, 4.0));
        // (1 + 2i)(0.5 - i) = 0.5 - i + i - 2i^2 = 2.5
        assert_eq!(a * b, AnalyticSample::new(2.5, 0.0));
    }

    #[test]
    fn test_merge_channels_takes_max() {
        let merged = PresentationConstraints::channels(1).merge(&PresentationConstraints::channels(2));
        assert_eq!(merged.required_channels, Some(2));
        assert_eq!(merged.transducers, None);
    }

    #[test]
    fn test_merge_transducers_intersect() {
        let a = PresentationConstraints::transducers(["HD650", "TDH-39"]);
        let b = PresentationConstraints::transducers(["TDH-39", "ER-3A"]);
        let merged = a.merge(&b);

        let expected: BTreeSet<String> = ["TDH-39".to_string()].into_iter().collect();
        assert_eq!(merged.transducers, Some(expected));
        assert!(merged.allows_transducer("TDH-39"));
        assert!(!merged.allows_transducer("HD650"));
        assert!(merged.is_presentable());
    }

    #[test]
    fn test_merge_disjoint_transducers_not_presentable() {
        let a = PresentationConstraints::transducers(["HD650"]);
        let b = PresentationConstraints::transducers(["ER-3A"]);
        assert!(!a.merge(&b).is_presentable());
    }

    #[test]
    fn test_unconstrained_side_keeps_other() {
        let a = PresentationConstraints::default();
        let b = PresentationConstraints::transducers(["HD650"]);
        let merged = a.merge(&b);
        assert!(merged.allows_transducer("HD650"));
        assert!(!merged.allows_transducer("ER-3A"));
    }

    #[test]
    fn test_real_rms() {
        assert_eq!(real_rms(&[]), 0.0);
        let samples = vec![AnalyticSample::new(1.0, 5.0), AnalyticSample::new(-1.0, 3.0)];
        assert!((real_rms(&samples) - 1.0).abs() < 1e-12);
    }
}
