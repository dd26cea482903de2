//! RMS normalization
//!
//! Calibration answers "what RMS produces level L". Applying that answer to a
//! stream means multiplying every sample by `target_rms / stream_rms`.

use super::{AnalyticSample, AnalyticStream, PresentationConstraints};

/// Scale factor that brings a stream of `stream_rms` to `target_rms`
///
/// Returns 0.0 for silent streams, which cannot be normalized.
pub fn scale_factor(stream_rms: f64, target_rms: f64) -> f64 {
    if stream_rms > 0.0 && stream_rms.is_finite() {
        target_rms / stream_rms
    } else {
        0.0
    }
}

/// A stream scaled by a constant factor
pub struct NormalizedStream {
    inner: Box<dyn AnalyticStream>,
    factor: f64,
}

impl NormalizedStream {
    /// Scale `inner` so its RMS equals `target_rms`
    ///
    /// # Example
    /// ```
    /// use audiometry_core::stream::buffer::ToneStream;
    /// use audiometry_core::stream::normalize::NormalizedStream;
    /// use audiometry_core::stream::AnalyticStream;
    ///
    /// let tone = ToneStream::with_length(1000.0, 1.0, 480, 48000.0);
    /// let stream = NormalizedStream::to_rms(tone, 0.01);
    /// assert!((stream.rms() - 0.01).abs() < 1e-12);
    /// ```
    pub fn to_rms<S>(inner: S, target_rms: f64) -> Self
    where
        S: AnalyticStream + 'static,
    {
        let factor = scale_factor(inner.rms(), target_rms);
        Self::with_factor(inner, factor)
    }

    /// Scale `inner` by a fixed linear factor
    pub fn with_factor<S>(inner: S, factor: f64) -> Self
    where
        S: AnalyticStream + 'static,
    {
        Self {
            inner: Box::new(inner),
            factor,
        }
    }

    /// Linear factor applied to every sample
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Release the wrapped stream
    pub fn into_inner(self) -> Box<dyn AnalyticStream> {
        self.inner
    }
}

impl AnalyticStream for NormalizedStream {
    fn samples(&self) -> usize {
        self.inner.samples()
    }

    fn sampling_rate(&self) -> f64 {
        self.inner.sampling_rate()
    }

    fn read(&mut self, data: &mut [AnalyticSample]) -> usize {
        let read = self.inner.read(data);
        for sample in &mut data[..read] {
            *sample *= self.factor;
        }
        read
    }

    fn reset(&mut self) {
        self.inner.reset()
    }

    fn seek(&mut self, position: usize) {
        self.inner.seek(position)
    }

    fn rms(&self) -> f64 {
        self.inner.rms() * self.factor.abs()
    }

    fn presentation_constraints(&self) -> Option<PresentationConstraints> {
        self.inner.presentation_constraints()
    }
}
