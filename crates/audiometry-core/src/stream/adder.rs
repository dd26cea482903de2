//! Sample-for-sample mixing of analytic streams
//!
//! A [`StreamAdder`] owns a set of child streams and presents their sum as a
//! single stream. Shorter children are treated as if padded with silence.

use super::{
    AnalyticSample, AnalyticStream, PresentationConstraints, StreamError, DEFAULT_SAMPLING_RATE,
};
use std::cell::OnceCell;
use tracing::debug;

/// Size of the scratch buffer each child is pulled through
const BUFFER_SIZE: usize = 512;

/// Handle identifying a child stream inside a [`StreamAdder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

struct Child {
    id: StreamId,
    stream: Box<dyn AnalyticStream>,
}

/// Composite stream summing its children
///
/// All children must share one sampling rate. The adder length is the
/// longest child; RMS is combined as `sqrt(Σ rms²)`, which holds for
/// uncorrelated sources.
///
/// # Example
/// ```
/// use audiometry_core::stream::adder::StreamAdder;
/// use audiometry_core::stream::buffer::ToneStream;
/// use audiometry_core::stream::AnalyticStream;
///
/// let mut adder = StreamAdder::new();
/// adder.add_stream(ToneStream::with_length(500.0, 1.0, 480, 48000.0)).unwrap();
/// adder.add_stream(ToneStream::with_length(1000.0, 1.0, 960, 48000.0)).unwrap();
/// assert_eq!(adder.samples(), 960);
/// assert!((adder.rms() - 1.0).abs() < 1e-12);
/// ```
pub struct StreamAdder {
    /// Child streams in insertion order
    streams: Vec<Child>,
    /// Next identifier to hand out
    next_id: u64,
    /// Longest child length
    sample_count: usize,
    /// Common sampling rate of all children
    sampling_rate: f64,
    /// Scratch buffer reused across children
    buffer: Box<[AnalyticSample]>,
    /// Combined RMS, cleared on membership change
    rms: OnceCell<f64>,
    /// Merged presentation constraints, cleared on membership change
    constraints: OnceCell<Option<PresentationConstraints>>,
}

impl std::fmt::Debug for StreamAdder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAdder")
            .field("streams", &self.streams.len())
            .field("sample_count", &self.sample_count)
            .field("sampling_rate", &self.sampling_rate)
            .finish()
    }
}

impl StreamAdder {
    /// Create an empty adder
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            next_id: 0,
            sample_count: 0,
            sampling_rate: DEFAULT_SAMPLING_RATE,
            buffer: vec![AnalyticSample::new(0.0, 0.0); BUFFER_SIZE].into_boxed_slice(),
            rms: OnceCell::new(),
            constraints: OnceCell::new(),
        }
    }

    /// Create an adder from a set of streams
    ///
    /// # Errors
    /// [`StreamError::SamplingRateMismatch`] if the streams disagree on
    /// sampling rate.
    pub fn from_streams<I>(streams: I) -> Result<Self, StreamError>
    where
        I: IntoIterator<Item = Box<dyn AnalyticStream>>,
    {
        let mut adder = Self::new();
        adder.add_streams(streams)?;
        Ok(adder)
    }

    /// Add a child stream
    ///
    /// # Errors
    /// [`StreamError::SamplingRateMismatch`] if the stream's sampling rate
    /// differs from the children already present. The adder is unchanged
    /// and the rejected stream is dropped.
    pub fn add_stream<S>(&mut self, stream: S) -> Result<StreamId, StreamError>
    where
        S: AnalyticStream + 'static,
    {
        self.add_boxed(Box::new(stream))
    }

    /// Add an already boxed child stream
    pub fn add_boxed(&mut self, stream: Box<dyn AnalyticStream>) -> Result<StreamId, StreamError> {
        self.check_rate(stream.sampling_rate())?;
        let id = self.push(stream);
        self.update_stats();
        Ok(id)
    }

    /// Add several child streams at once
    ///
    /// Either all streams are added or none is.
    ///
    /// # Errors
    /// [`StreamError::SamplingRateMismatch`] if any two streams (new or
    /// existing) disagree on sampling rate.
    pub fn add_streams<I>(&mut self, streams: I) -> Result<Vec<StreamId>, StreamError>
    where
        I: IntoIterator<Item = Box<dyn AnalyticStream>>,
    {
        let streams: Vec<Box<dyn AnalyticStream>> = streams.into_iter().collect();

        let mut expected = self.streams.first().map(|c| c.stream.sampling_rate());
        for stream in &streams {
            let actual = stream.sampling_rate();
            match expected {
                Some(rate) if rate != actual => {
                    return Err(StreamError::SamplingRateMismatch {
                        expected: rate,
                        actual,
                    });
                }
                Some(_) => {}
                None => expected = Some(actual),
            }
        }

        let ids = streams.into_iter().map(|stream| self.push(stream)).collect();
        self.update_stats();
        Ok(ids)
    }

    /// Remove a child stream by identity
    ///
    /// # Returns
    /// The removed stream, or `None` if no child has this id
    pub fn remove_stream(&mut self, id: StreamId) -> Option<Box<dyn AnalyticStream>> {
        let index = self.streams.iter().position(|c| c.id == id)?;
        let child = self.streams.remove(index);
        self.update_stats();
        Some(child.stream)
    }

    /// Number of child streams
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether the adder has no children
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Ids of the children in insertion order
    pub fn stream_ids(&self) -> Vec<StreamId> {
        self.streams.iter().map(|c| c.id).collect()
    }

    fn check_rate(&self, actual: f64) -> Result<(), StreamError> {
        match self.streams.first() {
            Some(child) if child.stream.sampling_rate() != actual => {
                Err(StreamError::SamplingRateMismatch {
                    expected: child.stream.sampling_rate(),
                    actual,
                })
            }
            _ => Ok(()),
        }
    }

    fn push(&mut self, stream: Box<dyn AnalyticStream>) -> StreamId {
        let id = StreamId(self.next_id);
        self.next_id += 1;
        self.streams.push(Child { id, stream });
        id
    }

    /// Recompute membership-derived statistics and clear cached ones
    fn update_stats(&mut self) {
        match self.streams.first() {
            Some(first) => {
                self.sampling_rate = first.stream.sampling_rate();
                self.sample_count = self
                    .streams
                    .iter()
                    .map(|c| c.stream.samples())
                    .max()
                    .unwrap_or(0);
            }
            None => {
                self.sampling_rate = DEFAULT_SAMPLING_RATE;
                self.sample_count = 0;
            }
        }
        self.rms = OnceCell::new();
        self.constraints = OnceCell::new();

        debug!(
            streams = self.streams.len(),
            samples = self.sample_count,
            sampling_rate = self.sampling_rate,
            "Stream adder membership changed"
        );
    }
}

impl Default for StreamAdder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticStream for StreamAdder {
    fn samples(&self) -> usize {
        self.sample_count
    }

    fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    fn read(&mut self, data: &mut [AnalyticSample]) -> usize {
        let count = data.len();
        let mut min_remaining = count;

        data.fill(AnalyticSample::new(0.0, 0.0));

        for child in &mut self.streams {
            let mut remaining = count;
            let mut offset = 0;

            while remaining > 0 {
                let max_read = BUFFER_SIZE.min(remaining);
                let read = child.stream.read(&mut self.buffer[..max_read]);
                if read == 0 {
                    break;
                }

                for (out, sample) in data[offset..offset + read].iter_mut().zip(&self.buffer[..read]) {
                    *out += *sample;
                }

                offset += read;
                remaining -= read;
            }

            min_remaining = min_remaining.min(remaining);
        }

        count - min_remaining
    }

    fn reset(&mut self) {
        for child in &mut self.streams {
            child.stream.reset();
        }
    }

    fn seek(&mut self, position: usize) {
        for child in &mut self.streams {
            child.stream.seek(position);
        }
    }

    fn rms(&self) -> f64 {
        *self.rms.get_or_init(|| {
            self.streams
                .iter()
                .map(|c| {
                    let rms = c.stream.rms();
                    rms * rms
                })
                .sum::<f64>()
                .sqrt()
        })
    }

    fn presentation_constraints(&self) -> Option<PresentationConstraints> {
        self.constraints
            .get_or_init(|| {
                PresentationConstraints::merge_all(
                    self.streams
                        .iter()
                        .filter_map(|c| c.stream.presentation_constraints()),
                )
            })
            .clone()
    }
}
