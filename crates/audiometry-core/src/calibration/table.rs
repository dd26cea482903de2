//! Frequency-indexed point tables
//!
//! Calibration and validation both record per-channel points keyed by
//! frequency. Lookups between control frequencies interpolate linearly over
//! log-frequency and hold the end values outside the recorded range.

use super::{check_frequency, AudioChannel, CalibrationError};
use serde::{Deserialize, Deserializer, Serialize};

/// Relative tolerance under which two frequencies address the same entry
const FREQUENCY_TOLERANCE: f64 = 1e-9;

/// Whether two frequencies address the same table entry
pub fn same_frequency(a: f64, b: f64) -> bool {
    (a - b).abs() <= FREQUENCY_TOLERANCE * a.abs().max(b.abs())
}

/// Interpolate `(frequency, value)` control points at `frequency`
///
/// `points` must be sorted by increasing frequency with positive frequencies.
/// Returns `None` when there are no points.
///
/// # Example
/// ```
/// use audiometry_core::calibration::table::interpolate_log_frequency;
///
/// let points = [(500.0, 0.0), (2000.0, 10.0)];
/// assert_eq!(interpolate_log_frequency(&points, 1000.0), Some(5.0));
/// assert_eq!(interpolate_log_frequency(&points, 100.0), Some(0.0));
/// assert_eq!(interpolate_log_frequency(&[], 100.0), None);
/// ```
pub fn interpolate_log_frequency(points: &[(f64, f64)], frequency: f64) -> Option<f64> {
    let (first, last) = (points.first()?, points.last()?);
    if frequency <= first.0 {
        return Some(first.1);
    }
    if frequency >= last.0 {
        return Some(last.1);
    }

    // first.0 < frequency < last.0, so an upper neighbour exists past index 0
    let upper = points.iter().position(|&(f, _)| f >= frequency)?;
    let (f0, v0) = points[upper - 1];
    let (f1, v1) = points[upper];
    if same_frequency(f1, frequency) {
        return Some(v1);
    }

    let t = (frequency.ln() - f0.ln()) / (f1.ln() - f0.ln());
    Some(v0 + t * (v1 - v0))
}

/// Per-channel values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelPair<P> {
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub left: Option<P>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub right: Option<P>,
}

impl<P> Default for ChannelPair<P> {
    fn default() -> Self {
        Self {
            left: None,
            right: None,
        }
    }
}

impl<P> ChannelPair<P> {
    /// Value for `channel`
    pub fn get(&self, channel: AudioChannel) -> Option<&P> {
        match channel {
            AudioChannel::Left => self.left.as_ref(),
            AudioChannel::Right => self.right.as_ref(),
        }
    }

    /// Record or overwrite the value for `channel`
    pub fn set(&mut self, channel: AudioChannel, value: P) {
        match channel {
            AudioChannel::Left => self.left = Some(value),
            AudioChannel::Right => self.right = Some(value),
        }
    }

    /// Whether neither channel has a value
    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// One frequency row of a [`FrequencyTable`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FrequencyEntry<P> {
    /// Frequency in Hz
    pub frequency: f64,
    /// Per-channel points at this frequency
    #[serde(flatten)]
    pub channels: ChannelPair<P>,
}

/// Points keyed by `(frequency, channel)`, kept sorted by frequency
///
/// Loading accepts rows in any order and sorts them. Rows with a
/// non-positive, non-finite or repeated frequency are rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FrequencyTable<P> {
    entries: Vec<FrequencyEntry<P>>,
}

impl<'de, P: Deserialize<'de>> Deserialize<'de> for FrequencyTable<P> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<FrequencyEntry<P>>::deserialize(deserializer)?;
        Self::from_entries(entries).map_err(serde::de::Error::custom)
    }
}

impl<P> Default for FrequencyTable<P> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<P> FrequencyTable<P> {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from rows in any order
    pub fn from_entries(mut entries: Vec<FrequencyEntry<P>>) -> Result<Self, CalibrationError> {
        for entry in &entries {
            check_frequency(entry.frequency)?;
        }
        entries.sort_by(|a, b| a.frequency.total_cmp(&b.frequency));
        if let Some(pair) = entries
            .windows(2)
            .find(|pair| same_frequency(pair[0].frequency, pair[1].frequency))
        {
            return Err(CalibrationError::InvalidCalibrationValue(format!(
                "frequency {} Hz appears twice",
                pair[1].frequency
            )));
        }
        Ok(Self { entries })
    }

    /// Record or overwrite the point at `(frequency, channel)`
    pub fn set(&mut self, frequency: f64, channel: AudioChannel, point: P) {
        match self
            .entries
            .iter()
            .position(|e| same_frequency(e.frequency, frequency) || e.frequency > frequency)
        {
            Some(index) if same_frequency(self.entries[index].frequency, frequency) => {
                self.entries[index].channels.set(channel, point);
            }
            Some(index) => self.entries.insert(index, Self::entry(frequency, channel, point)),
            None => self.entries.push(Self::entry(frequency, channel, point)),
        }
    }

    fn entry(frequency: f64, channel: AudioChannel, point: P) -> FrequencyEntry<P> {
        let mut channels = ChannelPair::default();
        channels.set(channel, point);
        FrequencyEntry { frequency, channels }
    }

    /// Point recorded at exactly `frequency` for `channel`
    pub fn get(&self, frequency: f64, channel: AudioChannel) -> Option<&P> {
        self.entries
            .iter()
            .find(|e| same_frequency(e.frequency, frequency))
            .and_then(|e| e.channels.get(channel))
    }

    /// All points for `channel` in increasing frequency order
    pub fn channel_points(&self, channel: AudioChannel) -> impl Iterator<Item = (f64, &P)> + '_ {
        self.entries
            .iter()
            .filter_map(move |e| e.channels.get(channel).map(|p| (e.frequency, p)))
    }

    /// Rows in increasing frequency order
    pub fn entries(&self) -> &[FrequencyEntry<P>] {
        &self.entries
    }

    /// Number of frequency rows
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Interpolate a derived value for `channel` at `frequency`
    ///
    /// `value` maps each recorded point to the quantity being interpolated.
    /// Returns `None` when the channel has no points.
    pub fn interpolate<F>(&self, channel: AudioChannel, frequency: f64, value: F) -> Option<f64>
    where
        F: Fn(f64, &P) -> f64,
    {
        let points: Vec<(f64, f64)> = self
            .channel_points(channel)
            .map(|(f, p)| (f, value(f, p)))
            .collect();
        interpolate_log_frequency(&points, frequency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_single_point() {
        assert_eq!(interpolate_log_frequency(&[(1000.0, 3.0)], 50.0), Some(3.0));
        assert_eq!(interpolate_log_frequency(&[(1000.0, 3.0)], 5000.0), Some(3.0));
    }

    #[test]
    fn test_interpolate_at_boundaries() {
        let points = [(250.0, 1.0), (1000.0, 2.0), (4000.0, 4.0)];
        assert_eq!(interpolate_log_frequency(&points, 250.0), Some(1.0));
        assert_eq!(interpolate_log_frequency(&points, 1000.0), Some(2.0));
        assert_eq!(interpolate_log_frequency(&points, 4000.0), Some(4.0));
        assert_eq!(interpolate_log_frequency(&points, 8000.0), Some(4.0));
    }

    #[test]
    fn test_interpolate_monotonic_between_points() {
        let points = [(250.0, 1.0), (1000.0, 2.0), (4000.0, 4.0)];
        let mut previous = f64::NEG_INFINITY;
        let mut frequency = 250.0;
        while frequency <= 4000.0 {
            let value = interpolate_log_frequency(&points, frequency).unwrap();
            assert!(value >= previous);
            previous = value;
            frequency *= 1.05;
        }
    }

    #[test]
    fn test_table_set_keeps_sorted_and_overwrites() {
        let mut table = FrequencyTable::new();
        table.set(2000.0, AudioChannel::Left, 2.0);
        table.set(500.0, AudioChannel::Left, 0.5);
        table.set(1000.0, AudioChannel::Right, 1.0);
        table.set(2000.0, AudioChannel::Left, 2.5);

        let frequencies: Vec<f64> = table.entries().iter().map(|e| e.frequency).collect();
        assert_eq!(frequencies, vec![500.0, 1000.0, 2000.0]);
        assert_eq!(table.get(2000.0, AudioChannel::Left), Some(&2.5));
        assert_eq!(table.get(1000.0, AudioChannel::Left), None);
        assert_eq!(table.channel_points(AudioChannel::Left).count(), 2);
    }

    #[test]
    fn test_table_interpolate_skips_other_channel() {
        let mut table = FrequencyTable::new();
        table.set(500.0, AudioChannel::Left, 1.0);
        table.set(1000.0, AudioChannel::Right, 100.0);
        table.set(2000.0, AudioChannel::Left, 3.0);

        let value = table.interpolate(AudioChannel::Left, 1000.0, |_, p| *p).unwrap();
        assert!((value - 2.0).abs() < 1e-12);
        assert_eq!(table.interpolate(AudioChannel::Right, 4000.0, |_, p| *p), Some(100.0));
    }

    #[test]
    fn test_table_serializes_pascal_case() {
        let mut table = FrequencyTable::new();
        table.set(1000.0, AudioChannel::Left, 0.5);
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json, serde_json::json!([{ "Frequency": 1000.0, "Left": 0.5 }]));

        let loaded: FrequencyTable<f64> = serde_json::from_value(json).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_table_load_sorts_reversed_rows() {
        let json = serde_json::json!([
            { "Frequency": 4000.0, "Left": 4.0 },
            { "Frequency": 1000.0, "Left": 2.0 },
            { "Frequency": 250.0, "Left": 1.0 }
        ]);
        let loaded: FrequencyTable<f64> = serde_json::from_value(json).unwrap();

        let frequencies: Vec<f64> = loaded.entries().iter().map(|e| e.frequency).collect();
        assert_eq!(frequencies, vec![250.0, 1000.0, 4000.0]);
        let value = loaded.interpolate(AudioChannel::Left, 500.0, |_, p| *p).unwrap();
        assert!((value - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_table_load_rejects_bad_frequencies() {
        let rejected = [
            serde_json::json!([{ "Frequency": 1000.0, "Left": 1.0 }, { "Frequency": 1000.0, "Right": 2.0 }]),
            serde_json::json!([{ "Frequency": 0.0, "Left": 1.0 }]),
            serde_json::json!([{ "Frequency": -250.0, "Left": 1.0 }]),
        ];
        for json in rejected {
            assert!(serde_json::from_value::<FrequencyTable<f64>>(json.clone()).is_err(), "{json}");
        }
    }
}
