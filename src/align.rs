//! # Time-Series Alignment
//!
//! Merges the independently sampled sensor channels of a [`SeriesSet`] into a
//! single [`AlignedTable`] keyed by the union of all timestamps.
//!
//! ## Algorithm
//! 1. Walk every present channel in input order
//! 2. Insert each sample into an ordered map keyed by timestamp, writing the
//!    value into that row's slot for the channel
//! 3. Drain the map in key order
//!
//! The ordered map gives sorting and de-duplication in one pass:
//! `O(n log n)` in the total number of samples.
//!
//! ## Duplicate Timestamps
//! When one channel reports the same timestamp more than once, the sample that
//! appears **later in the input sequence wins** and earlier ones are discarded.
//! Readings are not averaged. Callers that cannot tolerate losing readings
//! should de-duplicate upstream.

use crate::{AlignedRow, AlignedTable, Channel, SeriesSet};
use std::collections::BTreeMap;

/// Align up to three sparse channels on a shared, sorted time axis.
///
/// Every distinct timestamp found in any channel yields exactly one row. The
/// row holds the value of each channel sampled at exactly that timestamp;
/// channels without a sample there stay `None`. Absent, `null` and empty
/// channels contribute nothing.
///
/// This function is pure: it never fails, never mutates `series`, and returns
/// identical output for identical input.
///
/// # Example
/// ```
/// use potbot_lib::{align::align, Channel, Sample, SeriesSet};
///
/// let series = SeriesSet::default()
///     .with(Channel::Light, vec![Sample { time: "T1", val: 10.0 }])
///     .with(Channel::Temp, vec![Sample { time: "T2", val: 21.0 }]);
///
/// let table = align(&series);
/// let rows = table.rows();
/// assert_eq!(rows.len(), 2);
/// assert_eq!(rows[0].light, Some(10.0));
/// assert_eq!(rows[0].temp, None);
/// assert_eq!(rows[1].temp, Some(21.0));
/// ```
pub fn align<T: Ord + Clone>(series: &SeriesSet<T>) -> AlignedTable<T> {
    let mut rows: BTreeMap<&T, AlignedRow<T>> = BTreeMap::new();

    for channel in Channel::ALL {
        for sample in series.channel(channel) {
            rows.entry(&sample.time)
                .or_insert_with(|| AlignedRow::new(sample.time.clone()))
                .set(channel, sample.val);
        }
    }

    AlignedTable {
        rows: rows.into_values().collect(),
    }
}

impl<T> AlignedTable<T> {
    /// Rows in ascending time order.
    pub fn rows(&self) -> &[AlignedRow<T>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Points actually sampled for one channel, in table order.
    ///
    /// The index is the row position in the table, which renderers use as
    /// the horizontal coordinate.
    pub fn channel_values(&self, channel: Channel) -> impl Iterator<Item = (usize, &T, f64)> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter_map(move |(i, row)| row.get(channel).map(|v| (i, &row.time, v)))
    }

    /// Minimum and maximum value of a channel, `None` if it has no values.
    pub fn value_range(&self, channel: Channel) -> Option<(f64, f64)> {
        self.channel_values(channel)
            .fold(None, |acc, (_, _, v)| match acc {
                None => Some((v, v)),
                Some((min, max)) => Some((f64::min(min, v), f64::max(max, v))),
            })
    }

    /// First and last timestamp of the table.
    pub fn time_span(&self) -> Option<(&T, &T)> {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => Some((&first.time, &last.time)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sample;

    fn s(time: &'static str, val: f64) -> Sample<&'static str> {
        Sample { time, val }
    }

    #[test]
    fn test_shared_timestamp_merges_into_one_row() {
        let series = SeriesSet::default()
            .with(Channel::Light, vec![s("T1", 10.0)])
            .with(Channel::Moisture, vec![s("T1", 50.0)]);

        let table = align(&series);

        assert_eq!(
            table.rows(),
            &[AlignedRow {
                time: "T1",
                light: Some(10.0),
                moisture: Some(50.0),
                temp: None,
            }]
        );
    }

    #[test]
    fn test_disjoint_timestamps_keep_channels_sparse() {
        let series = SeriesSet::default()
            .with(Channel::Light, vec![s("T1", 10.0)])
            .with(Channel::Temp, vec![s("T2", 21.0)]);

        let table = align(&series);

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].time, "T1");
        assert_eq!(table.rows()[0].light, Some(10.0));
        assert_eq!(table.rows()[0].temp, None);
        assert_eq!(table.rows()[1].time, "T2");
        assert_eq!(table.rows()[1].light, None);
        assert_eq!(table.rows()[1].temp, Some(21.0));
    }

    #[test]
    fn test_duplicate_timestamp_last_write_wins() {
        let series =
            SeriesSet::default().with(Channel::Moisture, vec![s("T1", 5.0), s("T1", 9.0)]);

        let table = align(&series);

        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].moisture, Some(9.0));
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        // The backend returns newest first
        let series = SeriesSet::default().with(
            Channel::Temp,
            vec![s("2025-01-03", 3.0), s("2025-01-01", 1.0), s("2025-01-02", 2.0)],
        );

        let times: Vec<_> = align(&series).rows().iter().map(|r| r.time).collect();
        assert_eq!(times, vec!["2025-01-01", "2025-01-02", "2025-01-03"]);
    }

    #[test]
    fn test_empty_and_absent_channels_are_equivalent() {
        let absent: SeriesSet<&str> = SeriesSet::default();
        let empty: SeriesSet<&str> = SeriesSet::default()
            .with(Channel::Light, vec![])
            .with(Channel::Moisture, vec![])
            .with(Channel::Temp, vec![]);

        assert!(align(&absent).is_empty());
        assert!(align(&empty).is_empty());
    }

    #[test]
    fn test_value_range_and_span() {
        let series = SeriesSet::default()
            .with(Channel::Light, vec![s("T3", 7.0), s("T1", -2.0)])
            .with(Channel::Temp, vec![s("T2", 20.0)]);
        let table = align(&series);

        assert_eq!(table.value_range(Channel::Light), Some((-2.0, 7.0)));
        assert_eq!(table.value_range(Channel::Temp), Some((20.0, 20.0)));
        assert_eq!(table.value_range(Channel::Moisture), None);
        assert_eq!(table.time_span(), Some((&"T1", &"T3")));

        let light: Vec<_> = table
            .channel_values(Channel::Light)
            .map(|(i, _, v)| (i, v))
            .collect();
        assert_eq!(light, vec![(0, -2.0), (2, 7.0)]);
    }

    #[test]
    fn test_sparse_fields_are_omitted_in_json() {
        let series = SeriesSet::default()
            .with(Channel::Light, vec![s("T1", 10.0)])
            .with(Channel::Temp, vec![s("T2", 21.0)]);

        let json = serde_json::to_value(align(&series)).unwrap();

        assert_eq!(
            json,
            serde_json::json!([
                { "time": "T1", "light": 10.0 },
                { "time": "T2", "temp": 21.0 }
            ])
        );
    }
}
