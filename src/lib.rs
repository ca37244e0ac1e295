//! # Potbot Viewer Core Library
//!
//! This library provides the data structures and building blocks for the potbot
//! plant-monitor client. A potbot plant reports three sensor channels (light,
//! soil moisture and temperature) to a backend, each on its own schedule. The
//! viewer fetches those logs for a time window, lines the three channels up on
//! a shared time axis and charts them.
//!
//! ## Design Philosophy
//!
//! ### Sparse In, Sparse Out
//! - **Independent sampling**: each channel arrives as its own list of
//!   `(time, val)` samples; timestamps rarely coincide across channels
//! - **No invented data**: a channel with no sample at an instant is simply
//!   absent from that row, never zero and never `null`
//! - **Generic timestamps**: any totally ordered type works as a timestamp;
//!   the default is [`chrono::DateTime<Utc>`](chrono::DateTime)
//!
//! ### Data Flow
//! 1. **Fetch**: [`client::PotbotClient::plant_logs`] posts a time window and
//!    receives a [`SeriesSet`]
//! 2. **Align**: [`align::align`] merges the channels into an [`AlignedTable`]
//! 3. **Render**: [`renderer`] draws the table as ASCII or onto a pixel canvas
//!
//! The [`view`] module wraps steps 1 and 2 with the loading/error state and the
//! stale-response guard a display needs.
//!
//! ## Core Types
//! - [`Sample`]: one sensor reading
//! - [`SeriesSet`]: the three raw channels as returned by the backend
//! - [`AlignedRow`] / [`AlignedTable`]: the merged, time-ordered result

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use tracing::warn;

// Module declarations
pub mod align;
pub mod client;
pub mod config;
pub mod renderer;
pub mod session;
pub mod view;

#[cfg(test)]
mod tests;

/// Default timestamp representation used on the wire.
///
/// The backend encodes times as RFC 3339 strings; chrono parses them into
/// UTC instants whose ordering matches chronological order.
pub type Timestamp = DateTime<Utc>;

/// One of the three sensor channels a plant reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Light,
    Moisture,
    Temp,
}

impl Channel {
    /// All channels in their canonical output order.
    pub const ALL: [Channel; 3] = [Channel::Light, Channel::Moisture, Channel::Temp];

    /// Wire name of the channel, as used for JSON keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Light => "light",
            Channel::Moisture => "moisture",
            Channel::Temp => "temp",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single sensor reading.
///
/// # Example
/// ```
/// use potbot_lib::Sample;
///
/// let reading = Sample { time: "2025-06-01T12:00:00Z", val: 412.0 };
/// assert_eq!(reading.val, 412.0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample<T = Timestamp> {
    /// Instant the reading was taken
    pub time: T,
    /// Raw sensor value
    pub val: f64,
}

/// Raw sensor logs for one plant, one optional sequence per channel.
///
/// A channel that is missing from the JSON body, `null`, or an empty array is
/// treated as "no data"; the three cases are indistinguishable to every
/// consumer in this crate. Keys other than the three channel names are ignored.
///
/// Deserialization is lenient per sample: an entry whose `time` or `val` does
/// not parse is dropped with a warning and the rest of the channel is kept. A
/// channel that is not an array at all counts as "no data".
///
/// # Example
/// ```
/// use potbot_lib::{Channel, SeriesSet};
///
/// let json = r#"{ "light": [{ "time": 1, "val": 10.0 }], "temp": null }"#;
/// let set: SeriesSet<i64> = serde_json::from_str(json).unwrap();
///
/// assert_eq!(set.channel(Channel::Light).len(), 1);
/// assert!(set.channel(Channel::Temp).is_empty());
/// assert!(set.channel(Channel::Moisture).is_empty());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct SeriesSet<T = Timestamp> {
    #[serde(
        default,
        deserialize_with = "lenient_samples",
        skip_serializing_if = "Option::is_none"
    )]
    pub light: Option<Vec<Sample<T>>>,
    #[serde(
        default,
        deserialize_with = "lenient_samples",
        skip_serializing_if = "Option::is_none"
    )]
    pub moisture: Option<Vec<Sample<T>>>,
    #[serde(
        default,
        deserialize_with = "lenient_samples",
        skip_serializing_if = "Option::is_none"
    )]
    pub temp: Option<Vec<Sample<T>>>,
}

/// Parse one channel, keeping every entry that is a valid sample.
fn lenient_samples<'de, D, T>(deserializer: D) -> Result<Option<Vec<Sample<T>>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let entries = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Array(entries) => entries,
        serde_json::Value::Null => return Ok(None),
        other => {
            warn!(found = %other, "ignoring channel that is not a list of samples");
            return Ok(None);
        }
    };

    let total = entries.len();
    let samples: Vec<Sample<T>> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect();
    let dropped = total - samples.len();
    if dropped > 0 {
        warn!(dropped, "dropped malformed samples");
    }
    Ok(Some(samples))
}

impl<T> Default for SeriesSet<T> {
    fn default() -> Self {
        Self {
            light: None,
            moisture: None,
            temp: None,
        }
    }
}

impl<T> SeriesSet<T> {
    /// Samples for `channel`, or an empty slice when the channel carries no data.
    pub fn channel(&self, channel: Channel) -> &[Sample<T>] {
        let samples = match channel {
            Channel::Light => &self.light,
            Channel::Moisture => &self.moisture,
            Channel::Temp => &self.temp,
        };
        samples.as_deref().unwrap_or(&[])
    }

    /// Replace the samples of one channel, builder style.
    pub fn with(mut self, channel: Channel, samples: Vec<Sample<T>>) -> Self {
        let slot = match channel {
            Channel::Light => &mut self.light,
            Channel::Moisture => &mut self.moisture,
            Channel::Temp => &mut self.temp,
        };
        *slot = Some(samples);
        self
    }

    /// True when no channel holds a single sample.
    pub fn is_empty(&self) -> bool {
        Channel::ALL.iter().all(|&c| self.channel(c).is_empty())
    }

    /// Drop samples whose value is NaN or infinite.
    ///
    /// Returns how many samples were removed. The aligner itself accepts any
    /// value; this is the validation hook for data coming off the network.
    pub fn retain_finite(&mut self) -> usize {
        let mut dropped = 0;
        for samples in [&mut self.light, &mut self.moisture, &mut self.temp]
            .into_iter()
            .flatten()
        {
            let before = samples.len();
            samples.retain(|s| s.val.is_finite());
            dropped += before - samples.len();
        }
        dropped
    }
}

/// One instant of the aligned table.
///
/// Channels without a sample at `time` are `None` and are omitted entirely
/// when serialized, so a row with only a light reading becomes
/// `{"time": ..., "light": 10.0}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignedRow<T = Timestamp> {
    pub time: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moisture: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<f64>,
}

impl<T> AlignedRow<T> {
    /// An empty row at `time`.
    pub fn new(time: T) -> Self {
        Self {
            time,
            light: None,
            moisture: None,
            temp: None,
        }
    }

    /// Value of `channel` at this instant, if sampled.
    pub fn get(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Light => self.light,
            Channel::Moisture => self.moisture,
            Channel::Temp => self.temp,
        }
    }

    /// Set the value of `channel`, overwriting any earlier value.
    pub fn set(&mut self, channel: Channel, val: f64) {
        let slot = match channel {
            Channel::Light => &mut self.light,
            Channel::Moisture => &mut self.moisture,
            Channel::Temp => &mut self.temp,
        };
        *slot = Some(val);
    }
}

/// Rows strictly increasing by `time`, one per distinct input timestamp.
///
/// Built by [`align::align`]; serializes as a plain JSON array of rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlignedTable<T = Timestamp> {
    rows: Vec<AlignedRow<T>>,
}

impl<T> Default for AlignedTable<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}
