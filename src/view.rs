//! # Plant Log View
//!
//! Display-layer state for the sensor chart of one plant: the selected time
//! window, whether a fetch is in flight, and the last aligned table.
//!
//! ## Stale Responses
//!
//! Every fetch is tagged with a [`FetchTicket`] drawn from a shared
//! [`RequestSequencer`]. Changing the window issues a new ticket, and a
//! completed fetch is applied only if its ticket is still the latest one
//! issued. A slow response for an old window can therefore never overwrite the
//! table for the window the user is looking at now.

use crate::align::align;
use crate::client::{ClientError, PotbotClient};
use crate::{AlignedTable, SeriesSet, Timestamp};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewError {
    #[error("Missing plant id")]
    MissingPlant,

    #[error("window start {start} is after end {end}")]
    InvertedWindow { start: Timestamp, end: Timestamp },

    #[error("a window of {0} days is out of range")]
    WindowOutOfRange(i64),

    #[error("session expired, log in again")]
    Unauthorized,

    #[error("Could not fetch logs: {0}")]
    Fetch(String),

    #[error("superseded by a newer request")]
    Superseded,
}

/// Inclusive time range of logs to request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, ViewError> {
        if start > end {
            return Err(ViewError::InvertedWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// The `days` days ending at `end`.
    ///
    /// Negative lengths are rejected like any other inverted window.
    pub fn ending_at(end: Timestamp, days: i64) -> Result<Self, ViewError> {
        let start = Duration::try_days(days)
            .and_then(|length| end.checked_sub_signed(length))
            .ok_or(ViewError::WindowOutOfRange(days))?;
        Self::new(start, end)
    }

    /// The `days` days ending now.
    pub fn last_days(days: i64) -> Result<Self, ViewError> {
        Self::ending_at(Utc::now(), days)
    }

    pub fn contains(&self, time: &Timestamp) -> bool {
        self.start <= *time && *time <= self.end
    }
}

/// Identifies one fetch; ordered by issue time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

/// Monotonic source of [`FetchTicket`]s.
///
/// Shareable across tasks behind an `Arc`; a spawned fetch can check
/// [`is_latest`](Self::is_latest) before spending time on a result nobody
/// will look at.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a ticket newer than every ticket issued before it.
    pub fn issue(&self) -> FetchTicket {
        FetchTicket(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_latest(&self, ticket: FetchTicket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ViewState {
    /// Nothing requested yet
    Idle,
    Loading,
    Error(ViewError),
    Loaded(AlignedTable),
}

/// Chart state for one plant.
#[derive(Debug)]
pub struct PlantLogView {
    plant_id: String,
    window: TimeWindow,
    state: ViewState,
    sequencer: Arc<RequestSequencer>,
}

impl PlantLogView {
    pub fn new(plant_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            plant_id: plant_id.into(),
            window,
            state: ViewState::Idle,
            sequencer: Arc::new(RequestSequencer::new()),
        }
    }

    pub fn plant_id(&self) -> &str {
        &self.plant_id
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Aligned table of the last applied fetch, if it succeeded.
    pub fn table(&self) -> Option<&AlignedTable> {
        match &self.state {
            ViewState::Loaded(table) => Some(table),
            _ => None,
        }
    }

    pub fn sequencer(&self) -> Arc<RequestSequencer> {
        Arc::clone(&self.sequencer)
    }

    /// Start a fetch for the current window.
    ///
    /// Any fetch still in flight becomes stale.
    pub fn begin(&mut self) -> Result<FetchTicket, ViewError> {
        if self.plant_id.is_empty() {
            self.state = ViewState::Error(ViewError::MissingPlant);
            return Err(ViewError::MissingPlant);
        }
        let ticket = self.sequencer.issue();
        self.state = ViewState::Loading;
        debug!(plant = %self.plant_id, ?ticket, "fetch started");
        Ok(ticket)
    }

    /// Switch to a new window and start fetching it.
    pub fn set_window(&mut self, window: TimeWindow) -> Result<FetchTicket, ViewError> {
        self.window = window;
        self.begin()
    }

    /// Apply the outcome of the fetch identified by `ticket`.
    ///
    /// Returns `false`, leaving the state untouched, when a newer fetch has
    /// been started since.
    pub fn apply(&mut self, ticket: FetchTicket, result: Result<SeriesSet, ClientError>) -> bool {
        if !self.sequencer.is_latest(ticket) {
            debug!(plant = %self.plant_id, ?ticket, "discarding stale response");
            return false;
        }
        self.state = match result {
            Ok(logs) => ViewState::Loaded(align(&logs)),
            Err(ClientError::Unauthorized(_)) => ViewState::Error(ViewError::Unauthorized),
            Err(err) => {
                warn!(plant = %self.plant_id, error = %err, "log fetch failed");
                ViewState::Error(ViewError::Fetch(err.to_string()))
            }
        };
        true
    }

    /// Fetch the current window and align it.
    pub async fn refresh(&mut self, client: &PotbotClient) -> Result<&AlignedTable, ViewError> {
        let ticket = self.begin()?;
        let result = client.plant_logs(&self.plant_id, &self.window).await;
        if !self.apply(ticket, result) {
            return Err(ViewError::Superseded);
        }
        match &self.state {
            ViewState::Loaded(table) => Ok(table),
            ViewState::Error(err) => Err(err.clone()),
            _ => Err(ViewError::Superseded),
        }
    }
}
