use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A booked session as it appears on the calendar.
///
/// Produced by a [`CalendarSource`]; the core never mutates one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Opaque identifier, unique per occurrence at the source
    pub id: String,
    pub title: String,
    /// Free text; may contain HTML markup and "Label: value" lines
    pub description: String,
    /// Holds the meeting-link URL in this domain
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Which kind of session an event was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Phase1,
    Phase2,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Phase1 => "PHASE_1",
            Phase::Phase2 => "PHASE_2",
        }
    }

    pub fn parse(s: &str) -> Option<Phase> {
        match s {
            "PHASE_1" => Some(Phase::Phase1),
            "PHASE_2" => Some(Phase::Phase2),
            _ => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core trait that all calendar sources must implement.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Unique identifier for this source
    fn name(&self) -> &str;

    /// Fetch all events within the monitoring window
    async fn list_events(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>>;
}
