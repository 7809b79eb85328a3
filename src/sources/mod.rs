pub mod http_feed;

pub use http_feed::HttpCalendarFeed;

use crate::error::Result;
use crate::types::{CalendarEvent, CalendarSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Calendar source backed by a fixed event list. Used in tests and for
/// replaying exported bookings.
pub struct FixtureCalendar {
    name: String,
    events: Vec<CalendarEvent>,
}

impl FixtureCalendar {
    pub fn new(name: &str, events: Vec<CalendarEvent>) -> Self {
        Self {
            name: name.to_string(),
            events,
        }
    }
}

#[async_trait]
impl CalendarSource for FixtureCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_events(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        Ok(self
            .events
            .iter()
            .filter(|e| e.start_time >= window_start && e.start_time <= window_end)
            .cloned()
            .collect())
    }
}
