use crate::error::{AutomationError, Result};
use crate::types::{CalendarEvent, CalendarSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, instrument};

/// Calendar source reading a JSON feed (the booking system's export
/// endpoint). The feed returns an array of event objects; the window is
/// passed as query parameters.
pub struct HttpCalendarFeed {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpCalendarFeed {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

fn parse_timestamp(item: &Value, field: &str) -> Result<DateTime<Utc>> {
    let raw = item[field]
        .as_str()
        .ok_or_else(|| AutomationError::MissingField(format!("{field} not found")))?;
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AutomationError::Feed(format!("failed to parse {field} '{raw}': {e}")))
}

/// Map one feed item into a [`CalendarEvent`]. Split out of the fetch so
/// the shape handling is testable without HTTP.
pub fn parse_feed_event(item: &Value) -> Result<CalendarEvent> {
    let id = item["id"]
        .as_str()
        .ok_or_else(|| AutomationError::MissingField("id not found".to_string()))?;
    let title = item["title"]
        .as_str()
        .ok_or_else(|| AutomationError::MissingField("title not found".to_string()))?;

    Ok(CalendarEvent {
        id: id.to_string(),
        title: title.to_string(),
        description: item["description"].as_str().unwrap_or_default().to_string(),
        location: item["location"].as_str().unwrap_or_default().to_string(),
        start_time: parse_timestamp(item, "start")?,
        end_time: parse_timestamp(item, "end")?,
    })
}

#[async_trait]
impl CalendarSource for HttpCalendarFeed {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), fields(source = %self.name))]
    async fn list_events(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("start", window_start.to_rfc3339()),
                ("end", window_end.to_rfc3339()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = response.json().await?;
        let items = payload
            .as_array()
            .ok_or_else(|| AutomationError::Feed("feed did not return an array".to_string()))?;

        let mut events = Vec::with_capacity(items.len());
        for item in items {
            events.push(parse_feed_event(item)?);
        }
        info!("Fetched {} events from {}", events.len(), self.name);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_complete_feed_item() {
        let item = json!({
            "id": "evt-1",
            "title": "Phase 1 Session",
            "description": "Email: a@b.com",
            "location": "https://zoom.us/j/1",
            "start": "2025-01-10T18:00:00Z",
            "end": "2025-01-10T19:00:00Z",
        });
        let event = parse_feed_event(&item).unwrap();
        assert_eq!(event.id, "evt-1");
        assert_eq!(event.start_time.to_rfc3339(), "2025-01-10T18:00:00+00:00");
    }

    #[test]
    fn missing_id_is_an_error() {
        let item = json!({
            "title": "Session",
            "start": "2025-01-10T18:00:00Z",
            "end": "2025-01-10T19:00:00Z",
        });
        assert!(matches!(
            parse_feed_event(&item).unwrap_err(),
            AutomationError::MissingField(_)
        ));
    }

    #[test]
    fn description_and_location_default_to_empty() {
        let item = json!({
            "id": "evt-1",
            "title": "Session",
            "start": "2025-01-10T18:00:00Z",
            "end": "2025-01-10T19:00:00Z",
        });
        let event = parse_feed_event(&item).unwrap();
        assert_eq!(event.description, "");
        assert_eq!(event.location, "");
    }

    #[test]
    fn malformed_timestamp_is_a_feed_error() {
        let item = json!({
            "id": "evt-1",
            "title": "Session",
            "start": "not-a-time",
            "end": "2025-01-10T19:00:00Z",
        });
        assert!(matches!(
            parse_feed_event(&item).unwrap_err(),
            AutomationError::Feed(_)
        ));
    }
}
