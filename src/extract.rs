use crate::error::{AutomationError, Result};
use crate::types::CalendarEvent;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Lead details pulled out of a booking's description text.
///
/// Derived once per event and passed by value through the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadInfo {
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub company_name: String,
    pub phone: String,
    /// Session date as written into the Build File, e.g. "January 10, 2025"
    pub formatted_date: String,
    /// Session start time as written into the Build File, e.g. "6:00 PM"
    pub formatted_time: String,
    pub zoom_link: String,
}

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*([A-Za-z][A-Za-z ]*?)\s*:\s*(.+?)\s*$").unwrap());

/// Booking forms emit descriptions with HTML line breaks; normalize those to
/// real newlines before looking for "Label: value" lines.
fn strip_markup(text: &str) -> String {
    let with_breaks = text
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n")
        .replace("</div>", "\n");
    let stripped = HTML_TAG_RE.replace_all(&with_breaks, "");
    stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

fn find_label(labels: &[(String, String)], wanted: &str) -> Option<String> {
    labels
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(wanted))
        .map(|(_, value)| value.clone())
}

/// Extract lead info from a calendar event.
///
/// Fails with [`AutomationError::Extraction`] when the email or the name is
/// missing; those two are required for everything downstream.
pub fn extract_lead_info(event: &CalendarEvent) -> Result<LeadInfo> {
    let text = strip_markup(&event.description);

    let labels: Vec<(String, String)> = LABEL_RE
        .captures_iter(&text)
        .map(|cap| (cap[1].trim().to_string(), cap[2].trim().to_string()))
        .collect();

    let email = find_label(&labels, "Email")
        .or_else(|| find_label(&labels, "Email address"))
        .unwrap_or_default();
    if email.is_empty() || !email.contains('@') {
        return Err(AutomationError::Extraction {
            event_id: event.id.clone(),
            reason: format!("missing or malformed email ('{email}')"),
        });
    }

    let first_name = find_label(&labels, "First name").unwrap_or_default();
    let last_name = find_label(&labels, "Last name").unwrap_or_default();
    let full_name = if !first_name.is_empty() || !last_name.is_empty() {
        format!("{first_name} {last_name}").trim().to_string()
    } else {
        find_label(&labels, "Name").unwrap_or_default()
    };
    if full_name.is_empty() {
        return Err(AutomationError::Extraction {
            event_id: event.id.clone(),
            reason: "missing leader name".to_string(),
        });
    }

    let company_name = find_label(&labels, "Company")
        .or_else(|| find_label(&labels, "Company name"))
        .unwrap_or_default();
    let phone = find_label(&labels, "Phone")
        .or_else(|| find_label(&labels, "Phone number"))
        .unwrap_or_default();

    Ok(LeadInfo {
        first_name,
        last_name,
        full_name,
        email,
        company_name,
        phone,
        formatted_date: event.start_time.format("%B %-d, %Y").to_string(),
        formatted_time: event.start_time.format("%-I:%M %p").to_string(),
        zoom_link: event.location.clone(),
    })
}
