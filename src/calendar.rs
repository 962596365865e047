// 📅 Calendar Client - Google Calendar `events` endpoints
//
// Each call is one bearer-authenticated request. Non-2xx answers become
// RemoteError::Status; nothing is retried.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::CalendarConfig;
use crate::error::{check_status, RemoteError};
use crate::models::Reminder;

const SERVICE: &str = "calendar";

/// Minutes before the event at which the popup fires
const POPUP_MINUTES: i64 = 10;

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// All-day events carry a date instead of a date-time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderOverride {
    pub method: String,
    pub minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReminders {
    pub use_default: bool,
    #[serde(default)]
    pub overrides: Vec<ReminderOverride>,
}

/// Body for create and update calls
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventInput {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<EventReminders>,
}

impl EventInput {
    /// Timed event for a reminder, lasting `duration_minutes`
    pub fn from_reminder(reminder: &Reminder, time_zone: &str, duration_minutes: i64) -> Self {
        let end = reminder.starts_at + Duration::minutes(duration_minutes);
        let at = |dt: chrono::NaiveDateTime| EventDateTime {
            date_time: Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            date: None,
            time_zone: Some(time_zone.to_string()),
        };

        EventInput {
            summary: reminder.title.clone(),
            description: if reminder.description.is_empty() {
                None
            } else {
                Some(reminder.description.clone())
            },
            start: at(reminder.starts_at),
            end: at(end),
            reminders: Some(EventReminders {
                use_default: false,
                overrides: vec![ReminderOverride {
                    method: "popup".to_string(),
                    minutes: POPUP_MINUTES,
                }],
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub start: Option<EventDateTime>,
    #[serde(default)]
    pub end: Option<EventDateTime>,
    #[serde(default)]
    pub html_link: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

/// Window for `list_events`
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub time_min: Option<DateTime<Utc>>,
    pub time_max: Option<DateTime<Utc>>,
    pub max_results: Option<u32>,
}

// ============================================================================
// CLIENT
// ============================================================================

#[derive(Debug, Clone)]
pub struct CalendarClient {
    http: reqwest::Client,
    base_url: String,
    calendar_id: String,
    time_zone: String,
    reminder_minutes: i64,
}

impl CalendarClient {
    pub fn new(config: &CalendarConfig) -> Self {
        CalendarClient {
            http: reqwest::Client::new(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            calendar_id: config.calendar_id.clone(),
            time_zone: config.time_zone.clone(),
            reminder_minutes: config.reminder_minutes,
        }
    }

    pub fn time_zone(&self) -> &str {
        &self.time_zone
    }

    /// Event body for a reminder using the configured zone and duration
    pub fn event_for(&self, reminder: &Reminder) -> EventInput {
        EventInput::from_reminder(reminder, &self.time_zone, self.reminder_minutes)
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(&self.calendar_id)
        )
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), urlencoding::encode(event_id))
    }

    pub async fn create_event(&self, token: &str, event: &EventInput) -> Result<CalendarEvent, RemoteError> {
        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(token)
            .json(event)
            .send()
            .await?;

        let created: CalendarEvent = check_status(SERVICE, response).await?.json().await?;
        debug!(event_id = %created.id, "calendar event created");
        Ok(created)
    }

    pub async fn list_events(&self, token: &str, query: &ListQuery) -> Result<Vec<CalendarEvent>, RemoteError> {
        let mut params: Vec<(&str, String)> = vec![
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(min) = query.time_min {
            params.push(("timeMin", min.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(max) = query.time_max {
            params.push(("timeMax", max.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        if let Some(limit) = query.max_results {
            params.push(("maxResults", limit.to_string()));
        }

        let response = self
            .http
            .get(self.events_url())
            .bearer_auth(token)
            .query(&params)
            .send()
            .await?;

        let list: EventList = check_status(SERVICE, response).await?.json().await?;
        Ok(list.items)
    }

    pub async fn update_event(
        &self,
        token: &str,
        event_id: &str,
        event: &EventInput,
    ) -> Result<CalendarEvent, RemoteError> {
        let response = self
            .http
            .patch(self.event_url(event_id))
            .bearer_auth(token)
            .json(event)
            .send()
            .await?;

        let updated = check_status(SERVICE, response).await?.json().await?;
        Ok(updated)
    }

    /// Delete an event; one that is already gone counts as deleted
    pub async fn delete_event(&self, token: &str, event_id: &str) -> Result<(), RemoteError> {
        let response = self
            .http
            .delete(self.event_url(event_id))
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::GONE {
            warn!(event_id, "calendar event already deleted");
            return Ok(());
        }

        check_status(SERVICE, response).await?;
        Ok(())
    }
}
