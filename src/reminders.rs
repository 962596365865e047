// ⏰ Reminders - SQLite rows kept in step with calendar events
//
// The row is the source of truth. Calendar calls only happen when the
// caller has a token, and a failed call is logged without failing the
// operation.

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::calendar::CalendarClient;
use crate::db;
use crate::models::{NewReminder, Reminder};

/// Save a reminder, creating its calendar event first when possible
pub async fn create_reminder(
    conn: &Mutex<Connection>,
    calendar: &CalendarClient,
    token: Option<&str>,
    owner_id: &str,
    input: NewReminder,
) -> Result<Reminder> {
    let mut reminder = Reminder::from_input(owner_id, input);

    if let Some(token) = token {
        match calendar.create_event(token, &calendar.event_for(&reminder)).await {
            Ok(event) => reminder.calendar_event_id = Some(event.id),
            Err(e) => warn!(reminder_id = %reminder.id, error = %e, "calendar sync failed, saving without event"),
        }
    }

    db::insert_reminder(&*db::lock(conn)?, &reminder)?;
    info!(reminder_id = %reminder.id, synced = reminder.calendar_event_id.is_some(), "reminder created");
    Ok(reminder)
}

/// Replace title, description and start time; `None` when no such reminder
pub async fn update_reminder(
    conn: &Mutex<Connection>,
    calendar: &CalendarClient,
    token: Option<&str>,
    owner_id: &str,
    id: &str,
    input: NewReminder,
) -> Result<Option<Reminder>> {
    let existing = db::get_reminder(&*db::lock(conn)?, owner_id, id)?;
    let Some(existing) = existing else {
        return Ok(None);
    };

    let mut reminder = Reminder {
        title: input.title.trim().to_string(),
        description: input.description.trim().to_string(),
        starts_at: input.starts_at,
        ..existing
    };

    if let Some(token) = token {
        let event = calendar.event_for(&reminder);
        match reminder.calendar_event_id.as_deref() {
            Some(event_id) => {
                if let Err(e) = calendar.update_event(token, event_id, &event).await {
                    warn!(reminder_id = %reminder.id, event_id, error = %e, "calendar event update failed");
                }
            }
            // Reminders saved while the calendar was unreachable get linked now
            None => match calendar.create_event(token, &event).await {
                Ok(created) => reminder.calendar_event_id = Some(created.id),
                Err(e) => warn!(reminder_id = %reminder.id, error = %e, "calendar sync failed"),
            },
        }
    }

    let updated = db::update_reminder(&*db::lock(conn)?, &reminder)?;
    Ok(updated.then_some(reminder))
}

/// Delete a reminder and its event; `false` when no such reminder
pub async fn delete_reminder(
    conn: &Mutex<Connection>,
    calendar: &CalendarClient,
    token: Option<&str>,
    owner_id: &str,
    id: &str,
) -> Result<bool> {
    let existing = db::get_reminder(&*db::lock(conn)?, owner_id, id)?;
    let Some(existing) = existing else {
        return Ok(false);
    };

    if let (Some(token), Some(event_id)) = (token, existing.calendar_event_id.as_deref()) {
        if let Err(e) = calendar.delete_event(token, event_id).await {
            warn!(reminder_id = %existing.id, event_id, error = %e, "calendar event delete failed, deleting row anyway");
        }
    }

    let deleted = db::delete_reminder(&*db::lock(conn)?, owner_id, id)?;
    if deleted {
        info!(reminder_id = %existing.id, "reminder deleted");
    }
    Ok(deleted)
}

pub fn list_reminders(
    conn: &Mutex<Connection>,
    owner_id: &str,
    day: Option<NaiveDate>,
) -> Result<Vec<Reminder>> {
    db::list_reminders(&*db::lock(conn)?, owner_id, day)
}
