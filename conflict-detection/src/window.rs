//! The detection window gates whether conflict reports are accepted.
//!
//! It is a single optional expiry timestamp stored under
//! [`DETECT_CONFLICTS_UNTIL_KEY`]. There is no start time: the window is open
//! from whenever it was set until the expiry, inclusive.

use chrono::{DateTime, SecondsFormat, Utc};
use options_store::{OptionsStore, StoreError};
use serde_json::Value;

pub const DETECT_CONFLICTS_UNTIL_KEY: &str = "detectConflictsUntil";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectionWindow {
    until: Option<DateTime<Utc>>,
}

impl DetectionWindow {
    pub fn closed() -> Self {
        DetectionWindow { until: None }
    }

    pub fn until(expires_at: DateTime<Utc>) -> Self {
        DetectionWindow {
            until: Some(expires_at),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.until
    }

    /// Open while `now` has not passed the expiry. The expiry itself is
    /// still inside the window.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.until, Some(until) if now <= until)
    }

    /// Reads the window from the store. A missing or null value is a closed
    /// window, and so is a value that is not a parseable timestamp.
    pub async fn load(store: &dyn OptionsStore) -> Result<Self, StoreError> {
        let window = match store.get(DETECT_CONFLICTS_UNTIL_KEY).await? {
            None | Some(Value::Null) => DetectionWindow::closed(),
            Some(Value::String(raw)) => match parse_timestamp(&raw) {
                Some(expires_at) => DetectionWindow::until(expires_at),
                None => {
                    tracing::warn!(value = %raw, "ignoring unparseable detection window");
                    DetectionWindow::closed()
                }
            },
            Some(other) => {
                tracing::warn!(value = %other, "ignoring detection window of unexpected type");
                DetectionWindow::closed()
            }
        };

        Ok(window)
    }

    pub async fn save(&self, store: &dyn OptionsStore) -> Result<(), StoreError> {
        let value = match self.until {
            Some(expires_at) => Value::String(format_timestamp(expires_at)),
            None => Value::Null,
        };
        store.set(DETECT_CONFLICTS_UNTIL_KEY, value).await
    }
}

/// Formats a timestamp the way it is persisted, e.g. `2026-10-16T12:10:00+00:00`.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
