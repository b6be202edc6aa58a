use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deadline::wire_instant_serde;
use crate::recurrence::{Recurrence, RecurrenceRule};

/// Snapshot of a task as served by the remote store. The engine only reads
/// these; creation, mutation, and deletion happen behind the HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,

    pub text: String,

    #[serde(default, with = "wire_instant_serde::option")]
    pub due_at: Option<DateTime<Utc>>,

    #[serde(default, with = "wire_instant_serde::option")]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default, with = "wire_instant_serde::option")]
    pub remind_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub remind_offset_min: Option<i64>,

    #[serde(default)]
    pub is_recurring: bool,

    #[serde(default)]
    pub recurrence_type: Option<String>,

    #[serde(default)]
    pub recurrence_interval: Option<i64>,
}

impl Task {
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            due_at: None,
            completed_at: None,
            remind_at: None,
            remind_offset_min: None,
            is_recurring: false,
            recurrence_type: None,
            recurrence_interval: None,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.completed_at.is_none()
    }

    /// Recurrence schedule, if the task rolls forward on completion.
    #[must_use]
    pub fn recurrence(&self) -> Option<Recurrence> {
        if !self.is_recurring {
            return None;
        }
        let rule = RecurrenceRule::parse(self.recurrence_type.as_deref().unwrap_or_default());
        Some(Recurrence {
            rule,
            interval_days: self.recurrence_interval.unwrap_or(1),
        })
    }
}

/// Per-user display settings, owned by the remote store. The timezone is
/// used only to project instants onto calendar dates; it never rewrites a
/// stored instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: i64,
    pub timezone: String,
}
