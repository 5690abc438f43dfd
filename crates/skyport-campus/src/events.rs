//! Event and campus data types.
//!
//! The campus API's event records carry far more than the portal shows;
//! only the displayed fields are modeled here, and the provider's free-form
//! `kind` string is folded into a small fixed set of categories so the UI
//! can filter and badge events consistently.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CampusError, Result};

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// A portal-level event category, folded down from the provider's `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Rushes, hackathons, anything ranked.
    Competition,
    /// Association meetings, meetups, general gatherings.
    Social,
    /// Piscines and hands-on sessions.
    Workshop,
    /// Talks, conferences, everything else.
    Lecture,
}

impl EventCategory {
    /// Map a provider `kind` string onto a category. Unknown kinds land in
    /// [`EventCategory::Lecture`] rather than erroring; new kinds appear
    /// upstream without notice.
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "rush" | "hackathon" | "challenge" => Self::Competition,
            "association" | "meet_up" | "event" => Self::Social,
            "piscine" | "workshop" => Self::Workshop,
            _ => Self::Lecture,
        }
    }

    /// A short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Competition => "Competition",
            Self::Social => "Social",
            Self::Workshop => "Workshop",
            Self::Lecture => "Lecture",
        }
    }
}

// ---------------------------------------------------------------------------
// Raw provider shapes
// ---------------------------------------------------------------------------

/// An event record as the campus API sends it.
#[derive(Debug, Deserialize)]
pub(crate) struct RawEvent {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub kind: String,
    pub max_people: Option<u32>,
    #[serde(default)]
    pub nbr_subscribers: u32,
    pub begin_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

/// A campus record as the campus API sends it.
#[derive(Debug, Deserialize)]
pub(crate) struct RawCampus {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub users_count: Option<u32>,
}

// ---------------------------------------------------------------------------
// Normalized types
// ---------------------------------------------------------------------------

/// A campus, normalized for the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campus {
    pub id: i64,
    pub name: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub student_count: Option<u32>,
}

impl From<RawCampus> for Campus {
    fn from(raw: RawCampus) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            city: raw.city,
            country: raw.country,
            student_count: raw.users_count,
        }
    }
}

/// A campus event, normalized for the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampusEvent {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub location: String,
    pub category: EventCategory,
    pub begins_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// `None` means unlimited capacity.
    pub max_attendees: Option<u32>,
    pub attendee_count: u32,
}

impl CampusEvent {
    pub(crate) fn from_raw(raw: RawEvent) -> Result<Self> {
        let begins_at = raw.begin_at.ok_or_else(|| CampusError::MalformedResponse {
            reason: format!("event {} has no begin_at", raw.id),
        })?;
        // Some records omit end_at; treat them as instantaneous.
        let ends_at = raw.end_at.unwrap_or(begins_at);

        Ok(Self {
            id: raw.id,
            title: raw.name,
            description: raw.description,
            location: raw.location,
            category: EventCategory::from_kind(&raw.kind),
            begins_at,
            ends_at,
            max_attendees: raw.max_people,
            attendee_count: raw.nbr_subscribers,
        })
    }

    /// Whether the event is already at capacity.
    pub fn is_full(&self) -> bool {
        match self.max_attendees {
            Some(max) => self.attendee_count >= max,
            None => false,
        }
    }

    /// A short date for listings, e.g. `Sep 12`.
    pub fn short_date(&self) -> String {
        self.begins_at.format("%b %e").to_string().replace("  ", " ")
    }

    /// A start-to-end time range, e.g. `14:00 - 17:30`.
    pub fn time_range(&self) -> String {
        format!(
            "{} - {}",
            self.begins_at.format("%H:%M"),
            self.ends_at.format("%H:%M")
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
