use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==============================================================================
// AVAILABILITY MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AvailabilityType {
    #[serde(alias = "available")]
    Available,

    #[serde(alias = "surgery_block", alias = "surgery")]
    SurgeryBlock,

    #[serde(alias = "unavailable")]
    Unavailable,

    #[serde(alias = "emergency_only", alias = "emergency")]
    EmergencyOnly,
}

impl fmt::Display for AvailabilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AvailabilityType::Available => write!(f, "AVAILABLE"),
            AvailabilityType::SurgeryBlock => write!(f, "SURGERY_BLOCK"),
            AvailabilityType::Unavailable => write!(f, "UNAVAILABLE"),
            AvailabilityType::EmergencyOnly => write!(f, "EMERGENCY_ONLY"),
        }
    }
}

/// Concrete per-date availability, the authoritative source the engine
/// reads. Instants are UTC; `date` is the practice-local calendar date the
/// row belongs to. Invariant: start_at < end_at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VetAvailability {
    pub id: Uuid,
    pub vet_id: Uuid,
    pub practice_id: Uuid,
    pub date: NaiveDate,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub availability_type: AvailabilityType,
    pub is_active: bool,
}

/// Standing weekly pattern. A batch job materializes these into
/// VetAvailability rows ahead of time; dates the job has not reached yet
/// are materialized lazily by the AvailabilityStore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringAvailabilityTemplate {
    pub id: Uuid,
    pub vet_id: Uuid,
    pub practice_id: Uuid,
    pub weekday: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub availability_type: AvailabilityType,
    pub effective_from: NaiveDate,
    pub effective_until: Option<NaiveDate>,
}

/// A vet's bookable window for one date, already clipped to practice hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenWindow {
    pub vet_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub availability_type: AvailabilityType,
}

// ==============================================================================
// CONFLICT MODELS
// ==============================================================================

/// Minimal appointment row read for conflict subtraction. The full model
/// lives in the appointment cell; this cell only needs timing and status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRow {
    pub id: Uuid,
    pub vet_id: Option<Uuid>,
    pub appointment_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: String,
}

impl AppointmentRow {
    pub fn end_at(&self) -> DateTime<Utc> {
        self.appointment_at + chrono::Duration::minutes(self.duration_minutes as i64)
    }

    /// Cancelled, no-show and completed appointments release their slot;
    /// every other status keeps blocking the calendar.
    pub fn blocks_schedule(&self) -> bool {
        !matches!(self.status.as_str(), "cancelled" | "no_show" | "completed")
    }
}

/// Time already taken on a vet's calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedInterval {
    pub appointment_id: Uuid,
    pub vet_id: Uuid,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// A bookable fixed-duration slot, carrying both representations: local
/// wall-clock for rendering, UTC instants for booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub date: NaiveDate,
    pub local_start: NaiveTime,
    pub local_end: NaiveTime,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub vet_id: Uuid,
    pub is_preferred_day: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePreference {
    Morning,
    Afternoon,
    Evening,
    Any,
}

impl TimePreference {
    /// Lenient parse: unrecognized values degrade to Any rather than
    /// failing the request.
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("morning") => TimePreference::Morning,
            Some("afternoon") => TimePreference::Afternoon,
            Some("evening") => TimePreference::Evening,
            Some("any") | None => TimePreference::Any,
            Some(other) => {
                tracing::warn!("Unrecognized time preference '{}', using any", other);
                TimePreference::Any
            }
        }
    }

    pub fn contains(&self, local_start: NaiveTime) -> bool {
        let window = match self {
            TimePreference::Morning => Some((6, 12)),
            TimePreference::Afternoon => Some((12, 17)),
            TimePreference::Evening => Some((17, 21)),
            TimePreference::Any => None,
        };

        match window {
            Some((from_hour, to_hour)) => {
                let from = NaiveTime::from_hms_opt(from_hour, 0, 0).unwrap();
                let to = NaiveTime::from_hms_opt(to_hour, 0, 0).unwrap();
                local_start >= from && local_start < to
            }
            None => true,
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error(transparent)]
    Practice(#[from] practice_cell::PracticeError),

    #[error(transparent)]
    Store(#[from] shared_database::StoreError),
}
