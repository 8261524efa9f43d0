use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use practice_cell::Pet;
use vet_cell::models::SlotCandidate;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub owner_id: Uuid,
    pub vet_id: Option<Uuid>,
    pub pet_ids: Vec<Uuid>,
    pub appointment_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_at(&self) -> DateTime<Utc> {
        self.appointment_at + chrono::Duration::minutes(self.duration_minutes as i64)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    Error,
}

impl AppointmentStatus {
    /// Cancelled, no-show and completed appointments free their slot;
    /// everything else keeps holding the vet's calendar.
    pub fn blocks_schedule(&self) -> bool {
        !matches!(
            self,
            AppointmentStatus::Cancelled | AppointmentStatus::NoShow | AppointmentStatus::Completed
        )
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Error => write!(f, "error"),
        }
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

/// Booking request as delivered by the phone channel. Date and time arrive
/// as strings the external language parser has already normalized into
/// concrete forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub practice_id: Uuid,
    pub pet_owner_id: Uuid,
    pub date: String,
    pub start_time: String,
    pub timezone: Option<String>,
    pub service: Option<String>,
    pub pet_ids: Option<Vec<Uuid>>,
    pub assigned_vet_user_id: Option<Uuid>,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
}

/// Day preferences arrive either as a JSON list or a delimited string,
/// mixed case. Normalized once at the boundary; nothing downstream sees
/// the raw shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferredDaysInput {
    List(Vec<String>),
    Delimited(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlexibleSearchParams {
    pub weeks_from_now: Option<i64>,
    pub specific_week_of_month: Option<u32>,
    pub target_month_offset: Option<u32>,
    pub date_range_start: Option<String>,
    pub date_range_end: Option<String>,
    pub preferred_days: Option<PreferredDaysInput>,
}

// ==============================================================================
// DERIVED SEARCH MODELS
// ==============================================================================

/// A concrete, bounded search range resolved from a flexible query.
#[derive(Debug, Clone)]
pub struct DateRangeQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub preferred_weekdays: HashSet<Weekday>,
    pub range_description: String,
    pub truncated: bool,
}

impl DateRangeQuery {
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}

#[derive(Debug, Clone)]
pub struct FlexibleSearchOutcome {
    pub slots: Vec<SlotCandidate>,
    pub used_preferred_days: bool,
    pub range: DateRangeQuery,
}

// ==============================================================================
// CONFLICT REPORTING
// ==============================================================================

/// An existing appointment standing in the way of a requested window,
/// with its start rendered in practice-local time for the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictingAppointment {
    pub appointment_id: Uuid,
    pub appointment_at: DateTime<Utc>,
    pub time: String,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Week {week} does not exist in {month}")]
    InvalidWeek { week: u32, month: String },

    #[error("Could not parse input: {0}")]
    ParseError(String),

    #[error("Requested window conflicts with an existing appointment")]
    Conflict {
        conflicts: Vec<ConflictingAppointment>,
        alternatives: Vec<SlotCandidate>,
    },

    #[error("Owner has more than one pet and none was specified")]
    PetSelectionRequired { pets: Vec<Pet> },

    #[error("Appointment not found")]
    NotFound,

    #[error("Practice not found")]
    PracticeNotFound,

    #[error("Appointment cannot leave {0} status this way")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl SchedulingError {
    /// Voice-facing phrasing. Conflicts and pet selection speak for
    /// themselves; every other kind falls back to a generic recovery line
    /// while the structured kind stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            SchedulingError::Conflict { .. } => {
                "I'm sorry, that time was just taken. Would you like to hear some other options?"
                    .to_string()
            }
            SchedulingError::PetSelectionRequired { pets } => {
                let names: Vec<&str> = pets.iter().map(|p| p.name.as_str()).collect();
                if names.is_empty() {
                    "Which pet is this appointment for?".to_string()
                } else {
                    format!("Which pet is this appointment for: {}?", names.join(", "))
                }
            }
            SchedulingError::InvalidRange(_)
            | SchedulingError::InvalidWeek { .. }
            | SchedulingError::ParseError(_) => {
                "I couldn't quite work out those dates. Could you say them another way?".to_string()
            }
            _ => "Something went wrong on our end. Please try again, or hold for a team member."
                .to_string(),
        }
    }
}

impl From<vet_cell::models::AvailabilityError> for SchedulingError {
    fn from(error: vet_cell::models::AvailabilityError) -> Self {
        use vet_cell::models::AvailabilityError;
        match error {
            AvailabilityError::InvalidTimezone(id) => SchedulingError::InvalidTimezone(id),
            AvailabilityError::Practice(practice_cell::PracticeError::NotFound) => {
                SchedulingError::PracticeNotFound
            }
            AvailabilityError::Practice(practice_cell::PracticeError::Store(e)) => {
                SchedulingError::StoreUnavailable(e.to_string())
            }
            AvailabilityError::Store(e) => SchedulingError::StoreUnavailable(e.to_string()),
        }
    }
}

impl From<practice_cell::PracticeError> for SchedulingError {
    fn from(error: practice_cell::PracticeError) -> Self {
        match error {
            practice_cell::PracticeError::NotFound => SchedulingError::PracticeNotFound,
            practice_cell::PracticeError::Store(e) => SchedulingError::StoreUnavailable(e.to_string()),
        }
    }
}
