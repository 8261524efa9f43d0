use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::DateTime;
use chrono::Utc;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use practice_cell::services::practice::PracticeService;
use shared_config::AppConfig;
use shared_models::error::AppError;
use vet_cell::models::{SlotCandidate, TimePreference};
use vet_cell::services::timezone::TimezoneNormalizer;

use crate::models::{BookAppointmentRequest, FlexibleSearchParams, SchedulingError};
use crate::services::booking::BookingService;
use crate::services::search::SchedulingOrchestrator;

// ==============================================================================
// REQUEST SHAPES
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct FlexibleSearchRequest {
    pub practice_id: Uuid,
    pub time_preference: Option<String>,
    pub timezone: Option<String>,
    pub vet_id: Option<Uuid>,
    pub duration_minutes: Option<i32>,
    #[serde(flatten)]
    pub range: FlexibleSearchParams,
}

#[derive(Debug, Deserialize)]
pub struct FirstAvailableQuery {
    pub practice_id: Uuid,
    pub time_preference: Option<String>,
    pub timezone: Option<String>,
    pub vet_id: Option<Uuid>,
    pub duration_minutes: Option<i32>,
}

// ==============================================================================
// SEARCH HANDLERS
// ==============================================================================

/// Flexible "find me a time" query: relative descriptors in, up to three
/// concrete options out.
#[axum::debug_handler]
pub async fn flexible_search(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<FlexibleSearchRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let normalizer = TimezoneNormalizer::from_config(&state);
    let render_tz = match &request.timezone {
        Some(id) => Some(normalizer.resolve(id).map_err(|e| {
            error!("Flexible search rejected timezone: {:?}", e);
            AppError::BadRequest("I didn't recognize that timezone. Could you try again?".to_string())
        })?),
        None => None,
    };

    let preference = TimePreference::from_param(request.time_preference.as_deref());
    let duration = request
        .duration_minutes
        .filter(|d| *d > 0)
        .unwrap_or(state.default_appointment_minutes);

    let orchestrator = SchedulingOrchestrator::new(&state);
    let search = orchestrator.flexible_search(
        request.practice_id,
        &request.range,
        duration,
        preference,
        request.vet_id,
        token,
    );

    let outcome = tokio::time::timeout(StdDuration::from_secs(state.search_timeout_seconds), search)
        .await
        .map_err(|_| search_timeout(request.practice_id))?
        .map_err(|e| scheduling_error_response(&e))?;

    // Times are spoken in the caller's zone when one was given, otherwise
    // in the practice's; dates stay practice-local either way.
    let practice_tz = practice_timezone(&state, request.practice_id, token).await;
    let tz_used = render_tz.or(practice_tz).unwrap_or(chrono_tz::UTC);

    let appointments: Vec<Value> = outcome
        .slots
        .iter()
        .map(|slot| render_slot(slot, &normalizer, &tz_used))
        .collect();

    let message = if appointments.is_empty() {
        format!(
            "I'm sorry, I couldn't find any openings for {}. Would different dates work?",
            outcome.range.range_description
        )
    } else {
        format!(
            "I found {} option{} for {}.",
            appointments.len(),
            if appointments.len() == 1 { "" } else { "s" },
            outcome.range.range_description
        )
    };

    Ok(Json(json!({
        "success": true,
        "appointments": appointments,
        "message": message,
        "preferred_days_used": outcome.used_preferred_days,
        "date_range_start": outcome.range.start_date.to_string(),
        "date_range_end": outcome.range.end_date.to_string(),
        "range_description": outcome.range.range_description,
        "timezone_used": tz_used.name()
    })))
}

/// One slot per day over the next three days.
#[axum::debug_handler]
pub async fn get_first_available(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(params): Query<FirstAvailableQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let normalizer = TimezoneNormalizer::from_config(&state);
    let preference = TimePreference::from_param(params.time_preference.as_deref());
    let duration = params
        .duration_minutes
        .filter(|d| *d > 0)
        .unwrap_or(state.default_appointment_minutes);

    let orchestrator = SchedulingOrchestrator::new(&state);
    let search = orchestrator.first_available_next_3_days(
        params.practice_id,
        duration,
        preference,
        params.vet_id,
        token,
    );

    let slots = tokio::time::timeout(StdDuration::from_secs(state.search_timeout_seconds), search)
        .await
        .map_err(|_| search_timeout(params.practice_id))?
        .map_err(|e| scheduling_error_response(&e))?;

    let tz_used = match &params.timezone {
        Some(id) => normalizer.resolve(id).ok(),
        None => None,
    }
    .or(practice_timezone(&state, params.practice_id, token).await)
    .unwrap_or(chrono_tz::UTC);

    let appointments: Vec<Value> = slots
        .iter()
        .map(|slot| render_slot(slot, &normalizer, &tz_used))
        .collect();

    let message = if appointments.is_empty() {
        "I'm sorry, the next three days are fully booked. Want me to look further out?".to_string()
    } else {
        format!("Here are the first openings over the next three days ({}).", appointments.len())
    };

    Ok(Json(json!({
        "success": true,
        "appointments": appointments,
        "message": message
    })))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

/// Commit a booking. Conflicts and pet selection come back as structured,
/// recoverable responses rather than errors: the voice channel turns them
/// into follow-up questions.
#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();
    let practice_id = request.practice_id;

    let booking_service = BookingService::new(&state);

    match booking_service.book_appointment(request, token).await {
        Ok(appointment) => {
            let rendered = render_local_datetime(&state, practice_id, appointment.appointment_at, token).await;
            Ok(Json(json!({
                "success": true,
                "appointment_id": appointment.id,
                "message": format!("You're all set for {}.", rendered),
                "details": {
                    "appointment_at": appointment.appointment_at.to_rfc3339(),
                    "local_time": rendered,
                    "duration_minutes": appointment.duration_minutes,
                    "vet_id": appointment.vet_id,
                    "pet_ids": appointment.pet_ids,
                    "status": appointment.status.to_string(),
                    "title": appointment.title
                }
            })))
        }
        Err(error @ SchedulingError::Conflict { .. }) => {
            let message = error.user_message();
            let SchedulingError::Conflict { conflicts, alternatives } = error else {
                unreachable!()
            };
            Ok(Json(json!({
                "success": false,
                "message": message,
                "conflicts": conflicts
                    .iter()
                    .map(|c| json!({"appointment_id": c.appointment_id, "time": c.time}))
                    .collect::<Vec<_>>(),
                "alternative_times": alternatives
                    .iter()
                    .map(|s| s.local_start.format("%-I:%M %p").to_string())
                    .collect::<Vec<_>>()
            })))
        }
        Err(error @ SchedulingError::PetSelectionRequired { .. }) => {
            let message = error.user_message();
            let SchedulingError::PetSelectionRequired { pets } = error else {
                unreachable!()
            };
            Ok(Json(json!({
                "success": false,
                "message": message,
                "requires_pet_selection": true,
                "pets": pets
                    .iter()
                    .map(|p| json!({"id": p.id, "name": p.name, "species": p.species}))
                    .collect::<Vec<_>>()
            })))
        }
        Err(error) => Err(scheduling_error_response(&error)),
    }
}

/// SCHEDULED -> CONFIRMED.
#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let booking_service = BookingService::new(&state);
    let appointment = booking_service
        .confirm_appointment(appointment_id, token)
        .await
        .map_err(|e| scheduling_error_response(&e))?;

    let rendered =
        render_local_datetime(&state, appointment.practice_id, appointment.appointment_at, token).await;

    Ok(Json(json!({
        "success": true,
        "appointment_details": {
            "appointment_id": appointment.id,
            "date_time": rendered,
            "status": appointment.status.to_string(),
            "title": appointment.title
        }
    })))
}

// ==============================================================================
// SHARED HELPERS
// ==============================================================================

fn render_slot(slot: &SlotCandidate, normalizer: &TimezoneNormalizer, tz: &chrono_tz::Tz) -> Value {
    let local = normalizer.to_local(slot.start_at, tz);
    let date = local.date();

    json!({
        "date": date.to_string(),
        "day_name": date.format("%A").to_string(),
        "formatted_date": date.format("%B %-d").to_string(),
        "time": local.format("%-I:%M %p").to_string(),
        "is_preferred_day": slot.is_preferred_day
    })
}

async fn practice_timezone(
    state: &Arc<AppConfig>,
    practice_id: Uuid,
    token: &str,
) -> Option<chrono_tz::Tz> {
    let practice = PracticeService::new(state)
        .get_practice(practice_id, token)
        .await
        .ok()?;
    TimezoneNormalizer::from_config(state)
        .resolve(&practice.timezone)
        .ok()
}

async fn render_local_datetime(
    state: &Arc<AppConfig>,
    practice_id: Uuid,
    instant: DateTime<Utc>,
    token: &str,
) -> String {
    match practice_timezone(state, practice_id, token).await {
        Some(tz) => TimezoneNormalizer::from_config(state)
            .to_local(instant, &tz)
            .format("%A, %B %-d at %-I:%M %p")
            .to_string(),
        None => instant.to_rfc3339(),
    }
}

fn search_timeout(practice_id: Uuid) -> AppError {
    error!("Scheduling search timed out for practice {}", practice_id);
    AppError::Unavailable(
        "That took longer than expected. Please try again in a moment.".to_string(),
    )
}

/// Structured kinds stay in the logs; the caller hears a voice-friendly
/// line.
pub fn scheduling_error_response(error: &SchedulingError) -> AppError {
    error!("Scheduling operation failed: {:?}", error);

    match error {
        SchedulingError::InvalidTimezone(_)
        | SchedulingError::InvalidRange(_)
        | SchedulingError::InvalidWeek { .. }
        | SchedulingError::ParseError(_)
        | SchedulingError::ValidationError(_) => AppError::BadRequest(error.user_message()),
        SchedulingError::NotFound | SchedulingError::PracticeNotFound => {
            AppError::NotFound(error.user_message())
        }
        SchedulingError::InvalidStatusTransition(_) => AppError::Conflict(error.user_message()),
        SchedulingError::StoreUnavailable(_) => AppError::Unavailable(error.user_message()),
        SchedulingError::Conflict { .. } | SchedulingError::PetSelectionRequired { .. } => {
            AppError::Conflict(error.user_message())
        }
    }
}
