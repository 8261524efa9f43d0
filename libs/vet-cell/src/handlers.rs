use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::{Duration, NaiveDate, Utc};
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::error::AppError;

use crate::models::{AvailabilityError, TimePreference};
use crate::services::slots::SlotService;
use crate::services::timezone::TimezoneNormalizer;

#[derive(Debug, Deserialize)]
pub struct AvailableTimesQuery {
    pub date: String,
    pub practice_id: Uuid,
    pub time_preference: Option<String>,
    pub timezone: Option<String>,
    pub vet_id: Option<Uuid>,
    pub duration_minutes: Option<i32>,
}

/// Single-day availability listing, rendered in the practice's (or the
/// caller's) local timezone as phone-friendly strings.
#[axum::debug_handler]
pub async fn get_available_times(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(params): Query<AvailableTimesQuery>,
) -> Result<Json<Value>, AppError> {
    let token = auth.token();

    let Some(date) = parse_concrete_date(&params.date) else {
        return Err(AppError::BadRequest(
            "I couldn't make sense of that date. Could you try again?".to_string(),
        ));
    };

    let preference = TimePreference::from_param(params.time_preference.as_deref());
    let duration = params
        .duration_minutes
        .filter(|d| *d > 0)
        .unwrap_or(state.default_appointment_minutes);

    let normalizer = TimezoneNormalizer::from_config(&state);
    let render_tz = match &params.timezone {
        Some(id) => Some(
            normalizer
                .resolve(id)
                .map_err(|e| availability_error_response(&e))?,
        ),
        None => None,
    };

    let service = SlotService::new(&state);
    let search = service.candidates(params.practice_id, params.vet_id, date, duration, preference, token);

    let slots = tokio::time::timeout(StdDuration::from_secs(state.search_timeout_seconds), search)
        .await
        .map_err(|_| {
            error!("Availability search timed out for practice {}", params.practice_id);
            AppError::Unavailable(
                "That took longer than expected. Please try again in a moment.".to_string(),
            )
        })?
        .map_err(|e| availability_error_response(&e))?;

    let mut available_times: Vec<String> = Vec::new();
    for slot in &slots {
        let rendered = match &render_tz {
            Some(tz) => normalizer.to_local(slot.start_at, tz).format("%-I:%M %p").to_string(),
            None => slot.local_start.format("%-I:%M %p").to_string(),
        };
        // Several vets can offer the same time; the caller only hears each once.
        if !available_times.contains(&rendered) {
            available_times.push(rendered);
        }
    }

    let spoken_date = date.format("%A, %B %-d").to_string();
    let message = if available_times.is_empty() {
        format!(
            "I'm sorry, we don't have any openings on {}. Would another day work?",
            spoken_date
        )
    } else {
        format!(
            "We have {} opening{} on {}.",
            available_times.len(),
            if available_times.len() == 1 { "" } else { "s" },
            spoken_date
        )
    };

    Ok(Json(json!({
        "success": true,
        "available_times": available_times,
        "message": message
    })))
}

/// Map a domain failure onto the HTTP surface. Structured kinds are kept
/// for logs; the caller hears a non-technical message.
pub fn availability_error_response(error: &AvailabilityError) -> AppError {
    error!("Availability lookup failed: {:?}", error);

    match error {
        AvailabilityError::InvalidTimezone(_) => AppError::BadRequest(
            "I didn't recognize that timezone. Could you try again?".to_string(),
        ),
        AvailabilityError::Practice(practice_cell::PracticeError::NotFound) => {
            AppError::NotFound("I couldn't find that practice.".to_string())
        }
        _ => AppError::Unavailable(
            "Something went wrong on our end. Please try again, or hold for a team member."
                .to_string(),
        ),
    }
}

/// The voice channel's language parser hands us concrete dates; accept the
/// few shapes it produces and nothing fancier.
pub fn parse_concrete_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();

    match trimmed.to_lowercase().as_str() {
        "today" => return Some(Utc::now().date_naive()),
        "tomorrow" => return Some(Utc::now().date_naive() + Duration::days(1)),
        _ => {}
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%m/%d/%Y"))
        .ok()
}
