use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use practice_cell::services::practice::PracticeService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_database::StoreError;
use vet_cell::models::{AvailabilityType, BookedInterval, SlotCandidate, TimePreference};
use vet_cell::services::slots::SlotService;

use crate::models::{
    Appointment, AppointmentStatus, BookAppointmentRequest, ConflictingAppointment,
    SchedulingError,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::range::{local_today, parse_flexible_date};

/// Books appointments. Reads along the way are advisory; the store's
/// per-vet no-overlap constraint is the final arbiter, so a racing insert
/// comes back as a conflict rather than a double booking. No application
/// mutex: the engine runs as stateless replicas.
pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    slots: SlotService,
    practice: PracticeService,
    lifecycle: AppointmentLifecycleService,
    default_duration_minutes: i32,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            slots: SlotService::new(config),
            practice: PracticeService::with_client(Arc::clone(&supabase)),
            lifecycle: AppointmentLifecycleService::new(),
            default_duration_minutes: config.default_appointment_minutes,
            supabase,
        }
    }

    /// Re-validate the requested window against live availability and
    /// conflicts, pick a vet when none was named, and commit. A slot the
    /// caller heard moments ago is never trusted without this recheck:
    /// concurrent bookings race.
    pub async fn book_appointment(
        &self,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        info!(
            "Booking appointment for owner {} at practice {}",
            request.pet_owner_id, request.practice_id
        );

        let practice = self.practice.get_practice(request.practice_id, auth_token).await?;
        let normalizer = self.slots.availability().normalizer();

        let tz_id = request
            .timezone
            .clone()
            .unwrap_or_else(|| practice.timezone.clone());
        let tz = normalizer.resolve(&tz_id).map_err(SchedulingError::from)?;

        let date = parse_flexible_date(&request.date, local_today(&tz)).ok_or_else(|| {
            SchedulingError::ParseError(format!("unrecognized date '{}'", request.date))
        })?;
        let time = parse_local_time(&request.start_time).ok_or_else(|| {
            SchedulingError::ParseError(format!("unrecognized time '{}'", request.start_time))
        })?;

        let duration = request
            .duration_minutes
            .filter(|d| *d > 0)
            .or(practice.default_appointment_minutes)
            .unwrap_or(self.default_duration_minutes);

        let start_at = normalizer.to_utc(date.and_time(time), &tz);
        let end_at = start_at + Duration::minutes(duration as i64);

        // Authoritative recheck of the exact window.
        let windows = self
            .slots
            .availability()
            .open_windows(request.practice_id, request.assigned_vet_user_id, date, auth_token)
            .await
            .map_err(SchedulingError::from)?;

        let covering_vets: HashSet<Uuid> = windows
            .iter()
            .filter(|w| w.availability_type == AvailabilityType::Available)
            .filter(|w| w.start_at <= start_at && end_at <= w.end_at)
            .map(|w| w.vet_id)
            .collect();

        let booked = self
            .slots
            .conflicts()
            .booked_intervals(request.practice_id, request.assigned_vet_user_id, date, &tz, auth_token)
            .await
            .map_err(SchedulingError::from)?;

        let overlapping: Vec<&BookedInterval> = booked
            .iter()
            .filter(|b| b.start_at < end_at && start_at < b.end_at)
            .collect();

        let mut eligible: Vec<Uuid> = covering_vets
            .iter()
            .filter(|vet| !overlapping.iter().any(|b| b.vet_id == **vet))
            .copied()
            .collect();
        eligible.sort();

        if eligible.is_empty() {
            warn!(
                "Requested window {} - {} is not bookable at practice {}",
                start_at, end_at, request.practice_id
            );
            let conflicts = overlapping
                .iter()
                .filter(|b| covering_vets.contains(&b.vet_id))
                .map(|b| self.render_conflict(b.appointment_id, b.start_at, &tz))
                .collect();
            let alternatives = self
                .same_day_alternatives(&request, date, duration, start_at, auth_token)
                .await;
            return Err(SchedulingError::Conflict { conflicts, alternatives });
        }

        // Load spreading: fewest same-day appointments wins, vet id breaks
        // ties.
        let chosen_vet = eligible
            .into_iter()
            .min_by_key(|vet| {
                let load = booked.iter().filter(|b| b.vet_id == *vet).count();
                (load, *vet)
            })
            .unwrap();

        let pet_ids = self.resolve_pets(&request, auth_token).await?;

        match self
            .insert_appointment(&request, chosen_vet, &pet_ids, start_at, duration, auth_token)
            .await
        {
            Ok(appointment) => {
                info!(
                    "Appointment {} booked with vet {} at {}",
                    appointment.id, chosen_vet, start_at
                );
                Ok(appointment)
            }
            Err(e) if e.is_conflict() => {
                // A concurrent booking won the window between our recheck
                // and the insert; surface the winner.
                info!("Concurrent booking beat us to vet {} at {}", chosen_vet, start_at);
                let conflicts = self
                    .committed_overlaps(request.practice_id, chosen_vet, start_at, end_at, date, &tz, auth_token)
                    .await
                    .unwrap_or_default();
                let alternatives = self
                    .same_day_alternatives(&request, date, duration, start_at, auth_token)
                    .await;
                Err(SchedulingError::Conflict { conflicts, alternatives })
            }
            Err(e) => Err(SchedulingError::StoreUnavailable(e.to_string())),
        }
    }

    /// SCHEDULED -> CONFIRMED, guarded by the transition matrix.
    pub async fn confirm_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        self.lifecycle
            .validate_status_transition(&appointment.status, &AppointmentStatus::Confirmed)?;

        let update = json!({
            "status": AppointmentStatus::Confirmed.to_string(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(Method::PATCH, &path, Some(auth_token), Some(update), Some(headers))
            .await
            .map_err(|e| SchedulingError::StoreUnavailable(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(SchedulingError::NotFound);
        };

        let confirmed: Appointment = serde_json::from_value(row)
            .map_err(|e| SchedulingError::StoreUnavailable(e.to_string()))?;

        info!("Appointment {} confirmed", appointment_id);
        Ok(confirmed)
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, SchedulingError> {
        debug!("Fetching appointment: {}", appointment_id);

        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::StoreUnavailable(e.to_string()))?;

        let Some(row) = result.into_iter().next() else {
            return Err(SchedulingError::NotFound);
        };

        serde_json::from_value(row).map_err(|e| SchedulingError::StoreUnavailable(e.to_string()))
    }

    // ==========================================================================
    // PRIVATE HELPERS
    // ==========================================================================

    async fn resolve_pets(
        &self,
        request: &BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Vec<Uuid>, SchedulingError> {
        if let Some(ids) = &request.pet_ids {
            if !ids.is_empty() {
                return Ok(ids.clone());
            }
        }

        let pets = self
            .practice
            .pets_for_owner(request.pet_owner_id, auth_token)
            .await?;

        match pets.len() {
            0 => Err(SchedulingError::ValidationError(
                "No active pets on file for this owner".to_string(),
            )),
            1 => Ok(vec![pets[0].id]),
            // Never guess which pet the caller means.
            _ => Err(SchedulingError::PetSelectionRequired { pets }),
        }
    }

    async fn insert_appointment(
        &self,
        request: &BookAppointmentRequest,
        vet_id: Uuid,
        pet_ids: &[Uuid],
        start_at: DateTime<Utc>,
        duration_minutes: i32,
        auth_token: &str,
    ) -> Result<Appointment, StoreError> {
        let now = Utc::now();
        let title = request
            .service
            .clone()
            .unwrap_or_else(|| "Veterinary visit".to_string());

        let body = json!({
            "practice_id": request.practice_id,
            "owner_id": request.pet_owner_id,
            "vet_id": vet_id,
            "pet_ids": pet_ids,
            "appointment_at": start_at.to_rfc3339(),
            "duration_minutes": duration_minutes,
            "status": AppointmentStatus::Scheduled.to_string(),
            "title": title,
            "notes": request.notes,
            "created_at": now.to_rfc3339(),
            "updated_at": now.to_rfc3339()
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Prefer", reqwest::header::HeaderValue::from_static("return=representation"));

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(body),
                Some(headers),
            )
            .await?;

        let Some(row) = result.into_iter().next() else {
            return Err(StoreError::Status {
                status: 500,
                message: "insert returned no representation".to_string(),
            });
        };

        Ok(serde_json::from_value(row)?)
    }

    // Committed rows that overlap the lost window, for naming the winner
    // after the store rejected our insert.
    #[allow(clippy::too_many_arguments)]
    async fn committed_overlaps(
        &self,
        practice_id: Uuid,
        vet_id: Uuid,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        date: NaiveDate,
        tz: &Tz,
        auth_token: &str,
    ) -> Result<Vec<ConflictingAppointment>, SchedulingError> {
        let normalizer = self.slots.availability().normalizer();
        let day_start = normalizer.to_utc(date.and_hms_opt(0, 0, 0).unwrap(), tz);
        let day_end =
            normalizer.to_utc((date + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap(), tz);

        let path = format!(
            "/rest/v1/appointments?practice_id=eq.{}&vet_id=eq.{}&status=in.(scheduled,confirmed,in_progress,error)&appointment_at=gte.{}&appointment_at=lt.{}&order=appointment_at.asc",
            practice_id,
            vet_id,
            urlencoding::encode(&day_start.to_rfc3339()),
            urlencoding::encode(&day_end.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| SchedulingError::StoreUnavailable(e.to_string()))?;

        let rows: Vec<Appointment> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| SchedulingError::StoreUnavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .filter(|a| a.appointment_at < end_at && start_at < a.end_at())
            .map(|a| self.render_conflict(a.id, a.appointment_at, tz))
            .collect())
    }

    fn render_conflict(
        &self,
        appointment_id: Uuid,
        appointment_at: DateTime<Utc>,
        tz: &Tz,
    ) -> ConflictingAppointment {
        let normalizer = self.slots.availability().normalizer();
        let local = normalizer.to_local(appointment_at, tz);
        ConflictingAppointment {
            appointment_id,
            appointment_at,
            time: local.format("%-I:%M %p").to_string(),
        }
    }

    // Up to three other open slots on the same day, so the caller can be
    // offered something instead of a dead end.
    async fn same_day_alternatives(
        &self,
        request: &BookAppointmentRequest,
        date: NaiveDate,
        duration_minutes: i32,
        requested_start: DateTime<Utc>,
        auth_token: &str,
    ) -> Vec<SlotCandidate> {
        self.slots
            .candidates(
                request.practice_id,
                request.assigned_vet_user_id,
                date,
                duration_minutes,
                TimePreference::Any,
                auth_token,
            )
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.start_at != requested_start)
            .take(3)
            .collect()
    }
}

/// Accepts the time shapes the phone channel produces: 24-hour, with
/// seconds, and 12-hour with AM/PM in either case.
pub fn parse_local_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();

    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .or_else(|_| NaiveTime::parse_from_str(&trimmed.to_uppercase(), "%I:%M %p"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_forms_parse() {
        assert_eq!(parse_local_time("09:00"), NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(parse_local_time("14:30:00"), NaiveTime::from_hms_opt(14, 30, 0));
        assert_eq!(parse_local_time("9:00 AM"), NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(parse_local_time("2:30 pm"), NaiveTime::from_hms_opt(14, 30, 0));
    }

    #[test]
    fn nonsense_time_is_rejected() {
        assert!(parse_local_time("half past nine").is_none());
        assert!(parse_local_time("25:00").is_none());
    }
}
