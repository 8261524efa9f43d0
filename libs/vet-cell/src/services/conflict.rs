use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_database::StoreError;

use crate::models::{AppointmentRow, AvailabilityError, BookedInterval};
use crate::services::timezone::TimezoneNormalizer;

/// Per-vet, per-date index of time already taken by appointments that
/// still block the calendar.
pub struct ConflictIndex {
    supabase: Arc<SupabaseClient>,
    normalizer: TimezoneNormalizer,
}

impl ConflictIndex {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            normalizer: TimezoneNormalizer::from_config(config),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>, normalizer: TimezoneNormalizer) -> Self {
        Self { supabase, normalizer }
    }

    /// Booked intervals for one practice-local date, sorted by start time.
    /// Reads are advisory: booking re-runs this check inside the commit.
    pub async fn booked_intervals(
        &self,
        practice_id: Uuid,
        vet_id: Option<Uuid>,
        date: NaiveDate,
        tz: &Tz,
        auth_token: &str,
    ) -> Result<Vec<BookedInterval>, AvailabilityError> {
        let day_start = self.normalizer.to_utc(date.and_hms_opt(0, 0, 0).unwrap(), tz);
        let day_end = self
            .normalizer
            .to_utc((date + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap(), tz);

        let mut path = format!(
            "/rest/v1/appointments?practice_id=eq.{}&appointment_at=gte.{}&appointment_at=lt.{}",
            practice_id,
            urlencoding::encode(&day_start.to_rfc3339()),
            urlencoding::encode(&day_end.to_rfc3339()),
        );
        if let Some(vet) = vet_id {
            path.push_str(&format!("&vet_id=eq.{}", vet));
        }
        path.push_str("&order=appointment_at.asc");

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let rows: Vec<AppointmentRow> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AppointmentRow>, _>>()
            .map_err(StoreError::from)?;

        let intervals: Vec<BookedInterval> = rows
            .into_iter()
            .filter(AppointmentRow::blocks_schedule)
            .filter_map(|row| {
                // Rows without a vet cannot occupy a vet's calendar.
                row.vet_id.map(|vet| BookedInterval {
                    appointment_id: row.id,
                    vet_id: vet,
                    start_at: row.appointment_at,
                    end_at: row.end_at(),
                })
            })
            .collect();

        debug!("Found {} booked intervals on {}", intervals.len(), date);
        Ok(intervals)
    }
}

/// Subtract booked intervals from an open window. One conflict splits the
/// window into zero, one, or two pieces; conflicts must arrive sorted by
/// start time and are applied iteratively.
pub fn subtract_booked(
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    booked: &[BookedInterval],
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut free = vec![(window_start, window_end)];

    for interval in booked {
        free = free
            .into_iter()
            .flat_map(|(start, end)| {
                if interval.end_at <= start || interval.start_at >= end {
                    return vec![(start, end)];
                }

                let mut pieces = Vec::with_capacity(2);
                if interval.start_at > start {
                    pieces.push((start, interval.start_at));
                }
                if interval.end_at < end {
                    pieces.push((interval.end_at, end));
                }
                pieces
            })
            .collect();
    }

    free
}
