use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use practice_cell::services::practice::PracticeService;
use practice_cell::weekday_number;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_database::StoreError;

use crate::models::{
    AvailabilityError, AvailabilityType, OpenWindow, RecurringAvailabilityTemplate,
    VetAvailability,
};
use crate::services::timezone::TimezoneNormalizer;

/// Merges practice hours (the hard constraint), concrete per-date vet
/// availability, and standing weekly templates into per-vet open windows.
pub struct AvailabilityService {
    supabase: Arc<SupabaseClient>,
    practice: PracticeService,
    normalizer: TimezoneNormalizer,
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            practice: PracticeService::with_client(Arc::clone(&supabase)),
            normalizer: TimezoneNormalizer::from_config(config),
            supabase,
        }
    }

    pub fn normalizer(&self) -> &TimezoneNormalizer {
        &self.normalizer
    }

    /// Per-vet open windows for one practice-local date, clipped to the
    /// practice-open interval, sorted by start time. A closed practice day
    /// short-circuits to empty no matter what vet rows say. When no vet is
    /// given, every vet's windows are returned, each keeping its vet
    /// identity so a slot can later be bound to the vet that offered it.
    pub async fn open_windows(
        &self,
        practice_id: Uuid,
        vet_id: Option<Uuid>,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<OpenWindow>, AvailabilityError> {
        debug!("Computing open windows for practice {} on {}", practice_id, date);

        let practice = self.practice.get_practice(practice_id, auth_token).await?;
        let tz = self.normalizer.resolve(&practice.timezone)?;

        let Some(hours) = self.practice.hours_for_date(practice_id, date, auth_token).await? else {
            debug!("No practice hours row covers {}", date);
            return Ok(vec![]);
        };
        let (Some(open_time), Some(close_time)) = (hours.open_time, hours.close_time) else {
            debug!("Practice closed on {}", date);
            return Ok(vec![]);
        };

        let open_at = self.normalizer.to_utc(date.and_time(open_time), &tz);
        let close_at = self.normalizer.to_utc(date.and_time(close_time), &tz);

        let mut raw = self
            .concrete_windows(practice_id, vet_id, date, auth_token)
            .await?;
        if raw.is_empty() {
            raw = self
                .windows_from_templates(practice_id, vet_id, date, &tz, auth_token)
                .await?;
        }

        let mut windows: Vec<OpenWindow> = raw
            .into_iter()
            .filter(|w| w.availability_type != AvailabilityType::Unavailable)
            .filter_map(|w| clip_window(w, open_at, close_at))
            .collect();

        windows.sort_by(|a, b| a.start_at.cmp(&b.start_at).then(a.vet_id.cmp(&b.vet_id)));
        Ok(merge_windows(windows))
    }

    // Concrete per-date rows, the authoritative source when present.
    async fn concrete_windows(
        &self,
        practice_id: Uuid,
        vet_id: Option<Uuid>,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<OpenWindow>, AvailabilityError> {
        let mut path = format!(
            "/rest/v1/vet_availability?practice_id=eq.{}&date=eq.{}&is_active=eq.true",
            practice_id, date
        );
        if let Some(vet) = vet_id {
            path.push_str(&format!("&vet_id=eq.{}", vet));
        }
        path.push_str("&order=start_at.asc");

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let rows: Vec<VetAvailability> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<VetAvailability>, _>>()
            .map_err(StoreError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| OpenWindow {
                vet_id: row.vet_id,
                start_at: row.start_at,
                end_at: row.end_at,
                availability_type: row.availability_type,
            })
            .collect())
    }

    // Lazy materialization for dates the batch job has not reached yet.
    async fn windows_from_templates(
        &self,
        practice_id: Uuid,
        vet_id: Option<Uuid>,
        date: NaiveDate,
        tz: &Tz,
        auth_token: &str,
    ) -> Result<Vec<OpenWindow>, AvailabilityError> {
        let weekday = weekday_number(date);
        let mut path = format!(
            "/rest/v1/recurring_availability_templates?practice_id=eq.{}&weekday=eq.{}&effective_from=lte.{}&or=(effective_until.is.null,effective_until.gte.{})",
            practice_id, weekday, date, date
        );
        if let Some(vet) = vet_id {
            path.push_str(&format!("&vet_id=eq.{}", vet));
        }
        path.push_str("&order=start_time.asc");

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let templates: Vec<RecurringAvailabilityTemplate> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<RecurringAvailabilityTemplate>, _>>()
            .map_err(StoreError::from)?;

        if !templates.is_empty() {
            debug!("Materializing {} template windows for {}", templates.len(), date);
        }

        Ok(templates
            .into_iter()
            .filter(|t| t.start_time < t.end_time)
            .map(|t| OpenWindow {
                vet_id: t.vet_id,
                start_at: self.normalizer.to_utc(date.and_time(t.start_time), tz),
                end_at: self.normalizer.to_utc(date.and_time(t.end_time), tz),
                availability_type: t.availability_type,
            })
            .collect())
    }
}

/// Clip a window to the practice-open interval; windows entirely outside
/// practice hours disappear.
fn clip_window(
    mut window: OpenWindow,
    open_at: DateTime<Utc>,
    close_at: DateTime<Utc>,
) -> Option<OpenWindow> {
    window.start_at = window.start_at.max(open_at);
    window.end_at = window.end_at.min(close_at);

    (window.start_at < window.end_at).then_some(window)
}

/// Merge overlapping or touching windows of the same vet and type. Input
/// must be sorted by start time; output stays sorted.
fn merge_windows(windows: Vec<OpenWindow>) -> Vec<OpenWindow> {
    let mut merged: Vec<OpenWindow> = Vec::with_capacity(windows.len());

    for window in windows {
        let absorbed = merged.iter_mut().rev().find(|prev| {
            prev.vet_id == window.vet_id
                && prev.availability_type == window.availability_type
                && window.start_at <= prev.end_at
        });

        match absorbed {
            Some(prev) => prev.end_at = prev.end_at.max(window.end_at),
            None => merged.push(window),
        }
    }

    merged
}
