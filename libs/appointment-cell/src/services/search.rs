use chrono::{Duration, NaiveDate};
use tracing::{debug, info};
use uuid::Uuid;

use practice_cell::services::practice::PracticeService;
use shared_config::AppConfig;
use vet_cell::models::{SlotCandidate, TimePreference};
use vet_cell::services::slots::SlotService;

use crate::models::{DateRangeQuery, FlexibleSearchOutcome, FlexibleSearchParams, SchedulingError};
use crate::services::range::{local_today, DateRangeResolver};

/// Result cap for every search pass: the phone channel reads options
/// aloud, and three is as many as a caller will hold in mind.
pub const MAX_SEARCH_RESULTS: usize = 3;

/// Drives day-by-day searches over a resolved range with a
/// preferred-day-first, any-day-fallback policy.
pub struct SchedulingOrchestrator {
    slots: SlotService,
    practice: PracticeService,
}

impl SchedulingOrchestrator {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            slots: SlotService::new(config),
            practice: PracticeService::new(config),
        }
    }

    /// Flexible search: pass 1 walks preferred weekdays only, taking the
    /// first open slot of each date; if that finds nothing, pass 2 repeats
    /// over every date in the range. Both passes empty is a normal empty
    /// outcome, not an error.
    pub async fn flexible_search(
        &self,
        practice_id: Uuid,
        params: &FlexibleSearchParams,
        duration_minutes: i32,
        preference: TimePreference,
        vet_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<FlexibleSearchOutcome, SchedulingError> {
        let practice = self.practice.get_practice(practice_id, auth_token).await?;
        let tz = self
            .slots
            .availability()
            .normalizer()
            .resolve(&practice.timezone)?;

        let range = DateRangeResolver::resolve(params, local_today(&tz))?;
        info!(
            "Flexible search over {} .. {} ({} days, {} preferred weekdays)",
            range.start_date,
            range.end_date,
            range.days(),
            range.preferred_weekdays.len()
        );

        let mut slots = self
            .scan(practice_id, &range, true, duration_minutes, preference, vet_id, auth_token)
            .await?;
        let mut used_preferred_days = true;

        if slots.is_empty() {
            debug!("Preferred-day pass found nothing, widening to all days");
            slots = self
                .scan(practice_id, &range, false, duration_minutes, preference, vet_id, auth_token)
                .await?;
            used_preferred_days = false;
        }

        Ok(FlexibleSearchOutcome {
            slots,
            used_preferred_days,
            range,
        })
    }

    /// One slot per day over today and the following two days.
    pub async fn first_available_next_3_days(
        &self,
        practice_id: Uuid,
        duration_minutes: i32,
        preference: TimePreference,
        vet_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<SlotCandidate>, SchedulingError> {
        let practice = self.practice.get_practice(practice_id, auth_token).await?;
        let tz = self
            .slots
            .availability()
            .normalizer()
            .resolve(&practice.timezone)?;
        let today = local_today(&tz);

        let mut results = Vec::new();
        for offset in 0..3 {
            let date = today + Duration::days(offset);
            if let Some(slot) = self
                .first_candidate(practice_id, date, duration_minutes, preference, vet_id, auth_token)
                .await?
            {
                results.push(slot);
            }
        }

        Ok(results)
    }

    // Chronological scan, first candidate per date, capped at
    // MAX_SEARCH_RESULTS.
    #[allow(clippy::too_many_arguments)]
    async fn scan(
        &self,
        practice_id: Uuid,
        range: &DateRangeQuery,
        preferred_only: bool,
        duration_minutes: i32,
        preference: TimePreference,
        vet_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Vec<SlotCandidate>, SchedulingError> {
        use chrono::Datelike;

        let mut results = Vec::new();
        let mut date = range.start_date;

        while date <= range.end_date && results.len() < MAX_SEARCH_RESULTS {
            let is_preferred = range.preferred_weekdays.contains(&date.weekday());
            if preferred_only && !is_preferred {
                date += Duration::days(1);
                continue;
            }

            if let Some(mut slot) = self
                .first_candidate(practice_id, date, duration_minutes, preference, vet_id, auth_token)
                .await?
            {
                slot.is_preferred_day = is_preferred;
                results.push(slot);
            }

            date += Duration::days(1);
        }

        Ok(results)
    }

    async fn first_candidate(
        &self,
        practice_id: Uuid,
        date: NaiveDate,
        duration_minutes: i32,
        preference: TimePreference,
        vet_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Option<SlotCandidate>, SchedulingError> {
        let candidates = self
            .slots
            .candidates(practice_id, vet_id, date, duration_minutes, preference, auth_token)
            .await?;

        Ok(candidates.into_iter().next())
    }
}
