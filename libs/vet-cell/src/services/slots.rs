use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};
use uuid::Uuid;

use practice_cell::services::practice::PracticeService;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailabilityError, AvailabilityType, BookedInterval, SlotCandidate, TimePreference,
};
use crate::services::availability::AvailabilityService;
use crate::services::conflict::{subtract_booked, ConflictIndex};
use crate::services::timezone::TimezoneNormalizer;

/// Turns open windows minus booked time into ordered, fixed-duration slot
/// candidates. Routine search only considers AVAILABLE windows; surgery
/// blocks and emergency-only windows never reach routine callers.
pub struct SlotService {
    availability: AvailabilityService,
    conflicts: ConflictIndex,
    practice: PracticeService,
}

impl SlotService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            availability: AvailabilityService::new(config),
            conflicts: ConflictIndex::with_client(
                Arc::clone(&supabase),
                TimezoneNormalizer::from_config(config),
            ),
            practice: PracticeService::with_client(supabase),
        }
    }

    pub fn availability(&self) -> &AvailabilityService {
        &self.availability
    }

    pub fn conflicts(&self) -> &ConflictIndex {
        &self.conflicts
    }

    /// Chronological slot candidates for one practice-local date. An empty
    /// result is a normal outcome, not an error.
    pub async fn candidates(
        &self,
        practice_id: Uuid,
        vet_id: Option<Uuid>,
        date: NaiveDate,
        duration_minutes: i32,
        preference: TimePreference,
        auth_token: &str,
    ) -> Result<Vec<SlotCandidate>, AvailabilityError> {
        if duration_minutes <= 0 {
            warn!("Rejecting slot search with non-positive duration {}", duration_minutes);
            return Ok(vec![]);
        }

        let practice = self.practice.get_practice(practice_id, auth_token).await?;
        let tz = self.availability.normalizer().resolve(&practice.timezone)?;

        let windows = self
            .availability
            .open_windows(practice_id, vet_id, date, auth_token)
            .await?;
        let routine: Vec<_> = windows
            .into_iter()
            .filter(|w| w.availability_type == AvailabilityType::Available)
            .collect();
        if routine.is_empty() {
            return Ok(vec![]);
        }

        let booked = self
            .conflicts
            .booked_intervals(practice_id, vet_id, date, &tz, auth_token)
            .await?;

        let mut slots = Vec::new();
        for window in &routine {
            let vet_booked: Vec<BookedInterval> = booked
                .iter()
                .filter(|b| b.vet_id == window.vet_id)
                .cloned()
                .collect();

            for (free_start, free_end) in
                subtract_booked(window.start_at, window.end_at, &vet_booked)
            {
                fill_slots(
                    &mut slots,
                    free_start,
                    free_end,
                    duration_minutes,
                    window.vet_id,
                    date,
                    preference,
                    self.availability.normalizer(),
                    &tz,
                );
            }
        }

        slots.sort_by(|a, b| a.start_at.cmp(&b.start_at).then(a.vet_id.cmp(&b.vet_id)));
        debug!("Generated {} slot candidates for {}", slots.len(), date);
        Ok(slots)
    }
}

/// Emit back-to-back fixed-size slots from the start of a free interval; a
/// trailing fragment shorter than the duration is dropped.
#[allow(clippy::too_many_arguments)]
fn fill_slots(
    out: &mut Vec<SlotCandidate>,
    free_start: DateTime<Utc>,
    free_end: DateTime<Utc>,
    duration_minutes: i32,
    vet_id: Uuid,
    date: NaiveDate,
    preference: TimePreference,
    normalizer: &TimezoneNormalizer,
    tz: &Tz,
) {
    let step = Duration::minutes(duration_minutes as i64);
    let mut current = free_start;

    while current + step <= free_end {
        let local_start = normalizer.to_local(current, tz).time();
        let local_end = normalizer.to_local(current + step, tz).time();

        if preference.contains(local_start) {
            out.push(SlotCandidate {
                date,
                local_start,
                local_end,
                start_at: current,
                end_at: current + step,
                vet_id,
                is_preferred_day: false,
            });
        }

        current += step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared_config::AppConfig;

    fn utc(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 3, h, m, 0).unwrap()
    }

    fn generate(
        free: &[(DateTime<Utc>, DateTime<Utc>)],
        duration: i32,
        preference: TimePreference,
    ) -> Vec<SlotCandidate> {
        let normalizer = TimezoneNormalizer::new(AppConfig::default_timezone_aliases());
        let tz: Tz = "UTC".parse().unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        let vet = Uuid::new_v4();

        let mut slots = Vec::new();
        for (start, end) in free {
            fill_slots(&mut slots, *start, *end, duration, vet, date, preference, &normalizer, &tz);
        }
        slots
    }

    #[test]
    fn slots_are_back_to_back_from_window_start() {
        let slots = generate(&[(utc(9, 0), utc(11, 0))], 30, TimePreference::Any);
        let starts: Vec<_> = slots.iter().map(|s| s.start_at).collect();
        assert_eq!(starts, vec![utc(9, 0), utc(9, 30), utc(10, 0), utc(10, 30)]);
    }

    #[test]
    fn trailing_fragment_is_dropped() {
        let slots = generate(&[(utc(9, 0), utc(9, 50))], 30, TimePreference::Any);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].start_at, utc(9, 0));
    }

    #[test]
    fn morning_preference_filters_on_local_start() {
        let slots = generate(&[(utc(11, 0), utc(14, 0))], 30, TimePreference::Morning);
        let starts: Vec<_> = slots.iter().map(|s| s.local_start).collect();
        // 11:00 and 11:30 are morning; 12:00 onward is not.
        assert_eq!(
            starts,
            vec![
                chrono::NaiveTime::from_hms_opt(11, 0, 0).unwrap(),
                chrono::NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn full_morning_window_yields_expected_slots() {
        // Vet available 09:00-17:00, no conflicts, morning preference.
        let slots = generate(&[(utc(9, 0), utc(17, 0))], 30, TimePreference::Morning);
        let starts: Vec<_> = slots.iter().map(|s| s.local_start.format("%H:%M").to_string()).collect();
        assert_eq!(starts, vec!["09:00", "09:30", "10:00", "10:30", "11:00", "11:30"]);
    }

    #[test]
    fn booked_interval_removes_exactly_its_slot() {
        let vet = Uuid::new_v4();
        let booked = vec![BookedInterval {
            appointment_id: Uuid::new_v4(),
            vet_id: vet,
            start_at: utc(10, 0),
            end_at: utc(10, 30),
        }];

        let free = subtract_booked(utc(9, 0), utc(17, 0), &booked);
        let slots = generate(&free, 30, TimePreference::Morning);
        let starts: Vec<_> = slots.iter().map(|s| s.local_start.format("%H:%M").to_string()).collect();

        assert!(!starts.contains(&"10:00".to_string()));
        assert!(starts.contains(&"09:30".to_string()));
        assert!(starts.contains(&"10:30".to_string()));
    }

    #[test]
    fn generated_slots_stay_inside_their_window() {
        let slots = generate(&[(utc(9, 0), utc(12, 0))], 45, TimePreference::Any);
        for slot in &slots {
            assert!(slot.start_at >= utc(9, 0));
            assert!(slot.end_at <= utc(12, 0));
        }
    }
}
