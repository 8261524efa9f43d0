use std::collections::HashMap;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::debug;

use shared_config::AppConfig;

use crate::models::AvailabilityError;

/// Converts practice-local wall-clock times to UTC instants and back using
/// IANA rules. The alias table is injected at construction; there is no
/// process-wide timezone state.
pub struct TimezoneNormalizer {
    aliases: HashMap<String, String>,
}

impl TimezoneNormalizer {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self { aliases }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.timezone_aliases.clone())
    }

    /// Resolve a zone id, accepting legacy aliases. Unknown ids are an
    /// error: guessing a timezone silently misplaces every appointment.
    pub fn resolve(&self, id: &str) -> Result<Tz, AvailabilityError> {
        let canonical = self
            .aliases
            .get(id.trim())
            .map(String::as_str)
            .unwrap_or_else(|| id.trim());

        canonical
            .parse::<Tz>()
            .map_err(|_| AvailabilityError::InvalidTimezone(id.to_string()))
    }

    /// Local wall clock -> UTC instant. Ambiguous times (clocks rolled
    /// back) take the standard-offset reading; nonexistent times (clocks
    /// sprang forward) take the offset in force just before the gap.
    pub fn to_utc(&self, local: NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(_, standard) => {
                debug!("Ambiguous local time {}, using standard offset", local);
                standard.with_timezone(&Utc)
            }
            LocalResult::None => {
                let before_gap = local - Duration::hours(3);
                let offset_seconds = tz
                    .from_local_datetime(&before_gap)
                    .earliest()
                    .map(|dt| dt.offset().fix().local_minus_utc())
                    .unwrap_or(0);
                debug!("Nonexistent local time {}, resolving via pre-gap offset", local);
                Utc.from_utc_datetime(&(local - Duration::seconds(offset_seconds as i64)))
            }
        }
    }

    /// UTC instant -> local wall clock.
    pub fn to_local(&self, instant: DateTime<Utc>, tz: &Tz) -> NaiveDateTime {
        instant.with_timezone(tz).naive_local()
    }
}
