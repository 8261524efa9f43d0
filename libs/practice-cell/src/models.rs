use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Practice {
    pub id: Uuid,
    pub name: String,
    pub timezone: String,
    pub default_appointment_minutes: Option<i32>,
}

/// One weekday row of the practice's operating hours. Null open or close
/// time means the practice is closed that day. The row is only in force
/// for dates inside [effective_from, effective_until].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PracticeHours {
    pub id: Uuid,
    pub practice_id: Uuid,
    pub weekday: i32,
    pub open_time: Option<NaiveTime>,
    pub close_time: Option<NaiveTime>,
    pub effective_from: NaiveDate,
    pub effective_until: Option<NaiveDate>,
}

impl PracticeHours {
    pub fn is_open(&self) -> bool {
        self.open_time.is_some() && self.close_time.is_some()
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.effective_from <= date
            && self.effective_until.map_or(true, |until| date <= until)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pet {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub species: String,
    pub is_active: bool,
}

/// Weekday number as stored in practice_hours (0 = Sunday .. 6 = Saturday).
pub fn weekday_number(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PracticeError {
    #[error("Practice not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] shared_database::StoreError),
}
