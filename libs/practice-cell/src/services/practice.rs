use std::sync::Arc;

use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use chrono::NaiveDate;
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{weekday_number, Pet, Practice, PracticeError, PracticeHours};

pub struct PracticeService {
    supabase: Arc<SupabaseClient>,
}

impl PracticeService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Fetch a practice row (timezone and booking defaults live here).
    pub async fn get_practice(
        &self,
        practice_id: Uuid,
        auth_token: &str,
    ) -> Result<Practice, PracticeError> {
        debug!("Fetching practice: {}", practice_id);

        let path = format!("/rest/v1/practices?id=eq.{}", practice_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let Some(row) = result.into_iter().next() else {
            return Err(PracticeError::NotFound);
        };

        let practice: Practice = serde_json::from_value(row).map_err(shared_database::StoreError::from)?;
        Ok(practice)
    }

    /// The operating-hours row in force for a date, or None when no row
    /// covers that weekday. Several rows can cover the same weekday with
    /// overlapping effective windows; the latest effective_from wins.
    pub async fn hours_for_date(
        &self,
        practice_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Option<PracticeHours>, PracticeError> {
        let weekday = weekday_number(date);
        debug!("Fetching practice hours for {} weekday {}", date, weekday);

        let path = format!(
            "/rest/v1/practice_hours?practice_id=eq.{}&weekday=eq.{}&effective_from=lte.{}&or=(effective_until.is.null,effective_until.gte.{})&order=effective_from.desc&limit=1",
            practice_id, weekday, date, date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let Some(row) = result.into_iter().next() else {
            return Ok(None);
        };

        let hours: PracticeHours = serde_json::from_value(row).map_err(shared_database::StoreError::from)?;
        Ok(Some(hours).filter(|h| h.covers(date)))
    }

    /// Active pets on file for an owner, ordered by name.
    pub async fn pets_for_owner(
        &self,
        owner_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Pet>, PracticeError> {
        debug!("Fetching pets for owner: {}", owner_id);

        let path = format!(
            "/rest/v1/pets?owner_id=eq.{}&is_active=eq.true&order=name.asc",
            owner_id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let pets: Vec<Pet> = result
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Pet>, _>>()
            .map_err(shared_database::StoreError::from)?;

        Ok(pets)
    }
}
