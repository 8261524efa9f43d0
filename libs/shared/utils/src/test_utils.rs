use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Point the config at a mock store (wiremock server URI).
    pub fn with_store_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            default_appointment_minutes: 30,
            search_timeout_seconds: 25,
            timezone_aliases: AppConfig::default_timezone_aliases(),
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "owner".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn owner(email: &str) -> Self {
        Self::new(email, "owner")
    }

    pub fn staff(email: &str) -> Self {
        Self::new(email, "staff")
    }

    pub fn voice_agent() -> Self {
        Self::new("voice@practice.internal", "service")
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST rows for the scheduling tables.
pub struct MockStoreResponses;

impl MockStoreResponses {
    pub fn practice_response(practice_id: &str, timezone: &str) -> serde_json::Value {
        json!({
            "id": practice_id,
            "name": "North Paw Veterinary Clinic",
            "timezone": timezone,
            "default_appointment_minutes": 30,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn practice_hours_response(
        practice_id: &str,
        weekday: u8,
        open_time: Option<&str>,
        close_time: Option<&str>,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "practice_id": practice_id,
            "weekday": weekday,
            "open_time": open_time,
            "close_time": close_time,
            "effective_from": "2024-01-01",
            "effective_until": null
        })
    }

    pub fn vet_availability_response(
        vet_id: &str,
        practice_id: &str,
        date: &str,
        start_at: &str,
        end_at: &str,
        availability_type: &str,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "vet_id": vet_id,
            "practice_id": practice_id,
            "date": date,
            "start_at": start_at,
            "end_at": end_at,
            "availability_type": availability_type,
            "is_active": true
        })
    }

    pub fn appointment_response(
        appointment_id: &str,
        practice_id: &str,
        owner_id: &str,
        vet_id: &str,
        appointment_at: &str,
        duration_minutes: i32,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": appointment_id,
            "practice_id": practice_id,
            "owner_id": owner_id,
            "vet_id": vet_id,
            "pet_ids": [Uuid::new_v4()],
            "appointment_at": appointment_at,
            "duration_minutes": duration_minutes,
            "status": status,
            "title": "Wellness exam",
            "notes": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn pet_response(pet_id: &str, owner_id: &str, name: &str, species: &str) -> serde_json::Value {
        json!({
            "id": pet_id,
            "owner_id": owner_id,
            "name": name,
            "species": species,
            "is_active": true
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
