use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

/// Store-level failure. Callers that commit writes need to tell a
/// constraint conflict (a concurrent booking won the row) apart from the
/// store being unreachable, so the HTTP status survives into the error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store rejected request ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store response decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    /// True when the store refused a write because it would collide with an
    /// existing row (unique/exclusion constraint).
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Status { status: 409, .. })
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key).unwrap());
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
            );
        }

        headers
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, auth_token, body, None)
            .await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut headers = self.get_headers(auth_token);
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status == StatusCode::CONFLICT {
                debug!("Store reported conflict: {}", error_text);
            } else {
                error!("Store error ({}): {}", status, error_text);
            }

            return Err(StoreError::Status {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let raw = response.bytes().await?;
        let data = serde_json::from_slice::<T>(&raw)?;
        Ok(data)
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}
