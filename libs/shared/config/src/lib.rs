use std::collections::HashMap;
use std::env;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub default_appointment_minutes: i32,
    pub search_timeout_seconds: u64,
    pub timezone_aliases: HashMap<String, String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            default_appointment_minutes: env::var("DEFAULT_APPOINTMENT_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            search_timeout_seconds: env::var("SEARCH_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(25),
            timezone_aliases: Self::timezone_aliases_from_env(),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Legacy timezone names still sent by older phone-channel integrations.
    /// Extend via TIMEZONE_ALIASES="Legacy/Name=America/Canonical,..."
    pub fn default_timezone_aliases() -> HashMap<String, String> {
        let mut aliases = HashMap::new();
        for (legacy, canonical) in [
            ("US/Eastern", "America/New_York"),
            ("US/Central", "America/Chicago"),
            ("US/Mountain", "America/Denver"),
            ("US/Pacific", "America/Los_Angeles"),
            ("US/Arizona", "America/Phoenix"),
            ("US/Hawaii", "Pacific/Honolulu"),
            ("US/Alaska", "America/Anchorage"),
        ] {
            aliases.insert(legacy.to_string(), canonical.to_string());
        }
        aliases
    }

    fn timezone_aliases_from_env() -> HashMap<String, String> {
        let mut aliases = Self::default_timezone_aliases();

        if let Ok(raw) = env::var("TIMEZONE_ALIASES") {
            for pair in raw.split(',') {
                match pair.split_once('=') {
                    Some((legacy, canonical))
                        if !legacy.trim().is_empty() && !canonical.trim().is_empty() =>
                    {
                        aliases.insert(legacy.trim().to_string(), canonical.trim().to_string());
                    }
                    _ => warn!("Ignoring malformed TIMEZONE_ALIASES entry: {}", pair),
                }
            }
        }

        aliases
    }
}
