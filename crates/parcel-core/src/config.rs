//! Configuration module
//!
//! Client-side settings for the upload protocol: where the metadata service
//! lives, its endpoint paths, and the deadlines and reporting intervals used
//! by the orchestrator. Values come from the environment (and `.env`).

use std::env;
use std::time::Duration;

use crate::session::{Role, Session};

// Common constants
const DEFAULT_API_URL: &str = "http://localhost:3000";
const DEFAULT_API_VERSION: &str = "v0";
const DEFAULT_CREDENTIALS_PATH: &str = "/uploads/presigned";
const DEFAULT_CONFIRM_PATH: &str = "/uploads/complete";
const API_TIMEOUT_SECS: u64 = 60;
const TRANSFER_TIMEOUT_SECS: u64 = 60;
const SLOW_UPLOAD_THRESHOLD_SECS: u64 = 30;
const ELAPSED_TICK_MS: u64 = 500;

/// Upload client configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub api_version: String,
    pub credentials_path: String,
    pub confirm_path: String,
    /// Transport-level timeout of the authorized client (credential and confirm calls).
    pub api_timeout: Duration,
    /// Hard deadline of the direct transfer to storage.
    pub transfer_timeout: Duration,
    /// Elapsed time after which the batch is reported as slow.
    pub slow_upload_threshold: Duration,
    /// Interval at which elapsed time is republished.
    pub elapsed_tick: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            credentials_path: DEFAULT_CREDENTIALS_PATH.to_string(),
            confirm_path: DEFAULT_CONFIRM_PATH.to_string(),
            api_timeout: Duration::from_secs(API_TIMEOUT_SECS),
            transfer_timeout: Duration::from_secs(TRANSFER_TIMEOUT_SECS),
            slow_upload_threshold: Duration::from_secs(SLOW_UPLOAD_THRESHOLD_SECS),
            elapsed_tick: Duration::from_millis(ELAPSED_TICK_MS),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, anyhow::Error> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, anyhow::Error> {
        let api_url = lookup("PARCEL_API_URL")
            .or_else(|| lookup("API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let config = Self {
            api_url,
            api_version: lookup("PARCEL_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            credentials_path: lookup("PARCEL_CREDENTIALS_PATH")
                .unwrap_or_else(|| DEFAULT_CREDENTIALS_PATH.to_string()),
            confirm_path: lookup("PARCEL_CONFIRM_PATH")
                .unwrap_or_else(|| DEFAULT_CONFIRM_PATH.to_string()),
            api_timeout: Duration::from_secs(parse_or(
                &lookup,
                "PARCEL_API_TIMEOUT_SECS",
                API_TIMEOUT_SECS,
            )?),
            transfer_timeout: Duration::from_secs(parse_or(
                &lookup,
                "PARCEL_TRANSFER_TIMEOUT_SECS",
                TRANSFER_TIMEOUT_SECS,
            )?),
            slow_upload_threshold: Duration::from_secs(parse_or(
                &lookup,
                "PARCEL_SLOW_UPLOAD_THRESHOLD_SECS",
                SLOW_UPLOAD_THRESHOLD_SECS,
            )?),
            elapsed_tick: Duration::from_millis(parse_or(
                &lookup,
                "PARCEL_ELAPSED_TICK_MS",
                ELAPSED_TICK_MS,
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(anyhow::anyhow!(
                "PARCEL_API_URL must start with http:// or https:// (got {})",
                self.api_url
            ));
        }

        for (key, path) in [
            ("PARCEL_CREDENTIALS_PATH", &self.credentials_path),
            ("PARCEL_CONFIRM_PATH", &self.confirm_path),
        ] {
            if !path.starts_with('/') {
                return Err(anyhow::anyhow!("{} must start with '/' (got {})", key, path));
            }
        }

        if self.api_timeout.is_zero() {
            return Err(anyhow::anyhow!("PARCEL_API_TIMEOUT_SECS must be greater than 0"));
        }
        if self.transfer_timeout.is_zero() {
            return Err(anyhow::anyhow!(
                "PARCEL_TRANSFER_TIMEOUT_SECS must be greater than 0"
            ));
        }
        if self.elapsed_tick.is_zero() {
            return Err(anyhow::anyhow!("PARCEL_ELAPSED_TICK_MS must be greater than 0"));
        }

        Ok(())
    }

    /// API version prefix (e.g. "/api/v0").
    pub fn api_prefix(&self) -> String {
        format!("/api/{}", self.api_version)
    }

    pub fn credentials_url(&self) -> String {
        format!("{}{}{}", self.api_url, self.api_prefix(), self.credentials_path)
    }

    pub fn confirm_url(&self) -> String {
        format!("{}{}{}", self.api_url, self.api_prefix(), self.confirm_path)
    }
}

/// Builds the caller session from PARCEL_API_TOKEN (or API_TOKEN) and PARCEL_API_ROLE.
pub fn session_from_env() -> Result<Session, anyhow::Error> {
    dotenvy::dotenv().ok();
    session_from_lookup(|key| env::var(key).ok())
}

pub fn session_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Session, anyhow::Error> {
    let token = lookup("PARCEL_API_TOKEN")
        .or_else(|| lookup("API_TOKEN"))
        .ok_or_else(|| anyhow::anyhow!("Missing access token. Set PARCEL_API_TOKEN or API_TOKEN"))?;

    let role = match lookup("PARCEL_API_ROLE") {
        Some(raw) => raw.parse::<Role>().map_err(|e| anyhow::anyhow!(e))?,
        None => Role::default(),
    };

    Ok(Session::new(token, role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.transfer_timeout, Duration::from_secs(60));
        assert_eq!(config.slow_upload_threshold, Duration::from_secs(30));
        assert_eq!(
            config.credentials_url(),
            "http://localhost:3000/api/v0/uploads/presigned"
        );
        assert_eq!(
            config.confirm_url(),
            "http://localhost:3000/api/v0/uploads/complete"
        );
    }

    #[test]
    fn test_overrides_and_fallback_url() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("API_URL", "https://media.example.com/"),
            ("PARCEL_API_VERSION", "v1"),
            ("PARCEL_TRANSFER_TIMEOUT_SECS", "120"),
            ("PARCEL_ELAPSED_TICK_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.api_url, "https://media.example.com");
        assert_eq!(config.api_prefix(), "/api/v1");
        assert_eq!(config.transfer_timeout, Duration::from_secs(120));
        assert_eq!(config.elapsed_tick, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = ClientConfig::from_lookup(lookup_from(&[(
            "PARCEL_TRANSFER_TIMEOUT_SECS",
            "sixty",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("PARCEL_TRANSFER_TIMEOUT_SECS"));
    }

    #[test]
    fn test_validation() {
        assert!(ClientConfig::from_lookup(lookup_from(&[("PARCEL_API_URL", "ftp://x")])).is_err());
        assert!(
            ClientConfig::from_lookup(lookup_from(&[("PARCEL_TRANSFER_TIMEOUT_SECS", "0")]))
                .is_err()
        );
        assert!(
            ClientConfig::from_lookup(lookup_from(&[("PARCEL_CONFIRM_PATH", "uploads/done")]))
                .is_err()
        );
    }

    #[test]
    fn test_session_from_lookup() {
        let session = session_from_lookup(lookup_from(&[
            ("PARCEL_API_TOKEN", "tok"),
            ("PARCEL_API_ROLE", "admin"),
        ]))
        .unwrap();
        assert_eq!(session.token(), "tok");
        assert!(session.can_publish());

        let fallback = session_from_lookup(lookup_from(&[("API_TOKEN", "t2")])).unwrap();
        assert_eq!(fallback.role(), Role::User);

        assert!(session_from_lookup(lookup_from(&[])).is_err());
    }
}
