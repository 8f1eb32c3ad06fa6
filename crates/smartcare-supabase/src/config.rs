//! Hosted backend configuration

use crate::error::{SupabaseError, SupabaseResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Connection settings for the hosted auth provider and profile table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    #[serde(default)]
    pub url: Option<String>,

    /// Public anon key, sent as `apikey` on every request
    #[serde(default)]
    pub anon_key: Option<String>,

    /// Table holding clinician profiles
    #[serde(default = "default_profile_table")]
    pub profile_table: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Where to persist the auth session between runs. `None` keeps it in
    /// memory only.
    #[serde(default)]
    pub session_file: Option<PathBuf>,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            profile_table: default_profile_table(),
            request_timeout_secs: default_request_timeout_secs(),
            session_file: None,
        }
    }
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            anon_key: Some(anon_key.into()),
            ..Self::default()
        }
    }

    /// Both the project URL and the anon key are set and non-empty.
    pub fn is_configured(&self) -> bool {
        non_empty(&self.url).is_some() && non_empty(&self.anon_key).is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validated endpoint. Fails with [`SupabaseError::NotConfigured`] when
    /// either setting is missing.
    pub fn endpoint(&self) -> SupabaseResult<Endpoint> {
        let url = non_empty(&self.url).ok_or(SupabaseError::NotConfigured("url"))?;
        let anon_key = non_empty(&self.anon_key).ok_or(SupabaseError::NotConfigured("anon_key"))?;

        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SupabaseError::InvalidConfig(format!(
                "unsupported url scheme: {}",
                parsed.scheme()
            )));
        }
        if self.profile_table.trim().is_empty() {
            return Err(SupabaseError::InvalidConfig("profile_table is empty".into()));
        }

        Ok(Endpoint {
            base_url: url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        })
    }
}

/// Resolved base URL and key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub base_url: String,
    pub anon_key: String,
}

impl Endpoint {
    pub fn auth(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    pub fn rest(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn default_profile_table() -> String {
    "doctors".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}
