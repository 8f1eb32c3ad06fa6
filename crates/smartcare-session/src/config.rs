//! Session manager configuration

use serde::{Deserialize, Serialize};

/// What to publish when the profile lookup fails while resolving a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailurePolicy {
    /// Publish `Unauthenticated`.
    #[default]
    SignOut,

    /// Publish `AuthenticatedNoProfile`.
    Degrade,
}

/// Session manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Minimum password length accepted at sign-up
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,

    /// Lookup-failure handling during startup and `refresh`.
    ///
    /// Sign-in and change notifications always degrade.
    #[serde(default)]
    pub startup_lookup_failure: LookupFailurePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_password_length: default_min_password_length(),
            startup_lookup_failure: LookupFailurePolicy::SignOut,
        }
    }
}

fn default_min_password_length() -> usize {
    6
}
