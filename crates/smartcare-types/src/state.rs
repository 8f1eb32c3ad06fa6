//! Reconciled session state.
//!
//! Exactly one variant holds at any instant. `Authenticated` always pairs an
//! identity with the profile that belongs to it; build it through
//! [`SessionState::authenticated`] so the pairing is checked.

use crate::{Identity, IdentityId, Profile};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Observable session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    /// Startup, or an operation is in flight.
    Loading,

    /// No identity; no profile.
    Unauthenticated,

    /// Signed in, but no linked profile could be resolved.
    AuthenticatedNoProfile { identity: Identity },

    /// Signed in with the identity's own profile.
    Authenticated { identity: Identity, profile: Profile },
}

/// Attempted to pair an identity with a profile owned by someone else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("profile belongs to identity {profile_owner}, not {identity}")]
pub struct ProfileMismatch {
    pub identity: IdentityId,
    pub profile_owner: IdentityId,
}

impl SessionState {
    /// Checked constructor for the `Authenticated` variant.
    pub fn authenticated(identity: Identity, profile: Profile) -> Result<Self, ProfileMismatch> {
        if !profile.belongs_to(&identity.id) {
            return Err(ProfileMismatch {
                identity: identity.id,
                profile_owner: profile.identity_id,
            });
        }
        Ok(Self::Authenticated { identity, profile })
    }

    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Loading => SessionStatus::Loading,
            Self::Unauthenticated => SessionStatus::Unauthenticated,
            Self::AuthenticatedNoProfile { .. } => SessionStatus::AuthenticatedNoProfile,
            Self::Authenticated { .. } => SessionStatus::Authenticated,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::AuthenticatedNoProfile { identity } | Self::Authenticated { identity, .. } => {
                Some(identity)
            }
            Self::Loading | Self::Unauthenticated => None,
        }
    }

    pub fn profile(&self) -> Option<&Profile> {
        match self {
            Self::Authenticated { profile, .. } => Some(profile),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// True for both authenticated variants.
    pub fn is_signed_in(&self) -> bool {
        self.identity().is_some()
    }

    /// Whether the identity/profile pairing invariant holds.
    pub fn is_consistent(&self) -> bool {
        match self {
            Self::Authenticated { identity, profile } => profile.belongs_to(&identity.id),
            _ => true,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Loading
    }
}

/// Variant tag of a [`SessionState`], without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Loading,
    Unauthenticated,
    AuthenticatedNoProfile,
    Authenticated,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Loading => "loading",
            Self::Unauthenticated => "unauthenticated",
            Self::AuthenticatedNoProfile => "authenticated_no_profile",
            Self::Authenticated => "authenticated",
        };
        f.write_str(s)
    }
}
