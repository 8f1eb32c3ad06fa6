//! Two-phase sign-up across the identity provider and the profile store.
//!
//! The stores share no transaction. Phase 1 (identity creation) is
//! authoritative: when phase 2 (profile insert) fails the identity is kept,
//! the caller gets [`SessionError::ProfileCreation`], and the profile can be
//! created later through profile completion. The provider offers no
//! compensating delete, so there is no rollback.

use crate::error::{SessionError, StoreError};
use crate::traits::{IdentityClient, ProfileStore};
use crate::validation::SignUpRequest;
use smartcare_types::{Identity, NewProfile, Profile, ProfileFields, SignUpMetadata};
use tracing::{info, warn};

/// Both phases completed.
#[derive(Debug, Clone)]
pub(crate) struct SignUpOutcome {
    pub identity: Identity,
    pub profile: Profile,
}

pub(crate) struct SignUpSaga<'a> {
    identity: &'a dyn IdentityClient,
    profiles: &'a dyn ProfileStore,
}

impl<'a> SignUpSaga<'a> {
    pub fn new(identity: &'a dyn IdentityClient, profiles: &'a dyn ProfileStore) -> Self {
        Self { identity, profiles }
    }

    /// Run both phases. Input must already be validated.
    pub async fn run(&self, request: SignUpRequest) -> Result<SignUpOutcome, SessionError> {
        let SignUpRequest {
            email,
            password,
            profile,
            ..
        } = request;

        let metadata = SignUpMetadata {
            full_name: profile.full_name.clone(),
        };
        let identity = self
            .identity
            .sign_up(&email, &password, metadata)
            .await
            .map_err(|err| {
                warn!(email = %email, error = %err, "identity creation failed");
                SessionError::SignUp(err)
            })?;
        info!(identity_id = %identity.id, "identity created; inserting profile");

        // The form's email is what the clinician typed; the provider may
        // normalize its own copy.
        let profile = create_profile(self.profiles, &identity, &email, profile).await?;
        Ok(SignUpOutcome { identity, profile })
    }
}

/// Insert the profile for `identity` and check the store returned the row
/// it was asked to write.
pub(crate) async fn create_profile(
    profiles: &dyn ProfileStore,
    identity: &Identity,
    email: &str,
    fields: ProfileFields,
) -> Result<Profile, SessionError> {
    let record = NewProfile::new(identity.id.clone(), email, fields);
    let profile = profiles.insert_profile(record).await.map_err(|source| {
        warn!(
            identity_id = %identity.id,
            error = %source,
            "profile insert failed; identity kept without profile"
        );
        SessionError::ProfileCreation {
            identity: identity.clone(),
            source,
        }
    })?;

    if !profile.belongs_to(&identity.id) {
        return Err(SessionError::ProfileCreation {
            identity: identity.clone(),
            source: StoreError::InvariantViolation(format!(
                "inserted profile {} is owned by {}",
                profile.id, profile.identity_id
            )),
        });
    }
    Ok(profile)
}
