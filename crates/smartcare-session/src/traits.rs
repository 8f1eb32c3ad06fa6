//! Seams to the two external collaborators.
//!
//! The session manager is the only caller of these traits. Implementations
//! live in `smartcare-supabase` (hosted backend) and [`crate::memory`]
//! (tests and local runs).

use crate::error::{IdentityResult, StoreResult};
use async_trait::async_trait;
use smartcare_types::{Identity, IdentityId, NewProfile, Profile, SignUpMetadata};
use tokio::sync::broadcast;

/// Stream of session-change notifications. `None` means signed out.
///
/// Dropping the receiver releases the subscription.
pub type SessionChanges = broadcast::Receiver<Option<Identity>>;

/// Auth provider client: issues and validates credentials and keeps its own
/// session cache.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Identity of the cached session, if any.
    async fn get_session(&self) -> IdentityResult<Option<Identity>>;

    /// Password sign-in.
    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Identity>;

    /// Create a new identity.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> IdentityResult<Identity>;

    /// End the provider session.
    async fn sign_out(&self) -> IdentityResult<()>;

    /// Register for session-change notifications (token refresh, sign-out
    /// elsewhere, ...).
    fn session_changes(&self) -> SessionChanges;
}

/// Durable store of clinician profiles, queried by equality on the owning identity.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_profile_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> StoreResult<Option<Profile>>;

    /// Insert a profile row; `record.identity_id` must be unique.
    async fn insert_profile(&self, record: NewProfile) -> StoreResult<Profile>;
}
