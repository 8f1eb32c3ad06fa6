use smartcare_types::{Identity, IdentityId, SessionStatus};
use thiserror::Error;

/// Result type for identity-provider calls.
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Result type for profile-store calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Failures reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("identity already registered: {0}")]
    AlreadyRegistered(String),

    #[error("request rejected by identity provider: {0}")]
    Rejected(String),

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Failures reported by the profile store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Local pre-checks that fail before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },
}

/// Errors surfaced by [`SessionManager`](crate::SessionManager) operations.
///
/// Every variant leaves the session in a well-defined state; none of them is
/// fatal to the process.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("authentication failed: {0}")]
    Authentication(#[source] IdentityError),

    #[error("sign-up failed: {0}")]
    SignUp(#[source] IdentityError),

    /// Identity was created but the profile row was not. The identity is kept;
    /// the profile can be created later from `AuthenticatedNoProfile`.
    #[error("account {} was created but its profile could not be saved: {source}", identity.email)]
    ProfileCreation {
        identity: Identity,
        #[source]
        source: StoreError,
    },

    /// Degrades the session instead of failing the caller.
    #[error("profile lookup failed for identity {identity_id}: {source}")]
    ProfileLookup {
        identity_id: IdentityId,
        #[source]
        source: StoreError,
    },

    /// Local state has already been cleared when this is returned.
    #[error("sign-out failed: {0}")]
    SignOut(#[source] IdentityError),

    #[error("operation not allowed while session is {0}")]
    InvalidState(SessionStatus),
}

impl SessionError {
    /// True for the signup partial failure that leaves an identity without a profile.
    pub fn is_partial_sign_up(&self) -> bool {
        matches!(self, Self::ProfileCreation { .. })
    }
}
