//! In-memory reference implementations of the collaborator traits.
//!
//! Deterministic and test-friendly, with fault injection for every remote
//! call the session manager makes. The CLI's `memory` backend uses them for
//! local runs; production uses the hosted-backend adapters.

use crate::error::{IdentityError, IdentityResult, StoreError, StoreResult};
use crate::traits::{IdentityClient, ProfileStore, SessionChanges};
use async_trait::async_trait;
use smartcare_types::{Identity, IdentityId, NewProfile, Profile, ProfileId, SignUpMetadata};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Account {
    identity: Identity,
    password: String,
    metadata: SignUpMetadata,
}

/// Injected failures for [`InMemoryIdentityClient`]. `None` means succeed.
#[derive(Debug, Clone, Default)]
struct IdentityFaults {
    get_session: Option<String>,
    sign_up: Option<String>,
    sign_out: Option<String>,
}

/// In-memory auth provider.
///
/// By default it does not broadcast session changes for its own
/// sign-in/sign-up/sign-out calls; enable that with
/// [`with_auth_events`](Self::with_auth_events). [`emit`](Self::emit)
/// simulates changes from outside the process (token refresh, sign-out in
/// another tab).
pub struct InMemoryIdentityClient {
    accounts: RwLock<HashMap<String, Account>>,
    session: RwLock<Option<Identity>>,
    changes: broadcast::Sender<Option<Identity>>,
    auth_events: bool,
    faults: RwLock<IdentityFaults>,
    sign_in_latency: RwLock<HashMap<String, Duration>>,
    sign_in_calls: AtomicUsize,
}

impl InMemoryIdentityClient {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            accounts: RwLock::new(HashMap::new()),
            session: RwLock::new(None),
            changes,
            auth_events: false,
            faults: RwLock::new(IdentityFaults::default()),
            sign_in_latency: RwLock::new(HashMap::new()),
            sign_in_calls: AtomicUsize::new(0),
        }
    }

    /// Broadcast a change for this client's own auth calls, like a hosted
    /// provider does.
    pub fn with_auth_events(mut self) -> Self {
        self.auth_events = true;
        self
    }

    /// Create an account without going through sign-up.
    pub fn register(&self, email: &str, password: &str, full_name: &str) -> Identity {
        let identity = Identity::new(IdentityId::generate(), email);
        write(&self.accounts).insert(
            email.to_string(),
            Account {
                identity: identity.clone(),
                password: password.to_string(),
                metadata: SignUpMetadata {
                    full_name: full_name.to_string(),
                },
            },
        );
        identity
    }

    /// Replace the cached session without notifying anyone.
    pub fn set_session(&self, identity: Option<Identity>) {
        *write(&self.session) = identity;
    }

    /// Change the cached session and notify listeners, as an external event would.
    pub fn emit(&self, identity: Option<Identity>) {
        self.set_session(identity.clone());
        let _ = self.changes.send(identity);
    }

    /// Metadata stored with an account at sign-up.
    pub fn metadata(&self, email: &str) -> Option<SignUpMetadata> {
        read(&self.accounts).get(email).map(|a| a.metadata.clone())
    }

    pub fn account_count(&self) -> usize {
        read(&self.accounts).len()
    }

    /// Number of live session-change receivers.
    pub fn listener_count(&self) -> usize {
        self.changes.receiver_count()
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    /// Delay sign-in for one email (use with paused tokio time).
    pub fn set_sign_in_latency(&self, email: &str, latency: Duration) {
        write(&self.sign_in_latency).insert(email.to_string(), latency);
    }

    pub fn fail_get_session(&self, reason: Option<&str>) {
        write(&self.faults).get_session = reason.map(str::to_string);
    }

    pub fn fail_sign_up(&self, reason: Option<&str>) {
        write(&self.faults).sign_up = reason.map(str::to_string);
    }

    pub fn fail_sign_out(&self, reason: Option<&str>) {
        write(&self.faults).sign_out = reason.map(str::to_string);
    }

    fn announce(&self, identity: Option<Identity>) {
        if self.auth_events {
            let _ = self.changes.send(identity);
        }
    }
}

impl Default for InMemoryIdentityClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityClient for InMemoryIdentityClient {
    async fn get_session(&self) -> IdentityResult<Option<Identity>> {
        if let Some(reason) = read(&self.faults).get_session.clone() {
            return Err(IdentityError::Unavailable(reason));
        }
        Ok(read(&self.session).clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let latency = read(&self.sign_in_latency).get(email).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let identity = match read(&self.accounts).get(email) {
            Some(account) if account.password == password => account.identity.clone(),
            _ => return Err(IdentityError::InvalidCredentials),
        };
        debug!(identity_id = %identity.id, "in-memory sign-in");
        self.set_session(Some(identity.clone()));
        self.announce(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> IdentityResult<Identity> {
        if let Some(reason) = read(&self.faults).sign_up.clone() {
            return Err(IdentityError::Rejected(reason));
        }

        let identity = {
            let mut accounts = write(&self.accounts);
            if accounts.contains_key(email) {
                return Err(IdentityError::AlreadyRegistered(email.to_string()));
            }
            let identity = Identity::new(IdentityId::generate(), email);
            accounts.insert(
                email.to_string(),
                Account {
                    identity: identity.clone(),
                    password: password.to_string(),
                    metadata,
                },
            );
            identity
        };
        debug!(identity_id = %identity.id, "in-memory sign-up");
        self.set_session(Some(identity.clone()));
        self.announce(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        if let Some(reason) = read(&self.faults).sign_out.clone() {
            return Err(IdentityError::Unavailable(reason));
        }
        self.set_session(None);
        self.announce(None);
        Ok(())
    }

    fn session_changes(&self) -> SessionChanges {
        self.changes.subscribe()
    }
}

/// In-memory profile table keyed by owning identity.
#[derive(Default)]
pub struct InMemoryProfileStore {
    rows: RwLock<HashMap<IdentityId, Profile>>,
    lookup_failure: RwLock<Option<String>>,
    insert_failure: RwLock<Option<String>>,
    lookup_latency: RwLock<Option<Duration>>,
    insert_latency: RwLock<Option<Duration>>,
    lookups: AtomicUsize,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row directly, keyed by its owner.
    pub fn seed(&self, profile: Profile) {
        self.seed_under(profile.identity_id.clone(), profile);
    }

    /// Insert a row under an arbitrary key, to model a store that returns
    /// the wrong row.
    pub fn seed_under(&self, key: IdentityId, profile: Profile) {
        write(&self.rows).insert(key, profile);
    }

    pub fn get(&self, identity_id: &IdentityId) -> Option<Profile> {
        read(&self.rows).get(identity_id).cloned()
    }

    pub fn len(&self) -> usize {
        read(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every lookup fail with a backend error until cleared.
    pub fn fail_lookups(&self, reason: Option<&str>) {
        *write(&self.lookup_failure) = reason.map(str::to_string);
    }

    /// Make every insert fail with a backend error until cleared.
    pub fn fail_inserts(&self, reason: Option<&str>) {
        *write(&self.insert_failure) = reason.map(str::to_string);
    }

    /// Answer lookups `latency` after reading the table, so a row inserted
    /// meanwhile is not seen.
    pub fn set_lookup_latency(&self, latency: Option<Duration>) {
        *write(&self.lookup_latency) = latency;
    }

    /// Delay inserts before the row is written.
    pub fn set_insert_latency(&self, latency: Option<Duration>) {
        *write(&self.insert_latency) = latency;
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn find_profile_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> StoreResult<Option<Profile>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let outcome = match read(&self.lookup_failure).clone() {
            Some(reason) => Err(StoreError::Backend(reason)),
            None => Ok(self.get(identity_id)),
        };
        let latency = *read(&self.lookup_latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        outcome
    }

    async fn insert_profile(&self, record: NewProfile) -> StoreResult<Profile> {
        let latency = *read(&self.insert_latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(reason) = read(&self.insert_failure).clone() {
            return Err(StoreError::Backend(reason));
        }

        let mut rows = write(&self.rows);
        if rows.contains_key(&record.identity_id) {
            return Err(StoreError::Conflict(format!(
                "profile for identity {} already exists",
                record.identity_id
            )));
        }
        let profile = record.into_profile(ProfileId::generate());
        rows.insert(profile.identity_id.clone(), profile.clone());
        Ok(profile)
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartcare_types::ProfileFields;

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let client = InMemoryIdentityClient::new();
        let registered = client.register("a@b.com", "secret1", "Jane Doe");

        let identity = client.sign_in("a@b.com", "secret1").await.unwrap();
        assert_eq!(identity, registered);
        assert_eq!(client.get_session().await.unwrap(), Some(registered));

        let err = client.sign_in("a@b.com", "wrong").await.unwrap_err();
        assert_eq!(err, IdentityError::InvalidCredentials);
        assert_eq!(client.sign_in_calls(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_rejected() {
        let client = InMemoryIdentityClient::new();
        let meta = SignUpMetadata {
            full_name: "Jane Doe".into(),
        };
        client.sign_up("a@b.com", "secret1", meta.clone()).await.unwrap();
        let err = client.sign_up("a@b.com", "secret1", meta).await.unwrap_err();
        assert!(matches!(err, IdentityError::AlreadyRegistered(_)));
        assert_eq!(client.account_count(), 1);
        assert_eq!(client.metadata("a@b.com").unwrap().full_name, "Jane Doe");
    }

    #[tokio::test]
    async fn test_auth_events_are_opt_in() {
        let quiet = InMemoryIdentityClient::new();
        quiet.register("a@b.com", "secret1", "Jane");
        let mut rx = quiet.session_changes();
        quiet.sign_in("a@b.com", "secret1").await.unwrap();
        assert!(rx.try_recv().is_err());

        let loud = InMemoryIdentityClient::new().with_auth_events();
        let identity = loud.register("a@b.com", "secret1", "Jane");
        let mut rx = loud.session_changes();
        loud.sign_in("a@b.com", "secret1").await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), Some(identity));
    }

    #[tokio::test]
    async fn test_profile_identity_is_unique() {
        let store = InMemoryProfileStore::new();
        let owner = IdentityId::new("u-1");
        let record = NewProfile::new(owner.clone(), "a@b.com", ProfileFields::default());

        store.insert_profile(record.clone()).await.unwrap();
        let err = store.insert_profile(record).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_lookup_failure() {
        let store = InMemoryProfileStore::new();
        store.fail_lookups(Some("connection reset"));
        let err = store
            .find_profile_by_identity(&IdentityId::new("u-1"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Backend("connection reset".into()));

        store.fail_lookups(None);
        assert!(store
            .find_profile_by_identity(&IdentityId::new("u-1"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.lookup_count(), 2);
    }
}
