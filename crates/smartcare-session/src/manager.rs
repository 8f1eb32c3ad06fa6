//! Session Manager - sole writer of the reconciled session state.
//!
//! The manager is the only caller into the identity provider and the profile
//! store. Every state write goes through one commit path:
//!
//! - each operation (or incoming change notification) takes a ticket when it
//!   is invoked;
//! - on completion it commits its resulting state only if no later-invoked
//!   operation has committed already. Superseded results are dropped; the
//!   underlying provider call is never aborted;
//! - change notifications share the ticket of the latest invoked operation
//!   and record how many commits had landed when they arrived. They apply
//!   immediately but never supersede an operation still in flight, including
//!   the one whose provider call raised them, and are dropped if any commit
//!   lands while their profile lookup is pending.
//!
//! `sign_in`, `sign_up` and `sign_out` publish `Loading` when they start and
//! settle to a non-loading variant when they finish, success or failure.

use crate::channel::{StateChannel, Subscription};
use crate::config::{LookupFailurePolicy, SessionConfig};
use crate::error::{SessionError, SessionResult};
use crate::signup::{create_profile, SignUpSaga};
use crate::traits::{IdentityClient, ProfileStore, SessionChanges};
use crate::validation::{validate_credentials, validate_profile_fields, SignUpRequest};
use crate::StoreError;
use smartcare_types::{Identity, Profile, ProfileFields, SessionState, SessionStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Invocation order of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Ticket(u64);

/// Position of a change notification at the moment it arrived.
#[derive(Debug, Clone, Copy)]
struct Arrival {
    ticket: Ticket,
    generation: u64,
}

struct Watermark {
    /// Highest ticket that has committed.
    committed: u64,
    /// Number of commits so far.
    generation: u64,
    /// Last committed non-loading state; failed operations settle back to it.
    settled: SessionState,
}

struct Shared {
    identity: Arc<dyn IdentityClient>,
    profiles: Arc<dyn ProfileStore>,
    config: SessionConfig,
    channel: StateChannel,
    issued: AtomicU64,
    watermark: Mutex<Watermark>,
}

impl Shared {
    fn issue(&self) -> Ticket {
        Ticket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Ticket of the latest invoked operation, without issuing a new one.
    fn latest(&self) -> Ticket {
        Ticket(self.issued.load(Ordering::SeqCst))
    }

    fn arrive(&self) -> Arrival {
        let mark = lock(&self.watermark);
        Arrival {
            ticket: self.latest(),
            generation: mark.generation,
        }
    }

    fn begin_loading(&self) -> Ticket {
        let ticket = self.issue();
        self.commit(ticket, SessionState::Loading);
        ticket
    }

    fn commit(&self, ticket: Ticket, state: SessionState) -> bool {
        self.settle(ticket, None, |_| state)
    }

    /// Commit a notification's result unless anything committed since it
    /// arrived.
    fn commit_arrival(&self, arrival: Arrival, state: SessionState) -> bool {
        self.settle(arrival.ticket, Some(arrival.generation), |_| state)
    }

    /// Settle back to the last non-loading state.
    fn revert(&self, ticket: Ticket) -> bool {
        self.settle(ticket, None, |mark| mark.settled.clone())
    }

    fn settle(
        &self,
        ticket: Ticket,
        fence: Option<u64>,
        next: impl FnOnce(&Watermark) -> SessionState,
    ) -> bool {
        let mut mark = lock(&self.watermark);
        if ticket.0 < mark.committed {
            debug!(
                ticket = ticket.0,
                committed = mark.committed,
                "discarding superseded session result"
            );
            return false;
        }
        if fence.is_some_and(|generation| generation != mark.generation) {
            debug!(
                ticket = ticket.0,
                generation = mark.generation,
                "discarding notification overtaken by a later commit"
            );
            return false;
        }

        let state = next(&mark);
        debug_assert!(state.is_consistent());
        mark.committed = ticket.0;
        mark.generation += 1;
        if !state.is_loading() {
            mark.settled = state.clone();
        }
        debug!(ticket = ticket.0, status = %state.status(), "committing session state");
        self.channel.publish(state);
        true
    }

    async fn lookup(&self, identity: &Identity) -> SessionResult<Option<Profile>> {
        let found = self
            .profiles
            .find_profile_by_identity(&identity.id)
            .await
            .map_err(|source| SessionError::ProfileLookup {
                identity_id: identity.id.clone(),
                source,
            })?;

        match found {
            Some(profile) if !profile.belongs_to(&identity.id) => {
                Err(SessionError::ProfileLookup {
                    identity_id: identity.id.clone(),
                    source: StoreError::InvariantViolation(format!(
                        "store returned profile {} owned by {}",
                        profile.id, profile.identity_id
                    )),
                })
            }
            other => Ok(other),
        }
    }

    /// Identity -> profile resolution shared by startup, sign-in and change
    /// notifications.
    async fn resolve(&self, identity: Option<Identity>, policy: LookupFailurePolicy) -> SessionState {
        let Some(identity) = identity else {
            return SessionState::Unauthenticated;
        };

        match self.lookup(&identity).await {
            Ok(profile) => pair(identity, profile),
            Err(err) => {
                warn!(error = %err, ?policy, "profile lookup failed");
                match policy {
                    LookupFailurePolicy::SignOut => SessionState::Unauthenticated,
                    LookupFailurePolicy::Degrade => SessionState::AuthenticatedNoProfile { identity },
                }
            }
        }
    }

    /// Resolve from the provider's cached session.
    async fn resolve_current(&self, policy: LookupFailurePolicy) -> SessionState {
        match self.identity.get_session().await {
            Ok(identity) => self.resolve(identity, policy).await,
            Err(err) => {
                warn!(error = %err, "failed to read provider session");
                SessionState::Unauthenticated
            }
        }
    }

    async fn on_session_change(&self, identity: Option<Identity>) {
        let arrival = self.arrive();
        debug!(
            ticket = arrival.ticket.0,
            identity_id = identity.as_ref().map(|i| i.id.as_str()),
            "session change received"
        );
        let state = self.resolve(identity, LookupFailurePolicy::Degrade).await;
        self.commit_arrival(arrival, state);
    }

    /// Re-read the provider session after missed notifications.
    async fn on_lag(&self) {
        let arrival = self.arrive();
        let state = self.resolve_current(LookupFailurePolicy::Degrade).await;
        self.commit_arrival(arrival, state);
    }

    /// Settle a sign-up whose profile insert failed. The provider's cache
    /// decides: if it kept the new identity's session, that identity is
    /// signed in without a profile.
    async fn settle_partial_sign_up(&self, ticket: Ticket, created: &Identity) {
        match self.identity.get_session().await {
            Ok(Some(current)) if current.id == created.id => {
                self.commit(ticket, SessionState::AuthenticatedNoProfile { identity: current });
            }
            Ok(_) => {
                debug!(identity_id = %created.id, "provider kept no session after sign-up");
                self.revert(ticket);
            }
            Err(err) => {
                warn!(error = %err, "failed to read provider session after partial sign-up");
                self.revert(ticket);
            }
        }
    }
}

/// Pair an identity with its profile, refusing a foreign one.
fn pair(identity: Identity, profile: Option<Profile>) -> SessionState {
    let Some(profile) = profile else {
        return SessionState::AuthenticatedNoProfile { identity };
    };
    match SessionState::authenticated(identity.clone(), profile) {
        Ok(state) => state,
        Err(mismatch) => {
            warn!(%mismatch, "refusing to expose a profile of another identity");
            SessionState::AuthenticatedNoProfile { identity }
        }
    }
}

async fn listen(shared: Arc<Shared>, mut changes: SessionChanges) {
    loop {
        match changes.recv().await {
            Ok(identity) => shared.on_session_change(identity).await,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "session change listener lagged; resynchronizing");
                shared.on_lag().await;
            }
            Err(RecvError::Closed) => {
                debug!("session change stream closed");
                break;
            }
        }
    }
}

/// Reconciles the provider identity with the clinician profile and publishes
/// the result to the rest of the application.
///
/// One instance per process at the composition boundary; tests build as
/// many as they like.
pub struct SessionManager {
    shared: Arc<Shared>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a manager in `Loading`. Call [`initialize`](Self::initialize)
    /// to resolve the cached session and start listening for changes.
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        profiles: Arc<dyn ProfileStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                identity,
                profiles,
                config,
                channel: StateChannel::new(SessionState::Loading),
                issued: AtomicU64::new(0),
                watermark: Mutex::new(Watermark {
                    committed: 0,
                    generation: 0,
                    settled: SessionState::Unauthenticated,
                }),
            }),
            listener: Mutex::new(None),
        }
    }

    /// [`new`](Self::new) followed by [`initialize`](Self::initialize).
    pub async fn start(
        identity: Arc<dyn IdentityClient>,
        profiles: Arc<dyn ProfileStore>,
        config: SessionConfig,
    ) -> Self {
        let manager = Self::new(identity, profiles, config);
        manager.initialize().await;
        manager
    }

    /// Subscribe to provider session changes, then resolve the cached
    /// session.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        let ticket = self.shared.issue();
        {
            let mut slot = lock(&self.listener);
            if slot.is_some() {
                warn!("session manager already initialized");
                return;
            }
            let changes = self.shared.identity.session_changes();
            *slot = Some(tokio::spawn(listen(self.shared.clone(), changes)));
        }

        let state = self
            .shared
            .resolve_current(self.shared.config.startup_lookup_failure)
            .await;
        info!(status = %state.status(), "initial session resolved");
        self.shared.commit(ticket, state);
    }

    /// Synchronous snapshot.
    pub fn state(&self) -> SessionState {
        self.shared.channel.snapshot()
    }

    pub fn status(&self) -> SessionStatus {
        self.state().status()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    /// Callback subscription; see [`StateChannel::subscribe`].
    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&SessionState) + Send + Sync + 'static,
    {
        self.shared.channel.subscribe(observer)
    }

    /// Async receiver of state changes.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.shared.channel.watch()
    }

    /// Password sign-in.
    ///
    /// A rejected credential settles back to the pre-call state and returns
    /// [`SessionError::Authentication`] without a profile lookup. A failed
    /// profile lookup is not an error: the session lands in
    /// `AuthenticatedNoProfile`.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> SessionResult<()> {
        validate_credentials(email, password)?;
        let ticket = self.shared.begin_loading();

        let identity = match self.shared.identity.sign_in(email, password).await {
            Ok(identity) => identity,
            Err(err) => {
                warn!(error = %err, "sign-in rejected");
                self.shared.revert(ticket);
                return Err(SessionError::Authentication(err));
            }
        };

        let state = self
            .shared
            .resolve(Some(identity), LookupFailurePolicy::Degrade)
            .await;
        info!(status = %state.status(), "sign-in settled");
        self.shared.commit(ticket, state);
        Ok(())
    }

    /// Create the identity, then its profile. See [`crate::signup`] for the
    /// partial-failure policy.
    ///
    /// When only the profile insert fails, the session follows the
    /// provider's cache: `AuthenticatedNoProfile` if the provider signed the
    /// new identity in, otherwise the pre-call state.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn sign_up(&self, request: SignUpRequest) -> SessionResult<Profile> {
        request.validate(self.shared.config.min_password_length)?;
        let ticket = self.shared.begin_loading();

        let saga = SignUpSaga::new(self.shared.identity.as_ref(), self.shared.profiles.as_ref());
        match saga.run(request).await {
            Ok(outcome) => {
                info!(
                    identity_id = %outcome.identity.id,
                    profile_id = %outcome.profile.id,
                    "sign-up complete"
                );
                self.shared
                    .commit(ticket, pair(outcome.identity, Some(outcome.profile.clone())));
                Ok(outcome.profile)
            }
            Err(err) => {
                match &err {
                    SessionError::ProfileCreation { identity, .. } => {
                        self.shared.settle_partial_sign_up(ticket, identity).await;
                    }
                    _ => {
                        self.shared.revert(ticket);
                    }
                }
                Err(err)
            }
        }
    }

    /// Create the missing profile for the signed-in identity.
    ///
    /// Only valid from `AuthenticatedNoProfile`; this is the retry path after
    /// a partially failed sign-up. On failure the state is left untouched.
    #[instrument(skip(self, fields))]
    pub async fn complete_profile(&self, fields: ProfileFields) -> SessionResult<Profile> {
        let identity = match self.state() {
            SessionState::AuthenticatedNoProfile { identity } => identity,
            other => return Err(SessionError::InvalidState(other.status())),
        };
        validate_profile_fields(&fields)?;

        let ticket = self.shared.issue();
        let profile = create_profile(
            self.shared.profiles.as_ref(),
            &identity,
            &identity.email,
            fields,
        )
        .await?;
        info!(identity_id = %identity.id, profile_id = %profile.id, "profile completed");
        self.shared.commit(ticket, pair(identity, Some(profile.clone())));
        Ok(profile)
    }

    /// End the session.
    ///
    /// Local state is cleared whether or not the provider call succeeds; a
    /// provider failure is still reported as [`SessionError::SignOut`].
    /// Calling this while already `Unauthenticated` leaves state untouched.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> SessionResult<()> {
        if self.state() == SessionState::Unauthenticated {
            // The provider may still cache a session the startup policy
            // refused to expose.
            if let Err(err) = self.shared.identity.sign_out().await {
                warn!(error = %err, "provider sign-out failed while already signed out");
            }
            return Ok(());
        }

        let ticket = self.shared.begin_loading();
        let remote = self.shared.identity.sign_out().await;
        self.shared.commit(ticket, SessionState::Unauthenticated);

        match remote {
            Ok(()) => {
                info!("signed out");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "provider sign-out failed; local session cleared");
                Err(SessionError::SignOut(err))
            }
        }
    }

    /// Re-read the provider session and resolve it again, with the startup
    /// lookup-failure policy.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> SessionState {
        let ticket = self.shared.issue();
        let state = self
            .shared
            .resolve_current(self.shared.config.startup_lookup_failure)
            .await;
        self.shared.commit(ticket, state.clone());
        state
    }

    /// Apply one session-change notification. The background listener calls
    /// this for every notification it receives.
    pub async fn handle_session_change(&self, identity: Option<Identity>) {
        self.shared.on_session_change(identity).await;
    }

    /// Whether the change listener is running.
    pub fn is_listening(&self) -> bool {
        lock(&self.listener)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Release the session-change subscription. Later calls are no-ops.
    pub async fn shutdown(&self) {
        let handle = lock(&self.listener).take();
        if let Some(handle) = handle {
            handle.abort();
            // Wait for the task to drop its receiver.
            let _ = handle.await;
            info!("session change subscription released");
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let slot = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
