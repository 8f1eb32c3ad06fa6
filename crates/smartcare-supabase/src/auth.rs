//! Identity client for the hosted auth provider.
//!
//! Talks to the provider's `/auth/v1` endpoints, caches the issued session,
//! refreshes it when it expires, and broadcasts every change to
//! subscribers the way the provider's own client SDK does.

use crate::config::{Endpoint, SupabaseConfig};
use crate::error::{SupabaseError, SupabaseResult};
use crate::session::{AuthSession, SessionCache, TokenResponse, UserResponse};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use smartcare_session::{IdentityClient, IdentityError, IdentityResult, SessionChanges};
use smartcare_types::{Identity, SignUpMetadata};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Supplies the signed-in user's bearer token to other adapters.
pub trait AccessTokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// HTTP identity client for the hosted auth provider.
pub struct GoTrueIdentityClient {
    http: Client,
    endpoint: Endpoint,
    sessions: SessionCache,
    changes: broadcast::Sender<Option<Identity>>,
}

impl GoTrueIdentityClient {
    /// Build a client. Fails if the backend is not configured.
    pub fn new(config: &SupabaseConfig) -> SupabaseResult<Self> {
        let endpoint = config.endpoint()?;
        let http = Client::builder().timeout(config.request_timeout()).build()?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            http,
            endpoint,
            sessions: SessionCache::open(config.session_file.clone()),
            changes,
        })
    }

    /// Cached session, without refreshing.
    pub fn current_session(&self) -> Option<AuthSession> {
        self.sessions.get()
    }

    #[instrument(skip(self, password))]
    async fn password_grant(&self, email: &str, password: &str) -> SupabaseResult<AuthSession> {
        let response: TokenResponse = self
            .post(
                &self.endpoint.auth("/token?grant_type=password"),
                &json!({ "email": email, "password": password }),
                None,
            )
            .await?;
        response.into_session(Utc::now())
    }

    async fn refresh_grant(&self, refresh_token: &str) -> SupabaseResult<AuthSession> {
        let response: TokenResponse = self
            .post(
                &self.endpoint.auth("/token?grant_type=refresh_token"),
                &json!({ "refresh_token": refresh_token }),
                None,
            )
            .await?;
        response.into_session(Utc::now())
    }

    /// Store the session and announce the identity it carries.
    fn install(&self, session: Option<AuthSession>) {
        let identity = session.as_ref().map(|s| s.user.clone());
        self.sessions.replace(session);
        // No receivers is fine.
        let _ = self.changes.send(identity);
    }

    fn authorize(&self, request: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
        request
            .header("apikey", &self.endpoint.anon_key)
            .bearer_auth(bearer.unwrap_or(self.endpoint.anon_key.as_str()))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> SupabaseResult<T> {
        let response = self
            .authorize(self.http.post(url), bearer)
            .json(body)
            .send()
            .await?;
        handle_response(response).await
    }
}

pub(crate) async fn handle_response<T: DeserializeOwned>(
    response: reqwest::Response,
) -> SupabaseResult<T> {
    let status = response.status();
    if status.is_success() {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|err| SupabaseError::Decode(err.to_string()))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(SupabaseError::from_response(status.as_u16(), &body))
    }
}

impl AccessTokenSource for GoTrueIdentityClient {
    fn access_token(&self) -> Option<String> {
        self.sessions.get().map(|s| s.access_token)
    }
}

#[async_trait]
impl IdentityClient for GoTrueIdentityClient {
    async fn get_session(&self) -> IdentityResult<Option<Identity>> {
        let Some(session) = self.sessions.get() else {
            return Ok(None);
        };
        if !session.is_expired(Utc::now()) {
            return Ok(Some(session.user));
        }

        debug!(identity_id = %session.user.id, "access token expired; refreshing");
        match self.refresh_grant(&session.refresh_token).await {
            Ok(fresh) => {
                let identity = fresh.user.clone();
                self.install(Some(fresh));
                Ok(Some(identity))
            }
            Err(SupabaseError::Api { status, message, .. }) if status < 500 => {
                warn!(status, %message, "refresh token rejected; dropping session");
                self.install(None);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        let session = self.password_grant(email, password).await?;
        let identity = session.user.clone();
        info!(identity_id = %identity.id, "provider sign-in");
        self.install(Some(session));
        Ok(identity)
    }

    #[instrument(skip(self, password, metadata))]
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> IdentityResult<Identity> {
        let body = json!({
            "email": email,
            "password": password,
            "data": { "full_name": metadata.full_name },
        });
        let response: serde_json::Value = self
            .post(&self.endpoint.auth("/signup"), &body, None)
            .await
            .map_err(|err| match IdentityError::from(err) {
                IdentityError::AlreadyRegistered(_) => {
                    IdentityError::AlreadyRegistered(email.to_string())
                }
                other => other,
            })?;

        // With auto-confirm the provider returns a full session; with email
        // confirmation it returns the bare user.
        if response.get("access_token").is_some() {
            let session = serde_json::from_value::<TokenResponse>(response)
                .map_err(|err| IdentityError::Unavailable(format!("bad sign-up response: {err}")))?
                .into_session(Utc::now())
                .map_err(IdentityError::from)?;
            let identity = session.user.clone();
            info!(identity_id = %identity.id, "provider sign-up with session");
            self.install(Some(session));
            return Ok(identity);
        }

        let user = response.get("user").cloned().unwrap_or(response);
        let identity = serde_json::from_value::<UserResponse>(user)
            .map_err(|err| IdentityError::Unavailable(format!("bad sign-up response: {err}")))?
            .into_identity();
        info!(identity_id = %identity.id, "provider sign-up pending confirmation");
        Ok(identity)
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        let Some(session) = self.sessions.get() else {
            debug!("no provider session to end");
            return Ok(());
        };

        let result = self
            .authorize(
                self.http.post(self.endpoint.auth("/logout")),
                Some(session.access_token.as_str()),
            )
            .send()
            .await;
        self.install(None);

        let response = result.map_err(SupabaseError::from)?;
        let status = response.status();
        // Token already invalid on the provider side.
        if status.is_success()
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::NOT_FOUND
        {
            info!("provider sign-out");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SupabaseError::from_response(status.as_u16(), &body).into())
    }

    fn session_changes(&self) -> SessionChanges {
        self.changes.subscribe()
    }
}
