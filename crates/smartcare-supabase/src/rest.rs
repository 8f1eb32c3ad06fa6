//! Profile store over the hosted REST interface.

use crate::auth::{handle_response, AccessTokenSource};
use crate::config::{Endpoint, SupabaseConfig};
use crate::error::{SupabaseError, SupabaseResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use smartcare_session::{ProfileStore, StoreError, StoreResult};
use smartcare_types::{IdentityId, NewProfile, Profile};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Reads and writes clinician rows in the profile table.
///
/// Requests carry the signed-in user's access token when a token source is
/// attached so row-level policies see the right user; otherwise the anon
/// key is used as the bearer.
pub struct PostgrestProfileStore {
    http: Client,
    endpoint: Endpoint,
    table: String,
    tokens: Option<Arc<dyn AccessTokenSource>>,
}

impl PostgrestProfileStore {
    pub fn new(config: &SupabaseConfig) -> SupabaseResult<Self> {
        let endpoint = config.endpoint()?;
        let http = Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self {
            http,
            endpoint,
            table: config.profile_table.trim().to_string(),
            tokens: None,
        })
    }

    pub fn with_tokens(mut self, tokens: Arc<dyn AccessTokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .tokens
            .as_ref()
            .and_then(|source| source.access_token())
            .unwrap_or_else(|| self.endpoint.anon_key.clone());
        request
            .header("apikey", &self.endpoint.anon_key)
            .bearer_auth(bearer)
    }

    async fn select_by_identity(&self, identity_id: &IdentityId) -> SupabaseResult<Vec<Profile>> {
        let request = self.http.get(self.endpoint.rest(&self.table)).query(&[
            ("user_id", format!("eq.{identity_id}")),
            ("select", "*".to_string()),
            ("limit", "1".to_string()),
        ]);
        let response = self.authorize(request).send().await?;
        handle_response(response).await
    }

    async fn insert(&self, record: &NewProfile) -> SupabaseResult<Vec<Profile>> {
        let request = self
            .http
            .post(self.endpoint.rest(&self.table))
            .header("Prefer", "return=representation")
            .json(record);
        let response = self.authorize(request).send().await?;
        handle_response(response).await
    }
}

#[async_trait]
impl ProfileStore for PostgrestProfileStore {
    #[instrument(skip(self))]
    async fn find_profile_by_identity(
        &self,
        identity_id: &IdentityId,
    ) -> StoreResult<Option<Profile>> {
        let rows = self.select_by_identity(identity_id).await?;
        debug!(rows = rows.len(), "profile lookup");
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self, record), fields(identity_id = %record.identity_id))]
    async fn insert_profile(&self, record: NewProfile) -> StoreResult<Profile> {
        let rows = self.insert(&record).await?;
        rows.into_iter().next().ok_or_else(|| {
            StoreError::from(SupabaseError::Decode(
                "insert returned no representation".into(),
            ))
        })
    }
}
