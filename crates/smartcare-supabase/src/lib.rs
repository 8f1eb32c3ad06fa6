//! # SmartCare Supabase - hosted backend adapters
//!
//! Implements the session manager's collaborator seams against the hosted
//! backend:
//!
//! - [`GoTrueIdentityClient`]: password sign-in, sign-up with user metadata,
//!   sign-out, session cache with refresh and optional persistence, change
//!   broadcasts
//! - [`PostgrestProfileStore`]: lookup and insert on the profile table
//!
//! Both require a project URL and anon key; without them construction fails
//! with [`SupabaseError::NotConfigured`].

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod auth;
mod config;
mod error;
mod rest;
mod session;

pub use auth::{AccessTokenSource, GoTrueIdentityClient};
pub use config::{Endpoint, SupabaseConfig};
pub use error::{SupabaseError, SupabaseResult};
pub use rest::PostgrestProfileStore;
pub use session::AuthSession;

use std::sync::Arc;

/// Build both adapters, with profile requests authorized by the identity
/// client's current session.
pub fn connect(
    config: &SupabaseConfig,
) -> SupabaseResult<(Arc<GoTrueIdentityClient>, Arc<PostgrestProfileStore>)> {
    let identity = Arc::new(GoTrueIdentityClient::new(config)?);
    let profiles = PostgrestProfileStore::new(config)?.with_tokens(identity.clone());
    Ok((identity, Arc::new(profiles)))
}
