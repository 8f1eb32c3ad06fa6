//! # SmartCare Session - Identity & Profile Session Manager
//!
//! Reconciles the identity issued by the hosted auth provider with the
//! clinician's profile record and publishes the combined
//! [`SessionState`](smartcare_types::SessionState) to the rest of the
//! dashboard.
//!
//! ## Architectural Boundaries
//!
//! - **Identity provider** owns credentials, tokens and its session cache
//! - **Profile store** owns durable profile rows
//! - **smartcare-session** owns the reconciled state and is the only caller
//!   into both collaborators
//!
//! ## Key Components
//!
//! - [`SessionManager`]: state machine, sign-in/sign-up/sign-out, change
//!   notification handling
//! - [`StateChannel`]: owned state plus callback and watch subscribers
//! - [`gate`]: pure access decisions for public and protected views
//! - [`IdentityClient`] / [`ProfileStore`]: collaborator seams
//! - [`memory`]: in-memory collaborators for tests and local runs
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use smartcare_session::{
//!     memory::{InMemoryIdentityClient, InMemoryProfileStore},
//!     SessionConfig, SessionManager,
//! };
//!
//! # async fn example() {
//! let identity = Arc::new(InMemoryIdentityClient::new());
//! identity.register("a@b.com", "secret1", "Jane Doe");
//! let profiles = Arc::new(InMemoryProfileStore::new());
//!
//! let manager = SessionManager::start(identity, profiles, SessionConfig::default()).await;
//! let _sub = manager.subscribe(|state| println!("session is now {}", state.status()));
//!
//! manager.sign_in("a@b.com", "secret1").await.unwrap();
//! manager.shutdown().await;
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod channel;
pub mod config;
mod error;
pub mod gate;
mod manager;
pub mod memory;
mod signup;
mod traits;
pub mod validation;

pub use channel::{StateChannel, Subscription};
pub use config::{LookupFailurePolicy, SessionConfig};
pub use error::{
    IdentityError, IdentityResult, SessionError, SessionResult, StoreError, StoreResult,
    ValidationError,
};
pub use gate::{Access, GateDecision, Route, ViewKind};
pub use manager::SessionManager;
pub use traits::{IdentityClient, ProfileStore, SessionChanges};
pub use validation::SignUpRequest;
