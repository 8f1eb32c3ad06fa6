//! SmartCare Types - Core data model for the clinician session layer
//!
//! These types are shared by the session manager, the hosted-backend
//! adapters and the operator CLI.
//!
//! ## Key Concepts
//!
//! - **Identity**: credential-backed principal issued by the auth provider
//! - **Profile**: clinician record, linked one-to-one to an identity
//! - **SessionState**: the reconciled view of identity + profile that the
//!   rest of the application renders from
//!
//! Wire names follow the hosted store's column names (`user_id`,
//! `full_name`, `license_number`, ...), so the same structs are used for
//! REST payloads and in-memory state.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

pub mod identity;
pub mod ids;
pub mod profile;
pub mod state;

pub use identity::{Identity, SignUpMetadata};
pub use ids::{IdentityId, ProfileId};
pub use profile::{NewProfile, Profile, ProfileFields};
pub use state::{ProfileMismatch, SessionState, SessionStatus};
