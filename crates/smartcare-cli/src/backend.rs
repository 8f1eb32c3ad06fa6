//! Collaborator wiring for the selected backend

use crate::config::{AppConfig, BackendKind};
use anyhow::Context;
use smartcare_session::memory::{InMemoryIdentityClient, InMemoryProfileStore};
use smartcare_session::{IdentityClient, ProfileStore};
use smartcare_types::{NewProfile, ProfileFields, ProfileId};
use std::sync::Arc;
use tracing::info;

pub const DEMO_EMAIL: &str = "demo@smartcare.test";
pub const DEMO_PASSWORD: &str = "demo123";

/// The two collaborators the session manager is built over.
pub struct Backend {
    pub identity: Arc<dyn IdentityClient>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl Backend {
    pub fn build(config: &AppConfig) -> anyhow::Result<Self> {
        match config.backend {
            BackendKind::Memory => Ok(Self::memory(config.memory.seed_demo)),
            BackendKind::Supabase => {
                let (identity, profiles) = smartcare_supabase::connect(&config.supabase)
                    .context("failed to set up the supabase backend")?;
                info!(table = %config.supabase.profile_table, "using supabase backend");
                Ok(Self { identity, profiles })
            }
        }
    }

    fn memory(seed_demo: bool) -> Self {
        let identity = Arc::new(InMemoryIdentityClient::new().with_auth_events());
        let profiles = Arc::new(InMemoryProfileStore::new());

        if seed_demo {
            let demo = identity.register(DEMO_EMAIL, DEMO_PASSWORD, "Dana Demo");
            let fields = ProfileFields {
                full_name: "Dana Demo".into(),
                specialty: "General Practice".into(),
                license_number: "DEMO-0001".into(),
                phone: "555-0100".into(),
            };
            profiles.seed(
                NewProfile::new(demo.id.clone(), DEMO_EMAIL, fields)
                    .into_profile(ProfileId::generate()),
            );
            info!(email = DEMO_EMAIL, "seeded demo clinician");
        }

        Self { identity, profiles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_seeds_demo_clinician() {
        let backend = Backend::build(&AppConfig::default()).unwrap();
        let identity = backend
            .identity
            .sign_in(DEMO_EMAIL, DEMO_PASSWORD)
            .await
            .unwrap();
        let profile = backend
            .profiles
            .find_profile_by_identity(&identity.id)
            .await
            .unwrap();
        assert!(profile.is_some());
    }

    #[test]
    fn test_unconfigured_supabase_backend_fails() {
        let config = AppConfig {
            backend: BackendKind::Supabase,
            ..AppConfig::default()
        };
        let err = Backend::build(&config).err().unwrap();
        assert!(format!("{err:#}").contains("not configured"));
    }
}
