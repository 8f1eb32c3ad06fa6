//! Clinician profile records.
//!
//! A [`Profile`] is the application-level record linked one-to-one to an
//! [`Identity`](crate::Identity). It is only ever created explicitly, as the
//! second phase of sign-up or as the profile-completion retry.

use crate::{IdentityId, ProfileId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored clinician profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,

    /// Owning identity; unique across the table.
    #[serde(rename = "user_id")]
    pub identity_id: IdentityId,

    pub full_name: String,
    pub specialty: String,
    pub license_number: String,
    pub phone: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn belongs_to(&self, identity_id: &IdentityId) -> bool {
        &self.identity_id == identity_id
    }
}

/// Clinician details collected by the sign-up form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    pub full_name: String,
    pub specialty: String,
    pub license_number: String,
    pub phone: String,
}

impl ProfileFields {
    /// Field names paired with their values, in form order.
    pub fn named(&self) -> [(&'static str, &str); 4] {
        [
            ("full_name", self.full_name.as_str()),
            ("specialty", self.specialty.as_str()),
            ("license_number", self.license_number.as_str()),
            ("phone", self.phone.as_str()),
        ]
    }
}

/// Insert payload for the profile store. The store assigns `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProfile {
    #[serde(rename = "user_id")]
    pub identity_id: IdentityId,
    pub full_name: String,
    pub specialty: String,
    pub license_number: String,
    pub phone: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl NewProfile {
    pub fn new(identity_id: IdentityId, email: impl Into<String>, fields: ProfileFields) -> Self {
        Self {
            identity_id,
            full_name: fields.full_name,
            specialty: fields.specialty,
            license_number: fields.license_number,
            phone: fields.phone,
            email: email.into(),
            created_at: Utc::now(),
        }
    }

    /// Materialize the stored row once the store has assigned an id.
    pub fn into_profile(self, id: ProfileId) -> Profile {
        Profile {
            id,
            identity_id: self.identity_id,
            full_name: self.full_name,
            specialty: self.specialty,
            license_number: self.license_number,
            phone: self.phone,
            email: self.email,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> ProfileFields {
        ProfileFields {
            full_name: "Jane Doe".into(),
            specialty: "Cardiology".into(),
            license_number: "L123".into(),
            phone: "555-0100".into(),
        }
    }

    #[test]
    fn test_profile_uses_store_column_names() {
        let row = NewProfile::new(IdentityId::new("u-1"), "a@b.com", fields())
            .into_profile(ProfileId::new("p-1"));
        let json = serde_json::to_value(&row).unwrap();

        assert_eq!(json["user_id"], "u-1");
        assert_eq!(json["license_number"], "L123");
        assert!(json.get("identity_id").is_none());
    }

    #[test]
    fn test_new_profile_keeps_identity_link() {
        let identity = IdentityId::new("u-7");
        let profile = NewProfile::new(identity.clone(), "x@y.z", fields())
            .into_profile(ProfileId::generate());

        assert!(profile.belongs_to(&identity));
        assert!(!profile.belongs_to(&IdentityId::new("someone-else")));
        assert_eq!(profile.email, "x@y.z");
    }
}
