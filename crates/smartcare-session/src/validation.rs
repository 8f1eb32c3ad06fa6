//! Local input checks run before any call to the identity provider or the
//! profile store.

use crate::error::ValidationError;
use smartcare_types::ProfileFields;

/// Sign-up form input.
#[derive(Clone, Default)]
pub struct SignUpRequest {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub profile: ProfileFields,
}

impl SignUpRequest {
    /// Check presence of every field, password confirmation and length.
    ///
    /// Order matches the sign-up form: missing fields first, then mismatch,
    /// then length.
    pub fn validate(&self, min_password_length: usize) -> Result<(), ValidationError> {
        require("email", &self.email)?;
        require("password", &self.password)?;
        require("confirm_password", &self.confirm_password)?;
        validate_profile_fields(&self.profile)?;

        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        if self.password.chars().count() < min_password_length {
            return Err(ValidationError::PasswordTooShort {
                min: min_password_length,
            });
        }
        Ok(())
    }
}

// Passwords stay out of logs.
impl std::fmt::Debug for SignUpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignUpRequest")
            .field("email", &self.email)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

/// Sign-in requires both credentials.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
    require("email", email)?;
    require("password", password)
}

/// All clinician fields are mandatory.
pub fn validate_profile_fields(fields: &ProfileFields) -> Result<(), ValidationError> {
    for (name, value) in fields.named() {
        require(name, value)?;
    }
    Ok(())
}

fn require(name: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(name))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> SignUpRequest {
        SignUpRequest {
            email: "a@b.com".into(),
            password: "secret1".into(),
            confirm_password: "secret1".into(),
            profile: ProfileFields {
                full_name: "Jane Doe".into(),
                specialty: "Cardiology".into(),
                license_number: "L123".into(),
                phone: "555-0100".into(),
            },
        }
    }

    #[test]
    fn test_complete_request_passes() {
        assert_eq!(request().validate(6), Ok(()));
    }

    #[test]
    fn test_missing_profile_field() {
        let mut req = request();
        req.profile.license_number = "   ".into();
        assert_eq!(
            req.validate(6),
            Err(ValidationError::MissingField("license_number"))
        );
    }

    #[test]
    fn test_password_mismatch_reported_before_length() {
        let mut req = request();
        req.password = "abc".into();
        req.confirm_password = "abd".into();
        assert_eq!(req.validate(6), Err(ValidationError::PasswordMismatch));
    }

    #[test]
    fn test_short_password() {
        let mut req = request();
        req.password = "abc".into();
        req.confirm_password = "abc".into();
        assert_eq!(
            req.validate(6),
            Err(ValidationError::PasswordTooShort { min: 6 })
        );
    }

    #[test]
    fn test_credentials() {
        assert!(validate_credentials("a@b.com", "pw").is_ok());
        assert_eq!(
            validate_credentials("", "pw"),
            Err(ValidationError::MissingField("email"))
        );
        assert_eq!(
            validate_credentials("a@b.com", ""),
            Err(ValidationError::MissingField("password"))
        );
    }
}
