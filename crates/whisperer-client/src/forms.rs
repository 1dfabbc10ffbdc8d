//! Login and registration forms.
//!
//! Forms are validated locally before any request is made so that the user
//! gets field-level feedback without a round-trip.

use serde::Serialize;
use validator::{Validate, ValidationErrors};

use crate::ClientResult;
use crate::error::{ClientError, FieldErrors};

/// Email/password login.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct LoginForm {
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_string(),
            password: password.into(),
        }
    }

    /// Validates the form, returning per-field messages on failure.
    pub fn check(&self) -> ClientResult<()> {
        self.validate().map_err(into_client_error)
    }
}

/// New account registration.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct RegisterForm {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(
        length(min = 1, message = "Email is required"),
        email(message = "Email is invalid")
    )]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

impl RegisterForm {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into().trim().to_string(),
            email: email.into().trim().to_string(),
            password: password.into(),
        }
    }

    pub fn check(&self) -> ClientResult<()> {
        self.validate().map_err(into_client_error)
    }
}

fn into_client_error(errors: ValidationErrors) -> ClientError {
    let mut fields = FieldErrors::new();
    for (field, errs) in errors.field_errors() {
        for err in errs {
            let message = err
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("{field} is invalid"));
            fields.insert(field.to_string(), message);
        }
    }
    ClientError::InvalidForm(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(err: ClientError) -> FieldErrors {
        match err {
            ClientError::InvalidForm(fields) => fields,
            other => panic!("expected InvalidForm, got {other:?}"),
        }
    }

    #[test]
    fn test_login_form_valid() {
        LoginForm::new("  ada@uni.example ", "hunter22").check().unwrap();
    }

    #[test]
    fn test_login_form_requires_both_fields() {
        let errs = fields(LoginForm::new("   ", "").check().unwrap_err());
        assert!(errs.get("email").is_some());
        assert_eq!(errs.get("password"), Some("Password is required"));
    }

    #[test]
    fn test_login_form_rejects_malformed_email() {
        let errs = fields(LoginForm::new("ada", "pw").check().unwrap_err());
        assert_eq!(errs.get("email"), Some("Email is invalid"));
        assert_eq!(errs.get("password"), None);
    }

    #[test]
    fn test_register_form_password_length() {
        let errs = fields(
            RegisterForm::new("Ada", "ada@uni.example", "short")
                .check()
                .unwrap_err(),
        );
        assert_eq!(
            errs.get("password"),
            Some("Password must be at least 8 characters")
        );
        RegisterForm::new("Ada", "ada@uni.example", "long enough")
            .check()
            .unwrap();
    }
}
