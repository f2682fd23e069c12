//! Request validation applied at the HTTP edge, after JSON parsing and before
//! any handler logic runs.

use crate::api::{
    AppendHistoryRequest, CreateSessionRequest, LoginRequest, ProfileUpdate, RegisterRequest,
};

pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_CONTENT_LEN: usize = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("email address is not valid")]
    InvalidEmail,
}

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Lower-cases and trims an email so lookups are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn require(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing(field));
    }
    limit(field, value, max)
}

fn limit(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

fn check_email(email: &str) -> Result<(), ValidationError> {
    require("email", email, MAX_EMAIL_LEN)?;
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain))
            if !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace) =>
        {
            Ok(())
        }
        _ => Err(ValidationError::InvalidEmail),
    }
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        check_email(&self.email)?;
        if self.password.is_empty() {
            return Err(ValidationError::Missing("password"));
        }
        require("firstName", &self.first_name, MAX_NAME_LEN)?;
        require("lastName", &self.last_name, MAX_NAME_LEN)
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require("email", &self.email, MAX_EMAIL_LEN)?;
        if self.password.is_empty() {
            return Err(ValidationError::Missing("password"));
        }
        Ok(())
    }
}

impl Validate for ProfileUpdate {
    fn validate(&self) -> Result<(), ValidationError> {
        if let Some(first) = &self.first_name {
            require("firstName", first, MAX_NAME_LEN)?;
        }
        if let Some(last) = &self.last_name {
            require("lastName", last, MAX_NAME_LEN)?;
        }
        if let Some(mobile) = &self.mobile {
            limit("mobile", mobile, 32)?;
        }
        if let Some(group) = &self.blood_group {
            limit("bloodGroup", group, 8)?;
        }
        if let Some(notes) = &self.personal_notes {
            limit("personalNotes", notes, 10_000)?;
        }
        Ok(())
    }
}

/// Titles are never rejected: blank ones fall back to a default and long ones
/// are cut to `MAX_TITLE_LEN` when the session is created.
impl Validate for CreateSessionRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

impl Validate for AppendHistoryRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require("content", &self.content, MAX_CONTENT_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Role;

    fn register(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
        }
    }

    #[test]
    fn test_register_validation() {
        assert!(register("a@x.com", "pw1234").validate().is_ok());
        assert_eq!(
            register("", "pw1234").validate(),
            Err(ValidationError::Missing("email"))
        );
        assert_eq!(
            register("no-at-sign", "pw1234").validate(),
            Err(ValidationError::InvalidEmail)
        );
        assert!(register("a@x.com", "pw1").validate().is_ok());
        assert_eq!(
            register("a@x.com", "").validate(),
            Err(ValidationError::Missing("password"))
        );

        let mut req = register("a@x.com", "pw1234");
        req.last_name = "   ".to_string();
        assert_eq!(req.validate(), Err(ValidationError::Missing("lastName")));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  A@X.com "), "a@x.com");
    }

    #[test]
    fn test_profile_update_allows_clearing_optional_fields() {
        let update = ProfileUpdate {
            mobile: Some(String::new()),
            personal_notes: Some(String::new()),
            ..Default::default()
        };
        assert!(update.validate().is_ok());

        let update = ProfileUpdate {
            first_name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(update.validate(), Err(ValidationError::Missing("firstName")));
    }

    #[test]
    fn test_long_session_title_is_accepted() {
        let req = CreateSessionRequest {
            title: Some("x".repeat(MAX_TITLE_LEN + 1)),
        };
        assert!(req.validate().is_ok());
        assert!(CreateSessionRequest::default().validate().is_ok());
    }

    #[test]
    fn test_history_content_required() {
        let req = AppendHistoryRequest {
            role: Role::User,
            content: " ".to_string(),
            session_id: Some(1),
        };
        assert_eq!(req.validate(), Err(ValidationError::Missing("content")));
    }
}
