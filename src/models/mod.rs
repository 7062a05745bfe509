//! Data models for Libris

pub mod book;
pub mod user;

use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, AppResult, FieldError};

/// Checks that the `validator` derive rules cannot express
pub trait FieldChecks: Validate {
    fn extra_checks(&self, _errors: &mut Vec<FieldError>) {}
}

/// Run every validation rule of a request and collect the failures.
///
/// Pure: the same input always yields the same list, ordered by field name.
pub fn validate_fields<T: FieldChecks>(value: &T) -> Vec<FieldError> {
    let mut errors = Vec::new();

    if let Err(errs) = value.validate() {
        for (field, field_errors) in errs.field_errors() {
            for e in field_errors.iter() {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                errors.push(FieldError::new(field.to_string(), message));
            }
        }
    }
    value.extra_checks(&mut errors);

    errors.sort_by(|a, b| a.field.cmp(&b.field).then_with(|| a.message.cmp(&b.message)));
    errors.dedup();
    errors
}

/// Reject a request whose fields do not validate
pub fn ensure_valid<T: FieldChecks>(value: &T) -> AppResult<()> {
    let errors = validate_fields(value);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::InvalidFields(errors))
    }
}

pub(crate) fn check_not_blank(errors: &mut Vec<FieldError>, field: &str, value: &str, message: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, message));
    }
}

/// Paginated response wrapper
#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T>
where
    T: for<'a> ToSchema<'a>,
{
    /// Items of the requested page
    pub items: Vec<T>,
    /// Total number of items
    pub total: i64,
    /// Current page number (0-based)
    pub page: i64,
    /// Items per page
    pub size: i64,
}

impl FieldChecks for user::RegisterRequest {
    fn extra_checks(&self, errors: &mut Vec<FieldError>) {
        check_not_blank(errors, "username", &self.username, "Username is required");
        check_not_blank(errors, "password", &self.password, "Password is required");
        check_not_blank(errors, "email", &self.email, "Email is required");
    }
}

impl FieldChecks for user::LoginRequest {
    fn extra_checks(&self, errors: &mut Vec<FieldError>) {
        check_not_blank(errors, "username", &self.username, "Username is required");
        check_not_blank(errors, "password", &self.password, "Password is required");
    }
}
