//! Role-based authorization

use crate::{
    error::{AppError, AppResult},
    models::user::{Principal, Role},
};

pub const AUTHENTICATION_REQUIRED: &str = "Authentication required";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

/// Each protected route requires exactly one role.
pub fn authorize(principal: Option<&Principal>, required: Role) -> Decision {
    match principal {
        Some(p) if p.role == required => Decision::Allow,
        _ => Decision::Deny,
    }
}

/// Like [`authorize`], but distinguishes "who are you?" (401) from
/// "not allowed" (403) for the HTTP layer.
pub fn require(principal: Option<&Principal>, required: Role) -> AppResult<&Principal> {
    let Some(p) = principal else {
        return Err(AppError::Authentication(AUTHENTICATION_REQUIRED.to_string()));
    };

    match authorize(Some(p), required) {
        Decision::Allow => Ok(p),
        Decision::Deny => Err(AppError::Authorization(format!("{} role required", required))),
    }
}
