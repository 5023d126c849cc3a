use account_auth::{SessionClaims, UNKNOWN_DEVICE};
use ticket_domain::UserId;

use crate::error::{ADMIN_REQUIRED, ServiceError};

/// The authenticated caller, as decoded from a session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Actor {
    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    #[must_use]
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }

    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.is_admin {
            Ok(())
        } else {
            Err(ServiceError::forbidden(ADMIN_REQUIRED))
        }
    }

    /// Owners and admins may see or touch a user's resources.
    pub fn require_owner_or_admin(&self, owner: UserId) -> Result<(), ServiceError> {
        if self.is_admin || self.user_id == owner {
            Ok(())
        } else {
            Err(ServiceError::forbidden(
                "You are not allowed to access this resource",
            ))
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        self.user_id.to_string()
    }
}

impl From<&SessionClaims> for Actor {
    fn from(claims: &SessionClaims) -> Self {
        Self {
            user_id: claims.id,
            is_admin: claims.is_admin,
        }
    }
}

/// Request metadata the account flows need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub device: String,
    pub ip: Option<String>,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            device: UNKNOWN_DEVICE.to_string(),
            ip: None,
        }
    }
}

impl ClientInfo {
    #[must_use]
    pub fn new(device: impl Into<String>, ip: Option<String>) -> Self {
        Self {
            device: device.into(),
            ip,
        }
    }
}
