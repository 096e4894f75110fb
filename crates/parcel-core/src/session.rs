//! Caller session supplied by the identity layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// Role of the authenticated caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    /// Elevated role; may publish public records.
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Invalid role: {}. Must be one of: user, admin", other)),
        }
    }
}

/// Bearer credentials of the caller, used only for calls to the metadata service.
#[derive(Clone)]
pub struct Session {
    token: String,
    role: Role,
    expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("role", &self.role)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Session {
    pub fn new(token: impl Into<String>, role: Role) -> Self {
        Self {
            token: token.into(),
            role,
            expires_at: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the caller may choose public visibility.
    pub fn can_publish(&self) -> bool {
        self.role == Role::Admin
    }

    /// Checks that the session can authorize a batch at `now`.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), BatchError> {
        if self.token.trim().is_empty() {
            return Err(BatchError::InvalidSession(
                "no access token; sign in before uploading".to_string(),
            ));
        }
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(BatchError::InvalidSession(format!(
                    "session expired at {}",
                    expires_at.to_rfc3339()
                )));
            }
        }
        Ok(())
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.check(now).is_ok()
    }
}
