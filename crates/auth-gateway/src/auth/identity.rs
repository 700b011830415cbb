//! Binding verified subjects to local users.
//!
//! The subject of a validated token is an opaque key into a [`UserLookup`]
//! supplied by the surrounding system. An unknown subject is a hard failure;
//! users are never provisioned here and identities are never cached.

use crate::auth::claims::Claims;
use crate::errors::IdentityError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::instrument;

/// A user record as returned by the persistence layer.
#[derive(Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl UserRecord {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            email: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("user_id", &"[REDACTED]")
            .field("display_name", &self.display_name)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// The user store could not answer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct LookupError(pub String);

/// Async user lookup by token subject.
///
/// `Ok(None)` means the subject is unknown; `Err` means the store failed.
#[async_trait]
pub trait UserLookup: Send + Sync {
    async fn lookup_user(&self, subject: &str) -> Result<Option<UserRecord>, LookupError>;
}

/// Fixed in-memory user table, keyed by subject.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserLookup {
    users: HashMap<String, UserRecord>,
}

impl InMemoryUserLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `record` under `subject`.
    #[must_use]
    pub fn with_user(mut self, subject: impl Into<String>, record: UserRecord) -> Self {
        self.users.insert(subject.into(), record);
        self
    }
}

#[async_trait]
impl UserLookup for InMemoryUserLookup {
    async fn lookup_user(&self, subject: &str) -> Result<Option<UserRecord>, LookupError> {
        Ok(self.users.get(subject).cloned())
    }
}

/// An authenticated local user.
///
/// Only [`IdentityBinder::bind`] creates one.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: String,
    display_name: Option<String>,
    email: Option<String>,
}

impl Identity {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub(crate) fn from_record(record: UserRecord) -> Self {
        Self {
            user_id: record.user_id,
            display_name: record.display_name,
            email: record.email,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &"[REDACTED]")
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Maps validated claims to a local [`Identity`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityBinder;

impl IdentityBinder {
    /// Look up the user named by `claims`' subject.
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if the lookup has no such user
    /// - `LookupFailed` if the lookup itself failed
    #[instrument(skip_all)]
    pub async fn bind(
        &self,
        claims: &Claims,
        lookup: &dyn UserLookup,
    ) -> Result<Identity, IdentityError> {
        match lookup.lookup_user(claims.subject()).await {
            Ok(Some(record)) => {
                tracing::debug!(target: "gateway.auth.identity", "Subject bound to local user");
                Ok(Identity::from_record(record))
            }
            Ok(None) => {
                tracing::debug!(target: "gateway.auth.identity", "No local user for subject");
                Err(IdentityError::UserNotFound)
            }
            Err(e) => {
                tracing::warn!(target: "gateway.auth.identity", error = %e, "User lookup failed");
                Err(IdentityError::LookupFailed(e.0))
            }
        }
    }
}
