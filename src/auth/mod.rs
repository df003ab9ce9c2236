//! Authentication binding
//!
//! Resolves the identity a request may act for. Only two sources are
//! trusted: the session's prior binding and the out-of-band channel handle.
//! Message text is never consulted.

pub mod pin;

use crate::directory::BankDirectory;
use crate::error::OrchestrationError;
use crate::models::{AuthenticatedIdentity, Session};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct AuthenticationBinder {
    directory: Arc<dyn BankDirectory>,
}

impl AuthenticationBinder {
    pub fn new(directory: Arc<dyn BankDirectory>) -> Self {
        Self { directory }
    }

    /// Resolve the identity for this request.
    ///
    /// The channel handle must always resolve. A session that is already
    /// bound only accepts a handle resolving to that same identity, so
    /// knowing a session key is not enough to act for its client. Fails with
    /// `Unauthenticated` when the handle is missing, unknown or belongs to
    /// someone else, `UpstreamUnavailable` when the lookup fails.
    pub async fn resolve(
        &self,
        session: &Session,
        handle: Option<&str>,
    ) -> Result<AuthenticatedIdentity> {
        let handle = handle.map(str::trim).filter(|h| !h.is_empty()).ok_or_else(|| {
            OrchestrationError::Unauthenticated("no channel identity supplied".to_string())
        })?;

        let identity = match self.directory.find_identity(handle).await? {
            Some(identity) => identity,
            None => {
                warn!(session_key = %session.key, "Handle not in scope for banking operations");
                return Err(OrchestrationError::Unauthenticated(
                    "not in scope for banking operations".to_string(),
                ));
            }
        };

        match &session.bound_identity {
            Some(bound) if bound != &identity => {
                warn!(session_key = %session.key, "Channel handle does not match session binding");
                Err(OrchestrationError::Unauthenticated(
                    "channel identity does not match session binding".to_string(),
                ))
            }
            Some(_) => {
                debug!(session_key = %session.key, "Session binding confirmed by channel handle");
                Ok(identity)
            }
            None => {
                info!(session_key = %session.key, "Channel handle resolved to client");
                Ok(identity)
            }
        }
    }
}
