//! Context resolution.
//!
//! [`ContextResolver`] turns an identity into a [`ContextHandle`]. It is
//! read-only and safe to call concurrently; it never invents a label. A
//! failed resolution is an error, not a default context (fail-closed).

use std::fmt;
use std::os::fd::BorrowedFd;
use std::sync::Arc;

use seclabel_common::{SecError, SecResult};

use crate::backend::LabelBackend;
use crate::label::{ContextHandle, LabelOrigin};

/// An identity whose security context can be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// The calling process itself ("who am I labeled as").
    Current,
    /// A job user's login name.
    User(String),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => write!(f, "self"),
            Self::User(name) => write!(f, "user {name}"),
        }
    }
}

/// Resolves identities to context handles via the underlying MAC backend.
#[derive(Clone)]
pub struct ContextResolver {
    backend: Arc<dyn LabelBackend>,
}

impl ContextResolver {
    /// Create a resolver over a label backend.
    #[must_use]
    pub fn new(backend: Arc<dyn LabelBackend>) -> Self {
        Self { backend }
    }

    /// Resolve an identity to a context handle.
    ///
    /// # Errors
    ///
    /// Returns [`SecError::SubsystemDisabled`] when the MAC subsystem is
    /// not active on this host (what that means is daemon policy, see
    /// [`crate::config::DisabledPolicy`]), and a resolution error when the
    /// underlying query fails. A returned handle is always valid.
    pub fn resolve(&self, identity: &Identity) -> SecResult<ContextHandle> {
        if !self.backend.is_enabled() {
            return Err(SecError::SubsystemDisabled);
        }

        let (label, origin) = match identity {
            Identity::Current => (self.backend.current_label(), LabelOrigin::Daemon),
            Identity::User(name) => (self.backend.user_label(name), LabelOrigin::Job),
        };

        let label = label.map_err(|e| resolution_error(&identity.to_string(), e))?;
        tracing::debug!(%identity, %label, "Resolved security context");

        Ok(ContextHandle::resolved(label, origin))
    }

    /// Resolve the context of a connected network peer.
    ///
    /// Used by the RPC layer to authorize an inbound connection by its MAC
    /// label, in addition to any cryptographic identity.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::resolve`].
    pub fn resolve_peer(&self, conn: BorrowedFd<'_>) -> SecResult<ContextHandle> {
        if !self.backend.is_enabled() {
            return Err(SecError::SubsystemDisabled);
        }

        let label = self
            .backend
            .peer_label(conn)
            .map_err(|e| resolution_error("network peer", e))?;
        tracing::debug!(%label, "Resolved peer security context");

        Ok(ContextHandle::resolved(label, LabelOrigin::Peer))
    }
}

/// Keep resolution-level errors intact; wrap lower-level ones.
fn resolution_error(identity: &str, err: SecError) -> SecError {
    match err {
        SecError::Resolution { .. } | SecError::SubsystemDisabled => err,
        other => SecError::Resolution {
            identity: identity.to_string(),
            reason: other.to_string(),
        },
    }
}
