//! Common error types for the seclabel subsystem.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`SecError`].
pub type SecResult<T> = Result<T, SecError>;

/// Errors surfaced by the security-context subsystem.
///
/// The taxonomy matters to callers: resolution failures and transition
/// failures are fatal to the launch attempt they occur in (fail-closed,
/// never retried automatically), while session-state errors indicate a
/// caller bug in the open/close protocol.
#[derive(Error, Diagnostic, Debug)]
pub enum SecError {
    /// The MAC subsystem could not produce a label for an identity.
    #[error("Could not resolve security context for {identity}: {reason}")]
    #[diagnostic(
        code(seclabel::resolve::failed),
        help("Check that the identity is known to the MAC policy and that the policy permits the lookup")
    )]
    Resolution {
        /// The identity whose resolution failed.
        identity: String,
        /// Why the underlying query failed.
        reason: String,
    },

    /// The MAC subsystem is not enabled on this host.
    ///
    /// Distinct from a resolution failure: whether a disabled subsystem
    /// means "deny" or "run unlabeled by design" is daemon policy, decided
    /// by the caller, never guessed here.
    #[error("MAC subsystem is disabled on this host")]
    #[diagnostic(code(seclabel::resolve::disabled))]
    SubsystemDisabled,

    /// A label could not be applied to a target.
    #[error("Could not apply security label to {target}: {reason}")]
    #[diagnostic(code(seclabel::transition::failed))]
    Transition {
        /// The target kind the label was being applied to.
        target: String,
        /// Why the underlying call failed.
        reason: String,
    },

    /// An operation was attempted on a closed session.
    #[error("Security session {id} is closed")]
    #[diagnostic(
        code(seclabel::session::closed),
        help("This is a caller bug: no operation is valid on a session after close")
    )]
    SessionClosed {
        /// The closed session's identifier.
        id: String,
    },

    /// A session was opened while another is still active.
    #[error("Security session {current} is still open; refusing to nest")]
    #[diagnostic(
        code(seclabel::session::already_open),
        help("The process-global label is single-writer: close the active session before opening another")
    )]
    SessionAlreadyOpen {
        /// The identifier of the session currently holding the slot.
        current: String,
    },

    /// A transition was requested with an invalid context handle.
    #[error("Context handle (origin: {origin}) does not carry a resolved label")]
    #[diagnostic(code(seclabel::handle::invalid))]
    InvalidHandle {
        /// Where the invalid handle came from.
        origin: String,
    },

    /// A raw label token failed validation.
    #[error("Invalid security label: {value:?}")]
    #[diagnostic(
        code(seclabel::label::invalid),
        help("Labels must be non-empty and must not contain NUL bytes")
    )]
    InvalidLabel {
        /// The rejected value.
        value: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(seclabel::io))]
    Io(#[from] std::io::Error),

    /// Feature not supported on this platform or filesystem.
    #[error("Feature not supported: {feature}")]
    #[diagnostic(
        code(seclabel::unsupported),
        help("This feature requires a Linux host with an SELinux-capable filesystem")
    )]
    Unsupported {
        /// The unsupported feature.
        feature: String,
    },
}

impl SecError {
    /// Whether this error is fatal to a job-launch attempt.
    ///
    /// Resolution and transition failures must abort the launch rather than
    /// fall back to an unlabeled job.
    #[must_use]
    pub fn is_fatal_to_launch(&self) -> bool {
        matches!(
            self,
            Self::Resolution { .. }
                | Self::Transition { .. }
                | Self::InvalidHandle { .. }
                | Self::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SecError::Resolution {
            identity: "jobUser123".to_string(),
            reason: "unknown seuser".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Could not resolve security context for jobUser123: unknown seuser"
        );
    }

    #[test]
    fn transition_names_target() {
        let err = SecError::Transition {
            target: "file descriptor".to_string(),
            reason: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("file descriptor"));
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such attr");
        let err: SecError = io_err.into();
        assert!(matches!(err, SecError::Io(_)));
    }

    #[test]
    fn launch_fatality() {
        assert!(
            SecError::Transition {
                target: "next exec".to_string(),
                reason: "denied".to_string(),
            }
            .is_fatal_to_launch()
        );
        assert!(!SecError::SubsystemDisabled.is_fatal_to_launch());
        assert!(
            !SecError::SessionClosed {
                id: "abc".to_string()
            }
            .is_fatal_to_launch()
        );
    }
}
