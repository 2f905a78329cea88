//! Security labels and context handles.
//!
//! A [`SecurityLabel`] is the raw MAC token (e.g. an SELinux context
//! string). It is opaque to this subsystem: nothing here interprets its
//! components, only the underlying MAC implementation does. A
//! [`ContextHandle`] wraps one label with the metadata needed to apply and
//! release it safely.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use seclabel_common::{SecError, SecResult};

/// An opaque, immutable MAC label token.
///
/// Labels are never mutated in place; a different label is always a new
/// value. Validation only rejects what no MAC subsystem accepts: empty
/// tokens and interior NUL bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecurityLabel(String);

impl SecurityLabel {
    /// Parse a raw label token.
    ///
    /// Trailing newlines and NUL bytes are stripped; the kernel appends
    /// them to values read from attr files and xattrs.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or contains an interior NUL.
    pub fn parse(raw: impl AsRef<str>) -> SecResult<Self> {
        let trimmed = raw.as_ref().trim_end_matches(['\n', '\0']);

        if trimmed.is_empty() || trimmed.contains('\0') {
            return Err(SecError::InvalidLabel {
                value: raw.as_ref().to_string(),
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Parse a raw label value read from the kernel.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not UTF-8 or fail label
    /// validation.
    pub fn from_kernel_bytes(bytes: &[u8]) -> SecResult<Self> {
        let s = std::str::from_utf8(bytes).map_err(|_| SecError::InvalidLabel {
            value: String::from_utf8_lossy(bytes).into_owned(),
        })?;
        Self::parse(s)
    }

    /// Get the label as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the label as bytes, without a trailing NUL.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for SecurityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SecurityLabel {
    type Err = SecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for SecurityLabel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Where a context handle's label was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelOrigin {
    /// The daemon's own context (`resolve(self)`).
    Daemon,
    /// A job identity's context.
    Job,
    /// The context of a connected network peer.
    Peer,
}

impl fmt::Display for LabelOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daemon => write!(f, "daemon"),
            Self::Job => write!(f, "job"),
            Self::Peer => write!(f, "peer"),
        }
    }
}

/// An owned security label plus the metadata needed to apply it safely.
///
/// Handles are immutable once constructed. A valid handle only exists if
/// the underlying resolution actually succeeded; the invalid form is a
/// placeholder a daemon may carry when its policy allowed skipping
/// resolution (disabled MAC subsystem), and every transition rejects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextHandle {
    label: Option<SecurityLabel>,
    origin: LabelOrigin,
}

impl ContextHandle {
    /// Create a handle for a successfully resolved label.
    #[must_use]
    pub fn resolved(label: SecurityLabel, origin: LabelOrigin) -> Self {
        Self {
            label: Some(label),
            origin,
        }
    }

    /// Create a placeholder handle carrying no label.
    #[must_use]
    pub fn invalid(origin: LabelOrigin) -> Self {
        Self {
            label: None,
            origin,
        }
    }

    /// Whether this handle carries a successfully resolved label.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.label.is_some()
    }

    /// Where this handle's label was resolved from.
    #[must_use]
    pub fn origin(&self) -> LabelOrigin {
        self.origin
    }

    /// The label payload, if resolution succeeded.
    #[must_use]
    pub fn label(&self) -> Option<&SecurityLabel> {
        self.label.as_ref()
    }

    /// The label payload, or an error for an invalid handle.
    ///
    /// # Errors
    ///
    /// Returns [`SecError::InvalidHandle`] if this handle carries no label.
    pub fn require_label(&self) -> SecResult<&SecurityLabel> {
        self.label.as_ref().ok_or_else(|| SecError::InvalidHandle {
            origin: self.origin.to_string(),
        })
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{} ({})", label, self.origin),
            None => write!(f, "<unresolved> ({})", self.origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_strips_kernel_terminators() {
        let label = SecurityLabel::parse("system_u:system_r:sched_t:s0\n").unwrap();
        assert_eq!(label.as_str(), "system_u:system_r:sched_t:s0");

        let label = SecurityLabel::from_kernel_bytes(b"system_u:object_r:job_t:s0\0").unwrap();
        assert_eq!(label.as_str(), "system_u:object_r:job_t:s0");
    }

    #[test]
    fn parse_rejects_empty_and_nul() {
        assert!(SecurityLabel::parse("").is_err());
        assert!(SecurityLabel::parse("\n").is_err());
        assert!(SecurityLabel::parse("bad\0middle").is_err());
    }

    #[test]
    fn handle_validity() {
        let label = SecurityLabel::parse("system_u:system_r:job_t:s0").unwrap();
        let handle = ContextHandle::resolved(label.clone(), LabelOrigin::Job);
        assert!(handle.is_valid());
        assert_eq!(handle.require_label().unwrap(), &label);

        let placeholder = ContextHandle::invalid(LabelOrigin::Job);
        assert!(!placeholder.is_valid());
        assert!(matches!(
            placeholder.require_label(),
            Err(SecError::InvalidHandle { .. })
        ));
    }

    proptest! {
        #[test]
        fn parse_roundtrips_clean_tokens(token in "[a-z_][a-z0-9_:.-]{0,120}") {
            let label = SecurityLabel::parse(&token).unwrap();
            prop_assert_eq!(label.as_str(), token.as_str());
            prop_assert_eq!(SecurityLabel::parse(label.as_str()).unwrap(), label);
        }
    }
}
