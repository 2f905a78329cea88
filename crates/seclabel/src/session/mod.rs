//! Security sessions.
//!
//! A [`Session`] bounds the lifetime during which one job's security label
//! may be active for this execution context. The [`SessionManager`] owns
//! the open/close protocol and the single active-session slot.

mod manager;

pub use manager::SessionManager;

use std::sync::Arc;

use parking_lot::Mutex;

use seclabel_common::{SecError, SecResult, SessionId};

use crate::backend::LabelBackend;
use crate::label::{ContextHandle, SecurityLabel};
use crate::resolver::Identity;

/// Shared record of which session currently owns the process-global label
/// state.
pub(crate) type ActiveSlot = Arc<Mutex<Option<SessionId>>>;

/// Session lifecycle state.
///
/// `Open { applied: false } → Open { applied: true }` via a transition,
/// back via revert (repeatable), and `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The session is open; `applied` records whether a process-global
    /// label transition is currently in effect.
    Open {
        /// Whether the job context is applied for this execution context.
        applied: bool,
    },
    /// The session is closed. No operation is valid anymore.
    Closed,
}

/// The security-relevant lifetime of one job.
///
/// Owns the context handles resolved for the job and the restore label
/// captured at open time. Dropping a session closes it: revert-and-release
/// runs on every exit path, including early error returns in the launch
/// path.
pub struct Session {
    id: SessionId,
    identity: Identity,
    restore: SecurityLabel,
    exec_handle: ContextHandle,
    file_handle: Option<ContextHandle>,
    state: SessionState,
    backend: Arc<dyn LabelBackend>,
    slot: ActiveSlot,
}

impl Session {
    pub(crate) fn new(
        identity: Identity,
        restore: SecurityLabel,
        exec_handle: ContextHandle,
        backend: Arc<dyn LabelBackend>,
        slot: ActiveSlot,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            identity,
            restore,
            exec_handle,
            file_handle: None,
            state: SessionState::Open { applied: false },
            backend,
            slot,
        }
    }

    /// The session identifier.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The identity this session was opened for.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The daemon context captured at open time, restored on close/revert.
    #[must_use]
    pub fn restore_label(&self) -> &SecurityLabel {
        &self.restore
    }

    /// The handle for the job's process-exec label.
    #[must_use]
    pub fn exec_handle(&self) -> &ContextHandle {
        &self.exec_handle
    }

    /// The handle for the job's file-creation label, if one was adopted.
    #[must_use]
    pub fn file_handle(&self) -> Option<&ContextHandle> {
        self.file_handle.as_ref()
    }

    /// Adopt a separately resolved handle for the job's file-creation
    /// label (it may differ from the exec label).
    ///
    /// # Errors
    ///
    /// Returns [`SecError::SessionClosed`] on a closed session.
    pub fn adopt_file_handle(&mut self, handle: ContextHandle) -> SecResult<()> {
        self.ensure_open()?;
        self.file_handle = Some(handle);
        Ok(())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// Whether a process-global label transition is currently in effect.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        matches!(self.state, SessionState::Open { applied: true })
    }

    /// Error unless the session is open.
    pub(crate) fn ensure_open(&self) -> SecResult<()> {
        if self.is_closed() {
            return Err(SecError::SessionClosed {
                id: self.id.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn mark_applied(&mut self) {
        if !self.is_closed() {
            self.state = SessionState::Open { applied: true };
        }
    }

    /// Restore the daemon's context without closing the session.
    pub(crate) fn revert_inner(&mut self) -> SecResult<()> {
        self.ensure_open()?;
        self.restore_global_state()?;
        self.state = SessionState::Open { applied: false };

        tracing::debug!(session = %self.id, "Reverted to daemon context");
        Ok(())
    }

    /// Close the session. Idempotent; always frees the active slot and
    /// marks the session closed, even when a restore step fails.
    pub(crate) fn close_inner(&mut self) -> SecResult<()> {
        if self.is_closed() {
            return Ok(());
        }

        let result = self.restore_global_state();

        self.state = SessionState::Closed;
        self.file_handle = None;

        let mut slot = self.slot.lock();
        if slot.as_ref() == Some(&self.id) {
            *slot = None;
        }
        drop(slot);

        tracing::debug!(session = %self.id, identity = %self.identity, "Closed security session");
        result
    }

    /// Clear exec staging and the creation-label override, and restore the
    /// thread's own label if it diverged from the restore point. Attempts
    /// every step and reports the first failure.
    fn restore_global_state(&mut self) -> SecResult<()> {
        let mut first_err = None;

        if let Err(e) = self.backend.set_exec_label(None) {
            first_err.get_or_insert(e);
        }
        if let Err(e) = self.backend.set_create_label(None) {
            first_err.get_or_insert(e);
        }

        // Transitions only stage labels; they never change the thread's
        // own context. Writing the current attr needs setcurrent and
        // dyntransition permission even for an unchanged value, so only
        // issue the write when the label actually diverged (an unreadable
        // current label counts as diverged).
        let diverged = self
            .backend
            .current_label()
            .map_or(true, |current| current != self.restore);
        if diverged {
            if let Err(e) = self.backend.set_current_label(&self.restore) {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close_inner() {
            tracing::warn!(session = %self.id, error = %e, "Failed to restore context while dropping session");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("restore", &self.restore)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
