//! Session open/close protocol.

use std::sync::Arc;

use parking_lot::Mutex;

use seclabel_common::{SecError, SecResult};

use crate::backend::LabelBackend;
use crate::resolver::{ContextResolver, Identity};

use super::{ActiveSlot, Session};

/// Opens and closes security sessions.
///
/// The process-global label state (next-exec staging, creation-label
/// override, the thread's own context) has exactly one writer at a time:
/// the manager holds a single active-session slot and rejects nesting.
/// Daemons that launch jobs concurrently dedicate one worker thread or
/// forked worker per job, each with its own manager.
pub struct SessionManager {
    backend: Arc<dyn LabelBackend>,
    resolver: ContextResolver,
    active: ActiveSlot,
}

impl SessionManager {
    /// Create a manager over a label backend.
    #[must_use]
    pub fn new(backend: Arc<dyn LabelBackend>) -> Self {
        let resolver = ContextResolver::new(backend.clone());
        Self {
            backend,
            resolver,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// The resolver this manager uses.
    #[must_use]
    pub fn resolver(&self) -> &ContextResolver {
        &self.resolver
    }

    /// Whether a session currently owns the process-global label state.
    #[must_use]
    pub fn has_active_session(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Open a security session for an identity.
    ///
    /// Captures the current self-context as the restore point and resolves
    /// the identity's context. The slot lock is held across both reads, so
    /// the restore point is captured atomically with respect to other
    /// sessions. On any failure nothing is registered and no global state
    /// is touched.
    ///
    /// # Errors
    ///
    /// Returns [`SecError::SessionAlreadyOpen`] while another session is
    /// active, and resolution errors per [`ContextResolver::resolve`].
    pub fn open(&self, identity: Identity) -> SecResult<Session> {
        let mut slot = self.active.lock();
        if let Some(current) = slot.as_ref() {
            return Err(SecError::SessionAlreadyOpen {
                current: current.to_string(),
            });
        }

        let restore = self
            .resolver
            .resolve(&Identity::Current)?
            .require_label()?
            .clone();
        let exec_handle = self.resolver.resolve(&identity)?;

        let session = Session::new(
            identity,
            restore,
            exec_handle,
            self.backend.clone(),
            self.active.clone(),
        );
        *slot = Some(session.id().clone());
        drop(slot);

        tracing::info!(
            session = %session.id(),
            identity = %session.identity(),
            restore = %session.restore_label(),
            "Opened security session"
        );
        Ok(session)
    }

    /// Close a session: clear staged labels, restore the captured daemon
    /// context, release the handles, free the slot.
    ///
    /// Idempotent: closing an already-closed session is a no-op, so
    /// cleanup code on error paths is always safe.
    ///
    /// # Errors
    ///
    /// Returns the first restore failure. The session is marked closed and
    /// the slot freed regardless.
    pub fn close(&self, session: &mut Session) -> SecResult<()> {
        session.close_inner()
    }

    /// Restore the daemon's own context without closing the session.
    ///
    /// Used after a privileged sub-operation completes; the job context
    /// can be re-applied later in the same session.
    ///
    /// # Errors
    ///
    /// Returns [`SecError::SessionClosed`] on a closed session, or the
    /// failure of a restore step.
    pub fn revert(&self, session: &mut Session) -> SecResult<()> {
        session.revert_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::label::SecurityLabel;

    const DAEMON: &str = "system_u:system_r:sched_t:s0";
    const JOB: &str = "user_u:user_r:job_t:s0";

    fn backend() -> Arc<MemoryBackend> {
        let backend = MemoryBackend::with_current_label(DAEMON).unwrap();
        backend.add_user("jobuser", SecurityLabel::parse(JOB).unwrap());
        Arc::new(backend)
    }

    #[test]
    fn open_captures_restore_point() {
        let manager = SessionManager::new(backend());
        let session = manager.open(Identity::User("jobuser".to_string())).unwrap();

        assert_eq!(session.restore_label().as_str(), DAEMON);
        assert_eq!(session.exec_handle().require_label().unwrap().as_str(), JOB);
        assert!(!session.is_applied());
        assert!(manager.has_active_session());
    }

    #[test]
    fn open_rejects_nesting() {
        let manager = SessionManager::new(backend());
        let _session = manager.open(Identity::User("jobuser".to_string())).unwrap();

        let err = manager
            .open(Identity::User("jobuser".to_string()))
            .unwrap_err();
        assert!(matches!(err, SecError::SessionAlreadyOpen { .. }));
    }

    #[test]
    fn failed_resolution_registers_nothing() {
        let manager = SessionManager::new(backend());
        let err = manager
            .open(Identity::User("stranger".to_string()))
            .unwrap_err();

        assert!(matches!(err, SecError::Resolution { .. }));
        assert!(!manager.has_active_session());

        // The slot is free: a later open succeeds.
        let session = manager.open(Identity::User("jobuser".to_string()));
        assert!(session.is_ok());
    }

    #[test]
    fn close_is_idempotent_and_frees_slot() {
        let manager = SessionManager::new(backend());
        let mut session = manager.open(Identity::User("jobuser".to_string())).unwrap();

        manager.close(&mut session).unwrap();
        assert!(session.is_closed());
        assert!(!manager.has_active_session());

        // Second close is a no-op, not an error.
        manager.close(&mut session).unwrap();
    }

    #[test]
    fn drop_frees_slot() {
        let manager = SessionManager::new(backend());
        {
            let _session = manager.open(Identity::User("jobuser".to_string())).unwrap();
            assert!(manager.has_active_session());
        }
        assert!(!manager.has_active_session());
    }

    #[test]
    fn revert_keeps_session_usable() {
        let manager = SessionManager::new(backend());
        let mut session = manager.open(Identity::User("jobuser".to_string())).unwrap();

        manager.revert(&mut session).unwrap();
        assert!(!session.is_closed());
        assert!(manager.has_active_session());

        manager.close(&mut session).unwrap();
        let err = manager.revert(&mut session).unwrap_err();
        assert!(matches!(err, SecError::SessionClosed { .. }));
    }
}
