//! Label transitions.
//!
//! [`TransitionEngine`] applies a resolved context handle to a concrete
//! target: the next process image, a filesystem path, an open descriptor,
//! or a network connection. Every failure is an error to the caller, never
//! a silent return; the launch path treats any of them as fatal to that
//! launch attempt.

use std::fmt;
use std::os::fd::{AsFd, BorrowedFd};
use std::path::Path;
use std::sync::Arc;

use seclabel_common::{SecError, SecResult};

use crate::backend::LabelBackend;
use crate::label::{ContextHandle, LabelOrigin};
use crate::session::Session;

/// The kind of target a label is applied to.
///
/// Named in transition errors so operators can tell a policy problem from
/// a resource-level problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// The next process image executed by this thread.
    Exec,
    /// A filesystem path.
    Path,
    /// An open file descriptor.
    Fd,
    /// A network connection.
    Connection,
    /// The process-scoped default creation label.
    CreationDefault,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exec => write!(f, "next process image"),
            Self::Path => write!(f, "filesystem path"),
            Self::Fd => write!(f, "file descriptor"),
            Self::Connection => write!(f, "network connection"),
            Self::CreationDefault => write!(f, "default creation label"),
        }
    }
}

/// Applies context handles to targets.
///
/// Exec staging and the creation-label override are process-global state;
/// the session layer's single-active-session rule is what keeps two jobs'
/// transitions from interleaving. Labeling one target kind never affects
/// the others.
pub struct TransitionEngine {
    backend: Arc<dyn LabelBackend>,
}

impl TransitionEngine {
    /// Create an engine over a label backend.
    #[must_use]
    pub fn new(backend: Arc<dyn LabelBackend>) -> Self {
        Self { backend }
    }

    /// Stage `handle`'s label for the next `exec` in this thread.
    ///
    /// Staging only: the current process keeps its own label until the
    /// exec happens, so there is no window where anything runs mislabeled.
    /// Must be called strictly before the process-execute primitive, and a
    /// failure must abort the launch.
    ///
    /// # Errors
    ///
    /// Returns [`SecError::SessionClosed`] on a closed session,
    /// [`SecError::InvalidHandle`] for an unresolved handle, and a
    /// transition error when staging fails.
    pub fn apply_to_exec(&self, session: &mut Session, handle: &ContextHandle) -> SecResult<()> {
        session.ensure_open()?;
        let label = handle.require_label()?;

        self.backend
            .set_exec_label(Some(label))
            .map_err(|e| transition_error(TargetKind::Exec, e))?;
        session.mark_applied();

        tracing::debug!(session = %session.id(), %label, "Staged exec label");
        Ok(())
    }

    /// Label `path` and make it the default for objects the job creates
    /// under it, so job output files inherit the job's label rather than
    /// the daemon's.
    ///
    /// # Errors
    ///
    /// Fails (never silently ignores) where the filesystem or MAC
    /// subsystem does not support labeling that path; same session and
    /// handle failure modes as [`Self::apply_to_exec`].
    pub fn apply_to_path(
        &self,
        session: &mut Session,
        path: &Path,
        handle: &ContextHandle,
    ) -> SecResult<()> {
        session.ensure_open()?;
        let label = handle.require_label()?;

        self.backend
            .set_path_label(path, label)
            .map_err(|e| transition_error(TargetKind::Path, e))?;
        self.backend
            .set_create_label(Some(label))
            .map_err(|e| transition_error(TargetKind::CreationDefault, e))?;
        session.mark_applied();

        tracing::debug!(session = %session.id(), path = %path.display(), %label, "Applied file-creation label");
        Ok(())
    }

    /// Label an open descriptor created by the daemon but used by the job
    /// (a pipe or socket handed across the boundary).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::apply_to_exec`].
    pub fn apply_to_fd(
        &self,
        session: &mut Session,
        fd: BorrowedFd<'_>,
        handle: &ContextHandle,
    ) -> SecResult<()> {
        session.ensure_open()?;
        let label = handle.require_label()?;

        self.backend
            .set_fd_label(fd, label)
            .map_err(|e| transition_error(TargetKind::Fd, e))?;

        tracing::debug!(session = %session.id(), %label, "Applied descriptor label");
        Ok(())
    }

    /// Clear any creation-label override back to the ambient default, so
    /// no job label leaks into daemon-internal file creation.
    ///
    /// # Errors
    ///
    /// Returns a transition error when the clear fails.
    pub fn reset_default_creation_label(&self) -> SecResult<()> {
        self.backend
            .set_create_label(None)
            .map_err(|e| transition_error(TargetKind::CreationDefault, e))
    }

    /// Read the label of the peer on a connection.
    ///
    /// Read-only and concurrent-safe; needs no session. The RPC layer uses
    /// the returned handle to accept or reject the peer.
    ///
    /// # Errors
    ///
    /// Returns an error when the peer's label cannot be read.
    pub fn get_connection_context(&self, conn: impl AsFd) -> SecResult<ContextHandle> {
        let label = self.backend.peer_label(conn.as_fd())?;
        Ok(ContextHandle::resolved(label, LabelOrigin::Peer))
    }

    /// Label a connection, for outbound connections made on a job's
    /// behalf.
    ///
    /// # Errors
    ///
    /// Returns [`SecError::InvalidHandle`] for an unresolved handle and a
    /// transition error when the underlying call fails.
    pub fn set_connection_context(&self, conn: impl AsFd, handle: &ContextHandle) -> SecResult<()> {
        let label = handle.require_label()?;

        self.backend
            .set_fd_label(conn.as_fd(), label)
            .map_err(|e| transition_error(TargetKind::Connection, e))
    }
}

/// Keep session/handle errors intact; name the target for the rest.
fn transition_error(target: TargetKind, err: SecError) -> SecError {
    match err {
        SecError::SessionClosed { .. }
        | SecError::SessionAlreadyOpen { .. }
        | SecError::InvalidHandle { .. } => err,
        SecError::Transition { reason, .. } => SecError::Transition {
            target: target.to_string(),
            reason,
        },
        other => SecError::Transition {
            target: target.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::label::SecurityLabel;
    use crate::resolver::Identity;
    use crate::session::SessionManager;

    const DAEMON: &str = "system_u:system_r:sched_t:s0";
    const JOB: &str = "user_u:user_r:job_t:s0";

    fn setup() -> (Arc<MemoryBackend>, SessionManager, TransitionEngine) {
        let backend = Arc::new(MemoryBackend::with_current_label(DAEMON).unwrap());
        backend.add_user("jobuser", SecurityLabel::parse(JOB).unwrap());
        let manager = SessionManager::new(backend.clone());
        let engine = TransitionEngine::new(backend.clone());
        (backend, manager, engine)
    }

    #[test]
    fn exec_staging_marks_session_applied() {
        let (backend, manager, engine) = setup();
        let mut session = manager.open(Identity::User("jobuser".to_string())).unwrap();
        let handle = session.exec_handle().clone();

        engine.apply_to_exec(&mut session, &handle).unwrap();

        assert!(session.is_applied());
        assert_eq!(backend.staged_exec_label().unwrap().as_str(), JOB);
        // Staging does not change the current label.
        assert_eq!(backend.observed_current().as_str(), DAEMON);
    }

    #[test]
    fn transitions_rejected_on_closed_session() {
        let (_backend, manager, engine) = setup();
        let mut session = manager.open(Identity::User("jobuser".to_string())).unwrap();
        let handle = session.exec_handle().clone();
        manager.close(&mut session).unwrap();

        let err = engine.apply_to_exec(&mut session, &handle).unwrap_err();
        assert!(matches!(err, SecError::SessionClosed { .. }));
    }

    #[test]
    fn invalid_handle_rejected() {
        let (_backend, manager, engine) = setup();
        let mut session = manager.open(Identity::User("jobuser".to_string())).unwrap();
        let placeholder = ContextHandle::invalid(LabelOrigin::Job);

        let err = engine.apply_to_exec(&mut session, &placeholder).unwrap_err();
        assert!(matches!(err, SecError::InvalidHandle { .. }));
        assert!(!session.is_applied());
    }

    #[test]
    fn failed_apply_names_the_target() {
        let (backend, manager, engine) = setup();
        let mut session = manager.open(Identity::User("jobuser".to_string())).unwrap();
        let handle = session.exec_handle().clone();
        backend.inject_apply_failure(true);

        let err = engine.apply_to_exec(&mut session, &handle).unwrap_err();
        match err {
            SecError::Transition { target, .. } => assert_eq!(target, "next process image"),
            other => panic!("expected transition error, got {other}"),
        }
        assert!(!session.is_applied());
    }

    #[test]
    fn path_label_sets_creation_default() {
        let (backend, manager, engine) = setup();
        let mut session = manager.open(Identity::User("jobuser".to_string())).unwrap();
        let handle = session.exec_handle().clone();

        engine
            .apply_to_path(&mut session, Path::new("/var/spool/jobs/42"), &handle)
            .unwrap();

        assert_eq!(backend.creation_label().unwrap().as_str(), JOB);

        engine.reset_default_creation_label().unwrap();
        assert_eq!(backend.creation_label(), None);
    }

    #[test]
    fn connection_label_roundtrip() {
        let (_backend, manager, engine) = setup();
        let mut session = manager.open(Identity::User("jobuser".to_string())).unwrap();
        let handle = session.exec_handle().clone();

        // Any open descriptor works as the connection object here.
        let conn = std::fs::File::open("/dev/null").unwrap();
        engine.set_connection_context(&conn, &handle).unwrap();

        let peer = engine.get_connection_context(&conn).unwrap();
        assert_eq!(peer.require_label().unwrap().as_str(), JOB);
        assert_eq!(peer.origin(), LabelOrigin::Peer);

        manager.close(&mut session).unwrap();
    }
}
