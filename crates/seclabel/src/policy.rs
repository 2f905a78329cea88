//! Impersonation decisions.
//!
//! Consulted by the launch path before any transition: should this
//! operation run under the job's context, or stay under the daemon's own?
//! Pure and deterministic; prevents re-applying a context when one is
//! already active, which would otherwise mask errors and create nested
//! revert semantics.

use crate::session::Session;

/// The kind of privileged operation about to be performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Executing the job's process image.
    Exec,
    /// Creating files or directories on the job's behalf.
    FileCreate,
    /// Handing an open descriptor to the job.
    Descriptor,
    /// Making or accepting a network connection on the job's behalf.
    Connection,
}

impl OperationKind {
    /// Whether this operation mutates process-global label state.
    #[must_use]
    pub fn is_process_global(self) -> bool {
        matches!(self, Self::Exec | Self::FileCreate)
    }
}

/// Decides whether an operation should impersonate the job.
pub struct ImpersonationPolicy;

impl ImpersonationPolicy {
    /// Whether `kind` should run under the session's job context.
    ///
    /// - A closed session never impersonates.
    /// - A session without a resolvable job label never impersonates
    ///   (fail-closed: the caller sees the error when it tries to apply).
    /// - A process-global operation does not impersonate while a context
    ///   is already applied; revert first.
    #[must_use]
    pub fn should_impersonate(kind: OperationKind, session: &Session) -> bool {
        if session.is_closed() || !session.exec_handle().is_valid() {
            return false;
        }
        if kind.is_process_global() && session.is_applied() {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::MemoryBackend;
    use crate::label::SecurityLabel;
    use crate::resolver::Identity;
    use crate::session::SessionManager;
    use crate::transition::TransitionEngine;

    fn setup() -> (SessionManager, TransitionEngine) {
        let backend =
            Arc::new(MemoryBackend::with_current_label("system_u:system_r:sched_t:s0").unwrap());
        backend.add_user(
            "jobuser",
            SecurityLabel::parse("user_u:user_r:job_t:s0").unwrap(),
        );
        (
            SessionManager::new(backend.clone()),
            TransitionEngine::new(backend),
        )
    }

    #[test]
    fn fresh_session_impersonates() {
        let (manager, _engine) = setup();
        let session = manager.open(Identity::User("jobuser".to_string())).unwrap();

        assert!(ImpersonationPolicy::should_impersonate(
            OperationKind::Exec,
            &session
        ));
        assert!(ImpersonationPolicy::should_impersonate(
            OperationKind::Descriptor,
            &session
        ));
    }

    #[test]
    fn no_double_impersonation_while_applied() {
        let (manager, engine) = setup();
        let mut session = manager.open(Identity::User("jobuser".to_string())).unwrap();
        let handle = session.exec_handle().clone();
        engine.apply_to_exec(&mut session, &handle).unwrap();

        assert!(!ImpersonationPolicy::should_impersonate(
            OperationKind::Exec,
            &session
        ));
        assert!(!ImpersonationPolicy::should_impersonate(
            OperationKind::FileCreate,
            &session
        ));
        // Non-global targets are still fine.
        assert!(ImpersonationPolicy::should_impersonate(
            OperationKind::Descriptor,
            &session
        ));
    }

    #[test]
    fn repeatable_after_revert() {
        let (manager, engine) = setup();
        let mut session = manager.open(Identity::User("jobuser".to_string())).unwrap();
        let handle = session.exec_handle().clone();
        engine.apply_to_exec(&mut session, &handle).unwrap();

        manager.revert(&mut session).unwrap();
        assert!(ImpersonationPolicy::should_impersonate(
            OperationKind::Exec,
            &session
        ));
    }

    #[test]
    fn closed_session_never_impersonates() {
        let (manager, _engine) = setup();
        let mut session = manager.open(Identity::User("jobuser".to_string())).unwrap();
        manager.close(&mut session).unwrap();

        assert!(!ImpersonationPolicy::should_impersonate(
            OperationKind::Exec,
            &session
        ));
        assert!(!ImpersonationPolicy::should_impersonate(
            OperationKind::Connection,
            &session
        ));
    }
}
