//! # Seclabel
//!
//! Seclabel is the mandatory-access-control (MAC) security-context
//! subsystem of a cluster job-scheduling daemon. It applies, tracks, and
//! reverts OS-level security labels (SELinux-style contexts) around every
//! privileged transition the daemon performs on a job's behalf: spawning
//! the job process, creating its output files, labeling descriptors handed
//! to it, and authorizing network peers by their label.
//!
//! ## Design
//!
//! - **Fail-closed**: a job that cannot be correctly labeled does not
//!   start. No operation ever falls back to an unlabeled default.
//! - **Single writer**: the process-global label state (next-exec label,
//!   default creation label, the thread's own context) is owned by exactly
//!   one open [`Session`] at a time; nesting is rejected.
//! - **Guaranteed revert**: a [`Session`] restores the daemon's own
//!   context on every exit path, including drops on error paths.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use seclabel::backend::MemoryBackend;
//! use seclabel::policy::{ImpersonationPolicy, OperationKind};
//! use seclabel::resolver::Identity;
//! use seclabel::session::SessionManager;
//! use seclabel::transition::TransitionEngine;
//!
//! # fn example() -> seclabel_common::SecResult<()> {
//! let backend = Arc::new(MemoryBackend::with_current_label("system_u:system_r:sched_t:s0")?);
//! let manager = SessionManager::new(backend.clone());
//! let engine = TransitionEngine::new(backend);
//!
//! // Open a security session for the job about to launch.
//! let mut session = manager.open(Identity::User("jobuser".to_string()))?;
//!
//! // Stage the job's label for the upcoming exec, then launch.
//! if ImpersonationPolicy::should_impersonate(OperationKind::Exec, &session) {
//!     let handle = session.exec_handle().clone();
//!     engine.apply_to_exec(&mut session, &handle)?;
//! }
//!
//! // ... fork/exec the job here ...
//!
//! // Revert to the daemon's own context, always.
//! manager.close(&mut session)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod label;
pub mod policy;
pub mod resolver;
pub mod session;
pub mod transition;

pub use config::SecurityConfig;
pub use label::{ContextHandle, LabelOrigin, SecurityLabel};
pub use resolver::{ContextResolver, Identity};
pub use session::{Session, SessionManager};
pub use transition::TransitionEngine;
