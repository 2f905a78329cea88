//! In-process label backend.
//!
//! Models the kernel's label state (thread context, exec staging, creation
//! override, object labels) in memory. Used by the test suite and by
//! development hosts without a MAC subsystem.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use seclabel_common::{SecError, SecResult};

use crate::label::SecurityLabel;

use super::LabelBackend;

#[derive(Debug)]
struct State {
    enabled: bool,
    current: SecurityLabel,
    exec: Option<SecurityLabel>,
    create: Option<SecurityLabel>,
    paths: HashMap<PathBuf, SecurityLabel>,
    fds: HashMap<RawFd, SecurityLabel>,
    users: HashMap<String, SecurityLabel>,
    fail_applies: bool,
    current_writes: usize,
}

/// An in-memory [`LabelBackend`].
///
/// A connection's label is modeled as a single cell per descriptor, so a
/// label written with `set_fd_label` is what `peer_label` reads back.
#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    /// Create a backend whose calling-thread label is `current`.
    #[must_use]
    pub fn new(current: SecurityLabel) -> Self {
        Self {
            state: Mutex::new(State {
                enabled: true,
                current,
                exec: None,
                create: None,
                paths: HashMap::new(),
                fds: HashMap::new(),
                users: HashMap::new(),
                fail_applies: false,
                current_writes: 0,
            }),
        }
    }

    /// Create a backend from a raw label token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token fails label validation.
    pub fn with_current_label(raw: &str) -> SecResult<Self> {
        Ok(Self::new(SecurityLabel::parse(raw)?))
    }

    /// Register the default context for a login name.
    pub fn add_user(&self, name: impl Into<String>, label: SecurityLabel) {
        self.state.lock().users.insert(name.into(), label);
    }

    /// Mark the MAC subsystem enabled or disabled.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    /// Make every label *set* operation fail until cleared.
    ///
    /// Clearing operations (staging reset, creation-label reset, revert)
    /// keep succeeding, so cleanup paths stay testable.
    pub fn inject_apply_failure(&self, fail: bool) {
        self.state.lock().fail_applies = fail;
    }

    /// Observe the calling-thread label.
    #[must_use]
    pub fn observed_current(&self) -> SecurityLabel {
        self.state.lock().current.clone()
    }

    /// Observe the staged next-exec label, if any.
    #[must_use]
    pub fn staged_exec_label(&self) -> Option<SecurityLabel> {
        self.state.lock().exec.clone()
    }

    /// Observe the creation-label override, if any.
    #[must_use]
    pub fn creation_label(&self) -> Option<SecurityLabel> {
        self.state.lock().create.clone()
    }

    /// How many times the calling-thread label has been written.
    ///
    /// The write itself is privileged on a real MAC host, so tests assert
    /// it is not issued when the label never diverged.
    #[must_use]
    pub fn current_write_count(&self) -> usize {
        self.state.lock().current_writes
    }

    fn check_apply(state: &State, target: &str) -> SecResult<()> {
        if state.fail_applies {
            return Err(SecError::Transition {
                target: target.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl LabelBackend for MemoryBackend {
    fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    fn current_label(&self) -> SecResult<SecurityLabel> {
        Ok(self.state.lock().current.clone())
    }

    fn set_current_label(&self, label: &SecurityLabel) -> SecResult<()> {
        let mut state = self.state.lock();
        state.current = label.clone();
        state.current_writes += 1;
        Ok(())
    }

    fn set_exec_label(&self, label: Option<&SecurityLabel>) -> SecResult<()> {
        let mut state = self.state.lock();
        if label.is_some() {
            Self::check_apply(&state, "next exec")?;
        }
        state.exec = label.cloned();
        Ok(())
    }

    fn set_create_label(&self, label: Option<&SecurityLabel>) -> SecResult<()> {
        let mut state = self.state.lock();
        if label.is_some() {
            Self::check_apply(&state, "default creation label")?;
        }
        state.create = label.cloned();
        Ok(())
    }

    fn path_label(&self, path: &Path) -> SecResult<SecurityLabel> {
        self.state.lock().paths.get(path).cloned().ok_or_else(|| {
            SecError::Unsupported {
                feature: format!("label lookup for unlabeled path {}", path.display()),
            }
        })
    }

    fn set_path_label(&self, path: &Path, label: &SecurityLabel) -> SecResult<()> {
        let mut state = self.state.lock();
        Self::check_apply(&state, "filesystem path")?;
        state.paths.insert(path.to_path_buf(), label.clone());
        Ok(())
    }

    fn fd_label(&self, fd: BorrowedFd<'_>) -> SecResult<SecurityLabel> {
        self.state
            .lock()
            .fds
            .get(&fd.as_raw_fd())
            .cloned()
            .ok_or_else(|| SecError::Unsupported {
                feature: format!("label lookup for unlabeled descriptor {}", fd.as_raw_fd()),
            })
    }

    fn set_fd_label(&self, fd: BorrowedFd<'_>, label: &SecurityLabel) -> SecResult<()> {
        let mut state = self.state.lock();
        Self::check_apply(&state, "file descriptor")?;
        state.fds.insert(fd.as_raw_fd(), label.clone());
        Ok(())
    }

    fn peer_label(&self, fd: BorrowedFd<'_>) -> SecResult<SecurityLabel> {
        self.state
            .lock()
            .fds
            .get(&fd.as_raw_fd())
            .cloned()
            .ok_or_else(|| SecError::Resolution {
                identity: format!("peer of descriptor {}", fd.as_raw_fd()),
                reason: "no label recorded for connection".to_string(),
            })
    }

    fn user_label(&self, name: &str) -> SecResult<SecurityLabel> {
        self.state
            .lock()
            .users
            .get(name)
            .cloned()
            .ok_or_else(|| SecError::Resolution {
                identity: name.to_string(),
                reason: "unknown identity".to_string(),
            })
    }
}
