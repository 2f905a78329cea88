//! Underlying MAC label mechanisms.
//!
//! [`LabelBackend`] is the seam between the subsystem and whatever the OS
//! actually enforces. Everything above it (resolver, sessions,
//! transitions) is MAC-implementation agnostic.

mod memory;
#[cfg(target_os = "linux")]
mod selinux;

pub use memory::MemoryBackend;
#[cfg(target_os = "linux")]
pub use selinux::SelinuxBackend;

use std::os::fd::BorrowedFd;
use std::path::Path;

use seclabel_common::SecResult;

use crate::label::SecurityLabel;

/// Low-level label operations supplied by a MAC implementation.
///
/// All methods are fast local calls; none block and none are cancellable.
/// Read operations are safe to call concurrently. Write operations mutate
/// thread- or process-global state and are serialized by the session layer,
/// which permits only one open session per execution context.
pub trait LabelBackend: Send + Sync {
    /// Whether the MAC subsystem is present and active on this host.
    fn is_enabled(&self) -> bool;

    /// The calling thread's own label.
    fn current_label(&self) -> SecResult<SecurityLabel>;

    /// Set the calling thread's own label (the revert path).
    fn set_current_label(&self, label: &SecurityLabel) -> SecResult<()>;

    /// Stage the label the next `exec` in this thread will run under, or
    /// clear the staging with `None`.
    ///
    /// Staging only: the current label is unchanged until the exec happens,
    /// so there is no window where this thread runs mislabeled.
    fn set_exec_label(&self, label: Option<&SecurityLabel>) -> SecResult<()>;

    /// Override the default label for filesystem objects this thread
    /// creates, or clear the override back to the ambient default.
    fn set_create_label(&self, label: Option<&SecurityLabel>) -> SecResult<()>;

    /// Read the label of a filesystem object.
    fn path_label(&self, path: &Path) -> SecResult<SecurityLabel>;

    /// Set the label of a filesystem object.
    ///
    /// Must fail, not silently ignore, where the filesystem does not
    /// support labeling.
    fn set_path_label(&self, path: &Path, label: &SecurityLabel) -> SecResult<()>;

    /// Read the label of an open descriptor.
    fn fd_label(&self, fd: BorrowedFd<'_>) -> SecResult<SecurityLabel>;

    /// Set the label of an open descriptor.
    fn set_fd_label(&self, fd: BorrowedFd<'_>, label: &SecurityLabel) -> SecResult<()>;

    /// Read the label of the peer connected to a socket.
    fn peer_label(&self, fd: BorrowedFd<'_>) -> SecResult<SecurityLabel>;

    /// Compute the default context for a login name.
    fn user_label(&self, name: &str) -> SecResult<SecurityLabel>;
}
