//! SELinux label backend.
//!
//! Talks to the kernel directly: per-thread attr files for the calling
//! thread's context and its exec/creation staging, `security.selinux`
//! xattrs for objects and descriptors, and `SO_PEERSEC` for network peers.
//! Per-thread attr files are used (not `/proc/self`) because the daemon
//! impersonates per worker thread.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::{Path, PathBuf};

use rustix::fs::XattrFlags;
use rustix::io::Errno;

use seclabel_common::{SecError, SecResult};

use crate::config::SecurityConfig;
use crate::label::SecurityLabel;

use super::LabelBackend;

const SELINUX_MOUNT: &str = "/sys/fs/selinux";
const SELINUX_XATTR: &str = "security.selinux";
const THREAD_ATTR_DIR: &str = "/proc/thread-self/attr";
const SELINUX_CONFIG: &str = "/etc/selinux/config";
const DEFAULT_POLICY_TYPE: &str = "targeted";

/// [`LabelBackend`] backed by the kernel's SELinux interfaces.
#[derive(Debug, Default)]
pub struct SelinuxBackend {
    config: SecurityConfig,
}

impl SelinuxBackend {
    /// Create a backend with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend with explicit configuration.
    #[must_use]
    pub fn with_config(config: SecurityConfig) -> Self {
        Self { config }
    }

    fn attr_path(name: &str) -> PathBuf {
        Path::new(THREAD_ATTR_DIR).join(name)
    }

    /// Write a thread attr file.
    ///
    /// A zero-length write clears the attribute, so the write syscall must
    /// be issued even for an empty value (`write_all` would skip it).
    fn write_attr(name: &str, value: &[u8]) -> SecResult<()> {
        let mut file = OpenOptions::new().write(true).open(Self::attr_path(name))?;
        if value.is_empty() {
            file.write(&[]).map(|_| ()).map_err(SecError::Io)
        } else {
            file.write_all(value).map_err(SecError::Io)
        }
    }

    fn read_attr(name: &str) -> SecResult<SecurityLabel> {
        let bytes = std::fs::read(Self::attr_path(name))?;
        SecurityLabel::from_kernel_bytes(&bytes)
    }

    fn xattr_err(target: &str, errno: Errno) -> SecError {
        match errno {
            Errno::NODATA | Errno::NOTSUP => SecError::Unsupported {
                feature: format!("MAC labeling for {target}"),
            },
            _ => SecError::Io(errno.into()),
        }
    }

    fn seusers_path(&self) -> PathBuf {
        self.config.seusers_path.clone().unwrap_or_else(|| {
            let policy = read_policy_type();
            PathBuf::from("/etc/selinux").join(policy).join("seusers")
        })
    }
}

impl LabelBackend for SelinuxBackend {
    fn is_enabled(&self) -> bool {
        Path::new(SELINUX_MOUNT).exists()
    }

    fn current_label(&self) -> SecResult<SecurityLabel> {
        Self::read_attr("current")
    }

    fn set_current_label(&self, label: &SecurityLabel) -> SecResult<()> {
        Self::write_attr("current", label.as_bytes())
    }

    fn set_exec_label(&self, label: Option<&SecurityLabel>) -> SecResult<()> {
        Self::write_attr("exec", label.map_or(&[], SecurityLabel::as_bytes))
    }

    fn set_create_label(&self, label: Option<&SecurityLabel>) -> SecResult<()> {
        Self::write_attr("fscreate", label.map_or(&[], SecurityLabel::as_bytes))
    }

    fn path_label(&self, path: &Path) -> SecResult<SecurityLabel> {
        let target = path.display().to_string();

        let len = rustix::fs::getxattr(path, SELINUX_XATTR, &mut [0u8; 0])
            .map_err(|e| Self::xattr_err(&target, e))?;
        let mut buf = vec![0u8; len];
        let len = rustix::fs::getxattr(path, SELINUX_XATTR, &mut buf)
            .map_err(|e| Self::xattr_err(&target, e))?;
        buf.truncate(len);

        SecurityLabel::from_kernel_bytes(&buf)
    }

    fn set_path_label(&self, path: &Path, label: &SecurityLabel) -> SecResult<()> {
        // The kernel stores the value NUL-terminated.
        let mut value = label.as_bytes().to_vec();
        value.push(0);

        rustix::fs::setxattr(path, SELINUX_XATTR, &value, XattrFlags::empty())
            .map_err(|e| Self::xattr_err(&path.display().to_string(), e))
    }

    fn fd_label(&self, fd: BorrowedFd<'_>) -> SecResult<SecurityLabel> {
        let target = format!("descriptor {}", fd.as_raw_fd());

        let len = rustix::fs::fgetxattr(fd, SELINUX_XATTR, &mut [0u8; 0])
            .map_err(|e| Self::xattr_err(&target, e))?;
        let mut buf = vec![0u8; len];
        let len = rustix::fs::fgetxattr(fd, SELINUX_XATTR, &mut buf)
            .map_err(|e| Self::xattr_err(&target, e))?;
        buf.truncate(len);

        SecurityLabel::from_kernel_bytes(&buf)
    }

    fn set_fd_label(&self, fd: BorrowedFd<'_>, label: &SecurityLabel) -> SecResult<()> {
        let mut value = label.as_bytes().to_vec();
        value.push(0);

        rustix::fs::fsetxattr(fd, SELINUX_XATTR, &value, XattrFlags::empty())
            .map_err(|e| Self::xattr_err(&format!("descriptor {}", fd.as_raw_fd()), e))
    }

    #[allow(unsafe_code)]
    fn peer_label(&self, fd: BorrowedFd<'_>) -> SecResult<SecurityLabel> {
        // Long MLS/MCS contexts can exceed any fixed guess; the kernel
        // reports the required length on ERANGE.
        let mut capacity = 256usize;

        loop {
            let mut buf = vec![0u8; capacity];
            let mut len = buf.len() as libc::socklen_t;

            // SAFETY: buf outlives the call and len matches its capacity.
            let rc = unsafe {
                libc::getsockopt(
                    fd.as_raw_fd(),
                    libc::SOL_SOCKET,
                    libc::SO_PEERSEC,
                    buf.as_mut_ptr().cast(),
                    &mut len,
                )
            };

            if rc == 0 {
                buf.truncate(len as usize);
                return SecurityLabel::from_kernel_bytes(&buf);
            }

            let err = std::io::Error::last_os_error();
            match peersec_retry_capacity(&err, len as usize, capacity) {
                Some(larger) => capacity = larger,
                None => return Err(SecError::Io(err)),
            }
        }
    }

    fn user_label(&self, name: &str) -> SecResult<SecurityLabel> {
        let path = self.seusers_path();
        let contents = std::fs::read_to_string(&path).map_err(|e| SecError::Resolution {
            identity: name.to_string(),
            reason: format!("cannot read seusers mapping {}: {e}", path.display()),
        })?;

        let entry =
            lookup_seuser(&contents, name).ok_or_else(|| SecError::Resolution {
                identity: name.to_string(),
                reason: "no seusers mapping for login or __default__".to_string(),
            })?;

        build_user_label(&self.config.job_context_template, &entry)
    }
}

/// One seusers mapping line: `login:seuser[:range]`.
struct SeuserEntry {
    seuser: String,
    range: Option<String>,
}

fn lookup_seuser(contents: &str, login: &str) -> Option<SeuserEntry> {
    let mut fallback = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        // MLS ranges contain ':', so split into at most three fields.
        let mut fields = line.splitn(3, ':');
        let entry_login = fields.next()?;
        let Some(seuser) = fields.next() else {
            continue;
        };
        let entry = SeuserEntry {
            seuser: seuser.to_string(),
            range: fields.next().map(str::to_string),
        };

        if entry_login == login {
            return Some(entry);
        }
        if entry_login == "__default__" {
            fallback = Some(entry);
        }
    }

    fallback
}

/// Substitute the user and range components of the template with the
/// seusers entry, the way the underlying policy computes a default context.
fn build_user_label(template: &str, entry: &SeuserEntry) -> SecResult<SecurityLabel> {
    let mut parts = template.splitn(4, ':');
    let (Some(_user), Some(role), Some(type_)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(SecError::InvalidLabel {
            value: template.to_string(),
        });
    };
    let template_range = parts.next();

    let label = match entry.range.as_deref().or(template_range) {
        Some(range) => format!("{}:{role}:{type_}:{range}", entry.seuser),
        None => format!("{}:{role}:{type_}", entry.seuser),
    };

    SecurityLabel::parse(label)
}

/// On ERANGE the kernel wrote the required buffer length back through
/// optlen; retry with that. Anything else, or a report that would not
/// grow the buffer, is a real failure.
fn peersec_retry_capacity(err: &std::io::Error, reported: usize, capacity: usize) -> Option<usize> {
    if err.raw_os_error() == Some(libc::ERANGE) && reported > capacity {
        Some(reported)
    } else {
        None
    }
}

fn read_policy_type() -> String {
    let Ok(contents) = std::fs::read_to_string(SELINUX_CONFIG) else {
        return DEFAULT_POLICY_TYPE.to_string();
    };

    contents
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("SELINUXTYPE="))
        .map_or_else(|| DEFAULT_POLICY_TYPE.to_string(), |t| t.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEUSERS: &str = "\
# comment line
root:unconfined_u:s0-s0:c0.c1023
jobuser:user_u:s0
__default__:guest_u:s0
";

    #[test]
    fn seusers_exact_match() {
        let entry = lookup_seuser(SEUSERS, "jobuser").unwrap();
        assert_eq!(entry.seuser, "user_u");
        assert_eq!(entry.range.as_deref(), Some("s0"));
    }

    #[test]
    fn seusers_mls_range_survives_split() {
        let entry = lookup_seuser(SEUSERS, "root").unwrap();
        assert_eq!(entry.seuser, "unconfined_u");
        assert_eq!(entry.range.as_deref(), Some("s0-s0:c0.c1023"));
    }

    #[test]
    fn seusers_default_fallback() {
        let entry = lookup_seuser(SEUSERS, "stranger").unwrap();
        assert_eq!(entry.seuser, "guest_u");
    }

    #[test]
    fn user_label_from_template() {
        let entry = SeuserEntry {
            seuser: "user_u".to_string(),
            range: Some("s0-s0:c0.c42".to_string()),
        };
        let label = build_user_label("system_u:system_r:sched_job_t:s0", &entry).unwrap();
        assert_eq!(label.as_str(), "user_u:system_r:sched_job_t:s0-s0:c0.c42");
    }

    #[test]
    fn user_label_keeps_template_range() {
        let entry = SeuserEntry {
            seuser: "user_u".to_string(),
            range: None,
        };
        let label = build_user_label("system_u:system_r:sched_job_t:s0", &entry).unwrap();
        assert_eq!(label.as_str(), "user_u:system_r:sched_job_t:s0");
    }

    #[test]
    fn bad_template_rejected() {
        let entry = SeuserEntry {
            seuser: "user_u".to_string(),
            range: None,
        };
        assert!(build_user_label("just_one_part", &entry).is_err());
    }

    #[test]
    fn peersec_retries_only_on_growing_erange() {
        let erange = std::io::Error::from_raw_os_error(libc::ERANGE);
        assert_eq!(peersec_retry_capacity(&erange, 4096, 256), Some(4096));
        // A report that would not grow the buffer must not loop.
        assert_eq!(peersec_retry_capacity(&erange, 256, 256), None);

        let denied = std::io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(peersec_retry_capacity(&denied, 4096, 256), None);
    }

    #[test]
    fn seusers_lookup_via_config_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seusers");
        std::fs::write(&path, SEUSERS).unwrap();

        let backend = SelinuxBackend::with_config(
            SecurityConfig::default().with_seusers_path(&path),
        );
        let label = backend.user_label("jobuser").unwrap();
        assert_eq!(label.as_str(), "user_u:system_r:sched_job_t:s0");
    }
}
