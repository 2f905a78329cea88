//! Subsystem configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What the daemon wants when the MAC subsystem is disabled at the OS
/// level.
///
/// This is daemon policy, not a subsystem decision: resolution reports a
/// disabled subsystem distinctly from a failed lookup, and the launch path
/// consults this knob instead of guessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledPolicy {
    /// Refuse to launch jobs without a label (fail-closed).
    #[default]
    Deny,
    /// Launch jobs unlabeled by design.
    RunUnlabeled,
}

/// Security-context configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Behavior when the MAC subsystem is disabled on this host.
    pub on_disabled: DisabledPolicy,
    /// Context template for job user labels; the user and range components
    /// are substituted from the seusers mapping.
    pub job_context_template: String,
    /// Override for the seusers mapping file (testing, nonstandard policy
    /// roots). Defaults to the active policy's seusers file.
    pub seusers_path: Option<PathBuf>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            on_disabled: DisabledPolicy::Deny,
            job_context_template: "system_u:system_r:sched_job_t:s0".to_string(),
            seusers_path: None,
        }
    }
}

impl SecurityConfig {
    /// Whether daemon policy allows launching unlabeled when the MAC
    /// subsystem is disabled.
    #[must_use]
    pub fn allows_unlabeled_when_disabled(&self) -> bool {
        self.on_disabled == DisabledPolicy::RunUnlabeled
    }

    /// Set the disabled-subsystem policy.
    #[must_use]
    pub fn with_on_disabled(mut self, policy: DisabledPolicy) -> Self {
        self.on_disabled = policy;
        self
    }

    /// Set the job context template.
    #[must_use]
    pub fn with_job_context_template(mut self, template: impl Into<String>) -> Self {
        self.job_context_template = template.into();
        self
    }

    /// Set the seusers mapping file path.
    #[must_use]
    pub fn with_seusers_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.seusers_path = Some(path.into());
        self
    }
}
