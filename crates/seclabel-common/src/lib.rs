//! # seclabel-common
//!
//! Shared types for the seclabel security-context subsystem.
//!
//! This crate provides the pieces every seclabel crate needs:
//! - Security session identifiers
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod id;

pub use error::{SecError, SecResult};
pub use id::SessionId;
