//! routedeck-core: Device model and capability classification for routedeck.
//!
//! This crate holds the pieces of routedeck that never touch a terminal,
//! a socket or a child process:
//! - Device records as reported by the route provider
//! - Discovery snapshots and their change fingerprints
//! - The action vocabulary and the rule table that maps OS tags to it
//! - Common error types

pub mod capability;
pub mod error;
pub mod types;

pub use capability::{classify, is_recognized, Action, ActionEntry, Availability, CapabilityProfile, Platform};
pub use error::{CoreError, Result};
pub use types::{DeviceRecord, DiscoverySnapshot, Fingerprint};
