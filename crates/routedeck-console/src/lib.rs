//! routedeck-console: Interactive route table console.
//!
//! Polls the route provider, shows the reachable devices in a table that
//! is only redrawn when it changes, and on selection launches a management
//! page, remote desktop, remote display, SSH or SFTP session against the
//! chosen device.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod input;
pub mod launcher;
pub mod orchestrator;
pub mod probe;
pub mod provider;
pub mod provision;
pub mod render;
