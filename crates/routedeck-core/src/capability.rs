//! Capability classification.
//!
//! Maps a device's free-text OS tag to the platform it runs and the
//! connection actions the console offers for it. Classification is an
//! ordered rule table evaluated first-match-wins; a tag that matches no
//! rule still yields a profile, just an inert one.

use serde::Serialize;

use crate::types::DeviceRecord;

// ── Actions ───────────────────────────────────────────────────────

/// A connection action the operator can pick from a device menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Action {
    OpenManagementPage,
    StartRemoteDesktop,
    StartShell,
    StartFileTransfer,
    StartShellAndFileTransfer,
}

/// Whether an action's transport was seen listening at menu time.
///
/// Purely advisory: an unavailable action can still be selected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Availability {
    #[default]
    Unknown,
    Available,
    Unavailable,
}

/// One numbered line of a device menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionEntry {
    pub action: Action,
    pub label: &'static str,
    pub availability: Availability,
}

impl ActionEntry {
    fn new(action: Action, label: &'static str) -> Self {
        Self {
            action,
            label,
            availability: Availability::Unknown,
        }
    }
}

// ── Platforms ─────────────────────────────────────────────────────

/// The runtime platform a device was classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Platform {
    Windows,
    TcBsd,
    TcRtos,
    Linux,
    WindowsCe,
    Unknown,
}

impl Platform {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::TcBsd => "TwinCAT/BSD",
            Self::TcRtos => "TwinCAT/RTOS",
            Self::Linux => "Linux",
            Self::WindowsCe => "Windows CE",
            Self::Unknown => "unknown",
        }
    }

    /// Remote desktop on this platform goes through the vendor
    /// remote-display helper rather than RDP.
    pub fn uses_remote_display(&self) -> bool {
        matches!(self, Self::WindowsCe)
    }

    /// Shell sessions need the hardened key exchange / MAC override.
    pub fn hardened_ssh(&self) -> bool {
        matches!(self, Self::Linux)
    }
}

// ── Profile ───────────────────────────────────────────────────────

/// Actions and management URL computed for one selected device.
///
/// Built fresh on every selection; never cached across polls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityProfile {
    pub platform: Platform,
    pub management_url: String,
    pub entries: Vec<ActionEntry>,
    pub recognized: bool,
}

impl CapabilityProfile {
    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.entries.iter().map(|e| e.action)
    }

    /// Resolve a 1-based menu choice as typed by the operator.
    pub fn choose(&self, choice: &str) -> Option<Action> {
        let number: usize = choice.trim().parse().ok()?;
        number
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .map(|e| e.action)
    }

    pub fn entry(&self, action: Action) -> Option<&ActionEntry> {
        self.entries.iter().find(|e| e.action == action)
    }

    /// Record a probe result against an action, if the profile offers it.
    pub fn annotate(&mut self, action: Action, availability: Availability) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.action == action) {
            entry.availability = availability;
        }
    }
}

// ── Rule table ────────────────────────────────────────────────────

enum Matcher {
    Prefix(&'static str),
    Contains(&'static str),
}

impl Matcher {
    /// Case-insensitive match against an already lowercased tag.
    fn matches(&self, lowered_tag: &str) -> bool {
        match self {
            Self::Prefix(p) => lowered_tag.starts_with(p),
            Self::Contains(s) => lowered_tag.contains(s),
        }
    }
}

struct Rule {
    matcher: Matcher,
    build: fn(&DeviceRecord) -> CapabilityProfile,
}

/// Evaluated top to bottom; the first matching rule wins. Needles are lowercase.
const RULES: &[Rule] = &[
    Rule {
        matcher: Matcher::Prefix("win"),
        build: windows,
    },
    Rule {
        matcher: Matcher::Prefix("tcbsd"),
        build: tc_bsd,
    },
    Rule {
        matcher: Matcher::Prefix("tcrtos"),
        build: tc_rtos,
    },
    Rule {
        matcher: Matcher::Contains("linux"),
        build: linux,
    },
    Rule {
        matcher: Matcher::Contains("ce"),
        build: windows_ce,
    },
];

/// Classify a device by its OS tag. Total: never fails.
pub fn classify(record: &DeviceRecord) -> CapabilityProfile {
    let tag = record.os_tag.to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.matcher.matches(&tag))
        .map(|rule| (rule.build)(record))
        .unwrap_or_else(|| {
            tracing::debug!(device = %record.name, os_tag = %record.os_tag, "No capability rule matched");
            unrecognized()
        })
}

fn management_url(scheme: &str, record: &DeviceRecord, path: &str) -> String {
    format!("{scheme}://{}{path}", record.address)
}

fn web_page() -> ActionEntry {
    ActionEntry::new(Action::OpenManagementPage, "Open device manager web page")
}

fn shell_entries() -> Vec<ActionEntry> {
    vec![
        web_page(),
        ActionEntry::new(Action::StartShell, "Open SSH session"),
        ActionEntry::new(Action::StartFileTransfer, "Open SFTP file transfer"),
        ActionEntry::new(Action::StartShellAndFileTransfer, "Open SSH and SFTP"),
    ]
}

fn windows(record: &DeviceRecord) -> CapabilityProfile {
    CapabilityProfile {
        platform: Platform::Windows,
        management_url: management_url("https", record, "/config"),
        entries: vec![
            web_page(),
            ActionEntry::new(Action::StartRemoteDesktop, "Start remote desktop (RDP)"),
        ],
        recognized: true,
    }
}

fn tc_bsd(record: &DeviceRecord) -> CapabilityProfile {
    CapabilityProfile {
        platform: Platform::TcBsd,
        management_url: management_url("https", record, ""),
        entries: shell_entries(),
        recognized: true,
    }
}

fn tc_rtos(record: &DeviceRecord) -> CapabilityProfile {
    CapabilityProfile {
        platform: Platform::TcRtos,
        management_url: management_url("http", record, "/config"),
        entries: vec![web_page()],
        recognized: true,
    }
}

fn linux(record: &DeviceRecord) -> CapabilityProfile {
    CapabilityProfile {
        platform: Platform::Linux,
        management_url: management_url("https", record, ""),
        entries: shell_entries(),
        recognized: true,
    }
}

fn windows_ce(record: &DeviceRecord) -> CapabilityProfile {
    CapabilityProfile {
        platform: Platform::WindowsCe,
        management_url: management_url("https", record, "/config"),
        entries: vec![
            web_page(),
            ActionEntry::new(Action::StartRemoteDesktop, "Start remote display (CERHost)"),
        ],
        recognized: true,
    }
}

fn unrecognized() -> CapabilityProfile {
    CapabilityProfile {
        platform: Platform::Unknown,
        management_url: String::new(),
        entries: Vec::new(),
        recognized: false,
    }
}

/// Whether an OS tag is covered by the rule table.
pub fn is_recognized(os_tag: &str) -> bool {
    let tag = os_tag.to_lowercase();
    RULES.iter().any(|rule| rule.matcher.matches(&tag))
}
