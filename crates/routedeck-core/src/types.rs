//! Device records, discovery snapshots and snapshot fingerprints.
//!
//! A snapshot is rebuilt from scratch on every poll; records are never
//! mutated after the provider hands them over.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

// ── Device ────────────────────────────────────────────────────────

/// One device on the route table.
///
/// Field aliases accept both the PowerShell `Get-AdsRoute` property names
/// and camelCase JSON. `ConvertTo-Json` writes `null` for unset
/// properties, which reads the same as a missing field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceRecord {
    #[serde(alias = "Name", deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(default, alias = "Address", deserialize_with = "null_as_default")]
    pub address: String,

    #[serde(
        alias = "NetId",
        alias = "networkId",
        alias = "AmsNetId",
        deserialize_with = "null_as_default"
    )]
    pub net_id: String,

    #[serde(
        default,
        alias = "RTSystem",
        alias = "osTag",
        deserialize_with = "null_as_default"
    )]
    pub os_tag: String,

    #[serde(
        default,
        alias = "IsLocal",
        alias = "isLocal",
        deserialize_with = "null_as_default"
    )]
    pub is_local: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl DeviceRecord {
    pub fn new(name: &str, address: &str, net_id: &str, os_tag: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            net_id: net_id.to_string(),
            os_tag: os_tag.to_string(),
            is_local: false,
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────

/// The ordered, filtered device list produced by one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscoverySnapshot {
    devices: Vec<DeviceRecord>,
}

impl DiscoverySnapshot {
    /// Build a snapshot from raw provider output.
    ///
    /// Drops routes flagged local or carrying the local net id, then sorts
    /// by name ignoring case. Ties fall back to the exact name, then the
    /// net id, so the order is total.
    pub fn from_routes(routes: Vec<DeviceRecord>, local_net_id: Option<&str>) -> Self {
        let mut devices: Vec<DeviceRecord> = routes
            .into_iter()
            .filter(|r| !r.is_local)
            .filter(|r| local_net_id != Some(r.net_id.as_str()))
            .collect();
        devices.sort_by_cached_key(|d| (d.name.to_lowercase(), d.name.clone(), d.net_id.clone()));
        Self { devices }
    }

    /// Take devices in the given order, without filtering or sorting.
    pub fn from_ordered(devices: Vec<DeviceRecord>) -> Self {
        Self { devices }
    }

    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Look up a displayed row. Rows are 1-based.
    pub fn row(&self, number: usize) -> Option<&DeviceRecord> {
        number.checked_sub(1).and_then(|i| self.devices.get(i))
    }

    /// Content fingerprint of the ordered device list.
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        Fingerprint::of(self)
    }
}

// ── Fingerprint ───────────────────────────────────────────────────

/// BLAKE3 digest (hex) of a snapshot's canonical JSON form.
///
/// Only used to decide whether the table needs redrawing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn of(snapshot: &DiscoverySnapshot) -> Result<Self> {
        let json = serde_json::to_vec(&snapshot.devices)?;
        Ok(Self(blake3::hash(&json).to_hex().to_string()))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
