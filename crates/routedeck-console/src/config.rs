//! Configuration for the routedeck console.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConsoleError, Result};

/// Top-level console configuration.
///
/// Loaded from the `[console]` section of `routedeck.toml` and from
/// `ROUTEDECK__CONSOLE__*` environment variables. CLI flags are applied
/// on top by the binary.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsoleConfig {
    /// Inactivity deadline for each input read, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Interval between keystroke checks, in milliseconds.
    #[serde(default = "default_poll_tick_ms")]
    pub poll_tick_ms: u64,

    /// Port probe deadline, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// TCP port of the vendor remote-display service.
    #[serde(default = "default_remote_display_port")]
    pub remote_display_port: u16,

    /// How long warnings stay on screen before the table is redrawn.
    #[serde(default = "default_message_pause_ms")]
    pub message_pause_ms: u64,

    /// Default tracing filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub rdp: RdpConfig,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub sftp: SftpConfig,

    #[serde(default)]
    pub helper: HelperConfig,
}

/// Where the route table comes from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Read routes from this JSON file instead of running `command`.
    pub routes_file: Option<PathBuf>,

    /// Program printing the route table as JSON.
    pub command: String,

    pub args: Vec<String>,

    /// Net id of this machine, if the provider does not flag it.
    pub local_net_id: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            routes_file: None,
            command: "powershell".to_string(),
            args: vec![
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-Command".to_string(),
                "Get-AdsRoute -All | Select-Object Name,Address,NetId,RTSystem,IsLocal | ConvertTo-Json -Compress".to_string(),
            ],
            local_net_id: None,
        }
    }
}

/// Remote desktop credential and session descriptor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RdpConfig {
    pub user: String,
    pub password: String,
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
    pub client: String,
}

impl Default for RdpConfig {
    fn default() -> Self {
        Self {
            user: "Administrator".to_string(),
            password: "1".to_string(),
            width: 1920,
            height: 1080,
            color_depth: 32,
            client: "mstsc".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub user: String,
    pub client: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "Administrator".to_string(),
            client: "ssh".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SftpConfig {
    /// File transfer client executable.
    pub client_path: String,

    /// Opened when the client cannot be found.
    pub download_page: String,
}

impl Default for SftpConfig {
    fn default() -> Self {
        Self {
            client_path: r"C:\Program Files (x86)\WinSCP\WinSCP.exe".to_string(),
            download_page: "https://winscp.net/eng/download.php".to_string(),
        }
    }
}

/// The lazily downloaded remote-display client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    /// Where the cached binary lives.
    pub path: PathBuf,

    /// Archive (or bare executable) to fetch on first use.
    pub url: String,

    /// File name to look for inside the archive.
    pub executable_name: String,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("CERHost.exe"),
            url: "https://infosys.beckhoff.com/content/1033/cx51x0_hw/Resources/5047075211.zip"
                .to_string(),
            executable_name: "CERHost.exe".to_string(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_poll_tick_ms() -> u64 {
    25
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

fn default_remote_display_port() -> u16 {
    987
}

fn default_message_pause_ms() -> u64 {
    1500
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_tick_ms: default_poll_tick_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            remote_display_port: default_remote_display_port(),
            message_pause_ms: default_message_pause_ms(),
            log_level: default_log_level(),
            provider: ProviderConfig::default(),
            rdp: RdpConfig::default(),
            ssh: SshConfig::default(),
            sftp: SftpConfig::default(),
            helper: HelperConfig::default(),
        }
    }
}

impl ConsoleConfig {
    pub fn input_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_tick(&self) -> Duration {
        Duration::from_millis(self.poll_tick_ms.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn message_pause(&self) -> Duration {
        Duration::from_millis(self.message_pause_ms)
    }
}

/// Load the console configuration.
///
/// Sources, lowest priority first: defaults, `<file_prefix>.toml` (optional),
/// `ROUTEDECK__` environment variables.
pub fn load(file_prefix: &str) -> Result<ConsoleConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("ROUTEDECK")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConsoleError::Config(e.to_string()))?;

    match cfg.get::<ConsoleConfig>("console") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(ConsoleConfig::default()),
        Err(e) => Err(ConsoleError::Config(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConsoleConfig::default();
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.remote_display_port, 987);
        assert_eq!(config.probe_timeout_ms, 1000);
        assert_eq!(config.rdp.user, "Administrator");
        assert_eq!(config.helper.executable_name, "CERHost.exe");
        assert!(config.provider.routes_file.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.toml");
        std::fs::write(
            &path,
            r#"
[console]
timeout_secs = 3
remote_display_port = 1987

[console.ssh]
user = "operator"

[console.provider]
routes_file = "routes.json"
"#,
        )
        .unwrap();

        let prefix = dir.path().join("deck");
        let config = load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.remote_display_port, 1987);
        assert_eq!(config.ssh.user, "operator");
        assert_eq!(config.ssh.client, "ssh");
        assert_eq!(
            config.provider.routes_file.as_deref(),
            Some(std::path::Path::new("routes.json"))
        );
        assert_eq!(config.rdp.width, 1920);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        let config = load(prefix.to_str().unwrap()).unwrap();
        assert_eq!(config.timeout_secs, 10);
    }

    #[test]
    fn test_poll_tick_never_zero() {
        let config = ConsoleConfig {
            poll_tick_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.poll_tick(), Duration::from_millis(1));
    }
}
