//! Connection dispatch: turns a chosen action into external launches.
//!
//! Nothing here returns an error to the caller. Every failure becomes a
//! warning in the [`DispatchReport`], plus a fallback launch where one
//! exists (the file transfer client's download page).

use std::path::PathBuf;

use routedeck_core::{Action, CapabilityProfile, DeviceRecord, Platform};

use crate::config::{ConsoleConfig, RdpConfig};
use crate::launcher::Launcher;
use crate::probe::probe;
use crate::provision::HelperProvisioner;

/// Key exchange algorithms offered to Linux targets.
const HARDENED_KEX: &str = "curve25519-sha256,curve25519-sha256@libssh.org,diffie-hellman-group16-sha512";
/// MACs offered to Linux targets.
const HARDENED_MACS: &str = "hmac-sha2-512-etm@openssh.com,hmac-sha2-256-etm@openssh.com";
/// TwinCAT/BSD has no sudo; the SFTP server is started through doas.
const BSD_SFTP_SERVER: &str = "SftpServer=doas%20/usr/libexec/sftp-server";

/// What happened when an action was dispatched.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// At least one external program was started.
    pub started: bool,
    pub warnings: Vec<String>,
}

impl DispatchReport {
    fn started() -> Self {
        Self {
            started: true,
            warnings: Vec::new(),
        }
    }

    fn warning(message: String) -> Self {
        tracing::warn!(warning = %message, "Dispatch degraded");
        Self {
            started: false,
            warnings: vec![message],
        }
    }

    fn merge(mut self, other: DispatchReport) -> Self {
        self.started |= other.started;
        self.warnings.extend(other.warnings);
        self
    }
}

/// Result of the pre-launch check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchPlan {
    /// Go ahead with the chosen action.
    Ready(Action),
    /// The chosen action's transport is down. The operator has to confirm
    /// before `fallback` is dispatched in its place.
    ConfirmFallback {
        requested: Action,
        fallback: Action,
        warning: String,
    },
}

pub struct Dispatcher<L> {
    launcher: L,
    config: ConsoleConfig,
    helper: HelperProvisioner,
}

impl<L: Launcher> Dispatcher<L> {
    pub fn new(launcher: L, config: ConsoleConfig) -> Self {
        let helper = HelperProvisioner::new(&config.helper);
        Self {
            launcher,
            config,
            helper,
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Whether the remote-display helper is already on disk.
    pub fn helper_cached(&self) -> bool {
        self.helper.is_cached()
    }

    /// Probe the vendor remote-display port on `device`.
    pub async fn remote_display_listening(&self, device: &DeviceRecord) -> bool {
        probe(
            &device.address,
            self.config.remote_display_port,
            self.config.probe_timeout(),
        )
        .await
    }

    /// Check an action before launching it.
    ///
    /// Remote display is re-probed here, since the menu-time probe may be
    /// stale. If the port is closed the plan asks for confirmation to fall
    /// back to the management page.
    pub async fn plan(
        &self,
        device: &DeviceRecord,
        profile: &CapabilityProfile,
        action: Action,
    ) -> DispatchPlan {
        if action != Action::StartRemoteDesktop || !profile.platform.uses_remote_display() {
            return DispatchPlan::Ready(action);
        }
        if self.remote_display_listening(device).await {
            return DispatchPlan::Ready(action);
        }
        DispatchPlan::ConfirmFallback {
            requested: action,
            fallback: Action::OpenManagementPage,
            warning: remote_display_remediation(device, self.config.remote_display_port),
        }
    }

    /// Launch `action` against `device`.
    pub async fn dispatch(
        &self,
        device: &DeviceRecord,
        profile: &CapabilityProfile,
        action: Action,
    ) -> DispatchReport {
        if profile.entry(action).is_none() {
            return DispatchReport::warning(format!(
                "{action:?} is not supported for {} ({})",
                device.name,
                profile.platform.name()
            ));
        }

        tracing::info!(device = %device.name, address = %device.address, ?action, "Dispatching");
        match action {
            Action::OpenManagementPage => self.open_management_page(profile),
            Action::StartRemoteDesktop if profile.platform.uses_remote_display() => {
                self.start_remote_display(device).await
            }
            Action::StartRemoteDesktop => self.start_rdp(device),
            Action::StartShell => self.start_shell(device, profile.platform),
            Action::StartFileTransfer => self.start_file_transfer(device, profile.platform),
            Action::StartShellAndFileTransfer => self
                .start_shell(device, profile.platform)
                .merge(self.start_file_transfer(device, profile.platform)),
        }
    }

    fn open_management_page(&self, profile: &CapabilityProfile) -> DispatchReport {
        match self.launcher.open_url(&profile.management_url) {
            Ok(()) => DispatchReport::started(),
            Err(e) => DispatchReport::warning(format!(
                "Could not open {}: {e}",
                profile.management_url
            )),
        }
    }

    fn start_rdp(&self, device: &DeviceRecord) -> DispatchReport {
        let rdp = &self.config.rdp;
        let mut report = DispatchReport::default();

        // A missing credential only means the client will prompt.
        if let Err(e) = self.launcher.run("cmdkey", &cmdkey_args(&device.address, rdp)) {
            report.warnings.push(format!("Could not store RDP credential: {e}"));
            tracing::warn!(address = %device.address, error = %e, "cmdkey failed");
        }

        let descriptor = match write_rdp_descriptor(&device.address, rdp) {
            Ok(path) => path,
            Err(e) => {
                return report.merge(DispatchReport::warning(format!(
                    "Could not write RDP session file: {e}"
                )))
            }
        };

        let args = vec![descriptor.display().to_string()];
        match self.launcher.spawn(&rdp.client, &args) {
            Ok(()) => report.merge(DispatchReport::started()),
            Err(e) => report.merge(DispatchReport::warning(format!(
                "Could not start remote desktop client: {e}"
            ))),
        }
    }

    async fn start_remote_display(&self, device: &DeviceRecord) -> DispatchReport {
        let helper = match self.helper.ensure().await {
            Ok(path) => path,
            Err(e) => {
                return DispatchReport::warning(format!(
                    "Could not provision remote-display client from {}: {e}",
                    self.config.helper.url
                ))
            }
        };

        let program = helper.display().to_string();
        match self.launcher.spawn(&program, &[device.address.clone()]) {
            Ok(()) => DispatchReport::started(),
            Err(e) => DispatchReport::warning(format!("Could not start remote display: {e}")),
        }
    }

    fn start_shell(&self, device: &DeviceRecord, platform: Platform) -> DispatchReport {
        let args = ssh_args(&self.config.ssh.user, &device.address, platform);
        match self.launcher.spawn_in_terminal(&self.config.ssh.client, &args) {
            Ok(()) => DispatchReport::started(),
            Err(e) => DispatchReport::warning(format!("Could not start SSH session: {e}")),
        }
    }

    fn start_file_transfer(&self, device: &DeviceRecord, platform: Platform) -> DispatchReport {
        let sftp = &self.config.sftp;
        let Some(client) = resolve_program(&sftp.client_path) else {
            let mut report = DispatchReport::warning(format!(
                "File transfer client not found at {}; opening its download page",
                sftp.client_path
            ));
            if let Err(e) = self.launcher.open_url(&sftp.download_page) {
                report
                    .warnings
                    .push(format!("Could not open {}: {e}", sftp.download_page));
            }
            return report;
        };

        let args = sftp_args(&self.config.ssh.user, &device.address, platform);
        match self.launcher.spawn(&client.display().to_string(), &args) {
            Ok(()) => DispatchReport::started(),
            Err(e) => DispatchReport::warning(format!("Could not start file transfer client: {e}")),
        }
    }
}

fn remote_display_remediation(device: &DeviceRecord, port: u16) -> String {
    format!(
        "Remote display is not reachable on {}:{port}. To enable it, open the \
         device manager page, turn on Remote Display under the device settings, \
         and reboot the device.",
        device.address
    )
}

/// Configured path if it exists, otherwise a PATH lookup of its file name.
fn resolve_program(path: &str) -> Option<PathBuf> {
    let candidate = PathBuf::from(path);
    if candidate.is_file() {
        return Some(candidate);
    }
    // The default path uses Windows separators; take the last component by hand.
    let name = path.rsplit(['/', '\\']).next().filter(|n| !n.is_empty())?;
    which::which(name).ok()
}

fn cmdkey_args(address: &str, rdp: &RdpConfig) -> Vec<String> {
    vec![
        format!("/generic:TERMSRV/{address}"),
        format!("/user:{}", rdp.user),
        format!("/pass:{}", rdp.password),
    ]
}

/// Minimal `.rdp` session descriptor.
pub fn rdp_descriptor(address: &str, rdp: &RdpConfig) -> String {
    [
        format!("full address:s:{address}"),
        format!("username:s:{}", rdp.user),
        "screen mode id:i:1".to_string(),
        format!("desktopwidth:i:{}", rdp.width),
        format!("desktopheight:i:{}", rdp.height),
        format!("session bpp:i:{}", rdp.color_depth),
        "smart sizing:i:1".to_string(),
        "prompt for credentials:i:0".to_string(),
        "authentication level:i:2".to_string(),
    ]
    .join("\r\n")
}

/// Descriptor location for `address`. One file per host, overwritten on
/// every launch, so repeated sessions do not pile up in the temp dir.
pub fn rdp_descriptor_path(address: &str) -> PathBuf {
    let host: String = address
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    std::env::temp_dir().join(format!("routedeck-{host}.rdp"))
}

/// Write the descriptor where the client can read it after we return.
fn write_rdp_descriptor(address: &str, rdp: &RdpConfig) -> std::io::Result<PathBuf> {
    let path = rdp_descriptor_path(address);
    std::fs::write(&path, rdp_descriptor(address, rdp))?;
    Ok(path)
}

pub fn ssh_args(user: &str, address: &str, platform: Platform) -> Vec<String> {
    let mut args = Vec::new();
    if platform.hardened_ssh() {
        args.push("-o".to_string());
        args.push(format!("KexAlgorithms={HARDENED_KEX}"));
        args.push("-o".to_string());
        args.push(format!("MACs={HARDENED_MACS}"));
    }
    args.push(format!("{user}@{address}"));
    args
}

pub fn sftp_args(user: &str, address: &str, platform: Platform) -> Vec<String> {
    let mut args = vec![format!("sftp://{user}@{address}/")];
    if platform == Platform::TcBsd {
        args.push("/rawsettings".to_string());
        args.push(BSD_SFTP_SERVER.to_string());
    }
    args
}
