//! External program launching.
//!
//! Launches are fire-and-forget: the console waits for a program to start,
//! never for it to exit. The one exception is [`Launcher::run`], used for
//! short helper commands whose effect the next step depends on.

use std::io;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::error::LaunchError;

/// Starts browsers, terminals and client programs.
pub trait Launcher: Send + Sync {
    /// Open a URL with the system default handler.
    fn open_url(&self, url: &str) -> Result<(), LaunchError>;

    /// Start a program in the background.
    fn spawn(&self, program: &str, args: &[String]) -> Result<(), LaunchError>;

    /// Start a console program in a new terminal window.
    fn spawn_in_terminal(&self, program: &str, args: &[String]) -> Result<(), LaunchError>;

    /// Run a short program to completion and check its exit status.
    fn run(&self, program: &str, args: &[String]) -> Result<(), LaunchError>;
}

impl<T: Launcher + ?Sized> Launcher for Arc<T> {
    fn open_url(&self, url: &str) -> Result<(), LaunchError> {
        (**self).open_url(url)
    }

    fn spawn(&self, program: &str, args: &[String]) -> Result<(), LaunchError> {
        (**self).spawn(program, args)
    }

    fn spawn_in_terminal(&self, program: &str, args: &[String]) -> Result<(), LaunchError> {
        (**self).spawn_in_terminal(program, args)
    }

    fn run(&self, program: &str, args: &[String]) -> Result<(), LaunchError> {
        (**self).run(program, args)
    }
}

fn spawn_error(program: &str, source: io::Error) -> LaunchError {
    if source.kind() == io::ErrorKind::NotFound {
        LaunchError::NotFound {
            program: program.to_string(),
        }
    } else {
        LaunchError::Spawn {
            program: program.to_string(),
            source,
        }
    }
}

// ── System launcher ───────────────────────────────────────────────

/// Launches real processes on the host.
#[derive(Debug, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }

    fn detached(program: &str, args: &[String]) -> Result<(), LaunchError> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(program, e))?;
        if let Err(e) = reap(child) {
            tracing::warn!(program, error = %e, "Failed to start reaper thread");
        }
        Ok(())
    }
}

/// Wait for a detached child on its own thread so it never lingers as a
/// zombie. The console itself never looks at the result.
fn reap(mut child: Child) -> io::Result<JoinHandle<io::Result<ExitStatus>>> {
    thread::Builder::new()
        .name(format!("reap-{}", child.id()))
        .spawn(move || child.wait())
}

/// `start` treats its first quoted argument as a window title.
#[cfg(windows)]
fn start_args(target: &str, args: &[String]) -> Vec<String> {
    let mut all = vec!["/C".to_string(), "start".to_string(), String::new(), target.to_string()];
    all.extend(args.iter().cloned());
    all
}

#[cfg(windows)]
fn url_command(url: &str) -> (&'static str, Vec<String>) {
    ("cmd", start_args(url, &[]))
}

#[cfg(target_os = "macos")]
fn url_command(url: &str) -> (&'static str, Vec<String>) {
    ("open", vec![url.to_string()])
}

#[cfg(not(any(windows, target_os = "macos")))]
fn url_command(url: &str) -> (&'static str, Vec<String>) {
    ("xdg-open", vec![url.to_string()])
}

#[cfg(windows)]
fn terminal_command(program: &str, args: &[String]) -> (&'static str, Vec<String>) {
    ("cmd", start_args(program, args))
}

#[cfg(target_os = "macos")]
fn terminal_command(program: &str, args: &[String]) -> (&'static str, Vec<String>) {
    let mut all = vec!["-a".to_string(), "Terminal".to_string(), program.to_string()];
    if !args.is_empty() {
        all.push("--args".to_string());
        all.extend(args.iter().cloned());
    }
    ("open", all)
}

#[cfg(not(any(windows, target_os = "macos")))]
fn terminal_command(program: &str, args: &[String]) -> (&'static str, Vec<String>) {
    let mut all = vec!["-e".to_string(), program.to_string()];
    all.extend(args.iter().cloned());
    ("x-terminal-emulator", all)
}

impl Launcher for SystemLauncher {
    fn open_url(&self, url: &str) -> Result<(), LaunchError> {
        tracing::info!(url, "Opening URL");
        let (opener, args) = url_command(url);
        Self::detached(opener, &args)
    }

    fn spawn(&self, program: &str, args: &[String]) -> Result<(), LaunchError> {
        tracing::info!(program, ?args, "Starting program");
        Self::detached(program, args)
    }

    fn spawn_in_terminal(&self, program: &str, args: &[String]) -> Result<(), LaunchError> {
        tracing::info!(program, ?args, "Starting program in new terminal");
        let (terminal, all) = terminal_command(program, args);
        Self::detached(terminal, &all)
    }

    fn run(&self, program: &str, args: &[String]) -> Result<(), LaunchError> {
        tracing::debug!(program, "Running helper command");
        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| spawn_error(program, e))?;
        if status.success() {
            Ok(())
        } else {
            Err(LaunchError::Failed {
                program: program.to_string(),
                code: status.code().unwrap_or(-1),
            })
        }
    }
}

// ── Dry-run launcher ──────────────────────────────────────────────

/// A launch the dry-run launcher would have performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    Url(String),
    Process { program: String, args: Vec<String> },
    Terminal { program: String, args: Vec<String> },
    Run { program: String, args: Vec<String> },
}

/// Records launches instead of performing them.
#[derive(Debug, Default)]
pub struct DryRunLauncher {
    launches: Mutex<Vec<Launch>>,
}

impl DryRunLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn launches(&self) -> Vec<Launch> {
        self.launches
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default()
    }

    fn record(&self, launch: Launch) {
        tracing::info!(?launch, "Dry run: launch skipped");
        if let Ok(mut launches) = self.launches.lock() {
            launches.push(launch);
        }
    }
}

impl Launcher for DryRunLauncher {
    fn open_url(&self, url: &str) -> Result<(), LaunchError> {
        self.record(Launch::Url(url.to_string()));
        Ok(())
    }

    fn spawn(&self, program: &str, args: &[String]) -> Result<(), LaunchError> {
        self.record(Launch::Process {
            program: program.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }

    fn spawn_in_terminal(&self, program: &str, args: &[String]) -> Result<(), LaunchError> {
        self.record(Launch::Terminal {
            program: program.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }

    fn run(&self, program: &str, args: &[String]) -> Result<(), LaunchError> {
        self.record(Launch::Run {
            program: program.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_records_in_order() {
        let launcher = DryRunLauncher::new();
        launcher.open_url("https://10.0.0.1/config").unwrap();
        launcher
            .spawn_in_terminal("ssh", &["admin@10.0.0.1".to_string()])
            .unwrap();
        assert_eq!(
            launcher.launches(),
            vec![
                Launch::Url("https://10.0.0.1/config".to_string()),
                Launch::Terminal {
                    program: "ssh".to_string(),
                    args: vec!["admin@10.0.0.1".to_string()],
                },
            ]
        );
    }

    #[test]
    fn shared_launcher_records_through_arc() {
        let launcher = Arc::new(DryRunLauncher::new());
        let shared: Arc<DryRunLauncher> = launcher.clone();
        shared.spawn("mstsc", &[]).unwrap();
        assert_eq!(launcher.launches().len(), 1);
    }

    #[test]
    fn missing_program_is_not_found() {
        let result = SystemLauncher::new().spawn("routedeck-no-such-program", &[]);
        assert!(matches!(result, Err(LaunchError::NotFound { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn detached_child_is_reaped() {
        let child = Command::new("sh")
            .args(["-c", "exit 3"])
            .spawn()
            .unwrap();
        let status = reap(child).unwrap().join().unwrap().unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn spawn_returns_without_waiting() {
        let started = std::time::Instant::now();
        SystemLauncher::new()
            .spawn("sleep", &["2".to_string()])
            .unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(1));
    }

    #[test]
    fn run_reports_missing_program() {
        let result = SystemLauncher::new().run("routedeck-no-such-program", &[]);
        assert!(matches!(result, Err(LaunchError::NotFound { .. })));
    }
}
