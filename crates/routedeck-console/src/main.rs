//! CLI entry point for the routedeck console.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use routedeck_console::config::{self, ConsoleConfig};
use routedeck_console::input::TerminalKeys;
use routedeck_console::launcher::{DryRunLauncher, Launcher, SystemLauncher};
use routedeck_console::orchestrator::Orchestrator;
use routedeck_console::provider;

#[derive(Parser)]
#[command(name = "routedeck")]
#[command(about = "Discover devices on the ADS route table and open sessions to them")]
struct Cli {
    /// Input inactivity timeout in seconds.
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Path to the SFTP client executable.
    #[arg(long)]
    sftp_client: Option<String>,

    /// Where the remote-display helper is cached.
    #[arg(long)]
    helper_path: Option<PathBuf>,

    /// Remote desktop user.
    #[arg(short, long)]
    user: Option<String>,

    /// Remote desktop password.
    #[arg(short, long)]
    password: Option<String>,

    /// SSH and SFTP user.
    #[arg(long)]
    ssh_user: Option<String>,

    /// Read routes from a JSON file instead of querying the router.
    #[arg(long)]
    routes_file: Option<PathBuf>,

    /// Config file prefix (default: routedeck).
    #[arg(short, long, default_value = "routedeck")]
    config: String,

    /// Log as JSON lines on stderr.
    #[arg(long)]
    log_json: bool,

    /// Print what would be launched instead of launching it.
    #[arg(long)]
    dry_run: bool,
}

impl Cli {
    fn apply(&self, config: &mut ConsoleConfig) {
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(client) = &self.sftp_client {
            config.sftp.client_path = client.clone();
        }
        if let Some(path) = &self.helper_path {
            config.helper.path = path.clone();
        }
        if let Some(user) = &self.user {
            config.rdp.user = user.clone();
        }
        if let Some(password) = &self.password {
            config.rdp.password = password.clone();
        }
        if let Some(user) = &self.ssh_user {
            config.ssh.user = user.clone();
        }
        if let Some(path) = &self.routes_file {
            config.provider.routes_file = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut console_config = config::load(&cli.config)?;
    cli.apply(&mut console_config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&console_config.log_level));
    // Logs go to stderr so they never interleave with the table on stdout.
    if cli.log_json {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::info!(
        timeout_secs = console_config.timeout_secs,
        routes_file = ?console_config.provider.routes_file,
        dry_run = cli.dry_run,
        "Configuration loaded"
    );

    if cli.dry_run {
        let launcher = Arc::new(DryRunLauncher::new());
        run(console_config, launcher.clone()).await?;
        for launch in launcher.launches() {
            println!("would launch: {launch:?}");
        }
    } else {
        run(console_config, SystemLauncher::new()).await?;
    }

    Ok(())
}

async fn run<L: Launcher>(config: ConsoleConfig, launcher: L) -> anyhow::Result<()> {
    let routes = provider::from_config(&config.provider);
    let mut orchestrator = Orchestrator::new(
        config,
        routes,
        TerminalKeys::new(),
        std::io::stdout(),
        launcher,
    );
    orchestrator.run().await?;
    Ok(())
}
