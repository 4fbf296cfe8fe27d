//! The console loop.
//!
//! One cycle: poll the provider, draw the table if it changed, wait for a
//! selection, then show a menu and dispatch. The only state carried between
//! cycles is the fingerprint of what is on screen, passed in and returned
//! by [`Orchestrator::cycle`]. Dropping it forces a full redraw.

use std::io::Write;

use routedeck_core::{classify, Action, Availability, DeviceRecord, DiscoverySnapshot, Fingerprint};

use crate::config::ConsoleConfig;
use crate::dispatch::{DispatchPlan, DispatchReport, Dispatcher};
use crate::error::Result;
use crate::input::{InputReader, KeySource, LineInput};
use crate::launcher::Launcher;
use crate::provider::{poll_snapshot, RouteProvider};
use crate::render::{should_redraw, Console};

/// Outcome of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Poll again. Carries the fingerprint now on screen, or `None` if the
    /// next cycle must redraw.
    Continue(Option<Fingerprint>),
    /// The operator asked to leave.
    Exit,
}

pub struct Orchestrator<P, K, W, L> {
    provider: P,
    input: InputReader<K>,
    console: Console<W>,
    dispatcher: Dispatcher<L>,
    config: ConsoleConfig,
}

impl<P, K, W, L> Orchestrator<P, K, W, L>
where
    P: RouteProvider,
    K: KeySource,
    W: Write,
    L: Launcher,
{
    pub fn new(config: ConsoleConfig, provider: P, keys: K, out: W, launcher: L) -> Self {
        Self {
            provider,
            input: InputReader::new(keys, config.poll_tick()),
            console: Console::new(out),
            dispatcher: Dispatcher::new(launcher, config.clone()),
            config,
        }
    }

    pub fn output(&self) -> &W {
        self.console.output()
    }

    pub fn launcher(&self) -> &L {
        self.dispatcher.launcher()
    }

    pub fn keys(&self) -> &K {
        self.input.keys()
    }

    /// Run cycles until the operator exits.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(timeout_secs = self.config.timeout_secs, "Console started");
        let mut on_screen = None;
        loop {
            match self.cycle(on_screen).await? {
                Step::Continue(next) => on_screen = next,
                Step::Exit => {
                    tracing::info!("Exit requested");
                    return Ok(());
                }
            }
        }
    }

    /// One pass of the state machine.
    pub async fn cycle(&mut self, on_screen: Option<Fingerprint>) -> Result<Step> {
        let (snapshot, provider_error) = self.poll().await;

        if snapshot.is_empty() {
            return self.no_targets(provider_error.as_deref()).await;
        }

        let (redraw, fingerprint) = should_redraw(on_screen.as_ref(), &snapshot);
        if redraw {
            tracing::debug!(devices = snapshot.len(), "Snapshot changed, redrawing");
            self.console.show_table(&snapshot)?;
        }

        match self.read(false).await? {
            LineInput::Exit => Ok(Step::Exit),
            LineInput::Empty | LineInput::Refresh => Ok(Step::Continue(fingerprint)),
            LineInput::Text(text) => {
                // Resolve against the snapshot that is on screen, not a newer one.
                match parse_row(&text).and_then(|row| snapshot.row(row)) {
                    Some(device) => self.selected(device).await,
                    None => {
                        tracing::info!(input = %text, devices = snapshot.len(), "Invalid selection");
                        self.warn_and_pause(&format!(
                            "Invalid selection '{text}'. Enter a number between 1 and {}.",
                            snapshot.len()
                        ))
                        .await?;
                        Ok(Step::Continue(None))
                    }
                }
            }
        }
    }

    /// Poll the provider. A provider failure reads as an empty table.
    async fn poll(&self) -> (DiscoverySnapshot, Option<String>) {
        match poll_snapshot(&self.provider).await {
            Ok(snapshot) => (snapshot, None),
            Err(e) => {
                tracing::warn!(error = %e, "Route discovery failed");
                (DiscoverySnapshot::default(), Some(e.to_string()))
            }
        }
    }

    async fn no_targets(&mut self, provider_error: Option<&str>) -> Result<Step> {
        self.console
            .show_no_targets(self.config.timeout_secs, provider_error)?;
        match self.read(true).await? {
            LineInput::Exit => Ok(Step::Exit),
            _ => Ok(Step::Continue(None)),
        }
    }

    /// Menu and dispatch for one selected device. Always ends in a full
    /// redraw, whatever happened.
    async fn selected(&mut self, device: &DeviceRecord) -> Result<Step> {
        let mut profile = classify(device);
        if !profile.recognized {
            tracing::info!(device = %device.name, os_tag = %device.os_tag, "Unsupported device type");
            self.warn_and_pause(&format!(
                "Unsupported device type '{}' for {}.",
                device.os_tag, device.name
            ))
            .await?;
            return Ok(Step::Continue(None));
        }

        if profile.platform.uses_remote_display() {
            let availability = if self.dispatcher.remote_display_listening(device).await {
                Availability::Available
            } else {
                Availability::Unavailable
            };
            profile.annotate(Action::StartRemoteDesktop, availability);
        }

        self.console.show_menu(device, &profile)?;
        let choice = match self.read(false).await? {
            LineInput::Exit => return Ok(Step::Exit),
            LineInput::Empty | LineInput::Refresh => return Ok(Step::Continue(None)),
            LineInput::Text(text) => text,
        };

        let Some(action) = profile.choose(&choice) else {
            tracing::info!(input = %choice, device = %device.name, "Invalid menu choice");
            self.warn_and_pause(&format!("Invalid choice '{choice}'."))
                .await?;
            return Ok(Step::Continue(None));
        };

        let action = match self.dispatcher.plan(device, &profile, action).await {
            DispatchPlan::Ready(action) => action,
            DispatchPlan::ConfirmFallback {
                requested,
                fallback,
                warning,
            } => {
                self.console.warn(&warning)?;
                self.console
                    .prompt("Open the device manager page instead? [y/N]: ")?;
                match self.read(false).await? {
                    LineInput::Exit => return Ok(Step::Exit),
                    LineInput::Text(answer) if is_yes(&answer) => {
                        tracing::info!(
                            device = %device.name,
                            from = ?requested,
                            to = ?fallback,
                            "Action downgraded after confirmation"
                        );
                        fallback
                    }
                    _ => {
                        self.console.info("Cancelled.")?;
                        return Ok(Step::Continue(None));
                    }
                }
            }
        };

        if action == Action::StartRemoteDesktop
            && profile.platform.uses_remote_display()
            && !self.dispatcher.helper_cached()
        {
            self.console
                .info("Fetching the remote display client (first use)...")?;
        }

        let report = self.dispatcher.dispatch(device, &profile, action).await;
        self.report(&report).await?;
        Ok(Step::Continue(None))
    }

    async fn report(&mut self, report: &DispatchReport) -> Result<()> {
        for warning in &report.warnings {
            self.console.warn(warning)?;
        }
        if !report.warnings.is_empty() {
            self.pause().await;
        }
        Ok(())
    }

    async fn read(&mut self, allow_empty_as_refresh: bool) -> Result<LineInput> {
        let timeout = self.config.input_timeout();
        let input = self
            .input
            .read_line(self.console.writer(), timeout, allow_empty_as_refresh)
            .await?;
        Ok(input)
    }

    async fn warn_and_pause(&mut self, message: &str) -> Result<()> {
        self.console.warn(message)?;
        self.pause().await;
        Ok(())
    }

    /// Keep a message on screen before the next redraw clears it.
    async fn pause(&self) {
        let pause = self.config.message_pause();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}

fn parse_row(text: &str) -> Option<usize> {
    text.trim().parse().ok()
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_parse_as_positive_numbers() {
        assert_eq!(parse_row("2"), Some(2));
        assert_eq!(parse_row(" 10 "), Some(10));
        assert_eq!(parse_row("-1"), None);
        assert_eq!(parse_row("two"), None);
    }

    #[test]
    fn confirmation_accepts_y_and_yes() {
        assert!(is_yes("y"));
        assert!(is_yes("YES"));
        assert!(!is_yes("n"));
        assert!(!is_yes("yeah"));
    }
}
