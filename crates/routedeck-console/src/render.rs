//! Change detection and screen rendering.
//!
//! The table is only redrawn when the snapshot fingerprint moves, or when
//! the loop drops its fingerprint to force a full redraw. Text is built by
//! pure functions so the layout can be checked without a terminal; the
//! [`Console`] adds clearing and colour on top.

use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};

use routedeck_core::{
    is_recognized, Availability, CapabilityProfile, DeviceRecord, DiscoverySnapshot, Fingerprint,
};

const NUMBER_WIDTH: usize = 3;
const NAME_WIDTH: usize = 24;
const ADDRESS_WIDTH: usize = 16;
const NET_ID_WIDTH: usize = 24;

const UNRECOGNIZED_MARK: &str = " (?)";
const UNAVAILABLE_MARK: &str = " [unavailable]";

/// Decide whether `snapshot` needs drawing, given the fingerprint of what
/// is currently on screen.
///
/// Returns the new fingerprint to carry into the next cycle. If the
/// snapshot cannot be fingerprinted the answer is always "redraw" and no
/// fingerprint is carried, so the next cycle redraws too.
pub fn should_redraw(
    previous: Option<&Fingerprint>,
    snapshot: &DiscoverySnapshot,
) -> (bool, Option<Fingerprint>) {
    match snapshot.fingerprint() {
        Ok(current) => (previous != Some(&current), Some(current)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to fingerprint snapshot");
            (true, None)
        }
    }
}

fn fit(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        format!("{value:<width$}")
    } else {
        let mut cut: String = value.chars().take(width.saturating_sub(1)).collect();
        cut.push('~');
        cut
    }
}

fn header_row() -> String {
    format!(
        "{:>NUMBER_WIDTH$}  {}  {}  {}  {}",
        "#",
        fit("Name", NAME_WIDTH),
        fit("Address", ADDRESS_WIDTH),
        fit("AMS Net ID", NET_ID_WIDTH),
        "OS"
    )
}

/// One table row. `number` is the 1-based row the operator types.
pub fn format_row(number: usize, device: &DeviceRecord) -> String {
    let mark = if is_recognized(&device.os_tag) {
        ""
    } else {
        UNRECOGNIZED_MARK
    };
    format!(
        "{number:>NUMBER_WIDTH$}  {}  {}  {}  {}{mark}",
        fit(&device.name, NAME_WIDTH),
        fit(&device.address, ADDRESS_WIDTH),
        fit(&device.net_id, NET_ID_WIDTH),
        device.os_tag,
    )
}

fn table_lines(snapshot: &DiscoverySnapshot, refreshed_at: &str) -> Vec<String> {
    let header = header_row();
    let rule = "-".repeat(header.len());
    let mut lines = vec![
        format!(
            "Devices on the route table: {}    (refreshed {refreshed_at})",
            snapshot.len()
        ),
        String::new(),
        header,
        rule,
    ];
    lines.extend(
        snapshot
            .devices()
            .iter()
            .enumerate()
            .map(|(i, d)| format_row(i + 1, d)),
    );
    lines.push(String::new());
    lines
}

/// The device table as plain text.
pub fn render_table(snapshot: &DiscoverySnapshot, refreshed_at: &str) -> String {
    let mut text = table_lines(snapshot, refreshed_at).join("\n");
    text.push('\n');
    text
}

pub fn selection_prompt(count: usize) -> String {
    format!("Select a device [1-{count}], Enter to refresh, or type exit: ")
}

/// Shown instead of the table when the snapshot is empty.
pub fn render_no_targets(timeout_secs: u64, provider_error: Option<&str>) -> String {
    let mut text = String::from("No remote devices found on the route table.\n");
    if let Some(error) = provider_error {
        text.push_str(&format!("Route discovery failed: {error}\n"));
    }
    text.push_str(
        "Add a route to the target (for example with the TwinCAT router or \
         Add-AdsRoute), or check the network connection.\n\n",
    );
    text.push_str(&format!(
        "Refreshing in {timeout_secs}s. Press Enter to refresh now, or type exit: "
    ));
    text
}

/// The capability menu for one device.
pub fn render_menu(device: &DeviceRecord, profile: &CapabilityProfile) -> String {
    let mut text = format!(
        "{} ({}) - {}\nManagement page: {}\n\n",
        device.name,
        device.address,
        profile.platform.name(),
        profile.management_url
    );
    for (i, entry) in profile.entries.iter().enumerate() {
        let mark = if entry.availability == Availability::Unavailable {
            UNAVAILABLE_MARK
        } else {
            ""
        };
        text.push_str(&format!("  {}) {}{mark}\n", i + 1, entry.label));
    }
    text.push_str(&format!(
        "\nChoose an action [1-{}], Enter to go back, or type exit: ",
        profile.entries.len()
    ));
    text
}

/// Terminal front end for the pure renderers.
pub struct Console<W> {
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.out
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn clear(&mut self) -> io::Result<()> {
        queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        self.out.flush()
    }

    /// Clear the screen and draw the full table with its prompt.
    pub fn show_table(&mut self, snapshot: &DiscoverySnapshot) -> io::Result<()> {
        self.clear()?;
        let refreshed_at = chrono::Local::now().format("%H:%M:%S").to_string();
        let lines = table_lines(snapshot, &refreshed_at);
        for line in &lines {
            if line.ends_with(UNRECOGNIZED_MARK) {
                queue!(self.out, SetForegroundColor(Color::Yellow))?;
                writeln!(self.out, "{line}")?;
                queue!(self.out, ResetColor)?;
            } else {
                writeln!(self.out, "{line}")?;
            }
        }
        write!(self.out, "{}", selection_prompt(snapshot.len()))?;
        self.out.flush()
    }

    pub fn show_no_targets(
        &mut self,
        timeout_secs: u64,
        provider_error: Option<&str>,
    ) -> io::Result<()> {
        self.clear()?;
        write!(self.out, "{}", render_no_targets(timeout_secs, provider_error))?;
        self.out.flush()
    }

    pub fn show_menu(&mut self, device: &DeviceRecord, profile: &CapabilityProfile) -> io::Result<()> {
        writeln!(self.out)?;
        write!(self.out, "{}", render_menu(device, profile))?;
        self.out.flush()
    }

    pub fn info(&mut self, message: &str) -> io::Result<()> {
        writeln!(self.out, "{message}")?;
        self.out.flush()
    }

    pub fn warn(&mut self, message: &str) -> io::Result<()> {
        queue!(self.out, SetForegroundColor(Color::Yellow))?;
        writeln!(self.out, "! {message}")?;
        queue!(self.out, ResetColor)?;
        self.out.flush()
    }

    /// Print without a trailing newline and flush.
    pub fn prompt(&mut self, text: &str) -> io::Result<()> {
        write!(self.out, "{text}")?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routedeck_core::{classify, Action};

    fn snapshot(tags: &[(&str, &str)]) -> DiscoverySnapshot {
        let routes = tags
            .iter()
            .enumerate()
            .map(|(i, (name, tag))| {
                DeviceRecord::new(name, &format!("10.0.0.{}", i + 1), &format!("5.{i}.0.0.1.1"), tag)
            })
            .collect();
        DiscoverySnapshot::from_routes(routes, None)
    }

    #[test]
    fn first_poll_always_redraws() {
        let s = snapshot(&[("A", "Win10")]);
        let (redraw, fp) = should_redraw(None, &s);
        assert!(redraw);
        assert!(fp.is_some());
    }

    #[test]
    fn unchanged_snapshot_does_not_redraw() {
        let s = snapshot(&[("A", "Win10"), ("B", "TcBSD22")]);
        let (_, fp) = should_redraw(None, &s);
        let (redraw, again) = should_redraw(fp.as_ref(), &s.clone());
        assert!(!redraw);
        assert_eq!(fp, again);
    }

    #[test]
    fn reordered_snapshot_redraws() {
        let a = DeviceRecord::new("A", "10.0.0.1", "5.1.0.0.1.1", "Win10");
        let b = DeviceRecord::new("B", "10.0.0.2", "5.2.0.0.1.1", "TcBSD22");
        let forward = DiscoverySnapshot::from_ordered(vec![a.clone(), b.clone()]);
        let reversed = DiscoverySnapshot::from_ordered(vec![b, a]);
        let (_, fp) = should_redraw(None, &forward);
        let (redraw, _) = should_redraw(fp.as_ref(), &reversed);
        assert!(redraw);
    }

    #[test]
    fn table_rows_are_numbered_in_snapshot_order() {
        let s = snapshot(&[("B", "TcBSD22"), ("A", "Win10")]);
        let text = render_table(&s, "12:00:00");
        let rows: Vec<&str> = text.lines().filter(|l| l.contains("10.0.0.")).collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].trim_start().starts_with("1  A "));
        assert!(rows[1].trim_start().starts_with("2  B "));
        assert!(text.contains("Devices on the route table: 2"));
        assert!(text.contains("AMS Net ID"));
    }

    #[test]
    fn unrecognized_tags_are_flagged_but_listed() {
        let s = snapshot(&[("A", "SomeUnknownRTOS"), ("B", "Win10")]);
        let text = render_table(&s, "12:00:00");
        assert!(text.contains("SomeUnknownRTOS (?)"));
        assert!(!text.contains("Win10 (?)"));
    }

    #[test]
    fn columns_are_fixed_width() {
        let long = DeviceRecord::new(
            "A-very-long-device-name-that-overflows",
            "10.0.0.1",
            "5.1.0.0.1.1",
            "Win10",
        );
        let short = DeviceRecord::new("B", "10.0.0.2", "5.2.0.0.1.1", "Win10");
        let first = format_row(1, &long);
        let second = format_row(2, &short);
        assert_eq!(first.find("10.0.0.1"), second.find("10.0.0.2"));
        assert!(first.contains("A-very-long-device-name~"));
    }

    #[test]
    fn menu_lists_actions_in_profile_order() {
        let device = DeviceRecord::new("B", "10.0.0.2", "5.2.0.0.1.1", "TcBSD22");
        let profile = classify(&device);
        let text = render_menu(&device, &profile);
        assert!(text.contains("  1) Open device manager web page"));
        assert!(text.contains("  3) Open SFTP file transfer"));
        assert!(text.contains("  4) Open SSH and SFTP"));
        assert!(text.contains("https://10.0.0.2"));
    }

    #[test]
    fn menu_marks_unavailable_actions() {
        let device = DeviceRecord::new("C", "10.0.0.3", "5.3.0.0.1.1", "CE7");
        let mut profile = classify(&device);
        profile.annotate(Action::StartRemoteDesktop, Availability::Unavailable);
        let text = render_menu(&device, &profile);
        assert!(text.contains("2) Start remote display (CERHost) [unavailable]"));
    }

    #[test]
    fn no_targets_message_mentions_provider_error() {
        let text = render_no_targets(10, Some("powershell exited with code 1"));
        assert!(text.contains("No remote devices found"));
        assert!(text.contains("powershell exited with code 1"));
        assert!(text.contains("Refreshing in 10s"));
    }

    #[test]
    fn console_clears_before_table() {
        let mut console = Console::new(Vec::new());
        console
            .show_table(&snapshot(&[("A", "Win10")]))
            .unwrap();
        let out = String::from_utf8(console.output().clone()).unwrap();
        assert!(out.starts_with("\x1b["));
        assert!(out.contains("Select a device [1-1]"));
    }
}
