//! Deadline-bounded line input.
//!
//! The reader polls a [`KeySource`] at a short fixed interval, echoes and
//! edits the line as keys arrive, and gives up when the deadline passes.
//! It never blocks waiting for a key: each tick is a zero-timeout check
//! followed by a sleep.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use tokio::time::Instant;

/// What one read produced, as the console loop interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineInput {
    /// The operator typed `exit` (or pressed Ctrl+C).
    Exit,
    /// Enter on an empty line where a refresh was allowed.
    Refresh,
    /// Nothing usable: empty Enter or a deadline with no input.
    Empty,
    /// Trimmed, non-empty text.
    Text(String),
}

/// Non-blocking source of key presses.
pub trait KeySource {
    /// Called when a read starts.
    fn begin(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Return a pending key, or `None` if nothing is waiting right now.
    fn poll_key(&mut self) -> io::Result<Option<KeyEvent>>;

    /// Called when a read ends, however it ended.
    fn end(&mut self) {}
}

// ── Terminal keys ─────────────────────────────────────────────────

struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Keys from the controlling terminal. Raw mode is held only while a
/// read is in progress.
#[derive(Default)]
pub struct TerminalKeys {
    raw: Option<RawMode>,
}

impl TerminalKeys {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeySource for TerminalKeys {
    fn begin(&mut self) -> io::Result<()> {
        if self.raw.is_none() {
            self.raw = Some(RawMode::enable()?);
        }
        Ok(())
    }

    fn poll_key(&mut self) -> io::Result<Option<KeyEvent>> {
        while event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    fn end(&mut self) {
        self.raw = None;
    }
}

// ── Scripted keys ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ScriptStep {
    Key(KeyEvent),
    Stall,
}

/// Replays a fixed key sequence. Drives the console without a terminal.
///
/// A stall makes the current read see no further keys until its deadline;
/// the next read resumes the script. An exhausted script stalls forever.
#[derive(Debug, Clone, Default)]
pub struct ScriptedKeys {
    steps: VecDeque<ScriptStep>,
    stalled: bool,
}

impl ScriptedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: KeyEvent) -> Self {
        self.steps.push_back(ScriptStep::Key(key));
        self
    }

    pub fn code(self, code: KeyCode) -> Self {
        self.key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    pub fn text(mut self, text: &str) -> Self {
        for c in text.chars() {
            self = self.code(KeyCode::Char(c));
        }
        self
    }

    /// Type `text` and press Enter.
    pub fn line(self, text: &str) -> Self {
        self.text(text).code(KeyCode::Enter)
    }

    pub fn stall(mut self) -> Self {
        self.steps.push_back(ScriptStep::Stall);
        self
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl KeySource for ScriptedKeys {
    fn begin(&mut self) -> io::Result<()> {
        self.stalled = false;
        Ok(())
    }

    fn poll_key(&mut self) -> io::Result<Option<KeyEvent>> {
        if self.stalled {
            return Ok(None);
        }
        match self.steps.pop_front() {
            Some(ScriptStep::Key(key)) => Ok(Some(key)),
            Some(ScriptStep::Stall) => {
                self.stalled = true;
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

// ── Reader ────────────────────────────────────────────────────────

enum Edit {
    Echo(String),
    Submit,
    Interrupt,
    Ignore,
}

const ERASE: &str = "\x08 \x08";

/// Longest wait a single read honours. Keeps the deadline arithmetic in range.
const MAX_WAIT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

fn apply_key(buffer: &mut String, key: KeyEvent) -> Edit {
    if key.kind == KeyEventKind::Release {
        return Edit::Ignore;
    }
    match key.code {
        KeyCode::Enter => Edit::Submit,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Edit::Interrupt,
        KeyCode::Char(c)
            if !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            buffer.push(c);
            Edit::Echo(c.to_string())
        }
        KeyCode::Backspace => match buffer.pop() {
            Some(_) => Edit::Echo(ERASE.to_string()),
            None => Edit::Ignore,
        },
        KeyCode::Esc => {
            let erased = buffer.chars().count();
            buffer.clear();
            Edit::Echo(ERASE.repeat(erased))
        }
        _ => Edit::Ignore,
    }
}

fn interpret(buffer: &str, submitted: bool, allow_empty_as_refresh: bool) -> LineInput {
    let text = buffer.trim();
    if text.is_empty() {
        if submitted && allow_empty_as_refresh {
            LineInput::Refresh
        } else {
            LineInput::Empty
        }
    } else if text.eq_ignore_ascii_case("exit") {
        LineInput::Exit
    } else {
        LineInput::Text(text.to_string())
    }
}

/// Collects one line of operator input under a deadline.
pub struct InputReader<K> {
    keys: K,
    tick: Duration,
}

impl<K: KeySource> InputReader<K> {
    pub fn new(keys: K, tick: Duration) -> Self {
        Self { keys, tick }
    }

    pub fn keys(&self) -> &K {
        &self.keys
    }

    /// Read a line, echoing edits to `out`.
    ///
    /// Returns when Enter is pressed or `timeout` elapses, whichever comes
    /// first. On deadline the partial line is interpreted as if submitted,
    /// except that an empty line never becomes [`LineInput::Refresh`].
    pub async fn read_line<W: Write>(
        &mut self,
        out: &mut W,
        timeout: Duration,
        allow_empty_as_refresh: bool,
    ) -> io::Result<LineInput> {
        self.keys.begin()?;
        let result = self.collect(out, timeout, allow_empty_as_refresh).await;
        self.keys.end();
        result
    }

    async fn collect<W: Write>(
        &mut self,
        out: &mut W,
        timeout: Duration,
        allow_empty_as_refresh: bool,
    ) -> io::Result<LineInput> {
        let timeout = timeout.min(MAX_WAIT);
        let deadline = Instant::now() + timeout;
        let mut buffer = String::new();

        loop {
            while Instant::now() < deadline {
                let Some(key) = self.keys.poll_key()? else {
                    break;
                };
                match apply_key(&mut buffer, key) {
                    Edit::Echo(s) => {
                        out.write_all(s.as_bytes())?;
                        out.flush()?;
                    }
                    Edit::Submit => {
                        out.write_all(b"\r\n")?;
                        out.flush()?;
                        return Ok(interpret(&buffer, true, allow_empty_as_refresh));
                    }
                    Edit::Interrupt => {
                        out.write_all(b"\r\n")?;
                        out.flush()?;
                        return Ok(LineInput::Exit);
                    }
                    Edit::Ignore => {}
                }
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(
                    timeout_ms = timeout.as_millis() as u64,
                    pending = buffer.len(),
                    "Input deadline reached"
                );
                if !buffer.is_empty() {
                    out.write_all(b"\r\n")?;
                    out.flush()?;
                }
                return Ok(interpret(&buffer, false, allow_empty_as_refresh));
            }
            tokio::time::sleep(self.tick.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant as StdInstant;

    const LONG: Duration = Duration::from_secs(5);

    fn reader(keys: ScriptedKeys) -> InputReader<ScriptedKeys> {
        InputReader::new(keys, Duration::from_millis(5))
    }

    #[tokio::test]
    async fn huge_timeout_is_clamped() {
        let mut r = reader(ScriptedKeys::new().line("exit"));
        let mut out = Vec::new();
        let input = r
            .read_line(&mut out, Duration::from_secs(u64::MAX), false)
            .await
            .unwrap();
        assert_eq!(input, LineInput::Exit);
    }

    #[tokio::test]
    async fn enter_returns_trimmed_text() {
        let mut r = reader(ScriptedKeys::new().line("  2 "));
        let mut out = Vec::new();
        let input = r.read_line(&mut out, LONG, false).await.unwrap();
        assert_eq!(input, LineInput::Text("2".to_string()));
        assert_eq!(String::from_utf8(out).unwrap(), "  2 \r\n");
    }

    #[tokio::test]
    async fn backspace_erases_last_character() {
        let keys = ScriptedKeys::new()
            .text("13")
            .code(KeyCode::Backspace)
            .line("2");
        let mut r = reader(keys);
        let mut out = Vec::new();
        let input = r.read_line(&mut out, LONG, false).await.unwrap();
        assert_eq!(input, LineInput::Text("12".to_string()));
        assert!(String::from_utf8(out).unwrap().contains(ERASE));
    }

    #[tokio::test]
    async fn backspace_on_empty_line_is_ignored() {
        let keys = ScriptedKeys::new().code(KeyCode::Backspace).line("1");
        let mut r = reader(keys);
        let mut out = Vec::new();
        let input = r.read_line(&mut out, LONG, false).await.unwrap();
        assert_eq!(input, LineInput::Text("1".to_string()));
        assert!(!String::from_utf8(out).unwrap().contains(ERASE));
    }

    #[tokio::test]
    async fn escape_cancels_the_whole_line() {
        let keys = ScriptedKeys::new().text("99").code(KeyCode::Esc).line("4");
        let mut r = reader(keys);
        let mut out = Vec::new();
        let input = r.read_line(&mut out, LONG, false).await.unwrap();
        assert_eq!(input, LineInput::Text("4".to_string()));
        assert!(String::from_utf8(out).unwrap().contains(&ERASE.repeat(2)));
    }

    #[tokio::test]
    async fn empty_enter_is_refresh_only_when_allowed() {
        let mut r = reader(ScriptedKeys::new().line("").line(""));
        let mut out = Vec::new();
        assert_eq!(
            r.read_line(&mut out, LONG, true).await.unwrap(),
            LineInput::Refresh
        );
        assert_eq!(
            r.read_line(&mut out, LONG, false).await.unwrap(),
            LineInput::Empty
        );
    }

    #[tokio::test]
    async fn exit_is_recognized_case_insensitively() {
        let mut r = reader(ScriptedKeys::new().line("EXIT"));
        let mut out = Vec::new();
        assert_eq!(
            r.read_line(&mut out, LONG, false).await.unwrap(),
            LineInput::Exit
        );
    }

    #[tokio::test]
    async fn ctrl_c_exits() {
        let keys = ScriptedKeys::new()
            .text("1")
            .key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        let mut r = reader(keys);
        let mut out = Vec::new();
        assert_eq!(
            r.read_line(&mut out, LONG, false).await.unwrap(),
            LineInput::Exit
        );
    }

    #[tokio::test]
    async fn release_events_are_ignored() {
        let mut release = KeyEvent::new(KeyCode::Char('7'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        let keys = ScriptedKeys::new().text("3").key(release).line("");
        let mut r = reader(keys);
        let mut out = Vec::new();
        assert_eq!(
            r.read_line(&mut out, LONG, false).await.unwrap(),
            LineInput::Text("3".to_string())
        );
    }

    #[tokio::test]
    async fn deadline_without_input_returns_empty() {
        let mut r = reader(ScriptedKeys::new());
        let mut out = Vec::new();
        let start = StdInstant::now();
        let input = r
            .read_line(&mut out, Duration::from_millis(100), true)
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert_eq!(input, LineInput::Empty);
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(600));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn deadline_returns_partial_line() {
        let mut r = reader(ScriptedKeys::new().text("4").stall().line("9"));
        let mut out = Vec::new();
        let first = r
            .read_line(&mut out, Duration::from_millis(50), false)
            .await
            .unwrap();
        assert_eq!(first, LineInput::Text("4".to_string()));

        let second = r.read_line(&mut out, LONG, false).await.unwrap();
        assert_eq!(second, LineInput::Text("9".to_string()));
    }

    #[tokio::test]
    async fn deadline_holds_under_continuous_typing() {
        let mut keys = ScriptedKeys::new();
        for _ in 0..100_000 {
            keys = keys.text("1").code(KeyCode::Backspace);
        }
        let mut r = reader(keys);
        let mut out = std::io::sink();
        let start = StdInstant::now();
        r.read_line(&mut out, Duration::from_millis(50), false)
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
