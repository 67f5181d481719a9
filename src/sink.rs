//! Visible, ordered message log.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::core::MISSING_CHANNEL_SEGMENT;

/// Receives every inbound payload in arrival order.
pub trait MessageSink: Send + 'static {
    /// Append after everything appended before.
    fn append(&mut self, payload: String);

    /// Drop every entry. Only called when a connection opens.
    fn clear(&mut self);
}

/// Shared in-memory log. Clones observe the same entries.
#[derive(Clone, Debug, Default)]
pub struct MessageLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl MessageSink for MessageLog {
    fn append(&mut self, payload: String) {
        self.entries.lock().push(payload);
    }

    fn clear(&mut self) {
        self.entries.lock().clear();
    }
}

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

/// Renders the log as a bulleted list on a terminal-like writer.
///
/// An optional heading (the channel being followed) is printed above the list and
/// re-printed after every clear.
pub struct ConsoleLog<W> {
    out: W,
    heading: Option<String>,
}

impl<W> ConsoleLog<W>
where
    W: Write + Send + 'static,
{
    pub fn new(out: W) -> Self {
        Self { out, heading: None }
    }

    /// Show `channel: <id>` above the entries; a missing id renders as `null`.
    pub fn with_heading(out: W, channel_id: Option<&str>) -> Self {
        let channel = channel_id.unwrap_or(MISSING_CHANNEL_SEGMENT);
        Self {
            out,
            heading: Some(format!("channel: {channel}\n")),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        if let Err(err) = self
            .out
            .write_all(text.as_bytes())
            .and_then(|_| self.out.flush())
        {
            warn!(error = %err, "failed to render live feed");
        }
    }
}

impl ConsoleLog<std::io::Stdout> {
    pub fn stdout(channel_id: Option<&str>) -> Self {
        Self::with_heading(std::io::stdout(), channel_id)
    }
}

impl<W> MessageSink for ConsoleLog<W>
where
    W: Write + Send + 'static,
{
    fn append(&mut self, payload: String) {
        self.write(&format!("• {payload}\n"));
    }

    fn clear(&mut self) {
        let mut screen = CLEAR_SCREEN.to_string();
        if let Some(heading) = &self.heading {
            screen.push_str(heading);
        }
        self.write(&screen);
    }
}
