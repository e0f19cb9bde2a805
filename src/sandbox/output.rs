//! Stream-order output classification
//!
//! A command counts as successful when its most recently received chunk
//! arrived on stdout. Interleaved output can therefore flip the verdict;
//! callers that need exit-status semantics must not rely on this.

use super::runtime::CommandOutput;

/// Output channel of one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stdout,
    Stderr,
}

/// Accumulates output chunks in arrival order
#[derive(Debug, Default)]
pub struct OutputCollector {
    stdout: String,
    stderr: String,
    last: Option<Channel>,
}

impl OutputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one chunk
    pub fn push(&mut self, channel: Channel, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        match channel {
            Channel::Stdout => self.stdout.push_str(&text),
            Channel::Stderr => self.stderr.push_str(&text),
        }
        self.last = Some(channel);
    }

    /// Finish collection
    pub fn finish(self) -> CommandOutput {
        CommandOutput {
            success: self.last != Some(Channel::Stderr),
            stdout: self.stdout,
            stderr: self.stderr,
            timed_out: false,
        }
    }
}
