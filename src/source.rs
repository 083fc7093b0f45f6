//! Line-based message source.
//!
//! Each input line is one event, either a JSON object tagged by `type`:
//!
//! ```text
//! {"type":"message","speaker":"alice","text":"hello"}
//! {"type":"system","text":"maintenance in five minutes"}
//! {"type":"join","speaker":"bob"}
//! {"type":"leave","speaker":"bob"}
//! ```
//!
//! or plain text: `alice: hello`, or just `hello` (read as speaker `console`).

use anyhow::Result;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tracing::{debug, info, warn};

use crate::config::Announcements;
use crate::speech::{Intake, SYSTEM_SPEAKER, SpeechRequest};

/// Speaker used for lines without a `speaker:` prefix.
pub const CONSOLE_SPEAKER: &str = "console";

/// One event from the chat side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub speaker_id: String,
    pub raw_text: String,
    pub is_system: bool,
}

impl InboundMessage {
    pub fn into_request(self) -> SpeechRequest {
        if self.is_system {
            SpeechRequest::system(self.raw_text)
        } else {
            SpeechRequest::chat(self.speaker_id, self.raw_text)
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Event {
    Message { speaker: String, text: String },
    System { text: String },
    Join { speaker: String },
    Leave { speaker: String },
}

/// Reads events from any buffered async reader (stdin in the binary).
pub struct MessageSource<R> {
    lines: Lines<R>,
    ignore_prefix: String,
    announcements: Announcements,
}

impl<R: AsyncBufRead + Unpin> MessageSource<R> {
    pub fn new(reader: R, ignore_prefix: impl Into<String>, announcements: Announcements) -> Self {
        Self { lines: reader.lines(), ignore_prefix: ignore_prefix.into(), announcements }
    }

    /// Next message worth reading aloud, or `None` at end of input.
    pub async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        while let Some(line) = self.lines.next_line().await? {
            if let Some(message) = self.parse_line(&line) {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }

    /// Read until end of input, queueing every message.
    ///
    /// Stops early once the intake is closed. Returns the number of messages queued.
    pub async fn forward(mut self, intake: &Intake) -> Result<usize> {
        let mut queued = 0;
        while let Some(message) = self.next_message().await? {
            debug!("Message from {}: {}", message.speaker_id, message.raw_text);
            if intake.enqueue(message.into_request()).is_err() {
                debug!("Intake closed, no longer reading input");
                break;
            }
            queued += 1;
        }
        info!("📭 End of input after {} message(s)", queued);
        Ok(queued)
    }

    /// Parse one line. Blank lines, ignored commands and malformed JSON yield `None`.
    pub fn parse_line(&self, line: &str) -> Option<InboundMessage> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.starts_with('{') {
            return match serde_json::from_str::<Event>(line) {
                Ok(event) => self.event_message(event),
                Err(e) => {
                    warn!("Skipping malformed event: {}", e);
                    None
                }
            };
        }

        let (speaker, text) = split_speaker(line).unwrap_or((CONSOLE_SPEAKER, line));
        self.chat(speaker, text)
    }

    fn event_message(&self, event: Event) -> Option<InboundMessage> {
        match event {
            Event::Message { speaker, text } => self.chat(&speaker, &text),
            Event::System { text } => system(text),
            Event::Join { speaker } => system(self.announcements.joined(&speaker)),
            Event::Leave { speaker } => system(self.announcements.left(&speaker)),
        }
    }

    fn chat(&self, speaker: &str, text: &str) -> Option<InboundMessage> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if !self.ignore_prefix.is_empty() && text.starts_with(&self.ignore_prefix) {
            debug!("Ignoring command from {}: {}", speaker, text);
            return None;
        }
        Some(InboundMessage { speaker_id: speaker.to_string(), raw_text: text.to_string(), is_system: false })
    }
}

fn system(text: String) -> Option<InboundMessage> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(InboundMessage { speaker_id: SYSTEM_SPEAKER.to_string(), raw_text: text.to_string(), is_system: true })
}

/// `speaker: text`, where the speaker is a single word.
fn split_speaker(line: &str) -> Option<(&str, &str)> {
    let (speaker, text) = line.split_once(':')?;
    if speaker.is_empty() || speaker.contains(char::is_whitespace) || text.starts_with("//") {
        return None;
    }
    Some((speaker, text))
}
