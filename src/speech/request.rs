//! Speech requests, phrases and synthesized bundles.

use crate::audio::AudioClip;

/// Speaker id used for system announcements.
pub const SYSTEM_SPEAKER: &str = "system";

/// Which intake lane a request travels through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    /// System announcements, played ahead of buffered chat
    Priority,
    /// Chat messages
    Normal,
}

/// One thing to say, from one speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    pub speaker_id: String,
    pub text: String,
    pub priority: bool,
}

impl SpeechRequest {
    /// A chat message read with the speaker's voice.
    pub fn chat(speaker_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { speaker_id: speaker_id.into(), text: text.into(), priority: false }
    }

    /// A system announcement read with the default voice.
    pub fn system(text: impl Into<String>) -> Self {
        Self { speaker_id: SYSTEM_SPEAKER.to_string(), text: text.into(), priority: true }
    }

    pub fn lane(&self) -> Lane {
        if self.priority { Lane::Priority } else { Lane::Normal }
    }
}

/// A non-empty segment of a request's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrase {
    pub index: usize,
    pub text: String,
}

/// Synthesized audio for one phrase.
#[derive(Debug, Clone)]
pub struct PhraseAudio {
    pub index: usize,
    pub audio: AudioClip,
}

/// All synthesized phrases of one request, in phrase order.
///
/// `sequence_id` is reserved when the request is dispatched and is
/// contiguous within the request's lane.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub sequence_id: u64,
    pub priority: bool,
    pub phrases: Vec<PhraseAudio>,
}

impl Bundle {
    pub fn lane(&self) -> Lane {
        if self.priority { Lane::Priority } else { Lane::Normal }
    }

    /// Playback length of all phrases.
    pub fn duration(&self) -> std::time::Duration {
        self.phrases.iter().map(|phrase| phrase.audio.duration()).sum()
    }
}

/// Split text into phrases at sentence ends and line breaks.
///
/// Runs of sentence punctuation stay together with their phrase. Segments
/// without any letter or digit are dropped.
pub fn split_phrases(text: &str) -> Vec<Phrase> {
    let mut phrases = Vec::new();
    let mut current = String::new();

    let mut push = |current: &mut String| {
        let trimmed = current.trim();
        if trimmed.chars().any(char::is_alphanumeric) {
            phrases.push(Phrase { index: phrases.len(), text: trimmed.to_string() });
        }
        current.clear();
    };

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if is_line_break(c) {
            push(&mut current);
            continue;
        }
        current.push(c);
        if is_sentence_end(c) && !chars.peek().is_some_and(|&next| is_sentence_end(next)) {
            push(&mut current);
        }
    }
    push(&mut current);

    phrases
}

fn is_line_break(c: char) -> bool {
    c == '\n' || c == '\r'
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(phrases: &[Phrase]) -> Vec<&str> {
        phrases.iter().map(|p| p.text.as_str()).collect()
    }

    #[test]
    fn test_split_on_sentences_and_lines() {
        let phrases = split_phrases("Hello there. How are you?\nfine");
        assert_eq!(texts(&phrases), vec!["Hello there.", "How are you?", "fine"]);
        assert_eq!(phrases.iter().map(|p| p.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_split_japanese_punctuation() {
        let phrases = split_phrases("こんにちは。元気ですか？はい");
        assert_eq!(texts(&phrases), vec!["こんにちは。", "元気ですか？", "はい"]);
    }

    #[test]
    fn test_empty_segments_are_discarded() {
        let phrases = split_phrases("\n\n  ...  \r\nreally?!\n");
        assert_eq!(texts(&phrases), vec!["really?!"]);
        assert_eq!(phrases[0].index, 0);
        assert!(split_phrases("   \n\t").is_empty());
    }

    #[test]
    fn test_request_lanes() {
        assert_eq!(SpeechRequest::chat("alice", "hi").lane(), Lane::Normal);
        let announcement = SpeechRequest::system("hello");
        assert_eq!(announcement.lane(), Lane::Priority);
        assert_eq!(announcement.speaker_id, SYSTEM_SPEAKER);
    }
}
