//! Text normalization applied before phrase splitting.

use std::sync::LazyLock;

use regex::{NoExpand, Regex};

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid URL pattern"));

/// Turns raw chat text into something worth speaking.
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, raw_text: &str) -> String;
}

/// Replaces every URL with a short spoken placeholder.
pub struct UrlAbbreviator {
    placeholder: String,
}

impl UrlAbbreviator {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self { placeholder: placeholder.into() }
    }
}

impl Default for UrlAbbreviator {
    fn default() -> Self {
        Self::new("URL")
    }
}

impl TextNormalizer for UrlAbbreviator {
    fn normalize(&self, raw_text: &str) -> String {
        URL_PATTERN.replace_all(raw_text, NoExpand(&self.placeholder)).trim().to_string()
    }
}
