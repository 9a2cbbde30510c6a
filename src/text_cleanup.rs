// Text cleanup module
// Strips configured patterns from artist/title/album before tracking

use crate::config::CleanupConfig;
use crate::player::Snapshot;
use regex::Regex;

pub struct TextCleaner {
    patterns: Vec<Regex>,
}

impl TextCleaner {
    /// Compile the configured patterns, skipping invalid ones
    pub fn new(config: &CleanupConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let patterns = config
            .patterns
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    log::warn!("Invalid cleanup pattern '{}': {}", pattern, e);
                    None
                }
            })
            .collect();

        Self { patterns }
    }

    pub fn disabled() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    pub fn clean(&self, text: &str) -> String {
        if self.patterns.is_empty() {
            return text.to_string();
        }

        let mut result = text.to_string();
        for pattern in &self.patterns {
            result = pattern.replace_all(&result, "").into_owned();
        }
        result.trim().to_string()
    }

    /// Clean the descriptive fields of a snapshot, leaving timing and state alone
    pub fn clean_snapshot(&self, snapshot: Snapshot) -> Snapshot {
        if self.patterns.is_empty() {
            return snapshot;
        }

        Snapshot {
            artist: self.clean(&snapshot.artist),
            title: self.clean(&snapshot.title),
            album: self.clean(&snapshot.album),
            ..snapshot
        }
    }
}
