use log::debug;

/// Holds the answer being spoken for the current question.
///
/// Recognition engines re-send the whole running transcript and sometimes
/// hand back a truncated one, so only the longest candidate seen since the
/// last reset is retained.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionBuffer {
    retained: String,
    updates: usize,
    discarded: usize,
}

impl TranscriptionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a candidate transcript. Returns true if it replaced the
    /// retained one; a candidate that is not strictly longer is discarded.
    pub fn offer(&mut self, candidate: &str) -> bool {
        if candidate.chars().count() > self.retained.chars().count() {
            self.retained = candidate.to_string();
            self.updates += 1;
            true
        } else {
            self.discarded += 1;
            debug!("Discarding shorter transcript candidate ({} chars)", candidate.chars().count());
            false
        }
    }

    pub fn retained(&self) -> &str {
        &self.retained
    }

    /// The retained transcript, trimmed. `None` when nothing but whitespace
    /// was heard.
    pub fn answer(&self) -> Option<String> {
        let trimmed = self.retained.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    pub fn get_stats(&self) -> TranscriptionStats {
        TranscriptionStats {
            retained_chars: self.retained.chars().count(),
            updates: self.updates,
            discarded: self.discarded,
        }
    }

    /// Clear all accumulated text and reset state
    pub fn clear(&mut self) {
        self.retained.clear();
        self.updates = 0;
        self.discarded = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscriptionStats {
    pub retained_chars: usize,
    pub updates: usize,
    pub discarded: usize,
}
