use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Ai,
}

/// One utterance in the conversation. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    /// Assigned by the log at append time, never by the caller
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

/// Append-only ordered store of conversation turns.
///
/// Sequence numbers start at 1 and increase by exactly one per append.
/// Only the session controller's event loop writes here; appends are
/// serialized by its single-threaded event processing, so no locking is
/// needed.
#[derive(Debug, Default)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
    last_sequence: u64,
}

impl ConversationLog {
    pub fn append(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.last_sequence += 1;
        self.turns.push(ConversationTurn {
            speaker,
            text: text.into(),
            sequence: self.last_sequence,
            timestamp: Utc::now(),
        });
    }

    /// Turns in append order.
    pub fn as_ordered_sequence(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_strictly_increasing_without_gaps() {
        let mut log = ConversationLog::default();

        log.append(Speaker::Ai, "greeting");
        log.append(Speaker::User, "question");
        log.append(Speaker::Ai, "answer");

        let sequences: Vec<u64> = log
            .as_ordered_sequence()
            .iter()
            .map(|t| t.sequence)
            .collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn append_preserves_arrival_order() {
        let mut log = ConversationLog::default();

        log.append(Speaker::User, "first");
        log.append(Speaker::Ai, "second");

        let turns = log.as_ordered_sequence();
        assert_eq!(turns[0].speaker, Speaker::User);
        assert_eq!(turns[0].text, "first");
        assert_eq!(turns[1].speaker, Speaker::Ai);
        assert_eq!(turns[1].text, "second");
    }
}
