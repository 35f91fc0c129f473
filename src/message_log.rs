//! Append-only display trail of system, chat and voting events.

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::votes::VoteResult;

/// Coarse category of a [`Message`], used by renderers for styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    System,
    Chat,
    VoteCast,
    VoteResults,
}

/// What a log entry says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    System { text: String },
    Chat { from: String, text: String },
    VoteCast { voter: String, target: String },
    VoteResults(VoteResult),
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::System { .. } => MessageKind::System,
            Self::Chat { .. } => MessageKind::Chat,
            Self::VoteCast { .. } => MessageKind::VoteCast,
            Self::VoteResults(_) => MessageKind::VoteResults,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }
}

/// One entry of the [`MessageLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Client-generated identity, unique per entry.
    pub id: Uuid,
    pub body: MessageBody,
    /// Local arrival time, epoch milliseconds.
    pub received_at: u64,
    /// Server-side timestamp when the payload carried one.
    pub sent_at: Option<u64>,
}

impl Message {
    /// Stamp `body` with a fresh id and the current time.
    pub fn new(body: MessageBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            body,
            received_at: now_millis(),
            sent_at: None,
        }
    }

    #[must_use]
    pub fn with_sent_at(mut self, sent_at: Option<u64>) -> Self {
        self.sent_at = sent_at;
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// The line of text a plain renderer would show.
    pub fn text(&self) -> String {
        match &self.body {
            MessageBody::System { text } => text.clone(),
            MessageBody::Chat { from, text } => format!("{from}: {text}"),
            MessageBody::VoteCast { voter, target } => format!("{voter} voted for {target}"),
            MessageBody::VoteResults(result) => match &result.eliminated_name {
                Some(name) => format!("{name} was eliminated"),
                None => "Nobody was eliminated".to_string(),
            },
        }
    }
}

/// Ordered record of display events. Arrival order is preserved; entries are
/// never mutated or reordered once appended.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    entries: Vec<Message>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The only mutator besides [`clear`](Self::clear).
    pub fn append(&mut self, message: Message) {
        self.entries.push(message);
    }

    /// All entries in arrival order. The iterator is cloneable, so it can be
    /// restarted from the same point.
    pub fn all(&self) -> std::slice::Iter<'_, Message> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the whole history. Only leaving the room does this.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a> IntoIterator for &'a MessageLog {
    type Item = &'a Message;
    type IntoIter = std::slice::Iter<'a, Message>;

    fn into_iter(self) -> Self::IntoIter {
        self.all()
    }
}

/// Milliseconds since the Unix epoch; a clock before 1970 reads as 0.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn preserves_arrival_order() {
        let mut log = MessageLog::new();
        log.append(Message::new(MessageBody::system("one")));
        log.append(Message::new(MessageBody::Chat {
            from: "Bob".into(),
            text: "two".into(),
        }));
        log.append(Message::new(MessageBody::system("three")));

        let texts: Vec<String> = log.all().map(Message::text).collect();
        assert_eq!(texts, ["one", "Bob: two", "three"]);
    }

    #[test]
    fn all_is_restartable() {
        let mut log = MessageLog::new();
        log.append(Message::new(MessageBody::system("a")));
        log.append(Message::new(MessageBody::system("b")));

        let iter = log.all();
        let first_pass: Vec<_> = iter.clone().map(|m| m.id).collect();
        let second_pass: Vec<_> = iter.map(|m| m.id).collect();
        assert_eq!(first_pass, second_pass);
        assert_eq!(log.all().count(), 2);
    }

    #[test]
    fn ids_are_unique() {
        let a = Message::new(MessageBody::system("x"));
        let b = Message::new(MessageBody::system("x"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn kinds_and_text() {
        let cast = Message::new(MessageBody::VoteCast {
            voter: "C".into(),
            target: "A".into(),
        });
        assert_eq!(cast.kind(), MessageKind::VoteCast);
        assert_eq!(cast.text(), "C voted for A");

        let tie = Message::new(MessageBody::VoteResults(VoteResult::default()));
        assert_eq!(tie.kind(), MessageKind::VoteResults);
        assert_eq!(tie.text(), "Nobody was eliminated");
    }

    #[test]
    fn clear_empties() {
        let mut log = MessageLog::new();
        log.append(Message::new(MessageBody::system("x")).with_sent_at(Some(5)));
        assert_eq!(log.last().unwrap().sent_at, Some(5));
        log.clear();
        assert!(log.is_empty());
    }
}
