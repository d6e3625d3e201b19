use chrono::{DateTime, Utc};
use shared::{
    domain::{MessageId, TempId, UserId},
    protocol::{Attachment, Message},
};

/// Lifecycle of a logical message as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
}

/// The single identity a timeline entry carries: a temporary id while the
/// message awaits confirmation, the server-assigned id afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimelineId {
    Confirmed(MessageId),
    Local(TempId),
}

/// One row of the reconciled view. Derived from either a cached confirmed
/// message or a pending-ledger entry; never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineMessage {
    pub id: TimelineId,
    pub author_id: Option<UserId>,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub attachments: Vec<Attachment>,
    pub status: MessageStatus,
    pub error: Option<String>,
}

impl TimelineMessage {
    pub fn confirmed(message: &Message) -> Self {
        Self {
            id: TimelineId::Confirmed(message.id.clone()),
            author_id: Some(message.author_id.clone()),
            author_name: message.author_name.clone().unwrap_or_default(),
            content: message.content.clone(),
            created_at: message.created_at,
            updated_at: message.updated_at,
            edited_at: message.edited_at,
            attachments: message.attachments.clone(),
            status: MessageStatus::Sent,
            error: None,
        }
    }

    fn local(entry: &PendingEntry) -> Self {
        let (status, error) = match &entry.state {
            PendingState::Awaiting => (MessageStatus::Pending, None),
            PendingState::Failed { error } => (MessageStatus::Failed, Some(error.clone())),
        };
        Self {
            id: TimelineId::Local(entry.temp_id.clone()),
            author_id: entry.author_id.clone(),
            author_name: entry.author_name.clone(),
            content: entry.content.clone(),
            created_at: entry.created_at,
            updated_at: entry.created_at,
            edited_at: None,
            attachments: Vec::new(),
            status,
            error,
        }
    }

    pub fn is_own(&self, viewer: Option<&UserId>) -> bool {
        match (viewer, &self.author_id) {
            (Some(viewer), Some(author)) => viewer == author,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PendingState {
    Awaiting,
    Failed { error: String },
}

/// A locally originated message between submission and resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub temp_id: TempId,
    pub author_id: Option<UserId>,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub state: PendingState,
}

/// Ordered ledger of unconfirmed messages. Owned exclusively by one channel
/// session; lookup is by temporary id only, never by content or author.
#[derive(Debug, Default)]
pub struct PendingLedger {
    entries: Vec<PendingEntry>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pending entry and returns its temporary id. The entry is
    /// part of the merged timeline from this moment on.
    pub fn create(
        &mut self,
        content: impl Into<String>,
        author_id: Option<UserId>,
        author_name: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> TempId {
        let temp_id = TempId::new();
        self.entries.push(PendingEntry {
            temp_id: temp_id.clone(),
            author_id,
            author_name: author_name.into(),
            content: content.into(),
            created_at,
            state: PendingState::Awaiting,
        });
        temp_id
    }

    /// Marks the entry failed, keeping it visible with the given error text.
    /// Returns false when no entry carries the id (already resolved).
    pub fn fail(&mut self, temp_id: &TempId, error: impl Into<String>) -> bool {
        match self.entry_mut(temp_id) {
            Some(entry) => {
                entry.state = PendingState::Failed {
                    error: error.into(),
                };
                true
            }
            None => false,
        }
    }

    /// Drops the entry after a successful resolution. Idempotent.
    pub fn remove(&mut self, temp_id: &TempId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.temp_id != *temp_id);
        self.entries.len() != before
    }

    /// Flips a failed entry back to awaiting for a resend under the same
    /// temporary id. Returns the refreshed entry, or None when the id is
    /// unknown or the entry never failed.
    pub fn reset_failed(&mut self, temp_id: &TempId) -> Option<&PendingEntry> {
        let entry = self.entry_mut(temp_id)?;
        if !matches!(entry.state, PendingState::Failed { .. }) {
            return None;
        }
        entry.state = PendingState::Awaiting;
        Some(entry)
    }

    pub fn get(&self, temp_id: &TempId) -> Option<&PendingEntry> {
        self.entries.iter().find(|entry| entry.temp_id == *temp_id)
    }

    pub fn entries(&self) -> &[PendingEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry_mut(&mut self, temp_id: &TempId) -> Option<&mut PendingEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.temp_id == *temp_id)
    }
}

/// Computes the displayed sequence: confirmed history plus ledger entries,
/// stable-sorted ascending by creation time. Recomputed on every change;
/// arrival order of events never matters.
pub fn merge_timeline<'a>(
    history: impl IntoIterator<Item = &'a Message>,
    ledger: &PendingLedger,
) -> Vec<TimelineMessage> {
    let mut timeline: Vec<TimelineMessage> = history
        .into_iter()
        .map(TimelineMessage::confirmed)
        .collect();
    timeline.extend(ledger.entries().iter().map(TimelineMessage::local));
    timeline.sort_by_key(|message| message.created_at);
    timeline
}

#[cfg(test)]
#[path = "tests/timeline_tests.rs"]
mod tests;
