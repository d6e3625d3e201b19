use super::*;
use chrono::{DateTime, Utc};
use shared::domain::UserId;
use shared::protocol::Message;

fn at(raw: &str) -> DateTime<Utc> {
    raw.parse().expect("timestamp")
}

fn confirmed(id: &str, created_at: &str) -> Message {
    Message {
        id: MessageId::new(id),
        author_id: UserId::new("u-2"),
        author_name: Some("Riley".to_string()),
        content: format!("message {id}"),
        created_at: at(created_at),
        updated_at: at(created_at),
        edited_at: None,
        attachments: Vec::new(),
    }
}

#[test]
fn pending_entry_is_visible_immediately() {
    let mut ledger = PendingLedger::new();
    let temp_id = ledger.create("hello", None, "Unknown user", at("2026-02-01T10:00:00Z"));

    let history: Vec<Message> = Vec::new();
    let timeline = merge_timeline(&history, &ledger);

    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].id, TimelineId::Local(temp_id));
    assert_eq!(timeline[0].status, MessageStatus::Pending);
    assert_eq!(timeline[0].content, "hello");
    assert_eq!(timeline[0].author_name, "Unknown user");
    assert!(timeline[0].error.is_none());
}

#[test]
fn failed_entry_stays_visible_with_error_text() {
    let mut ledger = PendingLedger::new();
    let temp_id = ledger.create("hello", None, "Dana", at("2026-02-01T10:00:00Z"));

    assert!(ledger.fail(&temp_id, "boom"));

    let history: Vec<Message> = Vec::new();
    let timeline = merge_timeline(&history, &ledger);
    assert_eq!(timeline.len(), 1);
    assert_eq!(timeline[0].status, MessageStatus::Failed);
    assert_eq!(timeline[0].error.as_deref(), Some("boom"));
}

#[test]
fn fail_on_unknown_id_reports_nothing_to_mark() {
    let mut ledger = PendingLedger::new();
    assert!(!ledger.fail(&TempId::new(), "boom"));
}

#[test]
fn timeline_is_sorted_ascending_by_creation_time() {
    let mut ledger = PendingLedger::new();
    ledger.create("newest", None, "Dana", at("2026-02-01T10:03:00Z"));
    ledger.create("oldest", None, "Dana", at("2026-02-01T10:00:00Z"));

    let history = vec![
        confirmed("m-2", "2026-02-01T10:02:00Z"),
        confirmed("m-1", "2026-02-01T10:01:00Z"),
    ];

    let timeline = merge_timeline(&history, &ledger);
    let contents: Vec<&str> = timeline
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    assert_eq!(contents, ["oldest", "message m-1", "message m-2", "newest"]);
}

#[test]
fn equal_timestamps_keep_history_before_ledger() {
    let mut ledger = PendingLedger::new();
    ledger.create("pending twin", None, "Dana", at("2026-02-01T10:00:00Z"));

    let history = vec![confirmed("m-1", "2026-02-01T10:00:00Z")];
    let timeline = merge_timeline(&history, &ledger);

    assert_eq!(timeline[0].id, TimelineId::Confirmed(MessageId::new("m-1")));
    assert_eq!(timeline[1].status, MessageStatus::Pending);
}

#[test]
fn removal_is_by_temporary_id_only() {
    let mut ledger = PendingLedger::new();
    let first = ledger.create("same text", None, "Dana", at("2026-02-01T10:00:00Z"));
    let second = ledger.create("same text", None, "Dana", at("2026-02-01T10:00:00Z"));

    assert!(ledger.remove(&second));
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.entries()[0].temp_id, first);

    // Already resolved: a second removal is a no-op.
    assert!(!ledger.remove(&second));
}

#[test]
fn reset_failed_requires_a_failed_entry() {
    let mut ledger = PendingLedger::new();
    let temp_id = ledger.create("hello", None, "Dana", at("2026-02-01T10:00:00Z"));

    assert!(ledger.reset_failed(&temp_id).is_none());

    ledger.fail(&temp_id, "boom");
    let entry = ledger.reset_failed(&temp_id).expect("failed entry resets");
    assert_eq!(entry.state, PendingState::Awaiting);

    let entry = ledger.get(&temp_id).expect("entry kept");
    assert_eq!(entry.state, PendingState::Awaiting);
}

#[test]
fn own_messages_compare_author_to_viewer() {
    let viewer = UserId::new("u-2");
    let other = UserId::new("u-9");

    let message = confirmed("m-1", "2026-02-01T10:00:00Z");
    let row = TimelineMessage::confirmed(&message);
    assert!(row.is_own(Some(&viewer)));
    assert!(!row.is_own(Some(&other)));
    assert!(!row.is_own(None));

    let mut ledger = PendingLedger::new();
    ledger.create("anonymous", None, "Unknown user", at("2026-02-01T10:00:00Z"));
    let history: Vec<Message> = Vec::new();
    let timeline = merge_timeline(&history, &ledger);
    assert!(!timeline[0].is_own(Some(&viewer)));
}
