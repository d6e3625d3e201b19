use chrono::Local;
use client_core::{MessageStatus, TimelineId, TimelineMessage};
use shared::{domain::UserId, protocol::Attachment};

/// Renders the reconciled timeline as one line per message. Purely derived
/// from the session's timeline; holds no state of its own.
pub fn render_timeline(messages: &[TimelineMessage], viewer: Option<&UserId>) -> String {
    messages
        .iter()
        .map(|message| render_message(message, viewer))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_message(message: &TimelineMessage, viewer: Option<&UserId>) -> String {
    let timestamp = message
        .created_at
        .with_timezone(&Local)
        .format("%H:%M")
        .to_string();

    let mut line = format!("[{timestamp}] {}", author_label(message));
    if message.is_own(viewer) {
        line.push_str(" (you)");
    }
    line.push_str(": ");
    line.push_str(&message.content);

    if message.edited_at.is_some() {
        line.push_str(" (edited)");
    }

    for attachment in &message.attachments {
        line.push_str(&format!(
            " [{} -> {}]",
            attachment_label(attachment),
            attachment.url
        ));
    }

    match message.status {
        MessageStatus::Pending => line.push_str(" (sending…)"),
        MessageStatus::Failed => {
            let reason = message.error.as_deref().unwrap_or("send failed");
            if let TimelineId::Local(temp_id) = &message.id {
                line.push_str(&format!(
                    " (failed: {reason} — /retry {temp_id} or /dismiss {temp_id})"
                ));
            } else {
                line.push_str(&format!(" (failed: {reason})"));
            }
        }
        MessageStatus::Sent => {}
    }

    line
}

fn author_label(message: &TimelineMessage) -> String {
    if !message.author_name.is_empty() {
        return message.author_name.clone();
    }
    match &message.author_id {
        Some(author_id) => format_author(author_id),
        None => "Anonymous".to_string(),
    }
}

/// Mail-style author ids collapse to their local part.
fn format_author(author_id: &UserId) -> String {
    let raw = author_id.0.as_str();
    if raw.is_empty() {
        return "Anonymous".to_string();
    }
    match raw.split_once('@') {
        Some((local, _)) => local.to_string(),
        None => raw.to_string(),
    }
}

fn attachment_label(attachment: &Attachment) -> String {
    if let Some(name) = attachment.name.as_deref().filter(|name| !name.is_empty()) {
        return name.to_string();
    }
    attachment
        .url
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("Attachment")
        .to_string()
}
