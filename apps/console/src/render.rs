//! One printable line per engine event.

use transport_core::codec::Direction;
use transport_core::events::{AttachmentUpdate, Event};

use std::time::{Duration, UNIX_EPOCH};

use humantime::format_rfc3339_seconds;

/// RFC 3339 for non-negative epoch seconds, the raw number otherwise.
pub fn format_epoch(secs: i64) -> String {
    match u64::try_from(secs) {
        Ok(secs) => format_rfc3339_seconds(UNIX_EPOCH + Duration::from_secs(secs)).to_string(),
        Err(_) => secs.to_string(),
    }
}

fn format_attachment(update: &AttachmentUpdate) -> String {
    match update {
        AttachmentUpdate::Presigned(response) => {
            format!("upload url ready for {}", response.attachment_id)
        }
        AttachmentUpdate::Deleted(response) => format!("deleted {}", response.attachment_id),
        AttachmentUpdate::Uploaded(event) => {
            format!("uploaded {} to {}", event.attachment_id, event.download_url)
        }
        AttachmentUpdate::UploadFailed(event) => format!(
            "upload of {} failed ({}): {}",
            event.attachment_id, event.error_code, event.error_message
        ),
        AttachmentUpdate::UrlGenerationFailed(error) => format!(
            "no upload url for {} ({}): {}",
            error.attachment_id, error.error_code, error.error_message
        ),
    }
}

pub fn describe(event: &Event) -> String {
    match event {
        Event::StateChanged { old, new } => format!("* state {old:?} -> {new:?}"),
        Event::Authenticated(_) => "* authenticated".to_string(),
        Event::Error {
            code,
            message,
            corrective_action,
        } => format!("! {code:?}: {message} ({corrective_action:?})"),
        Event::SessionExpirationNotice {
            expiration_date,
            notice_interval_secs,
        } => format!(
            "* session expires at {} (in about {notice_interval_secs}s)",
            format_epoch(*expiration_date)
        ),
        Event::SessionDurationUpdated(duration) => match duration.expiration_date {
            Some(expiration_date) => {
                format!("* session valid until {}", format_epoch(expiration_date))
            }
            None => "* session duration cleared".to_string(),
        },
        Event::MessageReceived(message) => {
            let arrow = match message.direction {
                Direction::Inbound => "<",
                Direction::Outbound => ">",
            };
            format!("{arrow} {}", message.text.as_deref().unwrap_or_default())
        }
        Event::Attachment(update) => format!("* {}", format_attachment(update)),
        Event::HealthChecked => "* health check ok".to_string(),
        Event::JwtReceived { exp, .. } => {
            format!("* jwt received, expires {}", format_epoch(*exp))
        }
        Event::Logout => "* logged out".to_string(),
        Event::ConversationCleared => "* conversation cleared".to_string(),
        Event::ConnectionClosed => "* connection closed by the server".to_string(),
    }
}
