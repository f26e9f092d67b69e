// Unit tests for event rendering

use crate::render::{describe, format_epoch};

use transport_core::codec::{Direction, StructuredMessage, UploadFailureEvent};
use transport_core::duration::SessionDurationState;
use transport_core::events::{AttachmentUpdate, CorrectiveAction, ErrorCode, Event};
use transport_core::session::State;

#[test]
fn given_epoch_seconds_when_formatted_then_rfc3339() {
    assert_eq!(format_epoch(0), "1970-01-01T00:00:00Z");
    assert_eq!(format_epoch(4_102_444_800), "2100-01-01T00:00:00Z");
}

#[test]
fn given_negative_epoch_when_formatted_then_raw_number() {
    assert_eq!(format_epoch(-5), "-5");
}

/// **VALUE**: Chat lines show direction and text only.
///
/// **BUG THIS CATCHES**: Would catch outbound echoes rendered as inbound,
/// which makes the transcript look like the agent repeated the user.
#[test]
fn given_messages_when_described_then_arrow_matches_direction() {
    // GIVEN: One message each way
    let inbound = StructuredMessage {
        text: Some("hi there".to_string()),
        direction: Direction::Inbound,
        ..Default::default()
    };
    let outbound = StructuredMessage {
        text: Some("hello".to_string()),
        direction: Direction::Outbound,
        ..Default::default()
    };

    // WHEN/THEN
    assert_eq!(describe(&Event::MessageReceived(inbound)), "< hi there");
    assert_eq!(describe(&Event::MessageReceived(outbound)), "> hello");
}

#[test]
fn given_error_event_when_described_then_code_message_and_action_shown() {
    let event = Event::error(
        ErrorCode::RequestRateTooHigh,
        "slow down",
        CorrectiveAction::TooManyRequests,
    );

    assert_eq!(
        describe(&event),
        "! RequestRateTooHigh: slow down (TooManyRequests)"
    );
}

#[test]
fn given_state_change_when_described_then_both_states_shown() {
    let event = Event::StateChanged {
        old: State::Connecting,
        new: State::Connected,
    };

    assert_eq!(describe(&event), "* state Connecting -> Connected");
}

#[test]
fn given_expiration_notice_when_described_then_date_is_readable() {
    let event = Event::SessionExpirationNotice {
        expiration_date: 4_102_444_800,
        notice_interval_secs: 60,
    };

    let line = describe(&event);

    assert!(line.contains("2100-01-01T00:00:00Z"), "got {line}");
    assert!(line.contains("60s"), "got {line}");
}

#[test]
fn given_cleared_duration_when_described_then_says_cleared() {
    let event = Event::SessionDurationUpdated(SessionDurationState::default());

    assert_eq!(describe(&event), "* session duration cleared");
}

#[test]
fn given_upload_failure_when_described_then_error_details_shown() {
    let event = Event::Attachment(AttachmentUpdate::UploadFailed(UploadFailureEvent {
        attachment_id: "att-1".to_string(),
        error_code: 4001,
        error_message: "too big".to_string(),
        timestamp: None,
    }));

    assert_eq!(describe(&event), "* upload of att-1 failed (4001): too big");
}
