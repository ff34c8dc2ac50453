// Model Tests - identity, status transitions and conversation bookkeeping

use super::support::{at, direct, me};
use crate::model::*;

fn confirmed(id: &str, content: &str, secs: i64, sender: &str) -> Message {
    Message::confirmed(id, direct("c1"), content.to_string(), at(secs), UserRef::new(sender))
}

fn direct_conversation() -> Conversation {
    Conversation::new(
        direct("c1"),
        ConversationKind::Direct {
            self_user: me(),
            other: UserRef::new("alice").with_name("Alice"),
        },
        at(0),
    )
}

#[test]
fn test_temp_ids_are_unique_and_prefixed() {
    let a = TempId::generate();
    let b = TempId::generate();
    assert_ne!(a, b);
    assert!(a.as_str().starts_with("temp-"));
}

#[test]
fn test_pending_message_state() {
    let temp_id = TempId::generate();
    let msg = Message::pending(temp_id.clone(), direct("c1"), "hi".to_string(), me());

    assert!(msg.is_pending());
    assert_eq!(msg.temp_id(), Some(&temp_id));
    assert_eq!(msg.confirmed_id(), None);
    assert!(msg.staged_as(&temp_id));
    assert_eq!(msg.delivery, DeliveryStatus::Sending);
    assert_eq!(msg.status_indicator(), "↻");
}

#[test]
fn test_confirm_with_substitutes_server_fields() {
    let temp_id = TempId::generate();
    let mut msg = Message::pending(temp_id.clone(), direct("c1"), "hi".to_string(), me());
    let ack = confirmed("m1", "hi", 30, "me");

    msg.confirm_with(&ack);

    assert_eq!(msg.confirmed_id(), Some("m1"));
    assert_eq!(msg.sent_at, at(30));
    assert_eq!(msg.delivery, DeliveryStatus::Sent);
    assert!(msg.staged_as(&temp_id), "origin survives confirmation");
    // The ack's bare sender does not erase the richer local one
    assert_eq!(msg.sender.id, "me");
}

#[test]
fn test_confirm_with_keeps_sender_when_ack_sender_unknown() {
    let mut msg = Message::pending(TempId::generate(), direct("c1"), "hi".to_string(), me());
    let ack = confirmed("m1", "hi", 30, crate::model::UNKNOWN_USER_ID);

    msg.confirm_with(&ack);
    assert_eq!(msg.sender, me());
}

#[test]
fn test_failed_and_retry_markers() {
    let mut msg = Message::pending(TempId::generate(), direct("c1"), "hi".to_string(), me());
    msg.mark_failed();
    assert_eq!(msg.delivery, DeliveryStatus::Failed);
    assert_eq!(msg.status_indicator(), "✗");
    msg.mark_sending();
    assert_eq!(msg.delivery, DeliveryStatus::Sending);
}

#[test]
fn test_request_status_is_monotonic() {
    let mut status = RequestStatus::Pending;
    assert!(status.advance(RequestStatus::Accepted));
    assert_eq!(status, RequestStatus::Accepted);

    assert!(!status.advance(RequestStatus::Pending));
    assert!(!status.advance(RequestStatus::Rejected));
    assert_eq!(status, RequestStatus::Accepted);
}

#[test]
fn test_request_status_accepts_server_synonyms() {
    let parse = |s: &str| -> RequestStatus {
        serde_json::from_value(serde_json::json!(s)).expect("Failed to parse status")
    };
    assert_eq!(parse("PENDING"), RequestStatus::Pending);
    assert_eq!(parse("ACCEPTED"), RequestStatus::Accepted);
    assert_eq!(parse("APPROVED"), RequestStatus::Accepted);
    assert_eq!(parse("REJECTED"), RequestStatus::Rejected);
    assert_eq!(parse("DECLINED"), RequestStatus::Rejected);
}

#[test]
fn test_request_actions() {
    assert_eq!(RequestAction::Accept.resulting_status(), RequestStatus::Accepted);
    assert_eq!(RequestAction::Approve.resulting_status(), RequestStatus::Accepted);
    assert_eq!(RequestAction::Decline.resulting_status(), RequestStatus::Rejected);
    assert_eq!(RequestAction::Reject.resulting_status(), RequestStatus::Rejected);
    assert!(RequestAction::Decline.is_friend_action());
    assert!(!RequestAction::Approve.is_friend_action());
    assert_eq!(RequestAction::Reject.as_str(), "reject");
}

#[test]
fn test_conversation_id_display_and_kind() {
    assert_eq!(direct("7").to_string(), "chat:7");
    assert_eq!(ConversationId::Team("3".to_string()).to_string(), "team:3");
    assert!(ConversationId::Team("3".to_string()).is_team());
    assert_eq!(direct("7").raw(), "7");
    assert_ne!(direct("1"), ConversationId::Team("1".to_string()));
}

#[test]
fn test_conversation_title() {
    assert_eq!(direct_conversation().title(), "Alice");

    let team = Conversation::new(
        ConversationId::Team("t1".to_string()),
        ConversationKind::Team {
            title: "Night Owls".to_string(),
            roster: vec!["me".to_string()],
        },
        at(0),
    );
    assert_eq!(team.title(), "Night Owls");
}

#[test]
fn test_placeholder_for_direct_push_uses_sender_as_other() {
    let conversation = Conversation::placeholder(direct("c9"), &me(), &UserRef::new("bob"));
    match conversation.kind {
        ConversationKind::Direct { other, .. } => assert_eq!(other.id, "bob"),
        other => panic!("unexpected kind {:?}", other),
    }

    let own = Conversation::placeholder(direct("c9"), &me(), &me());
    match own.kind {
        ConversationKind::Direct { other, .. } => assert!(other.is_unknown()),
        other => panic!("unexpected kind {:?}", other),
    }
}

#[test]
fn test_advance_last_message_never_regresses() {
    let mut conversation = direct_conversation();

    assert!(conversation.advance_last_message(&confirmed("m2", "newer", 20, "alice")));
    assert!(!conversation.advance_last_message(&confirmed("m1", "older", 10, "alice")));

    let last = conversation.last_message.as_ref().expect("last message");
    assert_eq!(last.id.as_deref(), Some("m2"));
    assert_eq!(conversation.updated_at, at(20));
}

#[test]
fn test_replace_pending_last_despite_clock_skew() {
    let mut conversation = direct_conversation();
    let mut pending = Message::pending(TempId::generate(), direct("c1"), "hi".to_string(), me());
    pending.sent_at = at(100);
    conversation.advance_last_message(&pending);

    // Server clock is behind the local one
    let ack = confirmed("m1", "hi", 90, "me");
    conversation.replace_pending_last(&ack);

    let last = conversation.last_message.as_ref().expect("last message");
    assert_eq!(last.id.as_deref(), Some("m1"));
    assert_eq!(last.sent_at, at(90));
}

#[test]
fn test_mark_read_records_read_through() {
    let mut conversation = direct_conversation();
    conversation.messages.push(confirmed("m1", "a", 10, "alice"));
    conversation.advance_last_message(&confirmed("m1", "a", 10, "alice"));
    conversation.unread_count = 4;

    conversation.mark_read();

    assert_eq!(conversation.unread_count, 0);
    assert_eq!(conversation.read_through, Some(at(10)));
}

#[test]
fn test_pending_helpers() {
    let mut conversation = direct_conversation();
    let temp_id = TempId::generate();
    conversation.messages.push(confirmed("m1", "a", 10, "alice"));
    conversation
        .messages
        .push(Message::pending(temp_id.clone(), direct("c1"), "b".to_string(), me()));

    assert_eq!(conversation.pending_messages().count(), 1);
    assert_eq!(conversation.confirmed_count(), 1);
    assert_eq!(conversation.position_of("m1"), Some(0));
    assert_eq!(conversation.position_of_staged(&temp_id), Some(1));
}

#[test]
fn test_system_event_key_includes_timestamp() {
    let event = SystemEvent {
        id: "t1".to_string(),
        kind: SystemEventKind::TournamentDeleted,
        title: "Cup".to_string(),
        reason: "Cancelled".to_string(),
        created_at: at(5),
        read: false,
    };
    let mut later = event.clone();
    later.created_at = at(6);

    assert_ne!(event.key(), later.key());
}
