pub mod db;
pub mod error;
pub mod gateway;
pub mod types;

pub use error::{Result, StorageError};
pub use gateway::StorageGateway;

#[cfg(test)]
mod tests {
    use super::*;
    use convocore_core::types::MessageRole;

    fn gateway() -> StorageGateway {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        db::init_db(&conn).unwrap();
        StorageGateway::new(conn)
    }

    #[test]
    fn create_and_fetch_user_round_trips() {
        let gw = gateway();
        let user = gw.create_user("alice", "hash", "be helpful").unwrap();
        let fetched = gw.get_user(&user.id).unwrap();
        assert_eq!(fetched.name, "alice");
        assert_eq!(gw.get_user_by_name("alice").unwrap().id, user.id);
    }

    #[test]
    fn missing_user_is_not_found() {
        let gw = gateway();
        let err = gw.get_user("nope").unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn frame_rolls_over_after_idle_threshold() {
        let gw = gateway();
        let user = gw.create_user("bob", "hash", "").unwrap();
        let convo = gw.create_conversation(&user.id, "chat").unwrap();

        let (frame1, rolled1) = gw.open_or_get_current_frame(&convo.id, 30).unwrap();
        assert!(!rolled1);
        gw.append_message(
            &frame1.id,
            crate::types::NewMessage {
                role: MessageRole::User,
                content: "hi".into(),
                thinking: None,
                raw_input: None,
                raw_output: None,
                speaker_name: None,
                agent_id: None,
            },
        )
        .unwrap();

        // idle_threshold_minutes = 0 means any elapsed time forces rollover.
        let (frame2, rolled2) = gw.open_or_get_current_frame(&convo.id, 0).unwrap();
        assert!(rolled2);
        assert_ne!(frame1.id, frame2.id);
    }

    #[test]
    fn streaming_upsert_appends_within_same_role_boundary() {
        let gw = gateway();
        let user = gw.create_user("carol", "hash", "").unwrap();
        let convo = gw.create_conversation(&user.id, "chat").unwrap();
        let (frame, _) = gw.open_or_get_current_frame(&convo.id, 30).unwrap();

        let m1 = gw
            .upsert_streaming_message(&frame.id, MessageRole::Assistant, None, "Hel", None, None, None)
            .unwrap();
        let m2 = gw
            .upsert_streaming_message(&frame.id, MessageRole::Assistant, None, "lo", None, None, None)
            .unwrap();
        assert_eq!(m1.id, m2.id);
        assert_eq!(m2.content, "Hello");

        let m3 = gw
            .upsert_streaming_message(&frame.id, MessageRole::User, None, "new turn", None, None, None)
            .unwrap();
        assert_ne!(m3.id, m2.id);
    }

    #[test]
    fn search_messages_respects_case_sensitivity_and_date_range() {
        let gw = gateway();
        let user = gw.create_user("dave", "hash", "").unwrap();
        let convo = gw.create_conversation(&user.id, "chat").unwrap();
        let (frame, _) = gw.open_or_get_current_frame(&convo.id, 30).unwrap();
        gw.append_message(
            &frame.id,
            crate::types::NewMessage {
                role: MessageRole::User,
                content: "The Quick Brown Fox".into(),
                thinking: None,
                raw_input: None,
                raw_output: None,
                speaker_name: None,
                agent_id: None,
            },
        )
        .unwrap();

        let hits_ci = gw
            .search_messages(&convo.id, "quick", false, None, None, 10)
            .unwrap();
        assert_eq!(hits_ci.len(), 1);

        let hits_cs = gw
            .search_messages(&convo.id, "quick", true, None, None, 10)
            .unwrap();
        assert!(hits_cs.is_empty());

        let hits_future = gw
            .search_messages(&convo.id, "quick", false, Some("2999-01-01T00:00:00Z"), None, 10)
            .unwrap();
        assert!(hits_future.is_empty());
    }

    #[test]
    fn delete_messages_from_removes_tail_only() {
        let gw = gateway();
        let user = gw.create_user("erin", "hash", "").unwrap();
        let convo = gw.create_conversation(&user.id, "chat").unwrap();
        let (frame, _) = gw.open_or_get_current_frame(&convo.id, 30).unwrap();

        let first = gw
            .append_message(
                &frame.id,
                crate::types::NewMessage {
                    role: MessageRole::User,
                    content: "one".into(),
                    thinking: None,
                    raw_input: None,
                    raw_output: None,
                    speaker_name: None,
                    agent_id: None,
                },
            )
            .unwrap();
        let second = gw
            .append_message(
                &frame.id,
                crate::types::NewMessage {
                    role: MessageRole::Assistant,
                    content: "two".into(),
                    thinking: None,
                    raw_input: None,
                    raw_output: None,
                    speaker_name: None,
                    agent_id: None,
                },
            )
            .unwrap();

        gw.delete_messages_from(&second.id).unwrap();
        let (_, messages) = gw.get_conversation_with_messages(&convo.id, 100, 0).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, first.id);
    }
}
