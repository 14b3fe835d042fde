//! crates/flashcard_lms_core/src/sessions.rs
//!
//! Study-session lifecycle: which status changes are allowed and when reviews may
//! be counted into a session.

use crate::domain::{SessionStatus, StudySession};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot move a {from} session to {to}")]
    InvalidTransition { from: SessionStatus, to: SessionStatus },
    #[error("Study session is {0}; only active sessions record reviews")]
    NotActive(SessionStatus),
    #[error("Card does not belong to the session's deck")]
    WrongDeck,
}

/// Active and paused sessions may move to any other status; finished ones are final.
pub fn check_transition(from: SessionStatus, to: SessionStatus) -> Result<(), SessionError> {
    let allowed = match from {
        SessionStatus::Active => to != SessionStatus::Active,
        SessionStatus::Paused => to != SessionStatus::Paused,
        SessionStatus::Completed | SessionStatus::Abandoned => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(SessionError::InvalidTransition { from, to })
    }
}

/// A review of a card from `card_deck_id` can be counted into the session.
pub fn check_recordable(session: &StudySession, card_deck_id: Uuid) -> Result<(), SessionError> {
    if session.status != SessionStatus::Active {
        return Err(SessionError::NotActive(session.status));
    }
    if session.deck_id != card_deck_id {
        return Err(SessionError::WrongDeck);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StudyMode;
    use chrono::Utc;

    const ALL: [SessionStatus; 4] = [
        SessionStatus::Active,
        SessionStatus::Paused,
        SessionStatus::Completed,
        SessionStatus::Abandoned,
    ];

    fn allowed_from(from: SessionStatus) -> Vec<SessionStatus> {
        ALL.into_iter().filter(|to| check_transition(from, *to).is_ok()).collect()
    }

    #[test]
    fn open_sessions_pause_resume_and_finish() {
        assert_eq!(
            allowed_from(SessionStatus::Active),
            vec![SessionStatus::Paused, SessionStatus::Completed, SessionStatus::Abandoned]
        );
        assert_eq!(
            allowed_from(SessionStatus::Paused),
            vec![SessionStatus::Active, SessionStatus::Completed, SessionStatus::Abandoned]
        );
    }

    #[test]
    fn finished_sessions_are_final() {
        assert!(allowed_from(SessionStatus::Completed).is_empty());
        assert!(allowed_from(SessionStatus::Abandoned).is_empty());
        assert_eq!(
            check_transition(SessionStatus::Completed, SessionStatus::Active)
                .unwrap_err()
                .to_string(),
            "Cannot move a completed session to active"
        );
    }

    #[test]
    fn only_active_sessions_on_the_same_deck_record_reviews() {
        let now = Utc::now();
        let deck_id = Uuid::new_v4();
        let mut session = StudySession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            deck_id,
            lesson_id: None,
            study_mode: StudyMode::Practice,
            target_cards: None,
            target_time: None,
            cards_studied: 0,
            correct_answers: 0,
            incorrect_answers: 0,
            total_time: 0,
            status: SessionStatus::Active,
            started_at: now,
            completed_at: None,
            updated_at: now,
        };

        assert_eq!(check_recordable(&session, deck_id), Ok(()));
        assert_eq!(check_recordable(&session, Uuid::new_v4()), Err(SessionError::WrongDeck));

        session.status = SessionStatus::Paused;
        assert_eq!(
            check_recordable(&session, deck_id),
            Err(SessionError::NotActive(SessionStatus::Paused))
        );
    }
}
