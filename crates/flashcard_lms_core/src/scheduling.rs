//! crates/flashcard_lms_core/src/scheduling.rs
//!
//! SM-2 spaced-repetition scheduling for flashcard reviews.

use crate::domain::Sm2State;
use chrono::{DateTime, Duration, Utc};

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const MAX_EASE_FACTOR: f64 = 5.0;
pub const MAX_QUALITY: u8 = 5;
/// Lowest quality rating that counts as a successful recall.
pub const PASSING_QUALITY: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    #[error("Quality rating must be between 0 and 5, got {0}")]
    InvalidQuality(u8),
}

/// Applies one review with the given quality (0-5) and returns the next state.
pub fn review(state: &Sm2State, quality: u8, now: DateTime<Utc>) -> Result<Sm2State, SchedulingError> {
    if quality > MAX_QUALITY {
        return Err(SchedulingError::InvalidQuality(quality));
    }

    let (repetitions, interval) = if quality >= PASSING_QUALITY {
        let interval = match state.repetitions {
            0 => 1,
            1 => 6,
            _ => (f64::from(state.interval) * state.ease_factor).round() as i32,
        };
        (state.repetitions + 1, interval.max(1))
    } else {
        (0, 1)
    };

    let miss = f64::from(MAX_QUALITY - quality);
    let ease_factor = (state.ease_factor + (0.1 - miss * (0.08 + miss * 0.02)))
        .clamp(MIN_EASE_FACTOR, MAX_EASE_FACTOR);

    Ok(Sm2State {
        repetitions,
        ease_factor,
        interval,
        next_review: Some(now + Duration::days(i64::from(interval))),
        last_quality: Some(quality),
    })
}

/// A review counts as correct when recall was at least passing.
pub fn is_correct(quality: u8) -> bool {
    quality >= PASSING_QUALITY
}
