use crate::{CoreError, Rating, ReviewState, MAX_INTERVAL_DAYS, MIN_INTERVAL_DAYS};
use chrono::{DateTime, Duration, Utc};

pub const GOOD_MULTIPLIER: u32 = 2;
pub const EASY_MULTIPLIER: u32 = 3;

/// Growth factors and lapse policy for [`apply_review_with`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerPolicy {
    good_multiplier: u32,
    easy_multiplier: u32,
    sticky_learned: bool,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            good_multiplier: GOOD_MULTIPLIER,
            easy_multiplier: EASY_MULTIPLIER,
            sticky_learned: true,
        }
    }
}

impl SchedulerPolicy {
    /// `easy_multiplier >= good_multiplier >= 1`, so an easy rating never
    /// schedules sooner than a good one.
    pub fn new(good_multiplier: u32, easy_multiplier: u32, sticky_learned: bool) -> Result<Self, CoreError> {
        if good_multiplier < 1 {
            return Err(CoreError::invalid("good multiplier must be at least 1"));
        }
        if easy_multiplier < good_multiplier {
            return Err(CoreError::invalid(
                "easy multiplier must not be smaller than good multiplier",
            ));
        }
        Ok(Self {
            good_multiplier,
            easy_multiplier,
            sticky_learned,
        })
    }

    pub fn good_multiplier(&self) -> u32 {
        self.good_multiplier
    }

    pub fn easy_multiplier(&self) -> u32 {
        self.easy_multiplier
    }

    /// Whether a lapse keeps `is_learned` set.
    pub fn sticky_learned(&self) -> bool {
        self.sticky_learned
    }

    pub fn next_interval(&self, current: u32, rating: Rating) -> u32 {
        let grown = match rating {
            Rating::Again => return MIN_INTERVAL_DAYS,
            Rating::Good => current.saturating_mul(self.good_multiplier),
            Rating::Easy => current.saturating_mul(self.easy_multiplier),
        };
        grown.clamp(MIN_INTERVAL_DAYS, MAX_INTERVAL_DAYS)
    }
}

pub fn apply_review(state: &ReviewState, rating: Rating, now: DateTime<Utc>) -> ReviewState {
    apply_review_with(&SchedulerPolicy::default(), state, rating, now)
}

/// Computes the state after one review event at `now`.
///
/// Total over its inputs and free of side effects: the caller persists the
/// result. Not idempotent, so one logical review must be applied once.
pub fn apply_review_with(
    policy: &SchedulerPolicy,
    state: &ReviewState,
    rating: Rating,
    now: DateTime<Utc>,
) -> ReviewState {
    let interval_days = policy.next_interval(state.interval_days, rating);
    let mut next = state.clone();

    next.reviews = state.reviews.saturating_add(1);
    if rating.is_correct() {
        next.correct_count = state.correct_count.saturating_add(1);
        next.streak = state.streak.saturating_add(1);
        next.is_learned = true;
    } else {
        next.incorrect_count = state.incorrect_count.saturating_add(1);
        next.streak = 0;
        if !policy.sticky_learned {
            next.is_learned = false;
        }
    }

    next.interval_days = interval_days;
    next.last_reviewed_at = Some(now);
    next.next_review_at = Some(now + Duration::days(i64::from(interval_days)));
    next
}

pub fn is_due(state: &ReviewState, now: DateTime<Utc>) -> bool {
    state.is_new() || state.next_review_at.is_some_and(|at| at <= now)
}
