use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::CoreError;

pub type CardId = Uuid;
pub type ReviewLogId = Uuid;

/// Interval every new card starts from, and the floor after any review.
pub const MIN_INTERVAL_DAYS: u32 = 1;
/// Growth stops here; keeps `next_review_at` inside chrono's date range.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Again,
    Good,
    Easy,
}

impl Rating {
    pub fn is_correct(self) -> bool {
        self != Rating::Again
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Good => "good",
            Rating::Easy => "easy",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rating {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "again" => Ok(Rating::Again),
            "good" => Ok(Rating::Good),
            "easy" => Ok(Rating::Easy),
            other => Err(CoreError::invalid(format!(
                "rating must be one of again, good, easy (got {other:?})"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CardKind {
    Vocabulary,
    Kanji,
    Grammar,
}

impl CardKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CardKind::Vocabulary => "vocabulary",
            CardKind::Kanji => "kanji",
            CardKind::Grammar => "grammar",
        }
    }
}

impl fmt::Display for CardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vocabulary" | "vocab" | "word" => Ok(CardKind::Vocabulary),
            "kanji" => Ok(CardKind::Kanji),
            "grammar" => Ok(CardKind::Grammar),
            other => Err(CoreError::invalid(format!(
                "kind must be one of vocabulary, kanji, grammar (got {other:?})"
            ))),
        }
    }
}

/// Memory-strength state carried by every card.
///
/// Only [`crate::apply_review`] produces a reviewed state; anything built by
/// hand or loaded from outside should pass [`ReviewState::check_invariants`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewState {
    pub is_learned: bool,
    pub reviews: u32,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub streak: u32,
    pub interval_days: u32,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    pub next_review_at: Option<DateTime<Utc>>,
}

impl Default for ReviewState {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewState {
    pub fn new() -> Self {
        Self {
            is_learned: false,
            reviews: 0,
            correct_count: 0,
            incorrect_count: 0,
            streak: 0,
            interval_days: MIN_INTERVAL_DAYS,
            last_reviewed_at: None,
            next_review_at: None,
        }
    }

    pub fn is_new(&self) -> bool {
        self.reviews == 0
    }

    pub fn check_invariants(&self) -> Result<(), CoreError> {
        if self.reviews != self.correct_count.saturating_add(self.incorrect_count) {
            return Err(CoreError::invalid(
                "reviews must equal correctCount + incorrectCount",
            ));
        }
        if !(MIN_INTERVAL_DAYS..=MAX_INTERVAL_DAYS).contains(&self.interval_days) {
            return Err(CoreError::invalid(format!(
                "intervalDays must be between {MIN_INTERVAL_DAYS} and {MAX_INTERVAL_DAYS}"
            )));
        }
        if self.streak > self.correct_count {
            return Err(CoreError::invalid("streak cannot exceed correctCount"));
        }
        match (self.reviews, self.last_reviewed_at, self.next_review_at) {
            (0, None, None) => Ok(()),
            (0, _, _) => Err(CoreError::invalid(
                "a card with no reviews has no review timestamps",
            )),
            (_, Some(last), Some(next)) => {
                if last.checked_add_signed(Duration::days(i64::from(self.interval_days))) == Some(next) {
                    Ok(())
                } else {
                    Err(CoreError::invalid(
                        "nextReviewAt must be lastReviewedAt + intervalDays",
                    ))
                }
            }
            _ => Err(CoreError::invalid(
                "a reviewed card needs lastReviewedAt and nextReviewAt",
            )),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub kind: CardKind,
    pub front: String,
    pub back: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub review: ReviewState,
}

impl Card {
    pub fn new(kind: CardKind, front: impl Into<String>, back: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            front: front.into(),
            back: back.into(),
            created_at: Utc::now(),
            version: 0,
            review: ReviewState::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLog {
    pub id: ReviewLogId,
    pub card_id: CardId,
    pub rating: Rating,
    pub reviewed_at: DateTime<Utc>,
    pub interval_days: u32,
}

impl ReviewLog {
    pub fn new(card_id: CardId, rating: Rating, reviewed_at: DateTime<Utc>, interval_days: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id,
            rating,
            reviewed_at,
            interval_days,
        }
    }
}
