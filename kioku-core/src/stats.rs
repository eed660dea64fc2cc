use crate::{is_due, Card, CardId, ReviewLog};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_words: u32,
    pub learned_words: u32,
    pub due_today: u32,
    pub total_reviews: u64,
    /// Percent of reviews not rated "again", rounded.
    pub accuracy: u32,
    /// Best per-card streak.
    pub streak: u32,
    pub mastery_percentage: f64,
}

pub fn aggregate_stats(cards: &[Card], now: DateTime<Utc>) -> Stats {
    let mut stats = Stats::default();
    let mut correct: u64 = 0;

    for c in cards {
        let r = &c.review;
        stats.total_words += 1;
        if r.is_learned {
            stats.learned_words += 1;
        }
        if is_due(r, now) {
            stats.due_today += 1;
        }
        stats.total_reviews += u64::from(r.reviews);
        correct += u64::from(r.correct_count);
        stats.streak = stats.streak.max(r.streak);
    }

    stats.accuracy = percent(correct, stats.total_reviews).round() as u32;
    stats.mastery_percentage = percent(
        u64::from(stats.learned_words),
        u64::from(stats.total_words),
    );
    stats
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Consecutive calendar days (UTC) ending at `today` with at least one review.
pub fn daily_streak(logs: &[ReviewLog], today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = logs.iter().map(|l| l.reviewed_at.date_naive()).collect();
    let mut streak = 0u32;
    let mut day = today;
    while days.contains(&day) {
        streak += 1;
        day -= Duration::days(1);
    }
    streak
}

/// [`daily_streak`] over the logs that belong to `cards`.
pub fn study_streak(cards: &[Card], logs: &[ReviewLog], today: NaiveDate) -> u32 {
    let ids: HashSet<CardId> = cards.iter().map(|c| c.id).collect();
    let own: Vec<ReviewLog> = logs
        .iter()
        .filter(|l| ids.contains(&l.card_id))
        .cloned()
        .collect();
    daily_streak(&own, today)
}
