use crate::{is_due, Card};
use chrono::{DateTime, Utc};

/// Due cards in review order, computed on demand.
///
/// Holding a `DueQueue` costs nothing; every call to [`DueQueue::iter`]
/// re-runs the selection against the borrowed cards, so the queue can be
/// walked any number of times and always yields the same order for the
/// same input.
#[derive(Clone, Copy, Debug)]
pub struct DueQueue<'a> {
    cards: &'a [Card],
    now: DateTime<Utc>,
}

pub fn select_due_queue(cards: &[Card], now: DateTime<Utc>) -> DueQueue<'_> {
    DueQueue { cards, now }
}

impl<'a> DueQueue<'a> {
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn iter(&self) -> std::vec::IntoIter<&'a Card> {
        let mut due: Vec<&'a Card> = self
            .cards
            .iter()
            .filter(|c| is_due(&c.review, self.now))
            .collect();
        // `None < Some(_)` puts new cards first; sort_by_key is stable.
        due.sort_by_key(|c| c.review.next_review_at);
        due.into_iter()
    }

    pub fn len(&self) -> usize {
        self.cards
            .iter()
            .filter(|c| is_due(&c.review, self.now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take_vec(&self, limit: Option<usize>) -> Vec<Card> {
        let it = self.iter().cloned();
        match limit {
            Some(n) => it.take(n).collect(),
            None => it.collect(),
        }
    }
}

impl<'a> IntoIterator for DueQueue<'a> {
    type Item = &'a Card;
    type IntoIter = std::vec::IntoIter<&'a Card>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &DueQueue<'a> {
    type Item = &'a Card;
    type IntoIter = std::vec::IntoIter<&'a Card>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
