use crate::{filter_by_optional_kind, Card, CardId, CardKind, CoreError, ReviewLog};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Default)]
struct State {
    cards: HashMap<CardId, Card>,
    reviews: HashMap<CardId, Vec<ReviewLog>>,
}

#[derive(Default)]
pub struct MemoryRepo {
    state: RwLock<State>,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl crate::repo::Repository for MemoryRepo {
    async fn add_card(&self, kind: CardKind, front: &str, back: &str) -> Result<Card, CoreError> {
        let card = Card::new(kind, front, back);
        self.state.write().cards.insert(card.id, card.clone());
        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        self.state
            .read()
            .cards
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("card"))
    }

    async fn list_cards(&self, kind: Option<CardKind>) -> Result<Vec<Card>, CoreError> {
        let all: Vec<Card> = self.state.read().cards.values().cloned().collect();
        let mut v = filter_by_optional_kind(all, kind);
        v.sort_by_key(|c| (c.created_at, c.id));
        Ok(v)
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        let mut s = self.state.write();
        s.cards.remove(&id).ok_or(CoreError::NotFound("card"))?;
        s.reviews.remove(&id);
        Ok(())
    }

    async fn import_card(&self, card: &Card) -> Result<Card, CoreError> {
        card.review.check_invariants()?;
        let mut s = self.state.write();
        if s.cards.contains_key(&card.id) {
            return Err(CoreError::Conflict("card id already exists"));
        }
        s.cards.insert(card.id, card.clone());
        Ok(card.clone())
    }

    async fn save_review(
        &self,
        card: &Card,
        expected_version: u64,
        log: &ReviewLog,
    ) -> Result<Card, CoreError> {
        // One write guard covers the version check, the update and the log.
        let mut s = self.state.write();
        let stored = s.cards.get_mut(&card.id).ok_or(CoreError::NotFound("card"))?;
        if stored.version != expected_version {
            return Err(CoreError::Conflict("card was reviewed concurrently"));
        }
        stored.review = card.review.clone();
        stored.version += 1;
        let out = stored.clone();
        s.reviews.entry(card.id).or_default().push(log.clone());
        Ok(out)
    }

    async fn list_reviews(&self, card_id: Option<CardId>) -> Result<Vec<ReviewLog>, CoreError> {
        let s = self.state.read();
        let mut v: Vec<ReviewLog> = match card_id {
            Some(id) => s.reviews.get(&id).cloned().unwrap_or_default(),
            None => s.reviews.values().flatten().cloned().collect(),
        };
        v.sort_by_key(|r| r.reviewed_at);
        Ok(v)
    }
}
