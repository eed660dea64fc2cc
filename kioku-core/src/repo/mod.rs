use crate::{Card, CardId, CardKind, CoreError, ReviewLog};
use async_trait::async_trait;

pub mod memory;

/// The Card Store: sole owner of persisted review state.
#[async_trait]
pub trait Repository: Send + Sync {
    // Cards
    async fn add_card(&self, kind: CardKind, front: &str, back: &str) -> Result<Card, CoreError>;
    async fn get_card(&self, id: CardId) -> Result<Card, CoreError>;
    async fn list_cards(&self, kind: Option<CardKind>) -> Result<Vec<Card>, CoreError>;
    async fn delete_card(&self, id: CardId) -> Result<(), CoreError>;

    /// Inserts a card as-is (id, timestamps and review state preserved).
    async fn import_card(&self, card: &Card) -> Result<Card, CoreError>;

    // Reviews

    /// Writes `card.review` and appends `log` when the stored version still
    /// equals `expected_version`. Returns the stored card with its bumped
    /// version; a stale version yields `Conflict` and writes nothing.
    async fn save_review(
        &self,
        card: &Card,
        expected_version: u64,
        log: &ReviewLog,
    ) -> Result<Card, CoreError>;

    async fn list_reviews(&self, card_id: Option<CardId>) -> Result<Vec<ReviewLog>, CoreError>;
}
