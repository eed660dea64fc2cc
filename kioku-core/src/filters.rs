use crate::{Card, CardKind};

pub fn filter_by_kind(cards: Vec<Card>, kind: CardKind) -> Vec<Card> {
    cards.into_iter().filter(|c| c.kind == kind).collect()
}

/// `filter_by_kind` when a kind is given, the whole collection otherwise.
pub fn filter_by_optional_kind(cards: Vec<Card>, kind: Option<CardKind>) -> Vec<Card> {
    match kind {
        Some(k) => filter_by_kind(cards, k),
        None => cards,
    }
}
