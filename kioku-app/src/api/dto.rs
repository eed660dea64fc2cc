use kioku_core::{CardKind, CoreError, ReviewState, Stats};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CardIn {
    pub kind: String,
    pub front: String,
    pub back: String,
}

#[derive(Deserialize)]
pub struct ReviewIn {
    pub rating: String,
}

/// The updated review-state fields of one card.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOut {
    pub id: Uuid,
    pub version: u64,
    #[serde(flatten)]
    pub review: ReviewState,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatsOut {
    #[serde(flatten)]
    pub stats: Stats,
    /// Consecutive days with at least one review, ending today.
    pub daily_streak: u32,
}

pub fn parse_kind(s: Option<&str>) -> Result<Option<CardKind>, CoreError> {
    s.map(str::parse::<CardKind>).transpose()
}

pub fn parse_card_id(s: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(s.trim()).map_err(|_| CoreError::invalid(format!("invalid card id {s:?}")))
}
