use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use kioku_core::{
    aggregate_stats, review_card, select_due_queue, study_streak, Card, CardKind, Clock, CoreError,
    Rating, Repository, ReviewLog, SchedulerPolicy,
};

use crate::api::dto::{parse_card_id, parse_kind, CardIn, ReviewIn, ReviewOut, StatsOut};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub clock: Arc<dyn Clock>,
    pub policy: SchedulerPolicy,
}

pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
pub struct KindQuery {
    kind: Option<String>,
}

#[derive(Deserialize)]
pub struct DueQuery {
    kind: Option<String>,
    limit: Option<usize>,
}

pub async fn create_card(
    State(st): State<Arc<AppState>>,
    Json(body): Json<CardIn>,
) -> ApiResult<(StatusCode, Json<Card>)> {
    let kind: CardKind = body.kind.parse()?;
    if body.front.trim().is_empty() {
        return Err(CoreError::invalid("front must not be empty").into());
    }
    let card = st.repo.add_card(kind, &body.front, &body.back).await?;
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn list_cards(
    State(st): State<Arc<AppState>>,
    Query(q): Query<KindQuery>,
) -> ApiResult<Json<Vec<Card>>> {
    let kind = parse_kind(q.kind.as_deref())?;
    Ok(Json(st.repo.list_cards(kind).await?))
}

pub async fn get_card(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Card>> {
    Ok(Json(st.repo.get_card(parse_card_id(&id)?).await?))
}

pub async fn post_review(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ReviewIn>,
) -> ApiResult<Json<ReviewOut>> {
    let id = parse_card_id(&id)?;
    let rating: Rating = body.rating.parse()?;
    let card = review_card(&*st.repo, &*st.clock, &st.policy, id, rating).await?;
    Ok(Json(ReviewOut {
        id: card.id,
        version: card.version,
        review: card.review,
    }))
}

pub async fn list_card_reviews(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ReviewLog>>> {
    let id = parse_card_id(&id)?;
    st.repo.get_card(id).await?;
    Ok(Json(st.repo.list_reviews(Some(id)).await?))
}

pub async fn due_cards(
    State(st): State<Arc<AppState>>,
    Query(q): Query<DueQuery>,
) -> ApiResult<Json<Vec<Card>>> {
    let kind = parse_kind(q.kind.as_deref())?;
    let cards = st.repo.list_cards(kind).await?;
    Ok(Json(select_due_queue(&cards, st.clock.now()).take_vec(q.limit)))
}

pub async fn stats(
    State(st): State<Arc<AppState>>,
    Query(q): Query<KindQuery>,
) -> ApiResult<Json<StatsOut>> {
    let kind = parse_kind(q.kind.as_deref())?;
    let now = st.clock.now();
    let cards = st.repo.list_cards(kind).await?;
    let logs = st.repo.list_reviews(None).await?;
    Ok(Json(StatsOut {
        stats: aggregate_stats(&cards, now),
        daily_streak: study_streak(&cards, &logs, now.date_naive()),
    }))
}
