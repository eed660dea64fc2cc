use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::api::routes::{
    create_card, due_cards, get_card, list_card_reviews, list_cards, post_review, stats, AppState,
};

pub fn router(state: AppState) -> Router {
    // Static segments win over `:id`, so /cards/due never parses as an id.
    Router::new()
        .route("/cards", get(list_cards).post(create_card))
        .route("/cards/due", get(due_cards))
        .route("/cards/stats", get(stats))
        .route("/cards/:id", get(get_card))
        .route("/cards/:id/review", post(post_review))
        .route("/cards/:id/reviews", get(list_card_reviews))
        .with_state(Arc::new(state))
        .layer(TraceLayer::new_for_http())
}

pub async fn run(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "api listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
