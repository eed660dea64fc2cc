use crate::{apply_review_with, Card, CardId, Clock, CoreError, Rating, Repository, ReviewLog, SchedulerPolicy};
use tracing::{debug, info, warn};

/// Loads a card, applies one rating at `clock.now()` and persists the result.
///
/// This is the only path that writes review state. On `Conflict` the stored
/// card moved on since it was read; reload before deciding to rate again,
/// since replaying the same review would count it twice.
pub async fn review_card<R: Repository + ?Sized>(
    repo: &R,
    clock: &dyn Clock,
    policy: &SchedulerPolicy,
    id: CardId,
    rating: Rating,
) -> Result<Card, CoreError> {
    let card = repo.get_card(id).await?;
    let now = clock.now();

    let mut updated = card.clone();
    updated.review = apply_review_with(policy, &card.review, rating, now);
    debug!(card = %id, version = card.version, "applying review");

    let log = ReviewLog::new(id, rating, now, updated.review.interval_days);
    match repo.save_review(&updated, card.version, &log).await {
        Ok(saved) => {
            info!(
                card = %id,
                %rating,
                interval_days = saved.review.interval_days,
                streak = saved.review.streak,
                "review recorded"
            );
            Ok(saved)
        }
        Err(e) => {
            warn!(card = %id, %rating, error = %e, "review not recorded");
            Err(e)
        }
    }
}
