use chrono::{DateTime, SecondsFormat, Utc};
use kioku_core::{repo::Repository, Card, CardId, CardKind, CoreError, Rating, ReviewLog, ReviewState};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};
use std::path::Path;
use tracing::debug;

const CARD_COLUMNS: &str = r#"id,kind,front,back,created_at,version,is_learned,reviews,
    correct_count,incorrect_count,streak,interval_days,last_reviewed_at,next_review_at"#;

pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    pub async fn open_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .map_err(|_| CoreError::Storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        debug!(path = %path.as_ref().display(), "sqlite store opened");
        Ok(repo)
    }

    /// Every pooled connection to `:memory:` is its own database, so this
    /// pool holds exactly one.
    pub async fn open_memory() -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|_| CoreError::Storage("sqlite connect"))?;
        let repo = Self { pool };
        repo.ensure_schema().await?;
        Ok(repo)
    }

    async fn ensure_schema(&self) -> Result<(), CoreError> {
        const STMT: &str = r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS cards (
          id                TEXT PRIMARY KEY,
          kind              TEXT NOT NULL,
          front             TEXT NOT NULL,
          back              TEXT NOT NULL,
          created_at        TEXT NOT NULL,
          version           INTEGER NOT NULL DEFAULT 0,
          is_learned        INTEGER NOT NULL DEFAULT 0,
          reviews           INTEGER NOT NULL DEFAULT 0,
          correct_count     INTEGER NOT NULL DEFAULT 0,
          incorrect_count   INTEGER NOT NULL DEFAULT 0,
          streak            INTEGER NOT NULL DEFAULT 0,
          interval_days     INTEGER NOT NULL DEFAULT 1 CHECK (interval_days >= 1),
          last_reviewed_at  TEXT,
          next_review_at    TEXT,
          CHECK (reviews = correct_count + incorrect_count)
        );

        CREATE TABLE IF NOT EXISTS review_logs (
          id             TEXT PRIMARY KEY,
          card_id        TEXT NOT NULL,
          rating         TEXT NOT NULL,
          reviewed_at    TEXT NOT NULL,
          interval_days  INTEGER NOT NULL,
          FOREIGN KEY(card_id) REFERENCES cards(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_cards_kind_next ON cards (kind, next_review_at);
        CREATE INDEX IF NOT EXISTS idx_review_logs_card_time ON review_logs (card_id, reviewed_at);
        "#;

        // Execute statements one by one for compatibility.
        for chunk in STMT.split(';') {
            let sql = chunk.trim();
            if sql.is_empty() {
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|_| CoreError::Storage("sqlite schema"))?;
        }
        Ok(())
    }

    async fn insert_card(&self, card: &Card) -> Result<(), CoreError> {
        let r = &card.review;
        sqlx::query(
            r#"
            INSERT INTO cards (
              id, kind, front, back, created_at, version, is_learned, reviews,
              correct_count, incorrect_count, streak, interval_days,
              last_reviewed_at, next_review_at
            )
            VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?)
            "#,
        )
        .bind(card.id.to_string())
        .bind(card.kind.as_str())
        .bind(&card.front)
        .bind(&card.back)
        .bind(dt_to_str(card.created_at))
        .bind(card.version as i64)
        .bind(bool_to_i(r.is_learned))
        .bind(i64::from(r.reviews))
        .bind(i64::from(r.correct_count))
        .bind(i64::from(r.incorrect_count))
        .bind(i64::from(r.streak))
        .bind(i64::from(r.interval_days))
        .bind(r.last_reviewed_at.map(dt_to_str))
        .bind(r.next_review_at.map(dt_to_str))
        .execute(&self.pool)
        .await
        .map_err(|_| CoreError::Storage("insert card"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Repository for SqliteRepo {
    // ===== Cards =====
    async fn add_card(&self, kind: CardKind, front: &str, back: &str) -> Result<Card, CoreError> {
        let card = Card::new(kind, front, back);
        self.insert_card(&card).await?;
        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        let row = sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM cards WHERE id=?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("read card"))?;
        let row = row.ok_or(CoreError::NotFound("card"))?;
        row_into_card(row)
    }

    async fn list_cards(&self, kind: Option<CardKind>) -> Result<Vec<Card>, CoreError> {
        let rows = if let Some(k) = kind {
            sqlx::query(&format!(
                "SELECT {CARD_COLUMNS} FROM cards WHERE kind=? ORDER BY created_at ASC, id ASC"
            ))
            .bind(k.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("list cards"))?
        } else {
            sqlx::query(&format!(
                "SELECT {CARD_COLUMNS} FROM cards ORDER BY created_at ASC, id ASC"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("list cards"))?
        };
        let mut v = Vec::with_capacity(rows.len());
        for row in rows {
            v.push(row_into_card(row)?);
        }
        Ok(v)
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|_| CoreError::Storage("tx"))?;
        sqlx::query("DELETE FROM review_logs WHERE card_id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("del review logs"))?;
        let res = sqlx::query("DELETE FROM cards WHERE id=?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("del card"))?;
        if res.rows_affected() == 0 {
            tx.rollback().await.ok();
            return Err(CoreError::NotFound("card"));
        }
        tx.commit()
            .await
            .map_err(|_| CoreError::Storage("tx commit"))
    }

    async fn import_card(&self, card: &Card) -> Result<Card, CoreError> {
        card.review.check_invariants()?;
        let exists = sqlx::query("SELECT 1 FROM cards WHERE id=? LIMIT 1")
            .bind(card.id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|_| CoreError::Storage("read card"))?
            .is_some();
        if exists {
            return Err(CoreError::Conflict("card id already exists"));
        }
        self.insert_card(card).await?;
        Ok(card.clone())
    }

    // ===== Reviews =====
    async fn save_review(
        &self,
        card: &Card,
        expected_version: u64,
        log: &ReviewLog,
    ) -> Result<Card, CoreError> {
        let r = &card.review;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|_| CoreError::Storage("tx"))?;

        let res = sqlx::query(
            r#"
            UPDATE cards SET
              version=version+1, is_learned=?, reviews=?, correct_count=?,
              incorrect_count=?, streak=?, interval_days=?,
              last_reviewed_at=?, next_review_at=?
            WHERE id=? AND version=?
            "#,
        )
        .bind(bool_to_i(r.is_learned))
        .bind(i64::from(r.reviews))
        .bind(i64::from(r.correct_count))
        .bind(i64::from(r.incorrect_count))
        .bind(i64::from(r.streak))
        .bind(i64::from(r.interval_days))
        .bind(r.last_reviewed_at.map(dt_to_str))
        .bind(r.next_review_at.map(dt_to_str))
        .bind(card.id.to_string())
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await
        .map_err(|_| CoreError::Storage("update card"))?;

        if res.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM cards WHERE id=? LIMIT 1")
                .bind(card.id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|_| CoreError::Storage("read card"))?
                .is_some();
            tx.rollback().await.ok();
            return Err(if exists {
                CoreError::Conflict("card was reviewed concurrently")
            } else {
                CoreError::NotFound("card")
            });
        }

        sqlx::query(
            r#"INSERT INTO review_logs (id,card_id,rating,reviewed_at,interval_days)
               VALUES (?,?,?,?,?)"#,
        )
        .bind(log.id.to_string())
        .bind(log.card_id.to_string())
        .bind(log.rating.as_str())
        .bind(dt_to_str(log.reviewed_at))
        .bind(i64::from(log.interval_days))
        .execute(&mut *tx)
        .await
        .map_err(|_| CoreError::Storage("insert review log"))?;

        let row = sqlx::query(&format!("SELECT {CARD_COLUMNS} FROM cards WHERE id=?"))
            .bind(card.id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(|_| CoreError::Storage("read card"))?;
        let saved = row_into_card(row)?;

        tx.commit()
            .await
            .map_err(|_| CoreError::Storage("tx commit"))?;
        Ok(saved)
    }

    async fn list_reviews(&self, card_id: Option<CardId>) -> Result<Vec<ReviewLog>, CoreError> {
        let rows = if let Some(id) = card_id {
            sqlx::query(
                r#"SELECT id,card_id,rating,reviewed_at,interval_days
                   FROM review_logs WHERE card_id=? ORDER BY reviewed_at ASC"#,
            )
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"SELECT id,card_id,rating,reviewed_at,interval_days
                   FROM review_logs ORDER BY reviewed_at ASC"#,
            )
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|_| CoreError::Storage("list review logs"))?;

        let mut v = Vec::with_capacity(rows.len());
        for row in rows {
            v.push(ReviewLog {
                id: uuid_from_str(row.get::<String, _>("id"))?,
                card_id: uuid_from_str(row.get::<String, _>("card_id"))?,
                rating: row
                    .get::<String, _>("rating")
                    .parse::<Rating>()
                    .map_err(|_| CoreError::Storage("bad rating in review log"))?,
                reviewed_at: dt_from_str(row.get::<String, _>("reviewed_at"))?,
                interval_days: u32_from_i(row.get::<i64, _>("interval_days"))?,
            });
        }
        Ok(v)
    }
}

// ===== Helpers =====
fn uuid_from_str(s: String) -> Result<uuid::Uuid, CoreError> {
    uuid::Uuid::parse_str(&s).map_err(|_| CoreError::Storage("bad uuid"))
}

// Fixed-width so TEXT ordering matches time ordering.
fn dt_to_str(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn dt_from_str(s: String) -> Result<DateTime<Utc>, CoreError> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map_err(|_| CoreError::Storage("bad datetime"))
        .map(|dt| dt.with_timezone(&Utc))
}

fn bool_to_i(b: bool) -> i64 {
    if b {
        1
    } else {
        0
    }
}

fn u32_from_i(i: i64) -> Result<u32, CoreError> {
    u32::try_from(i).map_err(|_| CoreError::Storage("counter out of range"))
}

fn row_into_card(row: SqliteRow) -> Result<Card, CoreError> {
    Ok(Card {
        id: uuid_from_str(row.get::<String, _>("id"))?,
        kind: row
            .get::<String, _>("kind")
            .parse::<CardKind>()
            .map_err(|_| CoreError::Storage("bad card kind"))?,
        front: row.get::<String, _>("front"),
        back: row.get::<String, _>("back"),
        created_at: dt_from_str(row.get::<String, _>("created_at"))?,
        version: row.get::<i64, _>("version") as u64,
        review: ReviewState {
            is_learned: row.get::<i64, _>("is_learned") != 0,
            reviews: u32_from_i(row.get::<i64, _>("reviews"))?,
            correct_count: u32_from_i(row.get::<i64, _>("correct_count"))?,
            incorrect_count: u32_from_i(row.get::<i64, _>("incorrect_count"))?,
            streak: u32_from_i(row.get::<i64, _>("streak"))?,
            interval_days: u32_from_i(row.get::<i64, _>("interval_days"))?,
            last_reviewed_at: row
                .get::<Option<String>, _>("last_reviewed_at")
                .map(dt_from_str)
                .transpose()?,
            next_review_at: row
                .get::<Option<String>, _>("next_review_at")
                .map(dt_from_str)
                .transpose()?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kioku_core::{apply_review, review_card, FixedClock, SchedulerPolicy};

    #[tokio::test]
    async fn review_round_trips_through_sqlite() {
        let repo = SqliteRepo::open_memory().await.unwrap();
        let clock = FixedClock::new(Utc::now());
        let card = repo.add_card(CardKind::Kanji, "森", "forest").await.unwrap();

        let out = review_card(&repo, &clock, &SchedulerPolicy::default(), card.id, Rating::Easy)
            .await
            .unwrap();
        assert_eq!(out.version, 1);
        assert_eq!(out.review.interval_days, 3);
        assert!(out.review.check_invariants().is_ok());

        let stored = repo.get_card(card.id).await.unwrap();
        assert_eq!(stored.review, out.review);
        assert_eq!(stored.kind, CardKind::Kanji);

        let logs = repo.list_reviews(Some(card.id)).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].rating, Rating::Easy);
    }

    #[tokio::test]
    async fn stale_version_conflicts_and_unknown_card_is_not_found() {
        let repo = SqliteRepo::open_memory().await.unwrap();
        let card = repo.add_card(CardKind::Vocabulary, "花", "flower").await.unwrap();
        let mut next = card.clone();
        next.review = apply_review(&card.review, Rating::Good, Utc::now());
        let log = ReviewLog::new(card.id, Rating::Good, Utc::now(), 2);

        repo.save_review(&next, 0, &log).await.unwrap();
        let log2 = ReviewLog::new(card.id, Rating::Good, Utc::now(), 2);
        let err = repo.save_review(&next, 0, &log2).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(repo.list_reviews(None).await.unwrap().len(), 1);

        let mut ghost = next.clone();
        ghost.id = uuid::Uuid::new_v4();
        let log3 = ReviewLog::new(ghost.id, Rating::Good, Utc::now(), 2);
        let err = repo.save_review(&ghost, 0, &log3).await.unwrap_err();
        assert_eq!(err, CoreError::NotFound("card"));
    }

    #[tokio::test]
    async fn list_filters_by_kind_and_delete_cascades() {
        let repo = SqliteRepo::open_memory().await.unwrap();
        let a = repo.add_card(CardKind::Grammar, "〜でしょう", "probably").await.unwrap();
        repo.add_card(CardKind::Kanji, "石", "stone").await.unwrap();

        assert_eq!(repo.list_cards(Some(CardKind::Grammar)).await.unwrap().len(), 1);
        assert_eq!(repo.list_cards(None).await.unwrap().len(), 2);

        let clock = FixedClock::new(Utc::now());
        review_card(&repo, &clock, &SchedulerPolicy::default(), a.id, Rating::Again)
            .await
            .unwrap();
        repo.delete_card(a.id).await.unwrap();
        assert!(repo.list_reviews(None).await.unwrap().is_empty());
        assert_eq!(repo.get_card(a.id).await.unwrap_err(), CoreError::NotFound("card"));
    }
}
