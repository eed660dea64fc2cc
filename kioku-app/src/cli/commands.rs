use crate::api::routes::AppState;
use crate::api::server as api_server;
use crate::cli::opts::*;
use crate::config::AppConfig;

use anyhow::{anyhow, Context, Result};
use kioku_core::{
    aggregate_stats, memory::MemoryRepo, review_card, select_due_queue, study_streak, Card,
    CardKind, Clock, CoreError, Rating, Repository, SchedulerPolicy, SystemClock,
};
use kioku_json::JsonStore;
use kioku_sqlite::SqliteRepo;
use std::io::{stdin, stdout, BufRead, Write};
use std::sync::Arc;
use uuid::Uuid;

pub async fn run_cli(cmd: Command, config: AppConfig) -> Result<()> {
    let repo = open_repo(&config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cmd {
        Command::Card(cmd) => card_cmd(repo, cmd).await,
        Command::Due(q) => due_cmd(repo, &*clock, q).await,
        Command::Rate(r) => rate_cmd(repo, &*clock, &config, r).await,
        Command::Review(q) => review_cmd(repo, &*clock, &config, q).await,
        Command::Stats(k) => stats_cmd(repo, &*clock, k).await,
        Command::Export { path } => export_cmd(repo, path).await,
        Command::Import { path } => import_cmd(repo, path).await,
        Command::Api(api) => {
            let addr: std::net::SocketAddr = api.addr.parse().context("invalid --addr")?;
            let state = AppState {
                repo,
                clock,
                policy: config.policy,
            };
            api_server::run(state, addr).await
        }
    }
}

pub async fn open_repo(config: &AppConfig) -> Result<Arc<dyn Repository>> {
    let p = &config.store_path;
    match config.store {
        StoreKind::Memory => Ok(Arc::new(MemoryRepo::new())),
        StoreKind::Json => {
            let backups = p
                .parent()
                .map(|d| d.join("backups"))
                .unwrap_or_else(|| "backups".into());
            let s = JsonStore::open_with(p.clone(), backups, 10).await?;
            Ok(Arc::new(s))
        }
        StoreKind::Sqlite => {
            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            let s = SqliteRepo::open_file(p).await?;
            Ok(Arc::new(s))
        }
    }
}

async fn card_cmd(repo: Arc<dyn Repository>, cmd: CardCmd) -> Result<()> {
    match cmd {
        CardCmd::Add(a) => {
            let kind: CardKind = a.kind.parse()?;
            let c = repo.add_card(kind, &a.front, &a.back).await?;
            println!("{}", c.id);
        }
        CardCmd::List(k) => {
            let cards = repo.list_cards(parse_kind(k.kind.as_deref())?).await?;
            for c in cards {
                let r = &c.review;
                println!(
                    "{}\t{}\t{}\t{}\treviews={}\tinterval={}d\tnext={}",
                    c.id,
                    c.kind,
                    c.front,
                    c.back,
                    r.reviews,
                    r.interval_days,
                    r.next_review_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "new".to_string())
                );
            }
        }
        CardCmd::Rm { card_id } => {
            repo.delete_card(parse_uuid(&card_id)?).await?;
            println!("ok");
        }
    }
    Ok(())
}

async fn due_cmd(repo: Arc<dyn Repository>, clock: &dyn Clock, q: QueueArgs) -> Result<()> {
    let cards = repo.list_cards(parse_kind(q.kind.as_deref())?).await?;
    let queue = select_due_queue(&cards, clock.now());
    if queue.is_empty() {
        println!("no cards due");
        return Ok(());
    }
    for c in queue.iter().take(q.max) {
        let when = c
            .review
            .next_review_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "new".to_string());
        println!("{}\t{}\t{}\t{}", c.id, c.kind, c.front, when);
    }
    Ok(())
}

async fn rate_cmd(repo: Arc<dyn Repository>, clock: &dyn Clock, config: &AppConfig, r: RateCmd) -> Result<()> {
    let rating = parse_rating_key(&r.rating)?;
    let id = parse_uuid(&r.card_id)?;
    let card = review_card(&*repo, clock, &config.policy, id, rating).await?;
    println!("{}", serde_json::to_string_pretty(&card.review)?);
    Ok(())
}

async fn review_cmd(repo: Arc<dyn Repository>, clock: &dyn Clock, config: &AppConfig, q: QueueArgs) -> Result<()> {
    let cards = repo.list_cards(parse_kind(q.kind.as_deref())?).await?;
    let due = select_due_queue(&cards, clock.now()).take_vec(Some(q.max));
    if due.is_empty() {
        println!("no cards due");
        return Ok(());
    }

    let reviewed = review_session(&*repo, clock, &config.policy, &due, &mut stdin().lock(), &mut stdout()).await?;
    println!("\nreviewed {reviewed}");
    Ok(())
}

/// Walks `due` one card at a time and returns how many reviews were saved.
async fn review_session(
    repo: &dyn Repository,
    clock: &dyn Clock,
    policy: &SchedulerPolicy,
    due: &[Card],
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> Result<usize> {
    let mut reviewed = 0usize;
    for (i, card) in due.iter().enumerate() {
        writeln!(out, "\n[{}/{}] {} ({})", i + 1, due.len(), card.id, card.kind)?;
        writeln!(out, "Q: {}", card.front)?;
        if read_line(input, out, "[enter=show]")?.is_none() {
            return Ok(reviewed);
        }
        writeln!(out, "A: {}", card.back)?;
        writeln!(out, "[1=again, 2=good, 3=easy, s=skip, q=quit]")?;
        let rating = loop {
            let Some(line) = read_line(input, out, "rating> ")? else {
                return Ok(reviewed);
            };
            match line.trim().to_lowercase().as_str() {
                "s" | "skip" => break None,
                "q" | "quit" => return Ok(reviewed),
                other => match parse_rating_key(other) {
                    Ok(r) => break Some(r),
                    Err(_) => writeln!(out, "enter 1/2/3, s, or q")?,
                },
            }
        };

        if let Some(rating) = rating {
            match review_card(repo, clock, policy, card.id, rating).await {
                Ok(updated) => {
                    reviewed += 1;
                    writeln!(out, "→ next due in {} day(s)", updated.review.interval_days)?;
                }
                Err(CoreError::Conflict(_)) => {
                    writeln!(out, "card changed elsewhere; skipped (rerun to see its current state)")?
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(reviewed)
}

async fn stats_cmd(repo: Arc<dyn Repository>, clock: &dyn Clock, k: KindArg) -> Result<()> {
    let now = clock.now();
    let cards = repo.list_cards(parse_kind(k.kind.as_deref())?).await?;
    let s = aggregate_stats(&cards, now);
    let logs = repo.list_reviews(None).await?;

    println!("cards        {}", s.total_words);
    println!("learned      {} ({:.1}%)", s.learned_words, s.mastery_percentage);
    println!("due now      {}", s.due_today);
    println!("reviews      {}", s.total_reviews);
    println!("accuracy     {}%", s.accuracy);
    println!("best streak  {}", s.streak);
    println!("study days   {}", study_streak(&cards, &logs, now.date_naive()));
    Ok(())
}

async fn export_cmd(repo: Arc<dyn Repository>, path: std::path::PathBuf) -> Result<()> {
    let cards = repo.list_cards(None).await?;
    let bundle = ExportBundle { version: 1, cards };
    let s = serde_json::to_string_pretty(&bundle)?;
    std::fs::write(&path, s)?;
    println!("wrote {}", path.display());
    Ok(())
}

async fn import_cmd(repo: Arc<dyn Repository>, path: std::path::PathBuf) -> Result<()> {
    let data = std::fs::read_to_string(&path)?;
    let bundle: ExportBundle = serde_json::from_str(&data)?;
    let (mut imported, mut skipped) = (0usize, 0usize);
    for c in bundle.cards {
        c.review
            .check_invariants()
            .with_context(|| format!("card {} has an invalid review state", c.id))?;
        match repo.import_card(&c).await {
            Ok(_) => imported += 1,
            Err(CoreError::Conflict(_)) => {
                tracing::warn!(card = %c.id, "card already exists, skipping");
                skipped += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
    println!("imported {imported}, skipped {skipped}");
    Ok(())
}

// ===== Helpers =====
fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).map_err(|_| anyhow!("invalid card id: {s}"))
}

/// Keypad shortcuts for the terminal; full names go through `Rating`.
fn parse_rating_key(s: &str) -> Result<Rating, CoreError> {
    match s.trim().to_lowercase().as_str() {
        "1" | "a" => Ok(Rating::Again),
        "2" | "g" => Ok(Rating::Good),
        "3" | "e" => Ok(Rating::Easy),
        other => other.parse(),
    }
}

fn parse_kind(s: Option<&str>) -> Result<Option<CardKind>> {
    Ok(crate::api::dto::parse_kind(s)?)
}

/// `None` at end of input.
fn read_line(input: &mut impl BufRead, out: &mut impl Write, prompt: &str) -> Result<Option<String>> {
    write!(out, "{prompt}")?;
    out.flush()?;
    let mut s = String::new();
    if input.read_line(&mut s)? == 0 {
        return Ok(None);
    }
    Ok(Some(s))
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ExportBundle { version: u32, cards: Vec<Card> }

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kioku_core::FixedClock;
    use std::io::Cursor;

    #[tokio::test]
    async fn session_counts_only_saved_reviews() {
        let repo = MemoryRepo::new();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap());
        let a = repo.add_card(CardKind::Kanji, "一", "one").await.unwrap();
        let b = repo.add_card(CardKind::Kanji, "二", "two").await.unwrap();
        let c = repo.add_card(CardKind::Kanji, "三", "three").await.unwrap();
        let due = vec![a.clone(), b.clone(), c.clone()];

        // skip a, rate b with a key, type junk then rate c by name
        let mut input = Cursor::new("\ns\n\n3\n\nmeh\ngood\n");
        let mut out = Vec::new();
        let n = review_session(&repo, &clock, &SchedulerPolicy::default(), &due, &mut input, &mut out)
            .await
            .unwrap();

        assert_eq!(n, 2);
        assert_eq!(repo.get_card(a.id).await.unwrap().version, 0);
        assert_eq!(repo.get_card(b.id).await.unwrap().review.interval_days, 3);
        assert_eq!(repo.get_card(c.id).await.unwrap().review.interval_days, 2);
        assert!(String::from_utf8(out).unwrap().contains("enter 1/2/3"));
    }

    #[tokio::test]
    async fn session_stops_on_quit_or_end_of_input() {
        let repo = MemoryRepo::new();
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap());
        let a = repo.add_card(CardKind::Vocabulary, "本", "book").await.unwrap();
        let b = repo.add_card(CardKind::Vocabulary, "車", "car").await.unwrap();
        let due = vec![a, b.clone()];
        let policy = SchedulerPolicy::default();

        let mut input = Cursor::new("\n1\n\nq\n");
        let n = review_session(&repo, &clock, &policy, &due, &mut input, &mut Vec::new())
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(repo.get_card(b.id).await.unwrap().version, 0);

        let mut input = Cursor::new("");
        let n = review_session(&repo, &clock, &policy, &due[1..], &mut input, &mut Vec::new())
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn review_keys_map_to_ratings() {
        assert_eq!(parse_rating_key("1").unwrap(), Rating::Again);
        assert_eq!(parse_rating_key("G").unwrap(), Rating::Good);
        assert_eq!(parse_rating_key(" 3 ").unwrap(), Rating::Easy);
        assert_eq!(parse_rating_key("easy").unwrap(), Rating::Easy);
        assert!(matches!(parse_rating_key("4"), Err(CoreError::InvalidArgument(_))));
    }
}
