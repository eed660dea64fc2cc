use chrono::{DateTime, Utc};
use kioku_core::{filter_by_optional_kind, repo::Repository, Card, CardId, CardKind, CoreError, ReviewLog};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, warn};

pub mod paths;

const FILE_VERSION: u32 = 1;

#[derive(Clone, Serialize, Deserialize)]
struct FileImage {
    version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cards: Vec<Card>,
    reviews: Vec<ReviewLog>,
}

#[derive(Default, Clone)]
struct State {
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cards: HashMap<CardId, Card>,
    reviews: HashMap<CardId, Vec<ReviewLog>>,
}

impl State {
    fn new_empty() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
            cards: HashMap::new(),
            reviews: HashMap::new(),
        }
    }

    fn to_image(&self) -> FileImage {
        let mut cards: Vec<Card> = self.cards.values().cloned().collect();
        cards.sort_by_key(|c| (c.created_at, c.id));
        let mut reviews: Vec<ReviewLog> = self.reviews.values().flatten().cloned().collect();
        reviews.sort_by_key(|r| r.reviewed_at);
        FileImage {
            version: FILE_VERSION,
            created_at: self.created_at,
            updated_at: self.updated_at,
            cards,
            reviews,
        }
    }

    fn from_image(img: FileImage) -> Result<Self, CoreError> {
        if img.version != FILE_VERSION {
            return Err(CoreError::Storage("unsupported store file version"));
        }
        let mut cards = HashMap::new();
        for c in img.cards {
            if let Err(e) = c.review.check_invariants() {
                warn!(card = %c.id, error = %e, "store file holds an invalid review state");
                return Err(CoreError::Storage("invalid review state in store file"));
            }
            cards.insert(c.id, c);
        }
        let mut reviews: HashMap<CardId, Vec<ReviewLog>> = HashMap::new();
        for r in img.reviews {
            reviews.entry(r.card_id).or_default().push(r);
        }
        Ok(Self {
            created_at: img.created_at,
            updated_at: img.updated_at,
            cards,
            reviews,
        })
    }
}

/// Card store kept in memory and flushed to one JSON file after every write.
///
/// Each flush goes through a temp file + rename and also drops a timestamped
/// copy into `backups_dir`, keeping the newest `max_backups`.
pub struct JsonStore {
    path: PathBuf,
    backups_dir: PathBuf,
    max_backups: usize,
    state: RwLock<State>,
    // Serializes snapshot + write so an older snapshot never lands last.
    flush: Mutex<()>,
}

impl JsonStore {
    pub async fn open_default() -> Result<Self, CoreError> {
        let (file, backups) = paths::default_store_file();
        Self::open_with(file, backups, 10).await
    }

    pub async fn open_with(path: PathBuf, backups_dir: PathBuf, max_backups: usize) -> Result<Self, CoreError> {
        ensure_parent_dirs(&path)?;
        ensure_dir(&backups_dir)?;
        let max_backups = max_backups.max(1);
        let state = load_or_init(&path, &backups_dir, max_backups).await?;
        Ok(Self {
            path,
            backups_dir,
            max_backups,
            state: RwLock::new(state),
            flush: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` to a copy of the state, writes the copy, and only then
    /// makes it visible. The flush lock is held for the whole step, so a
    /// failed write leaves neither the file nor readers with the change.
    async fn commit<T, F>(&self, change: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut State) -> Result<T, CoreError> + Send,
        T: Send,
    {
        let _flush = self.flush.lock().await;
        let mut next = self.state.read().clone();
        let out = change(&mut next)?;
        next.updated_at = Utc::now();
        self.write_locked(next.to_image()).await?;
        *self.state.write() = next;
        Ok(out)
    }

    // Caller holds `flush`.
    async fn write_locked(&self, snapshot: FileImage) -> Result<(), CoreError> {
        let path = self.path.clone();
        let backups = self.backups_dir.clone();
        let keep = self.max_backups;

        task::spawn_blocking(move || write_with_backup(&path, &backups, keep, &snapshot))
            .await
            .map_err(|_| CoreError::Storage("io"))?
            .map_err(|e| {
                warn!(error = %e, "failed to write store file");
                CoreError::Storage("io")
            })?;
        debug!(path = %self.path.display(), "store file written");
        Ok(())
    }
}

fn ensure_parent_dirs(path: &Path) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> Result<(), CoreError> {
    fs::create_dir_all(path).map_err(|_| CoreError::Storage("io"))
}

async fn load_or_init(path: &Path, backups_dir: &Path, keep: usize) -> Result<State, CoreError> {
    if path.exists() {
        let p = path.to_path_buf();
        let img: FileImage = task::spawn_blocking(move || {
            let mut f = fs::File::open(&p)?;
            let mut buf = String::new();
            f.read_to_string(&mut buf)?;
            let v = serde_json::from_str::<FileImage>(&buf)?;
            Ok::<FileImage, std::io::Error>(v)
        })
        .await
        .map_err(|_| CoreError::Storage("io"))
        .and_then(|r| r.map_err(|_| CoreError::Storage("unreadable store file")))?;
        State::from_image(img)
    } else {
        let st = State::new_empty();
        write_with_backup(path, backups_dir, keep, &st.to_image()).map_err(|_| CoreError::Storage("io"))?;
        Ok(st)
    }
}

fn write_with_backup(path: &Path, backups_dir: &Path, max_backups: usize, img: &FileImage) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::create_dir_all(backups_dir)?;

    let json = serde_json::to_vec_pretty(img)?;
    let mut tmp = NamedTempFile::new_in(path.parent().unwrap_or_else(|| Path::new(".")))?;
    tmp.write_all(&json)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;

    // Backup rotation
    let ts = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let backup_path = backups_dir.join(format!("kioku-{ts}.json"));
    let mut btmp = NamedTempFile::new_in(backups_dir)?;
    btmp.write_all(&json)?;
    btmp.flush()?;
    btmp.persist(&backup_path).map_err(|e| e.error)?;

    rotate_backups(backups_dir, max_backups)?;

    Ok(())
}

fn rotate_backups(dir: &Path, keep: usize) -> Result<(), std::io::Error> {
    let mut entries: Vec<_> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    entries.sort_by_key(|e| e.file_name());
    if entries.len() > keep {
        for e in &entries[0..entries.len() - keep] {
            let _ = fs::remove_file(e.path());
        }
    }
    Ok(())
}

use async_trait::async_trait;

#[async_trait]
impl Repository for JsonStore {
    async fn add_card(&self, kind: CardKind, front: &str, back: &str) -> Result<Card, CoreError> {
        let card = Card::new(kind, front, back);
        self.commit(|s| {
            s.cards.insert(card.id, card.clone());
            Ok(())
        })
        .await?;
        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Card, CoreError> {
        let s = self.state.read();
        s.cards.get(&id).cloned().ok_or(CoreError::NotFound("card"))
    }

    async fn list_cards(&self, kind: Option<CardKind>) -> Result<Vec<Card>, CoreError> {
        let all: Vec<Card> = self.state.read().cards.values().cloned().collect();
        let mut v = filter_by_optional_kind(all, kind);
        v.sort_by_key(|c| (c.created_at, c.id));
        Ok(v)
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        self.commit(|s| {
            s.cards.remove(&id).ok_or(CoreError::NotFound("card"))?;
            s.reviews.remove(&id);
            Ok(())
        })
        .await
    }

    async fn import_card(&self, card: &Card) -> Result<Card, CoreError> {
        card.review.check_invariants()?;
        self.commit(|s| {
            if s.cards.contains_key(&card.id) {
                return Err(CoreError::Conflict("card id already exists"));
            }
            s.cards.insert(card.id, card.clone());
            Ok(())
        })
        .await?;
        Ok(card.clone())
    }

    async fn save_review(
        &self,
        card: &Card,
        expected_version: u64,
        log: &ReviewLog,
    ) -> Result<Card, CoreError> {
        self.commit(|s| {
            let stored = s.cards.get_mut(&card.id).ok_or(CoreError::NotFound("card"))?;
            if stored.version != expected_version {
                return Err(CoreError::Conflict("card was reviewed concurrently"));
            }
            stored.review = card.review.clone();
            stored.version += 1;
            let saved = stored.clone();
            s.reviews.entry(card.id).or_default().push(log.clone());
            Ok(saved)
        })
        .await
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
