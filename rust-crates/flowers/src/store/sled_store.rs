// Sled-backed score and history persistence.
use crate::{
    model::{
        DEFAULT_SCORE,
        HistoryEntry,
        MAX_SCORE,
    },
    store::{
        DEFAULT_HISTORY_LIMIT,
        ScoreStore,
    },
};
use anyhow::{
    Context,
    ensure,
};
use sled::{
    Config,
    Db,
    Tree,
};
use std::{
    convert::TryInto,
    path::Path,
};

const SCORE_KEY: &[u8] = b"current_score";
const NEXT_SEQUENCE_KEY: &[u8] = b"next_history_sequence";
pub const LOCAL_PROFILE: &str = "local";

/// Score and history of one profile, stored in two sled trees.
///
/// History keys are big-endian sequence numbers, so reverse iteration yields
/// newest first and `pop_min` evicts the oldest entry.
#[derive(Clone)]
pub struct SledScoreStore {
    meta: Tree,
    history: Tree,
    history_limit: usize,
}

impl SledScoreStore {
    pub fn new(db: &Db, profile: &str, history_limit: usize) -> crate::Result<Self> {
        let meta = db
            .open_tree(format!("{profile}/meta"))
            .with_context(|| format!("open meta tree for profile {profile}"))?;
        let history = db
            .open_tree(format!("{profile}/history"))
            .with_context(|| format!("open history tree for profile {profile}"))?;
        Ok(Self {
            meta,
            history,
            history_limit,
        })
    }

    /// Open (or create) the on-device database holding the local profile.
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let db = Config::default()
            .path(path)
            .open()
            .context("open sled database")?;
        Self::new(&db, LOCAL_PROFILE, DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit;
        self
    }

    fn next_sequence(&self) -> crate::Result<u64> {
        let next = match self.meta.get(NEXT_SEQUENCE_KEY)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .context("history sequence should be 8 bytes")?;
                u64::from_be_bytes(arr)
            }
            None => 0,
        };
        self.meta
            .insert(NEXT_SEQUENCE_KEY, (next + 1).to_be_bytes().as_slice())
            .context("advance history sequence")?;
        Ok(next)
    }

    fn evict_overflow(&self) -> crate::Result<()> {
        while self.history.len() > self.history_limit {
            if self
                .history
                .pop_min()
                .context("evict oldest history entry")?
                .is_none()
            {
                break;
            }
        }
        Ok(())
    }
}

impl ScoreStore for SledScoreStore {
    async fn score(&self) -> crate::Result<u32> {
        match self.meta.get(SCORE_KEY).context("read current score")? {
            Some(bytes) => {
                let arr: [u8; 4] = bytes
                    .as_ref()
                    .try_into()
                    .context("current score should be 4 bytes")?;
                Ok(u32::from_be_bytes(arr).min(MAX_SCORE))
            }
            None => Ok(DEFAULT_SCORE),
        }
    }

    async fn set_score(&mut self, score: u32) -> crate::Result<()> {
        ensure!(score <= MAX_SCORE, "score {score} is above {MAX_SCORE}");
        self.meta
            .insert(SCORE_KEY, score.to_be_bytes().as_slice())
            .context("write current score")?;
        self.meta.flush().context("flush current score")?;
        Ok(())
    }

    async fn append_history(&mut self, entry: &HistoryEntry) -> crate::Result<()> {
        let sequence = self.next_sequence()?;
        let bytes = serde_json::to_vec(entry).context("serialize history entry")?;
        self.history
            .insert(sequence.to_be_bytes(), bytes)
            .context("persist history entry")?;
        self.evict_overflow()?;
        self.meta.flush().context("flush history sequence")?;
        self.history.flush().context("flush history entry")?;
        Ok(())
    }

    async fn history(&self) -> crate::Result<Vec<HistoryEntry>> {
        let mut entries = Vec::with_capacity(self.history.len());
        for item in self.history.iter().rev() {
            let (_, value) = item.context("iterate history")?;
            let entry = serde_json::from_slice(value.as_ref())
                .context("deserialize history entry")?;
            entries.push(entry);
        }
        Ok(entries)
    }

    async fn clear_all(&mut self) -> crate::Result<()> {
        self.history.clear().context("clear history")?;
        self.meta.remove(SCORE_KEY).context("remove current score")?;
        self.history.flush().context("flush cleared history")?;
        self.meta.flush().context("flush cleared score")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::model::Direction;
    use tempdir::TempDir;

    fn sled_db(temp_dir: &TempDir) -> sled::Db {
        sled::Config::default()
            .path(temp_dir.path())
            .open()
            .expect("open sled db")
    }

    #[tokio::test]
    async fn sut__when_nothing_stored_then_score_defaults() {
        // given
        let temp_dir = TempDir::new("sled_score_default").unwrap();
        let db = sled_db(&temp_dir);
        let store = SledScoreStore::new(&db, LOCAL_PROFILE, 10).unwrap();

        // then
        assert_eq!(store.score().await.unwrap(), DEFAULT_SCORE);
        assert!(store.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sut__when_reopened_then_score_and_history_survive() {
        // given
        let temp_dir = TempDir::new("sled_score_reopen").unwrap();
        let db = sled_db(&temp_dir);
        let entry = HistoryEntry::new(Direction::Decrease, "Flunked a test", 3, 100, 97);
        {
            let mut store = SledScoreStore::new(&db, LOCAL_PROFILE, 10).unwrap();
            store.set_score(97).await.unwrap();
            store.append_history(&entry).await.unwrap();
        }

        // when
        let store = SledScoreStore::new(&db, LOCAL_PROFILE, 10).unwrap();

        // then
        assert_eq!(store.score().await.unwrap(), 97);
        assert_eq!(store.history().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn sut__when_appending_past_limit_then_oldest_entries_are_evicted() {
        // given
        let temp_dir = TempDir::new("sled_score_evict").unwrap();
        let db = sled_db(&temp_dir);
        let mut store = SledScoreStore::new(&db, LOCAL_PROFILE, 3).unwrap();
        let entries: Vec<HistoryEntry> = (0..5)
            .map(|i| HistoryEntry::new(Direction::Increase, format!("item {i}"), 1, i, i + 1))
            .collect();

        // when
        for entry in &entries {
            store.append_history(entry).await.unwrap();
        }

        // then
        let history = store.history().await.unwrap();
        let names: Vec<&str> = history.iter().map(|e| e.item_name.as_str()).collect();
        assert_eq!(names, vec!["item 4", "item 3", "item 2"]);
    }

    #[tokio::test]
    async fn sut__when_clearing_then_defaults_return() {
        // given
        let temp_dir = TempDir::new("sled_score_clear").unwrap();
        let db = sled_db(&temp_dir);
        let mut store = SledScoreStore::new(&db, LOCAL_PROFILE, 10).unwrap();
        store.set_score(12).await.unwrap();
        store
            .append_history(&HistoryEntry::new(Direction::Decrease, "x", 1, 13, 12))
            .await
            .unwrap();

        // when
        store.clear_all().await.unwrap();

        // then
        assert_eq!(store.score().await.unwrap(), DEFAULT_SCORE);
        assert!(store.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sut__profiles_do_not_share_state() {
        // given
        let temp_dir = TempDir::new("sled_score_profiles").unwrap();
        let db = sled_db(&temp_dir);
        let mut first = SledScoreStore::new(&db, "first", 10).unwrap();
        let second = SledScoreStore::new(&db, "second", 10).unwrap();

        // when
        first.set_score(33).await.unwrap();

        // then
        assert_eq!(first.score().await.unwrap(), 33);
        assert_eq!(second.score().await.unwrap(), DEFAULT_SCORE);
    }
}
