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
    anyhow,
    ensure,
};
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

#[derive(Debug, Default)]
struct InMemoryState {
    score: Option<u32>,
    history: VecDeque<HistoryEntry>,
}

/// Store living only as long as the process. Clones share the same state.
#[derive(Clone, Debug)]
pub struct InMemoryScoreStore {
    state: Arc<Mutex<InMemoryState>>,
    history_limit: usize,
}

impl Default for InMemoryScoreStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryState::default())),
            history_limit,
        }
    }

    pub fn with_score(score: u32) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.state.lock() {
            guard.score = Some(score.min(MAX_SCORE));
        }
        store
    }

    fn lock(&self) -> crate::Result<MutexGuard<'_, InMemoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl ScoreStore for InMemoryScoreStore {
    async fn score(&self) -> crate::Result<u32> {
        Ok(self.lock()?.score.unwrap_or(DEFAULT_SCORE))
    }

    async fn set_score(&mut self, score: u32) -> crate::Result<()> {
        ensure!(score <= MAX_SCORE, "score {score} is above {MAX_SCORE}");
        self.lock()?.score = Some(score);
        Ok(())
    }

    async fn append_history(&mut self, entry: &HistoryEntry) -> crate::Result<()> {
        let limit = self.history_limit;
        let mut guard = self.lock()?;
        guard.history.push_front(entry.clone());
        guard.history.truncate(limit);
        Ok(())
    }

    async fn history(&self) -> crate::Result<Vec<HistoryEntry>> {
        Ok(self.lock()?.history.iter().cloned().collect())
    }

    async fn clear_all(&mut self) -> crate::Result<()> {
        let mut guard = self.lock()?;
        guard.score = None;
        guard.history.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::model::Direction;

    #[tokio::test]
    async fn score__defaults_to_one_hundred() {
        let store = InMemoryScoreStore::new();
        assert_eq!(store.score().await.unwrap(), DEFAULT_SCORE);
    }

    #[tokio::test]
    async fn append_history__keeps_newest_first_and_caps_length() {
        // given
        let mut store = InMemoryScoreStore::with_history_limit(2);
        let first = HistoryEntry::new(Direction::Increase, "a", 1, 90, 91);
        let second = HistoryEntry::new(Direction::Increase, "b", 1, 91, 92);
        let third = HistoryEntry::new(Direction::Decrease, "c", 2, 92, 90);

        // when
        for entry in [&first, &second, &third] {
            store.append_history(entry).await.unwrap();
        }

        // then
        let history = store.history().await.unwrap();
        assert_eq!(history, vec![third, second]);
    }

    #[tokio::test]
    async fn clear_all__resets_score_and_history() {
        // given
        let mut store = InMemoryScoreStore::with_score(40);
        let entry = HistoryEntry::new(Direction::Decrease, "a", 1, 41, 40);
        store.append_history(&entry).await.unwrap();

        // when
        store.clear_all().await.unwrap();

        // then
        assert_eq!(store.score().await.unwrap(), DEFAULT_SCORE);
        assert!(store.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_score__rejects_values_above_maximum() {
        let mut store = InMemoryScoreStore::new();
        assert!(store.set_score(101).await.is_err());
        assert!(store.set_score(100).await.is_ok());
    }

    #[tokio::test]
    async fn clones__share_state() {
        // given
        let mut store = InMemoryScoreStore::new();
        let observer = store.clone();

        // when
        store.set_score(12).await.unwrap();

        // then
        assert_eq!(observer.score().await.unwrap(), 12);
    }
}
