use crate::{
    model::{
        DEFAULT_SCORE,
        HistoryEntry,
    },
    store::ScoreStore,
};

/// Wraps a store so that faults never reach the caller: failed reads return
/// the defaults (score 100, empty history) and failed writes are dropped. Every
/// fault is logged.
#[derive(Clone, Debug)]
pub struct LenientStore<S> {
    inner: S,
}

impl<S> LenientStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: ScoreStore> ScoreStore for LenientStore<S> {
    async fn score(&self) -> crate::Result<u32> {
        match self.inner.score().await {
            Ok(score) => Ok(score),
            Err(err) => {
                tracing::error!(?err, "reading score failed, using default");
                Ok(DEFAULT_SCORE)
            }
        }
    }

    async fn set_score(&mut self, score: u32) -> crate::Result<()> {
        if let Err(err) = self.inner.set_score(score).await {
            tracing::error!(?err, score, "saving score failed");
        }
        Ok(())
    }

    async fn append_history(&mut self, entry: &HistoryEntry) -> crate::Result<()> {
        if let Err(err) = self.inner.append_history(entry).await {
            tracing::error!(?err, id = %entry.id, "saving history entry failed");
        }
        Ok(())
    }

    async fn history(&self) -> crate::Result<Vec<HistoryEntry>> {
        match self.inner.history().await {
            Ok(history) => Ok(history),
            Err(err) => {
                tracing::error!(?err, "reading history failed, using empty history");
                Ok(Vec::new())
            }
        }
    }

    async fn clear_all(&mut self) -> crate::Result<()> {
        if let Err(err) = self.inner.clear_all().await {
            tracing::error!(?err, "clearing data failed");
        }
        Ok(())
    }
}
