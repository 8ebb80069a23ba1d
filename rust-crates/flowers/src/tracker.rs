use crate::{
    model::{
        Direction,
        HistoryEntry,
        ScoreItem,
        SequencerTrigger,
    },
    scoring::{
        apply_adjustment,
        draw_magnitude,
    },
    store::ScoreStore,
};
use anyhow::Context;
use rand::Rng;
use tracing::info;

/// Result of a committed adjustment: what was recorded and what to animate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Adjustment {
    pub entry: HistoryEntry,
    pub trigger: SequencerTrigger,
}

/// Applies adjustments to a store. The store is written before the caller gets
/// a trigger to animate.
pub struct Tracker<S> {
    store: S,
    history_limit: usize,
}

impl<S: ScoreStore> Tracker<S> {
    /// `history_limit` caps what [`Tracker::history`] hands out.
    pub fn new(store: S, history_limit: usize) -> Self {
        Self {
            store,
            history_limit,
        }
    }

    pub async fn current_score(&self) -> crate::Result<u32> {
        self.store.score().await
    }

    pub async fn history(&self) -> crate::Result<Vec<HistoryEntry>> {
        let mut history = self.store.history().await?;
        history.truncate(self.history_limit);
        Ok(history)
    }

    /// Writes the adjusted score, then records the history entry. The two
    /// writes are not atomic: when appending history fails the new score stays
    /// stored without an entry, and the error is returned. Callers should
    /// re-read the score after an error.
    pub async fn commit(
        &mut self,
        direction: Direction,
        item: &ScoreItem,
        magnitude: u32,
    ) -> crate::Result<Adjustment> {
        let before = self
            .store
            .score()
            .await
            .context("reading score before adjustment")?;
        let after = apply_adjustment(direction, magnitude, before);
        self.store
            .set_score(after)
            .await
            .context("writing adjusted score")?;

        let entry = HistoryEntry::new(direction, &item.name, magnitude, before, after);
        self.store
            .append_history(&entry)
            .await
            .context("recording adjustment")?;
        info!(
            "{} {magnitude} for {:?}: {before} -> {after}",
            direction.sign(),
            item.name
        );

        Ok(Adjustment {
            entry,
            trigger: SequencerTrigger::for_item(direction, item, magnitude),
        })
    }

    pub async fn adjust<R: Rng + ?Sized>(
        &mut self,
        direction: Direction,
        item: &ScoreItem,
        rng: &mut R,
    ) -> crate::Result<Adjustment> {
        let magnitude = draw_magnitude(item, rng);
        self.commit(direction, item, magnitude).await
    }

    pub async fn reset(&mut self) -> crate::Result<()> {
        self.store.clear_all().await?;
        info!("score and history reset");
        Ok(())
    }
}
