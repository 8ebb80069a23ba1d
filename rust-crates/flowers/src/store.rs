use crate::model::HistoryEntry;
use std::future::Future;

pub mod in_memory_store;
pub mod lenient_store;
pub mod sled_store;

pub use in_memory_store::InMemoryScoreStore;
pub use lenient_store::LenientStore;
pub use sled_store::SledScoreStore;

/// Most history entries a store keeps; older entries are dropped on append.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// Durable home of the score and the adjustment history.
pub trait ScoreStore {
    /// current score, or `DEFAULT_SCORE` when nothing was stored yet
    fn score(&self) -> impl Future<Output = crate::Result<u32>>;

    /// last write wins
    fn set_score(&mut self, score: u32) -> impl Future<Output = crate::Result<()>>;

    /// insert at the head of the history
    fn append_history(
        &mut self,
        entry: &HistoryEntry,
    ) -> impl Future<Output = crate::Result<()>>;

    /// all kept entries, newest first
    fn history(&self) -> impl Future<Output = crate::Result<Vec<HistoryEntry>>>;

    /// reset the score to the default and drop the whole history
    fn clear_all(&mut self) -> impl Future<Output = crate::Result<()>>;
}
