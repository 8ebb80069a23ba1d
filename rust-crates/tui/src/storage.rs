use crate::sync_client::{
    RemoteCatalog,
    RemoteScoreStore,
};
use flowers::{
    Catalog,
    CatalogProvider,
    HistoryEntry,
    ScoreItem,
    ScoreStore,
    ScoreTier,
    store::{
        LenientStore,
        SledScoreStore,
    },
};

/// Score storage picked once at start-up.
pub enum Storage {
    Local(LenientStore<SledScoreStore>),
    Remote(RemoteScoreStore),
}

impl ScoreStore for Storage {
    async fn score(&self) -> anyhow::Result<u32> {
        match self {
            Storage::Local(store) => store.score().await,
            Storage::Remote(store) => store.score().await,
        }
    }

    async fn set_score(&mut self, score: u32) -> anyhow::Result<()> {
        match self {
            Storage::Local(store) => store.set_score(score).await,
            Storage::Remote(store) => store.set_score(score).await,
        }
    }

    async fn append_history(&mut self, entry: &HistoryEntry) -> anyhow::Result<()> {
        match self {
            Storage::Local(store) => store.append_history(entry).await,
            Storage::Remote(store) => store.append_history(entry).await,
        }
    }

    async fn history(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        match self {
            Storage::Local(store) => store.history().await,
            Storage::Remote(store) => store.history().await,
        }
    }

    async fn clear_all(&mut self) -> anyhow::Result<()> {
        match self {
            Storage::Local(store) => store.clear_all().await,
            Storage::Remote(store) => store.clear_all().await,
        }
    }
}

/// Where items and tiers come from.
pub enum CatalogSource {
    Local(Catalog),
    Remote(RemoteCatalog),
}

impl CatalogSource {
    /// Forget cached remote data so the next read refetches it.
    pub fn refresh(&self) {
        if let CatalogSource::Remote(remote) = self {
            remote.clear_cache();
        }
    }
}

impl CatalogProvider for CatalogSource {
    async fn increase_items(&self) -> anyhow::Result<Vec<ScoreItem>> {
        match self {
            CatalogSource::Local(catalog) => catalog.increase_items().await,
            CatalogSource::Remote(catalog) => catalog.increase_items().await,
        }
    }

    async fn decrease_items(&self) -> anyhow::Result<Vec<ScoreItem>> {
        match self {
            CatalogSource::Local(catalog) => catalog.decrease_items().await,
            CatalogSource::Remote(catalog) => catalog.decrease_items().await,
        }
    }

    async fn tiers(&self) -> anyhow::Result<Vec<ScoreTier>> {
        match self {
            CatalogSource::Local(catalog) => catalog.tiers().await,
            CatalogSource::Remote(catalog) => catalog.tiers().await,
        }
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use flowers::Direction;
    use tempdir::TempDir;

    #[tokio::test]
    async fn local_storage__persists_through_sled() {
        // given
        let tmp = TempDir::new("storage").unwrap();
        let sled = SledScoreStore::open(tmp.path().join("store")).unwrap();
        let mut sut = Storage::Local(LenientStore::new(sled));
        let entry = HistoryEntry::new(Direction::Increase, "Homework done", 2, 50, 52);

        // when
        sut.set_score(52).await.unwrap();
        sut.append_history(&entry).await.unwrap();

        // then
        assert_eq!(sut.score().await.unwrap(), 52);
        assert_eq!(sut.history().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn local_catalog__serves_builtin_rewards() {
        // given
        let sut = CatalogSource::Local(Catalog::builtin());

        // when
        let rewards = sut.rewards_for_score(95).await.unwrap();

        // then
        assert_eq!(rewards.len(), 4);
        sut.refresh();
        assert_eq!(sut.decrease_items().await.unwrap().len(), 4);
    }
}
