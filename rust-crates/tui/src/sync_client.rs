use anyhow::{
    Context,
    anyhow,
};
use flowers::{
    Catalog,
    CatalogProvider,
    HistoryEntry,
    Profile,
    ScoreItem,
    ScoreStore,
    ScoreTier,
};
use reqwest::{
    Response,
    StatusCode,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    sync::Mutex,
};
use url::Url;

/// HTTP client of the sync server.
#[derive(Clone)]
pub struct SyncClient {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct CreateProfileDto<'a> {
    user_id: &'a str,
    child_name: Option<&'a str>,
}

#[derive(Serialize, Deserialize)]
struct ScoreDto {
    score: u32,
}

impl SyncClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url).with_context(|| format!("invalid sync server url {base_url}"))?;
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build HTTP client for sync server")?;
        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn catalog(&self) -> anyhow::Result<Catalog> {
        let url = format!("{}/catalog", self.base_url);
        let res = self.send(self.http.get(url)).await?;
        let res = ensure_success(res, "fetching catalog").await?;
        let catalog: Catalog = res.json().await.context("invalid catalog payload")?;
        catalog.validate().context("server catalog failed validation")?;
        Ok(catalog)
    }

    pub async fn create_profile(
        &self,
        user_id: &str,
        child_name: Option<&str>,
    ) -> anyhow::Result<Profile> {
        let url = format!("{}/profiles", self.base_url);
        let body = CreateProfileDto {
            user_id,
            child_name,
        };
        let res = self.send(self.http.post(url).json(&body)).await?;
        let res = ensure_success(res, "creating profile").await?;
        res.json().await.context("invalid profile payload")
    }

    pub async fn score(&self, profile_id: &str) -> anyhow::Result<Option<u32>> {
        let url = format!("{}/profiles/{profile_id}/score", self.base_url);
        let res = self.send(self.http.get(url)).await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let res = ensure_success(res, "fetching score").await?;
        let dto: ScoreDto = res.json().await.context("invalid score payload")?;
        Ok(Some(dto.score))
    }

    pub async fn set_score(&self, profile_id: &str, score: u32) -> anyhow::Result<()> {
        let url = format!("{}/profiles/{profile_id}/score", self.base_url);
        let res = self.send(self.http.put(url).json(&ScoreDto { score })).await?;
        ensure_success(res, "writing score").await?;
        Ok(())
    }

    pub async fn history(&self, profile_id: &str) -> anyhow::Result<Option<Vec<HistoryEntry>>> {
        let url = format!("{}/profiles/{profile_id}/history", self.base_url);
        let res = self.send(self.http.get(url)).await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let res = ensure_success(res, "fetching history").await?;
        let history = res.json().await.context("invalid history payload")?;
        Ok(Some(history))
    }

    pub async fn append_history(
        &self,
        profile_id: &str,
        entry: &HistoryEntry,
    ) -> anyhow::Result<()> {
        let url = format!("{}/profiles/{profile_id}/history", self.base_url);
        let res = self.send(self.http.post(url).json(entry)).await?;
        ensure_success(res, "recording history").await?;
        Ok(())
    }

    pub async fn clear_data(&self, profile_id: &str) -> anyhow::Result<()> {
        let url = format!("{}/profiles/{profile_id}/data", self.base_url);
        let res = self.send(self.http.delete(url)).await?;
        ensure_success(res, "clearing profile data").await?;
        Ok(())
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> anyhow::Result<Response> {
        request.send().await.context("sync server request failed")
    }
}

impl fmt::Display for SyncClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_url)
    }
}

async fn ensure_success(res: Response, action: &str) -> anyhow::Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res
        .text()
        .await
        .unwrap_or_else(|_| "<unavailable body>".to_string());
    Err(anyhow!(
        "sync server responded with {status} when {action}: {body}"
    ))
}

/// Score store of one server-side profile. Failures are returned to the caller.
#[derive(Clone)]
pub struct RemoteScoreStore {
    client: SyncClient,
    profile_id: String,
}

impl RemoteScoreStore {
    pub fn new(client: SyncClient, profile_id: impl Into<String>) -> Self {
        Self {
            client,
            profile_id: profile_id.into(),
        }
    }

    /// Get-or-create the profile for `user_id` and bind to it.
    pub async fn connect(
        client: SyncClient,
        user_id: &str,
        child_name: Option<&str>,
    ) -> anyhow::Result<Self> {
        let profile = client.create_profile(user_id, child_name).await?;
        tracing::info!(
            "using remote profile {} for user {user_id} at {client}",
            profile.id
        );
        Ok(Self::new(client, profile.id))
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    fn unknown_profile(&self) -> anyhow::Error {
        anyhow!("profile {} is unknown to {}", self.profile_id, self.client)
    }
}

impl ScoreStore for RemoteScoreStore {
    async fn score(&self) -> anyhow::Result<u32> {
        self.client
            .score(&self.profile_id)
            .await?
            .ok_or_else(|| self.unknown_profile())
    }

    async fn set_score(&mut self, score: u32) -> anyhow::Result<()> {
        self.client.set_score(&self.profile_id, score).await
    }

    async fn append_history(&mut self, entry: &HistoryEntry) -> anyhow::Result<()> {
        self.client.append_history(&self.profile_id, entry).await
    }

    async fn history(&self) -> anyhow::Result<Vec<HistoryEntry>> {
        self.client
            .history(&self.profile_id)
            .await?
            .ok_or_else(|| self.unknown_profile())
    }

    async fn clear_all(&mut self) -> anyhow::Result<()> {
        self.client.clear_data(&self.profile_id).await
    }
}

/// Read-through cache of the server catalog.
pub struct RemoteCatalog {
    client: SyncClient,
    cache: Mutex<Option<Catalog>>,
}

impl RemoteCatalog {
    pub fn new(client: SyncClient) -> Self {
        Self {
            client,
            cache: Mutex::new(None),
        }
    }

    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.take();
        }
    }

    pub async fn catalog(&self) -> anyhow::Result<Catalog> {
        if let Some(cached) = self.cached() {
            return Ok(cached);
        }
        let catalog = self.client.catalog().await?;
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(catalog.clone());
        }
        Ok(catalog)
    }

    fn cached(&self) -> Option<Catalog> {
        self.cache.lock().ok().and_then(|cache| cache.clone())
    }
}

impl CatalogProvider for RemoteCatalog {
    async fn increase_items(&self) -> anyhow::Result<Vec<ScoreItem>> {
        Ok(self.catalog().await?.increase_items)
    }

    async fn decrease_items(&self) -> anyhow::Result<Vec<ScoreItem>> {
        Ok(self.catalog().await?.decrease_items)
    }

    async fn tiers(&self) -> anyhow::Result<Vec<ScoreTier>> {
        Ok(self.catalog().await?.tiers)
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use flowers::Direction;
    use sync_server::app::{
        App,
        actix_query_api::ActixQueryApi,
        in_memory_profile_storage::InMemoryProfileStorage,
    };

    fn spawn_server() -> String {
        let (url_sender, url_receiver) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let api = ActixQueryApi::new(None).await.unwrap();
                url_sender.send(api.base_url().to_string()).unwrap();
                let mut app =
                    App::new(api, InMemoryProfileStorage::new(), Catalog::builtin());
                while app.run(std::future::pending()).await.is_ok() {}
            });
        });
        url_receiver.recv().unwrap()
    }

    #[tokio::test]
    async fn remote_store__round_trips_score_and_history() {
        // given
        let client = SyncClient::new(spawn_server()).unwrap();
        let mut sut = RemoteScoreStore::connect(client, "parent", Some("Mia"))
            .await
            .unwrap();
        let entry = HistoryEntry::new(Direction::Decrease, "Talked back", 3, 100, 97);

        // when
        let initial = sut.score().await.unwrap();
        sut.set_score(97).await.unwrap();
        sut.append_history(&entry).await.unwrap();

        // then
        assert_eq!(initial, 100);
        assert_eq!(sut.score().await.unwrap(), 97);
        assert_eq!(sut.history().await.unwrap(), vec![entry]);

        sut.clear_all().await.unwrap();
        assert_eq!(sut.score().await.unwrap(), 100);
        assert!(sut.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remote_store__unknown_profile_is_an_error() {
        // given
        let client = SyncClient::new(spawn_server()).unwrap();
        let sut = RemoteScoreStore::new(client, "ghost");

        // when
        let result = sut.score().await;

        // then
        assert!(result.unwrap_err().to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn remote_store__rejects_score_above_hundred() {
        // given
        let client = SyncClient::new(spawn_server()).unwrap();
        let mut sut = RemoteScoreStore::connect(client, "parent", None).await.unwrap();

        // when
        let result = sut.set_score(101).await;

        // then
        assert!(result.unwrap_err().to_string().contains("400"));
    }

    #[tokio::test]
    async fn remote_catalog__caches_until_cleared() {
        // given
        let client = SyncClient::new(spawn_server()).unwrap();
        let sut = RemoteCatalog::new(client);

        // when
        let tiers = sut.tiers().await.unwrap();

        // then
        assert_eq!(tiers, Catalog::builtin().tiers);
        assert!(sut.cached().is_some());
        sut.clear_cache();
        assert!(sut.cached().is_none());
        assert_eq!(sut.increase_items().await.unwrap().len(), 6);
    }

    #[test]
    fn new__rejects_malformed_url() {
        assert!(SyncClient::new("not a url").is_err());
    }
}
