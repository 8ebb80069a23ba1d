use crate::{
    Result,
    app::{
        profile_storage::ProfileStorage,
        query_api::{
            ProfileQuery,
            Query,
            QueryAPI,
            QueryError,
            QueryResult,
        },
    },
};
use flowers::{
    Catalog,
    ScoreStore,
    model::MAX_SCORE,
};
use std::future::Future;

pub mod actix_query_api;
pub mod in_memory_profile_storage;
pub mod profile_storage;
pub mod query_api;
pub mod sled_profile_storage;


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Continue,
    Exit,
}

/// Single owner of all profile data. HTTP handlers reach it only through
/// queries, so writes never race.
pub struct App<API, Profiles> {
    api: API,
    profiles: Profiles,
    catalog: Catalog,
}

impl<API, Profiles> App<API, Profiles> {
    pub fn new(api: API, profiles: Profiles, catalog: Catalog) -> Self {
        Self {
            api,
            profiles,
            catalog,
        }
    }
}

impl<API: QueryAPI, Profiles: ProfileStorage> App<API, Profiles> {
    pub async fn run(&mut self, interrupt: impl Future<Output = ()>) -> Result<RunState> {
        tokio::select! {
            query = self.api.query() => {
                self.handle_query(query?).await;
                Ok(RunState::Continue)
            }
            _ = interrupt => Ok(RunState::Exit),
        }
    }

    async fn handle_query(&mut self, query: Query) {
        match query {
            Query::Catalog(sender) => {
                let _ = sender.send(self.catalog.clone());
            }
            Query::CreateProfile {
                user_id,
                child_name,
                sender,
            } => {
                let result = self
                    .profiles
                    .get_or_create(&user_id, child_name.as_deref())
                    .map_err(QueryError::storage);
                let _ = sender.send(result);
            }
            Query::Score(ProfileQuery {
                profile_id, sender, ..
            }) => {
                let result = match self.store(&profile_id) {
                    Ok(store) => store.score().await.map_err(QueryError::storage),
                    Err(err) => Err(err),
                };
                let _ = sender.send(result);
            }
            Query::SetScore(ProfileQuery {
                profile_id,
                payload: score,
                sender,
            }) => {
                let result = match self.store(&profile_id) {
                    Ok(_) if score > MAX_SCORE => {
                        Err(QueryError::Invalid(format!("score {score} is above {MAX_SCORE}")))
                    }
                    Ok(store) => store.set_score(score).await.map_err(QueryError::storage),
                    Err(err) => Err(err),
                };
                let _ = sender.send(result);
            }
            Query::History(ProfileQuery {
                profile_id, sender, ..
            }) => {
                let result = match self.store(&profile_id) {
                    Ok(store) => store.history().await.map_err(QueryError::storage),
                    Err(err) => Err(err),
                };
                let _ = sender.send(result);
            }
            Query::AppendHistory(ProfileQuery {
                profile_id,
                payload: entry,
                sender,
            }) => {
                let result = match self.store(&profile_id) {
                    Ok(store) => store
                        .append_history(&entry)
                        .await
                        .map_err(QueryError::storage),
                    Err(err) => Err(err),
                };
                let _ = sender.send(result);
            }
            Query::ClearData(ProfileQuery {
                profile_id, sender, ..
            }) => {
                let result = match self.store(&profile_id) {
                    Ok(store) => store.clear_all().await.map_err(QueryError::storage),
                    Err(err) => Err(err),
                };
                if result.is_ok() {
                    tracing::info!("cleared data of profile {profile_id}");
                }
                let _ = sender.send(result);
            }
        }
    }

    fn store(&mut self, profile_id: &str) -> QueryResult<&mut Profiles::Store> {
        self.profiles
            .store(profile_id)
            .map_err(QueryError::storage)?
            .ok_or_else(|| QueryError::UnknownProfile(profile_id.to_string()))
    }
}
