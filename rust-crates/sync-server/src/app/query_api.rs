use flowers::{
    Catalog,
    HistoryEntry,
    Profile,
};
use tokio::sync::oneshot;

pub trait QueryAPI {
    fn query(&mut self) -> impl Future<Output = crate::Result<Query>>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("unknown profile {0}")]
    UnknownProfile(String),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl QueryError {
    pub fn storage(err: anyhow::Error) -> Self {
        QueryError::Storage(format!("{err:#}"))
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
pub type Responder<T> = oneshot::Sender<QueryResult<T>>;

#[derive(Debug)]
pub struct ProfileQuery<T, P = ()> {
    pub profile_id: String,
    pub payload: P,
    pub sender: Responder<T>,
}

#[derive(Debug)]
pub enum Query {
    Catalog(oneshot::Sender<Catalog>),
    CreateProfile {
        user_id: String,
        child_name: Option<String>,
        sender: Responder<Profile>,
    },
    Score(ProfileQuery<u32>),
    SetScore(ProfileQuery<(), u32>),
    History(ProfileQuery<Vec<HistoryEntry>>),
    AppendHistory(ProfileQuery<(), HistoryEntry>),
    ClearData(ProfileQuery<()>),
}

impl Query {
    pub fn score(profile_id: String, sender: Responder<u32>) -> Self {
        Query::Score(ProfileQuery {
            profile_id,
            payload: (),
            sender,
        })
    }

    pub fn set_score(profile_id: String, score: u32, sender: Responder<()>) -> Self {
        Query::SetScore(ProfileQuery {
            profile_id,
            payload: score,
            sender,
        })
    }

    pub fn history(profile_id: String, sender: Responder<Vec<HistoryEntry>>) -> Self {
        Query::History(ProfileQuery {
            profile_id,
            payload: (),
            sender,
        })
    }

    pub fn append_history(
        profile_id: String,
        entry: HistoryEntry,
        sender: Responder<()>,
    ) -> Self {
        Query::AppendHistory(ProfileQuery {
            profile_id,
            payload: entry,
            sender,
        })
    }

    pub fn clear_data(profile_id: String, sender: Responder<()>) -> Self {
        Query::ClearData(ProfileQuery {
            profile_id,
            payload: (),
            sender,
        })
    }
}
