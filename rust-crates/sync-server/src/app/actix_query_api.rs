use crate::{
    Result,
    app::query_api::{
        Query,
        QueryAPI,
        QueryError,
        QueryResult,
    },
};
use actix_cors::Cors;
use actix_web::{
    App,
    HttpResponse,
    HttpServer,
    dev::ServerHandle,
    error::{
        ErrorBadRequest,
        ErrorInternalServerError,
        ErrorNotFound,
    },
    web,
};
use anyhow::{
    Context,
    anyhow,
};
use flowers::{
    Catalog,
    HistoryEntry,
    Profile,
    model::MAX_SCORE,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::TcpListener,
    thread::JoinHandle,
};
use tokio::sync::{
    mpsc,
    oneshot,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ScoreDto {
    score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct CreateProfileDto {
    user_id: String,
    #[serde(default)]
    child_name: Option<String>,
}

type QuerySender = web::Data<mpsc::Sender<Query>>;

pub const DEFAULT_HOST: &str = "127.0.0.1";

pub struct ActixQueryApi {
    receiver: mpsc::Receiver<Query>,
    base_url: String,
    server_handle: ServerHandle,
    server_thread: Option<JoinHandle<()>>,
}

impl ActixQueryApi {
    /// Listen on loopback only. `None` picks an ephemeral port.
    pub async fn new(port: Option<u16>) -> Result<Self> {
        Self::bind(DEFAULT_HOST, port).await
    }

    /// Listen on `host`, e.g. `0.0.0.0` to serve other devices on the network.
    pub async fn bind(host: &str, port: Option<u16>) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(16);

        let listener = TcpListener::bind((host, port.unwrap_or(0)))
            .with_context(|| format!("failed to bind HTTP listener for sync API on {host}"))?;
        let address = listener
            .local_addr()
            .context("failed to read listener address")?;
        let base_url = format!("http://{}", address);

        tracing::info!("sync API listening on {}", base_url);

        let server = HttpServer::new(move || {
            App::new()
                .wrap(Cors::permissive())
                .app_data(web::Data::new(sender.clone()))
                .route("/catalog", web::get().to(handle_catalog))
                .route("/profiles", web::post().to(handle_create_profile))
                .route("/profiles/{id}/score", web::get().to(handle_score))
                .route("/profiles/{id}/score", web::put().to(handle_set_score))
                .route("/profiles/{id}/history", web::get().to(handle_history))
                .route(
                    "/profiles/{id}/history",
                    web::post().to(handle_append_history),
                )
                .route("/profiles/{id}/data", web::delete().to(handle_clear_data))
        })
        .listen(listener)
        .context("failed to start Actix server")?
        .run();

        let server_handle = server.handle();
        let server_thread = std::thread::spawn(move || {
            let sys = actix_web::rt::System::new();
            let _ = sys.block_on(server);
        });

        Ok(Self {
            receiver,
            base_url,
            server_handle,
            server_thread: Some(server_thread),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl QueryAPI for ActixQueryApi {
    async fn query(&mut self) -> Result<Query> {
        self.receiver
            .recv()
            .await
            .ok_or_else(|| anyhow!("query server closed"))
    }
}

impl Drop for ActixQueryApi {
    fn drop(&mut self) {
        let _ = self.server_handle.stop(true);
        if let Some(thread) = self.server_thread.take() {
            let _ = thread.join();
        }
    }
}

async fn forward<T>(
    sender: &QuerySender,
    query: Query,
    receiver: oneshot::Receiver<T>,
) -> actix_web::Result<T> {
    sender
        .get_ref()
        .send(query)
        .await
        .map_err(|_| ErrorInternalServerError("unable to forward query"))?;
    receiver
        .await
        .map_err(|_| ErrorInternalServerError("query responder dropped"))
}

fn into_http<T>(result: QueryResult<T>) -> actix_web::Result<T> {
    result.map_err(|err| match err {
        QueryError::UnknownProfile(_) => ErrorNotFound(err.to_string()),
        QueryError::Invalid(_) => ErrorBadRequest(err.to_string()),
        QueryError::Storage(_) => {
            tracing::error!("{err}");
            ErrorInternalServerError(err.to_string())
        }
    })
}

async fn handle_catalog(sender: QuerySender) -> actix_web::Result<web::Json<Catalog>> {
    tracing::debug!("received catalog request");
    let (response_sender, response_receiver) = oneshot::channel();
    let catalog = forward(&sender, Query::Catalog(response_sender), response_receiver).await?;
    Ok(web::Json(catalog))
}

async fn handle_create_profile(
    sender: QuerySender,
    body: web::Json<CreateProfileDto>,
) -> actix_web::Result<web::Json<Profile>> {
    let CreateProfileDto {
        user_id,
        child_name,
    } = body.into_inner();
    if user_id.trim().is_empty() {
        return Err(ErrorBadRequest("user_id must not be empty"));
    }
    tracing::info!("received profile request for {user_id}");
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::CreateProfile {
        user_id,
        child_name,
        sender: response_sender,
    };
    let profile = into_http(forward(&sender, query, response_receiver).await?)?;
    Ok(web::Json(profile))
}

async fn handle_score(
    sender: QuerySender,
    profile_id: web::Path<String>,
) -> actix_web::Result<web::Json<ScoreDto>> {
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::score(profile_id.into_inner(), response_sender);
    let score = into_http(forward(&sender, query, response_receiver).await?)?;
    Ok(web::Json(ScoreDto { score }))
}

async fn handle_set_score(
    sender: QuerySender,
    profile_id: web::Path<String>,
    body: web::Json<ScoreDto>,
) -> actix_web::Result<HttpResponse> {
    let score = body.score;
    if score > MAX_SCORE {
        return Err(ErrorBadRequest(format!("score {score} is above {MAX_SCORE}")));
    }
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::set_score(profile_id.into_inner(), score, response_sender);
    into_http(forward(&sender, query, response_receiver).await?)?;
    Ok(HttpResponse::NoContent().finish())
}

async fn handle_history(
    sender: QuerySender,
    profile_id: web::Path<String>,
) -> actix_web::Result<web::Json<Vec<HistoryEntry>>> {
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::history(profile_id.into_inner(), response_sender);
    let history = into_http(forward(&sender, query, response_receiver).await?)?;
    Ok(web::Json(history))
}

async fn handle_append_history(
    sender: QuerySender,
    profile_id: web::Path<String>,
    body: web::Json<HistoryEntry>,
) -> actix_web::Result<HttpResponse> {
    let (response_sender, response_receiver) = oneshot::channel();
    let query =
        Query::append_history(profile_id.into_inner(), body.into_inner(), response_sender);
    into_http(forward(&sender, query, response_receiver).await?)?;
    Ok(HttpResponse::Created().finish())
}

async fn handle_clear_data(
    sender: QuerySender,
    profile_id: web::Path<String>,
) -> actix_web::Result<HttpResponse> {
    tracing::info!("received clear request for profile {profile_id}");
    let (response_sender, response_receiver) = oneshot::channel();
    let query = Query::clear_data(profile_id.into_inner(), response_sender);
    into_http(forward(&sender, query, response_receiver).await?)?;
    Ok(HttpResponse::NoContent().finish())
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::query_api::ProfileQuery;
    use flowers::Direction;
    use reqwest::StatusCode;

    #[tokio::test]
    async fn query__can_get_and_respond_to_catalog() {
        // given
        let mut api = ActixQueryApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/catalog", api.base_url());
        let expected = Catalog::builtin();

        let client_task = tokio::spawn(async move {
            let response = client.get(url).send().await.unwrap();
            response.json::<Catalog>().await.unwrap()
        });

        // when
        let query = api.query().await.unwrap();
        if let Query::Catalog(sender) = query {
            sender.send(expected.clone()).unwrap();
        } else {
            panic!("expected catalog query got {:?}", query);
        }

        // then
        let response = client_task.await.unwrap();
        assert_eq!(response, expected);
    }

    #[tokio::test]
    async fn query__forwards_score_update_with_profile_id() {
        // given
        let mut api = ActixQueryApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/profiles/p-1/score", api.base_url());

        let client_task = tokio::spawn(async move {
            client
                .put(url)
                .json(&ScoreDto { score: 64 })
                .send()
                .await
                .unwrap()
                .status()
        });

        // when
        let query = api.query().await.unwrap();
        if let Query::SetScore(ProfileQuery {
            profile_id,
            payload,
            sender,
        }) = query
        {
            assert_eq!(profile_id, "p-1");
            assert_eq!(payload, 64);
            sender.send(Ok(())).unwrap();
        } else {
            panic!("expected set score query got {:?}", query);
        }

        // then
        assert_eq!(client_task.await.unwrap(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn bind__all_interfaces_accepts_loopback_clients() {
        // given
        let api = ActixQueryApi::bind("0.0.0.0", None).await.unwrap();
        let port = api.base_url().rsplit(':').next().unwrap().to_string();
        let url = format!("http://127.0.0.1:{port}/profiles/p-1/score");

        // when
        let status = reqwest::Client::new()
            .put(url)
            .json(&ScoreDto { score: 101 })
            .send()
            .await
            .unwrap()
            .status();

        // then
        assert!(api.base_url().starts_with("http://0.0.0.0:"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn set_score__above_hundred_is_rejected_before_forwarding() {
        // given
        let api = ActixQueryApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/profiles/p-1/score", api.base_url());

        // when
        let status = client
            .put(url)
            .json(&ScoreDto { score: 101 })
            .send()
            .await
            .unwrap()
            .status();

        // then
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history__unknown_profile_maps_to_not_found() {
        // given
        let mut api = ActixQueryApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/profiles/ghost/history", api.base_url());

        let client_task =
            tokio::spawn(async move { client.get(url).send().await.unwrap().status() });

        // when
        let query = api.query().await.unwrap();
        if let Query::History(ProfileQuery {
            profile_id, sender, ..
        }) = query
        {
            sender
                .send(Err(QueryError::UnknownProfile(profile_id)))
                .unwrap();
        } else {
            panic!("expected history query got {:?}", query);
        }

        // then
        assert_eq!(client_task.await.unwrap(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn query__forwards_appended_history_entry() {
        // given
        let mut api = ActixQueryApi::new(None).await.unwrap();
        let client = reqwest::Client::new();
        let url = format!("{}/profiles/p-2/history", api.base_url());
        let entry = HistoryEntry::new(Direction::Increase, "Homework done", 2, 50, 52);
        let sent = entry.clone();

        let client_task = tokio::spawn(async move {
            client.post(url).json(&sent).send().await.unwrap().status()
        });

        // when
        let query = api.query().await.unwrap();
        if let Query::AppendHistory(ProfileQuery {
            payload, sender, ..
        }) = query
        {
            assert_eq!(payload, entry);
            sender.send(Ok(())).unwrap();
        } else {
            panic!("expected append history query got {:?}", query);
        }

        // then
        assert_eq!(client_task.await.unwrap(), StatusCode::CREATED);
    }
}
