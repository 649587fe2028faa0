use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::item::NewsItem;

/// Request/response contract the cache and the gateway run over.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_items(
        &self,
        endpoint: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<NewsItem>, FetchError>;

    async fn post_reaction(
        &self,
        item_id: i64,
        value: i32,
        cancel: CancellationToken,
    ) -> Result<(), FetchError>;
}

#[derive(Debug, Serialize)]
struct ReactionBody {
    value: i32,
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    api: ApiConfig,
}

impl HttpTransport {
    pub fn new(client: Client, api: ApiConfig) -> Result<Self, FetchError> {
        let base_url = Url::parse(&api.base_url)
            .map_err(|e| FetchError::Validation(format!("invalid base url {}: {e}", api.base_url)))?;
        Ok(Self {
            client,
            base_url,
            api,
        })
    }

    fn resolve(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|e| FetchError::Validation(format!("invalid endpoint {path}: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch_items(
        &self,
        endpoint: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<NewsItem>, FetchError> {
        let url = self.resolve(endpoint)?;
        debug!(%url, "fetching feed");
        let request = async {
            let response = self
                .client
                .get(url)
                .header(ACCEPT, "application/json")
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            let bytes = response.bytes().await?;
            let items = serde_json::from_slice::<Vec<NewsItem>>(&bytes)?;
            Ok::<_, FetchError>(items)
        };
        bounded(self.api.request_timeout(), &cancel, request).await
    }

    async fn post_reaction(
        &self,
        item_id: i64,
        value: i32,
        cancel: CancellationToken,
    ) -> Result<(), FetchError> {
        let url = self.resolve(&self.api.reaction_path(item_id))?;
        debug!(%url, item_id, value, "posting reaction");
        let request = async {
            let response = self
                .client
                .post(url)
                .header(ACCEPT, "application/json")
                .json(&ReactionBody { value })
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }
            Ok::<_, FetchError>(())
        };
        bounded(self.api.request_timeout(), &cancel, request).await
    }
}

/// Runs `request` under a deadline, giving up early if `cancel` fires.
pub async fn bounded<T, F>(
    timeout: Duration,
    cancel: &CancellationToken,
    request: F,
) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        outcome = tokio::time::timeout(timeout, request) => match outcome {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        },
    }
}
