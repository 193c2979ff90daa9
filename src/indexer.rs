use std::time::Duration;

use bitcoin::OutPoint;
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use tracing::*;

use crate::{
    error::{ClientError, ClientResult},
    traits::ItemProvider,
    types::InscriptionItem,
};

/// Default request timeout for the indexer.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// An `async` client for an ord-style inscription indexer.
///
/// The indexer maps confirmed outpoints and inscription identifiers to
/// items; a missing entry is `None`, any transport failure is an error the
/// classifier treats as taint.
#[derive(Debug, Clone)]
pub struct IndexerClient {
    /// Base URL of the indexer API root.
    base_url: String,

    /// The underlying `async` HTTP client.
    client: ReqwestClient,
}

impl IndexerClient {
    /// Creates a new [`IndexerClient`] for `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> ClientResult<Self> {
        let client = ReqwestClient::builder()
            .timeout(timeout.unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS)))
            .build()
            .map_err(|e| ClientError::ReqBuilder(format!("Could not create client: {e}")))?;
        let base_url = base_url.into();
        trace!(url = %base_url, "Created indexer client");
        Ok(Self { base_url, client })
    }

    /// Gets one resource; a 404 becomes `None`.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> ClientResult<Option<T>> {
        let url = format!("{}{path}", self.base_url);
        trace!(%url, "Calling indexer endpoint");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ClientError::transport)?;
        let status = resp.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
            let err = ClientError::Status(status.as_u16(), reason);
            if err.is_not_found() {
                return Ok(None);
            }
            return Err(err);
        }
        resp.json::<T>()
            .await
            .map(Some)
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))
    }
}

impl ItemProvider for IndexerClient {
    async fn get_token_by_output(
        &self,
        outpoint: &OutPoint,
    ) -> ClientResult<Option<InscriptionItem>> {
        self.get_optional::<InscriptionItem>(&format!("/output/{outpoint}"))
            .await
    }

    async fn get_token_by_id(&self, id: &str) -> ClientResult<Option<InscriptionItem>> {
        self.get_optional::<InscriptionItem>(&format!("/inscription/{id}"))
            .await
    }
}
