use std::time::Duration;

use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use tracing::*;

use crate::{
    error::{ClientError, ClientResult},
    traits::{FeeProvider, UtxoProvider},
    types::{FeeRateTier, RecommendedFees, Utxo},
};

/// Default request timeout for the REST providers.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// An `async` client for a mempool.space-compatible REST endpoint, serving
/// as both the fee oracle and the address-UTXO indexer.
#[derive(Debug, Clone)]
pub struct EsploraClient {
    /// Base URL up to and including the API root, e.g.
    /// `https://mempool.space/api`.
    base_url: String,

    /// The underlying `async` HTTP client.
    client: ReqwestClient,
}

impl EsploraClient {
    /// Creates a new [`EsploraClient`] for `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> ClientResult<Self> {
        let client = ReqwestClient::builder()
            .timeout(timeout.unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS)))
            .build()
            .map_err(|e| ClientError::ReqBuilder(format!("Could not create client: {e}")))?;
        let base_url = base_url.into();
        trace!(url = %base_url, "Created esplora client");
        Ok(Self { base_url, client })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let url = format!("{}{path}", self.base_url);
        trace!(%url, "Calling esplora endpoint");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(ClientError::transport)?;
        let status = resp.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
            return Err(ClientError::Status(status.as_u16(), reason));
        }
        resp.json::<T>()
            .await
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))
    }
}

impl FeeProvider for EsploraClient {
    async fn get_fee(&self, tier: FeeRateTier) -> ClientResult<u64> {
        let fees = self.get_fees_recommended().await?;
        Ok(fees.tier(tier))
    }

    async fn get_fees_recommended(&self) -> ClientResult<RecommendedFees> {
        self.get_json::<RecommendedFees>("/v1/fees/recommended")
            .await
    }
}

impl UtxoProvider for EsploraClient {
    async fn get_address_utxos(&self, address: &str) -> ClientResult<Vec<Utxo>> {
        self.get_json::<Vec<Utxo>>(&format!("/address/{address}/utxo"))
            .await
    }
}
