use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use base64::{engine::general_purpose, Engine};
use bitcoin::{
    consensus::{self, encode::serialize_hex},
    Transaction, Txid,
};
use reqwest::{header::AUTHORIZATION, Client as ReqwestClient};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use tracing::*;

use crate::{
    error::{ClientError, ClientResult, RpcServerError},
    traits::NodeProvider,
    types::{
        AnalyzePsbtResult, FinalizePsbtResult, RawTransactionVerbose, TestMempoolAccept,
    },
};

/// Default request timeout for node RPC calls.
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Node error code for a transaction that already confirmed.
const RPC_VERIFY_ALREADY_IN_CHAIN: i32 = -27;

/// How the node RPC endpoint authenticates requests.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum Auth {
    /// Open endpoint, no credentials.
    None,
    /// Explicit RPC username and password.
    UserPass(String, String),
    /// A `user:password` cookie file written by the node at startup.
    CookieFile(PathBuf),
}

impl Auth {
    /// Resolves the credentials to a ready-made `Authorization` header
    /// value, or `None` for an open endpoint.
    fn header_value(self) -> ClientResult<Option<String>> {
        let credentials = match self {
            Auth::None => return Ok(None),
            Auth::UserPass(user, password) => format!("{user}:{password}"),
            Auth::CookieFile(path) => fs::read_to_string(&path)
                .map_err(|e| {
                    ClientError::Auth(format!("cannot read cookie file {}: {e}", path.display()))
                })?
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string(),
        };
        if !credentials.contains(':') {
            return Err(ClientError::Auth(
                "credentials must have the form user:password".to_string(),
            ));
        }
        Ok(Some(format!(
            "Basic {}",
            general_purpose::STANDARD.encode(credentials)
        )))
    }
}

/// JSON-RPC access to the node endpoint of one chain, covering exactly
/// the surface the swap engine consumes: raw-transaction fetches, PSBT
/// analysis and finalization, and mempool pre-flight.
///
/// Calls are single-shot. A failed round-trip surfaces immediately as a
/// [`ClientError`]; retry policy stays with the caller, like everywhere
/// else in the engine. Requests are numbered for log correlation.
#[derive(Debug)]
pub struct Client {
    /// The URL of the node RPC endpoint.
    url: String,

    /// Ready-made `Authorization` header, when the endpoint needs one.
    auth_header: Option<String>,

    /// The underlying `async` HTTP client.
    client: ReqwestClient,

    /// Sequence number of the next request.
    seq: AtomicU64,
}

/// The JSON-RPC response envelope: exactly one of `result` and `error`
/// is populated.
#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcServerError>,
}

impl Client {
    /// Creates a new [`Client`] for `url` with the given authentication
    /// and an optional per-request timeout.
    pub fn new(url: impl Into<String>, auth: Auth, timeout: Option<Duration>) -> ClientResult<Self> {
        let client = ReqwestClient::builder()
            .timeout(timeout.unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS)))
            .build()
            .map_err(|e| ClientError::ReqBuilder(format!("Could not create client: {e}")))?;
        let url = url.into();
        trace!(url = %url, "Created node RPC client");
        Ok(Self {
            url,
            auth_header: auth.header_value()?,
            client,
            seq: AtomicU64::new(0),
        })
    }

    /// One JSON-RPC round-trip.
    ///
    /// A node that rejects a call often still answers with a JSON body
    /// under a 500 status; the error object in that body is more useful
    /// than the status line, so decoding is attempted before giving up.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> ClientResult<T> {
        let id = self.seq.fetch_add(1, Ordering::Relaxed);
        trace!(%method, id, "node RPC call");

        let mut request = self.client.post(&self.url).json(&json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        }));
        if let Some(header) = &self.auth_header {
            request = request.header(AUTHORIZATION, header);
        }
        let response = request.send().await.map_err(ClientError::transport)?;

        let status = response.status();
        let envelope: RpcEnvelope<T> = if status.is_success() {
            response
                .json()
                .await
                .map_err(|e| ClientError::MalformedResponse(e.to_string()))?
        } else {
            match response.json().await {
                Ok(envelope @ RpcEnvelope { error: Some(_), .. }) => envelope,
                _ => {
                    let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
                    return Err(ClientError::Status(status.as_u16(), reason));
                }
            }
        };
        if let Some(err) = envelope.error {
            warn!(%method, code = err.code, "node rejected RPC call");
            return Err(ClientError::Server(err.code, err.message));
        }
        envelope.result.ok_or_else(|| {
            ClientError::MalformedResponse(format!("{method} returned neither result nor error"))
        })
    }
}

impl NodeProvider for Client {
    async fn get_raw_transaction(&self, txid: &Txid) -> ClientResult<Transaction> {
        let hex: String = self
            .call("getrawtransaction", json!([txid.to_string(), 0]))
            .await?;
        consensus::encode::deserialize_hex(&hex)
            .map_err(|e| ClientError::MalformedResponse(format!("transaction decode: {e}")))
    }

    async fn get_raw_transaction_verbose(
        &self,
        txid: &Txid,
    ) -> ClientResult<RawTransactionVerbose> {
        self.call("getrawtransaction", json!([txid.to_string(), 1]))
            .await
    }

    async fn analyze_psbt(&self, psbt_b64: &str) -> ClientResult<AnalyzePsbtResult> {
        self.call("analyzepsbt", json!([psbt_b64])).await
    }

    async fn finalize_psbt(&self, psbt_b64: &str) -> ClientResult<FinalizePsbtResult> {
        self.call("finalizepsbt", json!([psbt_b64, true])).await
    }

    async fn test_mempool_accept(&self, tx: &Transaction) -> ClientResult<Vec<TestMempoolAccept>> {
        self.call("testmempoolaccept", json!([[serialize_hex(tx)]]))
            .await
    }

    async fn send_raw_transaction(&self, tx: &Transaction) -> ClientResult<Txid> {
        let txstr = serialize_hex(tx);
        trace!(%txstr, "Sending raw transaction");
        match self.call("sendrawtransaction", json!([txstr])).await {
            // A resend of a confirmed transaction already achieved what
            // the caller wanted.
            Err(ClientError::Server(code, _)) if code == RPC_VERIFY_ALREADY_IN_CHAIN => {
                Ok(tx.compute_txid())
            }
            other => other,
        }
    }

    async fn get_raw_mempool(&self) -> ClientResult<Vec<Txid>> {
        self.call("getrawmempool", json!([])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_resolves_to_a_basic_header() {
        assert_eq!(Auth::None.header_value().unwrap(), None);

        let header = Auth::UserPass("user".into(), "pass".into())
            .header_value()
            .unwrap()
            .unwrap();
        // base64("user:pass")
        assert_eq!(header, "Basic dXNlcjpwYXNz");

        let err = Auth::CookieFile(PathBuf::from("/nonexistent/cookie"))
            .header_value()
            .unwrap_err();
        assert!(matches!(err, ClientError::Auth(_)));

        let auth = Auth::UserPass("user".into(), String::new());
        assert!(auth.header_value().is_ok(), "empty password is still user:pass");
    }

    #[test]
    fn envelope_decodes_result_or_error() {
        let json = r#"{"result":null,"error":{"code":-25,"message":"bad-psbt"},"id":7}"#;
        let envelope: RpcEnvelope<String> = serde_json::from_str(json).unwrap();
        let err = envelope.error.unwrap();
        assert_eq!(err.code, -25);
        assert_eq!(err.message, "bad-psbt");

        let json = r#"{"result":"00","error":null,"id":8}"#;
        let envelope: RpcEnvelope<String> = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.result.as_deref(), Some("00"));
        assert!(envelope.error.is_none());
    }

    #[test]
    fn clients_build_without_touching_the_network() {
        let client = Client::new("http://localhost:18443", Auth::None, None).unwrap();
        assert_eq!(client.seq.fetch_add(1, Ordering::Relaxed), 0);
        assert!(client.auth_header.is_none());
    }
}
