use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the swap engine's construction and validation
/// pipeline.
///
/// Validation failures are surfaced immediately and are never retried by
/// the engine; transient provider failures are wrapped in
/// [`Error::Provider`] so the caller can layer its own retry policy.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied value is malformed or violates the swap protocol:
    /// unparseable address, missing buyer pubkey on a P2SH payment address,
    /// unknown chain, or an inbound PSBT that fails a listing check.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// UTXO selection cannot cover the target amount plus fees.
    ///
    /// `required` already includes the estimated network fee for the
    /// selection that was attempted.
    #[error(
        "insufficient funds: required {required} sat, available {available} sat, short {shortfall} sat",
        shortfall = .required - .available
    )]
    InsufficientFunds {
        /// Amount plus estimated fee the selection had to reach.
        required: u64,
        /// Sum of all eligible candidate values.
        available: u64,
    },

    /// A transient failure of the node, indexer, or fee oracle.
    #[error("provider error: {0}")]
    Provider(#[from] ClientError),

    /// Node-side finalization or mempool rejection of a constructed
    /// transaction.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}

/// This is an alias for the result type returned by engine operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The error type for errors produced by the HTTP provider clients.
///
/// Provider calls are single-shot: nothing here is retried by the engine,
/// so every variant describes one failed round-trip.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ClientError {
    /// Missing or invalid authentication credentials.
    #[error("missing or invalid credentials: {0}")]
    Auth(String),

    /// The HTTP client could not be constructed or the request could not
    /// be built.
    #[error("could not build request: {0}")]
    ReqBuilder(String),

    /// The server responded with a non-success HTTP status.
    #[error("HTTP status {0}: {1}")]
    Status(u16, String),

    /// Could not establish a connection with the server.
    #[error("connection error: {0}")]
    Connection(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The request failed in transit for another reason.
    #[error("request error: {0}")]
    Request(String),

    /// The response arrived but could not be decoded into the expected
    /// shape.
    #[error("error decoding response: {0}")]
    MalformedResponse(String),

    /// The response parsed as JSON but not as the expected value.
    #[error("error parsing response: {0}")]
    Parse(String),

    /// The server executed the call and reported an application error.
    #[error("server returned error {0}: {1}")]
    Server(i32, String),
}

impl ClientError {
    /// Folds a transport-level `reqwest` failure into the client error
    /// taxonomy. HTTP statuses are not handled here; callers read them
    /// off the response before decoding.
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_builder() {
            Self::ReqBuilder(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }

    /// Whether this is an HTTP 404, which the indexer clients read as
    /// "no such resource" rather than a failure.
    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, Self::Status(404, _))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

/// This is an alias for the result type returned by the provider clients.
pub type ClientResult<T> = Result<T, ClientError>;

/// Error payload of a JSON-RPC response envelope.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Error)]
#[error("RPC server returned error {code}: {message}")]
pub struct RpcServerError {
    /// The error code.
    pub code: i32,
    /// The error message.
    pub message: String,
}
