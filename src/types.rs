use std::{fmt, str::FromStr};

use bitcoin::{
    consensus::encode, BlockHash, OutPoint, Psbt, Transaction, Txid, XOnlyPublicKey,
};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::Error;

/// The position of a single satoshi inside the UTXO set: an outpoint plus
/// the offset of the satoshi within that output's value.
///
/// Rendered textually as `txid:vout:offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SatPoint {
    /// The output containing the satoshi.
    pub outpoint: OutPoint,
    /// Satoshi offset within the output.
    pub offset: u64,
}

impl fmt::Display for SatPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.outpoint, self.offset)
    }
}

impl FromStr for SatPoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (outpoint, offset) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid(format!("satpoint {s} missing offset")))?;
        Ok(SatPoint {
            outpoint: outpoint
                .parse()
                .map_err(|e| Error::invalid(format!("satpoint {s}: {e}")))?,
            offset: offset
                .parse()
                .map_err(|e| Error::invalid(format!("satpoint {s}: {e}")))?,
        })
    }
}

impl From<SatPoint> for String {
    fn from(satpoint: SatPoint) -> Self {
        satpoint.to_string()
    }
}

impl TryFrom<String> for SatPoint {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Serde helper rendering an [`OutPoint`] as `txid:vout`, the shape the
/// inscription indexer speaks.
pub mod serde_outpoint {
    use super::*;

    pub fn serialize<S>(outpoint: &OutPoint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(outpoint)
    }

    pub fn deserialize<'d, D>(deserializer: D) -> Result<OutPoint, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// An inscription as reported by the indexer; the minimal attribute set the
/// engine consumes.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct InscriptionItem {
    /// Inscription identifier.
    pub id: String,
    /// Address currently holding the inscription.
    pub owner: String,
    /// Exact satoshi position, `txid:vout:offset`.
    pub location: SatPoint,
    /// The outpoint carrying the inscription.
    #[serde(with = "serde_outpoint")]
    pub output: OutPoint,
    /// Value of that output in sats.
    pub output_value: u64,
}

impl InscriptionItem {
    /// Checks the indexer's internal consistency: the location must point
    /// into the reported output.
    pub fn validate(&self) -> Result<(), Error> {
        if self.location.outpoint != self.output {
            return Err(Error::invalid(format!(
                "inscription {}: location {} disagrees with output {}",
                self.id, self.location, self.output
            )));
        }
        if self.location.offset >= self.output_value {
            return Err(Error::invalid(format!(
                "inscription {}: offset {} outside output of {} sat",
                self.id, self.location.offset, self.output_value
            )));
        }
        Ok(())
    }
}

/// Confirmation status of a UTXO, as reported by the UTXO indexer.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct UtxoStatus {
    /// Whether the funding transaction is confirmed.
    pub confirmed: bool,
    /// Height of the confirming block.
    pub block_height: Option<u32>,
    /// Hash of the confirming block.
    pub block_hash: Option<BlockHash>,
    /// Timestamp of the confirming block.
    pub block_time: Option<u64>,
}

/// One unspent output of an address, in the UTXO indexer's shape.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Utxo {
    /// The funding transaction id.
    pub txid: Txid,
    /// The output index.
    pub vout: u32,
    /// Output value in sats.
    pub value: u64,
    /// Confirmation status.
    pub status: UtxoStatus,
}

impl Utxo {
    /// The outpoint of this UTXO.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.txid, self.vout)
    }
}

/// Confirmation-target tier understood by the fee oracle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FeeRateTier {
    /// Next block.
    FastestFee,
    /// Within three blocks.
    HalfHourFee,
    /// Within six blocks.
    #[default]
    HourFee,
    /// Relay floor.
    MinimumFee,
}

impl FeeRateTier {
    /// Parses a tier label; unrecognized labels fall back to
    /// [`FeeRateTier::HourFee`].
    pub fn from_label(label: &str) -> Self {
        match label {
            "fastestFee" => Self::FastestFee,
            "halfHourFee" => Self::HalfHourFee,
            "minimumFee" => Self::MinimumFee,
            _ => Self::HourFee,
        }
    }

    /// The oracle-side label of this tier.
    pub fn label(&self) -> &'static str {
        match self {
            Self::FastestFee => "fastestFee",
            Self::HalfHourFee => "halfHourFee",
            Self::HourFee => "hourFee",
            Self::MinimumFee => "minimumFee",
        }
    }
}

impl fmt::Display for FeeRateTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of the fee oracle's recommended-fees endpoint, in sat/vB.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedFees {
    /// Next-block rate.
    pub fastest_fee: u64,
    /// Three-block rate.
    pub half_hour_fee: u64,
    /// Six-block rate.
    pub hour_fee: u64,
    /// Relay floor.
    pub minimum_fee: u64,
}

impl RecommendedFees {
    /// Selects the rate of `tier`.
    pub fn tier(&self, tier: FeeRateTier) -> u64 {
        match tier {
            FeeRateTier::FastestFee => self.fastest_fee,
            FeeRateTier::HalfHourFee => self.half_hour_fee,
            FeeRateTier::HourFee => self.hour_fee,
            FeeRateTier::MinimumFee => self.minimum_fee,
        }
    }
}

/// One spent input of a transaction, from the verbose `getrawtransaction`
/// result.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct VerboseVin {
    /// Funding transaction of this input; absent for coinbase inputs.
    pub txid: Option<Txid>,
    /// Funding output index; absent for coinbase inputs.
    pub vout: Option<u32>,
    /// Input script.
    #[serde(rename = "scriptSig")]
    pub script_sig: Option<VerboseScriptSig>,
    /// Input sequence number.
    pub sequence: u32,
    /// Witness stack, hex-encoded per element.
    #[serde(rename = "txinwitness")]
    pub witness: Option<Vec<String>>,
}

/// Script of a verbose input.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct VerboseScriptSig {
    /// Script assembly.
    pub asm: String,
    /// Script hex.
    pub hex: String,
}

/// One output of a transaction, from the verbose `getrawtransaction`
/// result.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct VerboseVout {
    /// Output value in whole coins.
    pub value: f64,
    /// Output index.
    pub n: u32,
}

/// Result of JSON-RPC method `getrawtransaction` with verbosity set to 1.
///
/// Method call: `getrawtransaction "txid" ( verbosity )`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RawTransactionVerbose {
    /// The transaction id.
    pub txid: Txid,
    /// The transaction itself.
    #[serde(deserialize_with = "deserialize_tx")]
    #[serde(rename = "hex")]
    pub transaction: Transaction,
    /// Hash of the confirming block, if confirmed.
    pub blockhash: Option<BlockHash>,
    /// Timestamp of the confirming block, if confirmed.
    pub blocktime: Option<u64>,
    /// Number of confirmations; absent or zero while in the mempool.
    pub confirmations: Option<u32>,
    /// Spent inputs.
    pub vin: Vec<VerboseVin>,
    /// Created outputs.
    pub vout: Vec<VerboseVout>,
}

impl RawTransactionVerbose {
    /// Whether the transaction is still unconfirmed.
    pub fn is_unconfirmed(&self) -> bool {
        self.confirmations.unwrap_or(0) == 0
    }
}

/// Per-input entry of the JSON-RPC method `analyzepsbt`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AnalyzePsbtInput {
    /// Whether the input has its UTXO attached.
    #[serde(default)]
    pub has_utxo: bool,
    /// Whether the input carries a complete set of signatures.
    #[serde(default)]
    pub is_final: bool,
    /// Next role needed to progress this input.
    pub next: Option<String>,
}

/// Result of JSON-RPC method `analyzepsbt`.
///
/// Method call: `analyzepsbt "psbt"`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AnalyzePsbtResult {
    /// Per-input analysis.
    pub inputs: Vec<AnalyzePsbtInput>,
    /// Next role needed to progress the PSBT as a whole.
    pub next: Option<String>,
}

/// Result of JSON-RPC method `finalizepsbt` with extraction enabled.
///
/// Method call: `finalizepsbt "psbt" ( extract )`
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct FinalizePsbtResult {
    /// The PSBT, when finalization is incomplete.
    pub psbt: Option<String>,
    /// The extracted network transaction, when complete.
    pub hex: Option<String>,
    /// Whether all inputs were finalized.
    pub complete: bool,
}

impl FinalizePsbtResult {
    /// Decodes the extracted transaction, if present.
    pub fn transaction(&self) -> Result<Option<Transaction>, encode::FromHexError> {
        self.hex
            .as_deref()
            .map(encode::deserialize_hex)
            .transpose()
    }
}

/// Fees reported per transaction by `testmempoolaccept`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TestMempoolAcceptFees {
    /// Transaction fee in whole coins.
    pub base: f64,
}

/// Models the result of JSON-RPC method `testmempoolaccept`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TestMempoolAccept {
    /// The transaction id.
    pub txid: Txid,
    /// The witness transaction id, if known.
    pub wtxid: Option<String>,
    /// Whether the mempool would accept the transaction.
    #[serde(default)]
    pub allowed: bool,
    /// Virtual size, present when allowed.
    pub vsize: Option<u64>,
    /// Fees, present when allowed.
    pub fees: Option<TestMempoolAcceptFees>,
    /// Rejection reason, if any.
    #[serde(rename = "reject-reason")]
    pub reject_reason: Option<String>,
}

/// The seller's side of a listing.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SellerTerms {
    /// Marketplace maker fee in basis points.
    pub maker_fee_bp: u16,
    /// Address currently holding the inscription.
    pub ord_address: String,
    /// Asking price in sats, net of postage.
    pub price: u64,
    /// The inscription being listed.
    pub ord_item: InscriptionItem,
    /// Address receiving the payout.
    pub receive_address: String,
    /// X-only key for taproot listings.
    pub tap_internal_key: Option<XOnlyPublicKey>,
    /// Listing half-PSBT awaiting signature.
    pub unsigned_listing_psbt: Option<Psbt>,
    /// Listing half-PSBT carrying the seller signature.
    pub signed_listing_psbt: Option<Psbt>,
}

/// The buyer's side of a listing, added at purchase time.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct BuyerTerms {
    /// Marketplace taker fee in basis points.
    pub taker_fee_bp: u16,
    /// Address funding the purchase.
    pub payment_address: String,
    /// Address receiving the inscription.
    pub token_receive_address: String,
    /// Fee oracle tier used to size the transaction fee.
    pub fee_rate_tier: FeeRateTier,
    /// Public key behind the payment address; required for script-hash
    /// wrapped segwit and taproot payment addresses.
    pub payment_pubkey: Option<bitcoin::PublicKey>,
    /// The two dummies consumed by the purchase.
    pub dummy_utxos: Option<Vec<Utxo>>,
    /// Payment coins funding price and fees.
    pub payment_utxos: Option<Vec<Utxo>>,
    /// Purchase half-PSBT awaiting buyer signatures.
    pub unsigned_buying_psbt: Option<Psbt>,
    /// Purchase half-PSBT carrying the buyer signatures.
    pub signed_buying_psbt: Option<Psbt>,
    /// The combined, broadcast-ready PSBT.
    pub merged_psbt: Option<Psbt>,
}

impl BuyerTerms {
    /// Fresh buyer terms for a purchase funded from `payment_address`.
    pub fn new(
        payment_address: impl Into<String>,
        token_receive_address: impl Into<String>,
        taker_fee_bp: u16,
    ) -> Self {
        Self {
            taker_fee_bp,
            payment_address: payment_address.into(),
            token_receive_address: token_receive_address.into(),
            fee_rate_tier: FeeRateTier::default(),
            payment_pubkey: None,
            dummy_utxos: None,
            payment_utxos: None,
            unsigned_buying_psbt: None,
            signed_buying_psbt: None,
            merged_psbt: None,
        }
    }
}

/// The mutable listing document passed between engine calls.
///
/// Produced by the seller flow, extended by the buyer flow; owned
/// exclusively by the calling session.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Listing {
    /// Seller side.
    pub seller: SellerTerms,
    /// Buyer side, absent until purchase time.
    pub buyer: Option<BuyerTerms>,
}

impl Listing {
    /// A new listing with no buyer attached yet.
    pub fn new(seller: SellerTerms) -> Self {
        Self {
            seller,
            buyer: None,
        }
    }

    /// The buyer side, or an invalid-argument error when missing.
    pub fn buyer(&self) -> Result<&BuyerTerms, Error> {
        self.buyer
            .as_ref()
            .ok_or_else(|| Error::invalid("listing has no buyer terms"))
    }
}

/// Deserializes a hex string straight into a [`Transaction`].
fn deserialize_tx<'d, D>(deserializer: D) -> Result<Transaction, D::Error>
where
    D: Deserializer<'d>,
{
    let hex = String::deserialize(deserializer)?;
    encode::deserialize_hex(&hex).map_err(de::Error::custom)
}
