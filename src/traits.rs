use std::future::Future;

use bitcoin::{OutPoint, Transaction, Txid};

use crate::{
    error::ClientResult,
    types::{
        AnalyzePsbtResult, FeeRateTier, FinalizePsbtResult, InscriptionItem, RawTransactionVerbose,
        RecommendedFees, TestMempoolAccept, Utxo,
    },
};

/// Node-level functionality the engine needs from a chain's RPC endpoint.
///
/// Every method is a suspension point: builders interleave these calls
/// with pure PSBT assembly, and the returned futures are `Send` so a
/// session can run on a multi-threaded executor. Implementations are
/// expected to be I/O handles that are cheap to call through `&self`.
pub trait NodeProvider {
    /// Gets a raw transaction by its [`Txid`].
    fn get_raw_transaction(
        &self,
        txid: &Txid,
    ) -> impl Future<Output = ClientResult<Transaction>> + Send;

    /// Gets a raw transaction by its [`Txid`], decoded with input, output
    /// and confirmation detail.
    fn get_raw_transaction_verbose(
        &self,
        txid: &Txid,
    ) -> impl Future<Output = ClientResult<RawTransactionVerbose>> + Send;

    /// Analyzes a base64 PSBT and reports per-input signing state.
    fn analyze_psbt(
        &self,
        psbt_b64: &str,
    ) -> impl Future<Output = ClientResult<AnalyzePsbtResult>> + Send;

    /// Finalizes a base64 PSBT, extracting the network transaction when
    /// every input is complete.
    fn finalize_psbt(
        &self,
        psbt_b64: &str,
    ) -> impl Future<Output = ClientResult<FinalizePsbtResult>> + Send;

    /// Tests whether the mempool would accept a raw transaction.
    fn test_mempool_accept(
        &self,
        tx: &Transaction,
    ) -> impl Future<Output = ClientResult<Vec<TestMempoolAccept>>> + Send;

    /// Sends a raw transaction to the network.
    fn send_raw_transaction(
        &self,
        tx: &Transaction,
    ) -> impl Future<Output = ClientResult<Txid>> + Send;

    /// Gets all transaction ids in mempool.
    fn get_raw_mempool(&self) -> impl Future<Output = ClientResult<Vec<Txid>>> + Send;
}

/// Fee-rate oracle, in sat/vB.
pub trait FeeProvider {
    /// Resolves one tier to a rate.
    fn get_fee(&self, tier: FeeRateTier) -> impl Future<Output = ClientResult<u64>> + Send;

    /// Gets all recommended tiers at once.
    fn get_fees_recommended(&self)
        -> impl Future<Output = ClientResult<RecommendedFees>> + Send;
}

/// UTXO-set indexer keyed by address.
pub trait UtxoProvider {
    /// Gets all unspent outputs of `address`, in indexer order.
    fn get_address_utxos(
        &self,
        address: &str,
    ) -> impl Future<Output = ClientResult<Vec<Utxo>>> + Send;
}

/// Inscription indexer mapping outpoints and identifiers to items.
///
/// # Note
///
/// The indexer only reflects confirmed chain state; the engine judges
/// unconfirmed outputs by their ancestry instead.
pub trait ItemProvider {
    /// Gets the inscription sitting on `outpoint`, if any.
    fn get_token_by_output(
        &self,
        outpoint: &OutPoint,
    ) -> impl Future<Output = ClientResult<Option<InscriptionItem>>> + Send;

    /// Gets an inscription by identifier, if known.
    fn get_token_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = ClientResult<Option<InscriptionItem>>> + Send;
}

/// Marketplace fee schedule keyed by participant address.
pub trait MarketFeeProvider {
    /// Maker fee of `address` in basis points.
    fn get_maker_fee_bp(&self, address: &str)
        -> impl Future<Output = ClientResult<u16>> + Send;

    /// Taker fee of `address` in basis points.
    fn get_taker_fee_bp(&self, address: &str)
        -> impl Future<Output = ClientResult<u16>> + Send;
}

/// The absent marketplace-fee schedule: every fee is zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoMarketFees;

impl MarketFeeProvider for NoMarketFees {
    async fn get_maker_fee_bp(&self, _address: &str) -> ClientResult<u16> {
        Ok(0)
    }

    async fn get_taker_fee_bp(&self, _address: &str) -> ClientResult<u16> {
        Ok(0)
    }
}
