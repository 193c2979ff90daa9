use bitcoin::{Psbt, Transaction, XOnlyPublicKey};
use tracing::*;

use crate::{
    buyer::{PLATFORM_FEE_OUTPUT_INDEX, SELLER_INPUT_INDEX},
    chain::ChainParams,
    config::Config,
    error::{Error, Result},
    psbt::{is_empty_schnorr_witness, prev_output_script},
    seller::seller_payout,
    session::Session,
    traits::{ItemProvider, MarketFeeProvider, NodeProvider},
    types::{InscriptionItem, Listing},
};

/// A signed listing as received from a seller, with the claims the
/// verifier holds it against.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifyListingRequest {
    /// The seller's signed half-PSBT.
    pub signed_listing_psbt: Psbt,
    /// The inscription the listing claims to sell.
    pub token_id: String,
    /// The asking price in sats.
    pub price: u64,
    /// The address the seller claims to be paid at.
    pub seller_receive_address: String,
    /// The seller's taproot internal key, for key-path listings.
    pub tap_internal_key: Option<XOnlyPublicKey>,
}

/// Validates a signed listing against the swap protocol.
///
/// Deterministic and idempotent given stable providers; any mismatch is an
/// `InvalidArgument`. On success the indexed item is returned so callers
/// can reuse it without another indexer round-trip.
pub async fn verify_signed_listing<N, I, U, F, M>(
    session: &Session<N, I, U, F, M>,
    req: &VerifyListingRequest,
) -> Result<InscriptionItem>
where
    N: NodeProvider,
    I: ItemProvider,
    M: MarketFeeProvider,
{
    if req.price == session.config.delist_magic_price {
        return Err(Error::invalid("listing is delisted"));
    }

    let psbt = &req.signed_listing_psbt;
    if psbt.unsigned_tx.input.len() != 1 || psbt.inputs.len() != 1 {
        return Err(Error::invalid(format!(
            "listing must spend exactly one input, found {}",
            psbt.unsigned_tx.input.len()
        )));
    }
    if psbt.unsigned_tx.output.len() != 1 {
        return Err(Error::invalid(format!(
            "listing must pay exactly one output, found {}",
            psbt.unsigned_tx.output.len()
        )));
    }

    let input = &psbt.inputs[0];
    if input.tap_internal_key.is_some() || req.tap_internal_key.is_some() {
        let witness = input
            .final_script_witness
            .as_ref()
            .ok_or_else(|| Error::invalid("taproot listing is missing its finalized witness"))?;
        if is_empty_schnorr_witness(witness) {
            return Err(Error::invalid("taproot listing witness is unsigned"));
        }
    }
    let analysis = session.node.analyze_psbt(&psbt.to_string()).await?;
    if !analysis.inputs.first().is_some_and(|i| i.is_final) {
        return Err(Error::invalid("listing input is not finalized"));
    }

    let outpoint = psbt.unsigned_tx.input[0].previous_output;
    let item = session
        .items
        .get_token_by_output(&outpoint)
        .await?
        .ok_or_else(|| Error::invalid(format!("no inscription indexed at {outpoint}")))?;
    if item.id != req.token_id {
        return Err(Error::invalid(format!(
            "token id mismatch: listing spends {}, claimed {}",
            item.id, req.token_id
        )));
    }

    let maker_fee_bp = session.market.get_maker_fee_bp(&item.owner).await?;
    let expected = seller_payout(req.price, maker_fee_bp, item.output_value);
    let output = &psbt.unsigned_tx.output[0];
    if output.value.to_sat() != expected {
        return Err(Error::invalid(format!(
            "invalid price: output pays {} sat, expected {expected} sat",
            output.value.to_sat()
        )));
    }

    let paid_to = session.chain.script_to_address(&output.script_pubkey)?;
    if paid_to != req.seller_receive_address {
        return Err(Error::invalid(format!(
            "receive address mismatch: listing pays {paid_to}"
        )));
    }

    let prev_script = prev_output_script(input, &outpoint)
        .ok_or_else(|| Error::invalid("listing input is missing its UTXO"))?;
    let signer = session.chain.script_to_address(prev_script)?;
    if signer != item.owner {
        return Err(Error::invalid(format!(
            "listing spends an output of {signer}, but the inscription is owned by {}",
            item.owner
        )));
    }

    debug!(token = %item.id, outpoint = %outpoint, "verified signed listing");
    Ok(item)
}

/// Splices the seller's signed input and its PSBT metadata into the seller
/// slot of the buyer PSBT. No other field is modified.
///
/// Pure: equal inputs always yield byte-identical output.
pub fn merge(signed_listing: &Psbt, signed_buying: &Psbt) -> Result<Psbt> {
    if signed_listing.unsigned_tx.input.len() != 1 || signed_listing.inputs.len() != 1 {
        return Err(Error::invalid("listing must spend exactly one input"));
    }
    if signed_buying.unsigned_tx.input.len() <= SELLER_INPUT_INDEX
        || signed_buying.inputs.len() != signed_buying.unsigned_tx.input.len()
    {
        return Err(Error::invalid("buyer PSBT has no seller slot"));
    }

    let seller_txin = &signed_listing.unsigned_tx.input[0];
    let slot = &signed_buying.unsigned_tx.input[SELLER_INPUT_INDEX];
    if slot.previous_output != seller_txin.previous_output {
        return Err(Error::invalid(format!(
            "seller slot spends {}, listing spends {}",
            slot.previous_output, seller_txin.previous_output
        )));
    }

    let mut merged = signed_buying.clone();
    merged.unsigned_tx.input[SELLER_INPUT_INDEX] = seller_txin.clone();
    merged.inputs[SELLER_INPUT_INDEX] = signed_listing.inputs[0].clone();
    Ok(merged)
}

/// Merges the signed halves stored in `listing` and records the result.
pub fn merge_listing(listing: &mut Listing) -> Result<Psbt> {
    let signed_listing = listing
        .seller
        .signed_listing_psbt
        .as_ref()
        .ok_or_else(|| Error::invalid("listing has no signed seller PSBT"))?;
    let signed_buying = listing
        .buyer()?
        .signed_buying_psbt
        .as_ref()
        .ok_or_else(|| Error::invalid("listing has no signed buyer PSBT"))?;
    let merged = merge(signed_listing, signed_buying)?;
    if let Some(buyer) = listing.buyer.as_mut() {
        buyer.merged_psbt = Some(merged.clone());
    }
    Ok(merged)
}

/// The platform fee actually paid by a purchase PSBT: the value of the
/// fee-slot output iff it exists and pays the configured fee address.
///
/// When the fee output was suppressed, whatever occupies the slot pays a
/// different script and this returns `None`.
pub fn platform_fee_paid(psbt: &Psbt, chain: &ChainParams, config: &Config) -> Option<u64> {
    let fee_address = config.platform_fee_address.as_deref()?;
    let output = psbt.unsigned_tx.output.get(PLATFORM_FEE_OUTPUT_INDEX)?;
    let paid_to = chain.script_to_address(&output.script_pubkey).ok()?;
    (paid_to == fee_address).then(|| output.value.to_sat())
}

/// Runs the node's finalizer over the merged PSBT and pre-flights the
/// extracted transaction against the mempool. Broadcast stays with the
/// caller.
pub async fn finalize_and_check<N, I, U, F, M>(
    session: &Session<N, I, U, F, M>,
    merged: &Psbt,
) -> Result<Transaction>
where
    N: NodeProvider,
{
    let finalized = session.node.finalize_psbt(&merged.to_string()).await?;
    if !finalized.complete {
        return Err(Error::Protocol(
            "node could not finalize the merged PSBT".to_string(),
        ));
    }
    let tx = finalized
        .transaction()
        .map_err(|e| Error::Protocol(format!("finalized transaction decode: {e}")))?
        .ok_or_else(|| Error::Protocol("finalized without an extracted transaction".to_string()))?;

    let results = session.node.test_mempool_accept(&tx).await?;
    let result = results
        .first()
        .ok_or_else(|| Error::Protocol("empty mempool-accept result".to_string()))?;
    if !result.allowed {
        return Err(Error::Protocol(format!(
            "mempool rejected transaction: {}",
            result.reject_reason.as_deref().unwrap_or("unknown reason")
        )));
    }
    debug!(txid = %result.txid, "merged transaction passed mempool pre-flight");
    Ok(tx)
}
