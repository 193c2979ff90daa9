use bitcoin::{Amount, Psbt, Transaction, TxOut};
use tracing::*;

use crate::{
    chain::AddressType,
    error::{Error, Result},
    psbt::{txin, InputKind, TX_LOCK_TIME, TX_VERSION},
    session::Session,
    traits::NodeProvider,
    types::Listing,
};

/// What the seller's single output must pay: the asking price net of the
/// marketplace maker fee, plus reimbursement of the postage carried by the
/// inscription output being spent.
pub fn seller_payout(price: u64, maker_fee_bp: u16, output_value: u64) -> u64 {
    let maker_fee = (price as u128 * maker_fee_bp as u128 / 10_000) as u64;
    price - maker_fee + output_value
}

/// Builds the seller half-PSBT: one input spending the inscription
/// outpoint, one output paying the seller, signed later under
/// `SINGLE | ANYONECANPAY`.
///
/// That flag commits the signature to this input and to the output at the
/// same index only, which is what lets the buyer embed both into a larger
/// transaction as long as the indices line up and the output is preserved
/// verbatim.
pub async fn create_listing_psbt<N, I, U, F, M>(
    session: &Session<N, I, U, F, M>,
    listing: &mut Listing,
) -> Result<Psbt>
where
    N: NodeProvider,
{
    let seller = &listing.seller;
    let item = &seller.ord_item;
    item.validate()?;
    if !session.chain.is_valid_address(&seller.receive_address) {
        return Err(Error::invalid(format!(
            "seller receive address {} is not valid for chain {}",
            seller.receive_address, session.chain.name
        )));
    }

    let kind = match session.chain.classify_address(&seller.ord_address) {
        AddressType::P2tr => {
            let internal_key = seller.tap_internal_key.ok_or_else(|| {
                Error::invalid("taproot listing requires the seller's internal key")
            })?;
            InputKind::Taproot {
                prev_txout: ord_txout(session, item.output_value, &seller.ord_address)?,
                internal_key,
            }
        }
        AddressType::P2wpkh | AddressType::P2wsh => InputKind::NativeSegwit {
            prev_txout: ord_txout(session, item.output_value, &seller.ord_address)?,
        },
        AddressType::P2pkh | AddressType::P2sh => {
            let prev_tx = session.node.get_raw_transaction(&item.output.txid).await?;
            check_outpoint(&prev_tx, item.output.vout, item.output_value)?;
            InputKind::legacy(prev_tx)
        }
        AddressType::Unknown => {
            return Err(Error::invalid(format!(
                "ordinal address {} is not valid for chain {}",
                seller.ord_address, session.chain.name
            )))
        }
    };

    let payout = seller_payout(seller.price, seller.maker_fee_bp, item.output_value);
    let tx = Transaction {
        version: TX_VERSION,
        lock_time: TX_LOCK_TIME,
        input: vec![txin(item.output)],
        output: vec![TxOut {
            value: Amount::from_sat(payout),
            script_pubkey: session.chain.address_to_script(&seller.receive_address)?,
        }],
    };

    let mut psbt = Psbt::from_unsigned_tx(tx)
        .map_err(|e| Error::invalid(format!("listing tx not signable: {e}")))?;
    let sighash = kind.sighash_single_anyone_can_pay();
    psbt.inputs[0] = kind.into_psbt_input(Some(sighash));

    debug!(
        item = %item.id,
        outpoint = %item.output,
        payout,
        "built listing half-PSBT"
    );

    listing.seller.unsigned_listing_psbt = Some(psbt.clone());
    Ok(psbt)
}

fn ord_txout<N, I, U, F, M>(
    session: &Session<N, I, U, F, M>,
    value: u64,
    address: &str,
) -> Result<TxOut> {
    Ok(TxOut {
        value: Amount::from_sat(value),
        script_pubkey: session.chain.address_to_script(address)?,
    })
}

fn check_outpoint(prev_tx: &Transaction, vout: u32, expected_value: u64) -> Result<()> {
    let txout = prev_tx.output.get(vout as usize).ok_or_else(|| {
        Error::invalid(format!(
            "outpoint {}:{vout} not present in parent transaction",
            prev_tx.compute_txid()
        ))
    })?;
    if txout.value.to_sat() != expected_value {
        return Err(Error::invalid(format!(
            "indexed output value {} disagrees with chain value {}",
            expected_value,
            txout.value.to_sat()
        )));
    }
    Ok(())
}
