use bitcoin::{psbt, Amount, Psbt, ScriptBuf, Transaction, TxOut};
use tracing::*;

use crate::{
    chain::AddressType,
    error::{Error, Result},
    fees::{estimate_tx_fee, rate_for_tier},
    psbt::{txin, InputKind, TX_LOCK_TIME, TX_VERSION},
    selection::{select_dummy_utxos, select_payment_utxos},
    seller::seller_payout,
    session::Session,
    traits::{FeeProvider, ItemProvider, NodeProvider, UtxoProvider},
    types::{BuyerTerms, Listing, Utxo},
};

/// Input slot the seller's signed ordinal input is spliced into.
pub const SELLER_INPUT_INDEX: usize = 2;

/// Output slot recombining the two dummies plus the inscription offset.
pub const MERGED_DUMMY_OUTPUT_INDEX: usize = 0;

/// Output slot delivering the inscription to the buyer.
pub const BUYER_RECEIVE_OUTPUT_INDEX: usize = 1;

/// Output slot paying the seller; must match the listing output verbatim.
pub const SELLER_OUTPUT_INDEX: usize = 2;

/// Output slot paying the platform fee, when one is configured.
///
/// When the fee output is suppressed this index denotes whatever output
/// follows; auditors must cross-check the script against the configured
/// fee address (see [`crate::combine::platform_fee_paid`]).
pub const PLATFORM_FEE_OUTPUT_INDEX: usize = 3;

/// The combined maker+taker platform fee on `price`.
pub fn platform_fee_value(price: u64, total_bp: u32) -> u64 {
    (price as u128 * total_bp as u128 / 10_000) as u64
}

/// Builds the buyer half-PSBT around the fixed slot layout:
///
/// inputs `[dummy, dummy, <seller slot>, payment...]`, outputs
/// `[dummies+offset, inscription postage, seller payout, platform fee?,
/// new dummy, new dummy, change?]`.
///
/// The two dummies merged into output 0 absorb exactly `offset` sats of
/// the seller input ahead of the ordinal, so the inscribed satoshi opens
/// output 1; the postage tail of the seller input then flows into the
/// seller payout at output 2, the slot the listing signature commits to.
pub async fn create_purchase_psbt<N, I, U, F, M>(
    session: &Session<N, I, U, F, M>,
    listing: &mut Listing,
) -> Result<Psbt>
where
    N: NodeProvider,
    I: ItemProvider,
    U: UtxoProvider,
    F: FeeProvider,
{
    let seller = listing.seller.clone();
    let buyer = listing.buyer()?.clone();
    let item = &seller.ord_item;
    item.validate()?;
    let chain = &session.chain;
    let config = &session.config;

    let payment_script = chain.address_to_script(&buyer.payment_address)?;
    let receive_script = chain.address_to_script(&buyer.token_receive_address)?;
    let seller_script = chain.address_to_script(&seller.receive_address)?;

    let utxos = session.utxos.get_address_utxos(&buyer.payment_address).await?;
    let (dummy1, dummy2) = select_dummy_utxos(session, &utxos).await.ok_or_else(|| {
        Error::invalid(format!(
            "two dummy UTXOs between {} and {} sat are required at {}; create them and retry",
            config.dummy_utxo_min_value, config.dummy_utxo_max_value, buyer.payment_address
        ))
    })?;

    let offset = item.location.offset;
    let payout = seller_payout(seller.price, seller.maker_fee_bp, item.output_value);
    let platform_fee = config.platform_fee_address.as_deref().and_then(|address| {
        let value = platform_fee_value(
            seller.price,
            seller.maker_fee_bp as u32 + buyer.taker_fee_bp as u32,
        );
        (value > chain.dust_limit).then_some((address, value))
    });

    // Fixed outputs in slot order; change may join at the tail.
    let mut outputs = vec![
        TxOut {
            value: Amount::from_sat(dummy1.value + dummy2.value + offset),
            script_pubkey: payment_script.clone(),
        },
        TxOut {
            value: Amount::from_sat(config.ordinals_postage_value),
            script_pubkey: receive_script,
        },
        TxOut {
            value: Amount::from_sat(payout),
            script_pubkey: seller_script,
        },
    ];
    if let Some((address, value)) = platform_fee {
        outputs.push(TxOut {
            value: Amount::from_sat(value),
            script_pubkey: chain.address_to_script(address)?,
        });
    }
    for _ in 0..2 {
        outputs.push(TxOut {
            value: Amount::from_sat(config.dummy_utxo_value),
            script_pubkey: payment_script.clone(),
        });
    }

    let fixed_out: u64 = outputs.iter().map(|o| o.value.to_sat()).sum();
    let fixed_in = dummy1.value + dummy2.value + item.output_value;
    let amount = fixed_out.saturating_sub(fixed_in);
    let base_vouts = outputs.len() + 1; // leave room for change

    let reserved = [dummy1.outpoint(), dummy2.outpoint()];
    let spendable: Vec<Utxo> = utxos
        .iter()
        .filter(|u| !reserved.contains(&u.outpoint()))
        .cloned()
        .collect();
    let payments = select_payment_utxos(
        session,
        &spendable,
        amount,
        SELLER_INPUT_INDEX + 1,
        base_vouts,
        buyer.fee_rate_tier,
    )
    .await?;

    let mut tx = Transaction {
        version: TX_VERSION,
        lock_time: TX_LOCK_TIME,
        input: Vec::new(),
        output: Vec::new(),
    };
    let mut meta: Vec<psbt::Input> = Vec::new();
    for dummy in [&dummy1, &dummy2] {
        tx.input.push(txin(dummy.outpoint()));
        meta.push(
            payment_input_kind(session, &buyer, dummy)
                .await?
                .into_psbt_input(None),
        );
    }
    // The seller slot; filled by the merge step.
    tx.input.push(txin(item.output));
    meta.push(psbt::Input::default());
    for utxo in &payments {
        tx.input.push(txin(utxo.outpoint()));
        meta.push(
            payment_input_kind(session, &buyer, utxo)
                .await?
                .into_psbt_input(None),
        );
    }

    let rate = rate_for_tier(&session.fees, buyer.fee_rate_tier, chain.min_fee_rate).await?;
    let total_in = fixed_in + payments.iter().map(|u| u.value).sum::<u64>();
    let fee = estimate_tx_fee(tx.input.len(), base_vouts, rate);
    let required = fixed_out + fee;
    if total_in < required {
        return Err(Error::InsufficientFunds {
            required,
            available: total_in,
        });
    }
    let change = total_in - required;
    if change > chain.dust_limit {
        outputs.push(TxOut {
            value: Amount::from_sat(change),
            script_pubkey: payment_script,
        });
    }
    tx.output = outputs;

    debug!(
        item = %item.id,
        inputs = tx.input.len(),
        outputs = tx.output.len(),
        fee,
        change,
        "built purchase half-PSBT"
    );

    let mut psbt = Psbt::from_unsigned_tx(tx)
        .map_err(|e| Error::invalid(format!("purchase tx not signable: {e}")))?;
    psbt.inputs = meta;

    let buyer_state = listing
        .buyer
        .as_mut()
        .ok_or_else(|| Error::invalid("listing has no buyer terms"))?;
    buyer_state.dummy_utxos = Some(vec![dummy1, dummy2]);
    buyer_state.payment_utxos = Some(payments);
    buyer_state.unsigned_buying_psbt = Some(psbt.clone());
    Ok(psbt)
}

/// The input shape for a coin held at the buyer's payment address.
async fn payment_input_kind<N, I, U, F, M>(
    session: &Session<N, I, U, F, M>,
    buyer: &BuyerTerms,
    utxo: &Utxo,
) -> Result<InputKind>
where
    N: NodeProvider,
{
    let chain = &session.chain;
    let value = Amount::from_sat(utxo.value);
    match chain.classify_address(&buyer.payment_address) {
        AddressType::P2pkh => {
            let prev_tx = session.node.get_raw_transaction(&utxo.txid).await?;
            if prev_tx.output.len() <= utxo.vout as usize {
                return Err(Error::invalid(format!(
                    "payment outpoint {} not present in its parent",
                    utxo.outpoint()
                )));
            }
            Ok(InputKind::legacy(prev_tx))
        }
        AddressType::P2sh => {
            let pubkey = buyer.payment_pubkey.ok_or_else(|| {
                Error::invalid("P2SH payment address requires the buyer's public key")
            })?;
            let wpkh = pubkey
                .wpubkey_hash()
                .map_err(|_| Error::invalid("buyer public key must be compressed"))?;
            let redeem_script = ScriptBuf::new_p2wpkh(&wpkh);
            let script_pubkey = ScriptBuf::new_p2sh(&redeem_script.script_hash());
            if script_pubkey != chain.address_to_script(&buyer.payment_address)? {
                return Err(Error::invalid(
                    "buyer public key does not match the P2SH payment address",
                ));
            }
            Ok(InputKind::NestedSegwit {
                prev_txout: TxOut {
                    value,
                    script_pubkey,
                },
                redeem_script,
            })
        }
        AddressType::P2wpkh | AddressType::P2wsh => Ok(InputKind::NativeSegwit {
            prev_txout: TxOut {
                value,
                script_pubkey: chain.address_to_script(&buyer.payment_address)?,
            },
        }),
        AddressType::P2tr => {
            let pubkey = buyer.payment_pubkey.ok_or_else(|| {
                Error::invalid("taproot payment address requires the buyer's public key")
            })?;
            let (internal_key, _) = pubkey.inner.x_only_public_key();
            Ok(InputKind::Taproot {
                prev_txout: TxOut {
                    value,
                    script_pubkey: chain.address_to_script(&buyer.payment_address)?,
                },
                internal_key,
            })
        }
        AddressType::Unknown => Err(Error::invalid(format!(
            "payment address {} is not valid for chain {}",
            buyer.payment_address, chain.name
        ))),
    }
}
