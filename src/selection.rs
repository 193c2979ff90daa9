use bitcoin::OutPoint;
use tracing::*;

use crate::{
    error::{Error, Result},
    fees::{estimate_tx_fee, rate_for_tier},
    session::Session,
    traits::{FeeProvider, ItemProvider, NodeProvider},
    types::{FeeRateTier, Utxo},
};

/// Whether spending `utxo` as an ordinary coin could move an inscription.
///
/// Inscriptions travel with their satoshi under a deterministic tracking
/// rule, so any inscription-bearing ancestor can taint a descendant. The
/// indexer only reflects confirmed chain state; unconfirmed outputs are
/// judged by their parents instead. The check fails closed: on any
/// provider error the UTXO is treated as inscription-bearing.
pub async fn contains_inscription<N, I, U, F, M>(
    session: &Session<N, I, U, F, M>,
    utxo: &Utxo,
) -> bool
where
    N: NodeProvider,
    I: ItemProvider,
{
    if utxo.status.confirmed {
        return indexed_as_inscription(&session.items, &utxo.outpoint()).await;
    }

    let tx = match session.node.get_raw_transaction_verbose(&utxo.txid).await {
        Ok(tx) => tx,
        Err(e) => {
            warn!(txid = %utxo.txid, %e, "cannot inspect unconfirmed ancestry, treating as inscription");
            return true;
        }
    };
    for vin in &tx.vin {
        let (txid, vout) = match (vin.txid, vin.vout) {
            (Some(txid), Some(vout)) => (txid, vout),
            _ => continue,
        };
        match session.node.get_raw_transaction_verbose(&txid).await {
            Ok(parent) if parent.is_unconfirmed() => {
                // The ancestry cannot be cleared against confirmed state.
                debug!(%txid, "unconfirmed parent, treating as inscription");
                return true;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%txid, %e, "cannot fetch parent, treating as inscription");
                return true;
            }
        }
        if indexed_as_inscription(&session.items, &OutPoint::new(txid, vout)).await {
            return true;
        }
    }
    false
}

async fn indexed_as_inscription<I: ItemProvider>(items: &I, outpoint: &OutPoint) -> bool {
    match items.get_token_by_output(outpoint).await {
        Ok(Some(item)) => {
            debug!(%outpoint, id = %item.id, "outpoint carries an inscription");
            true
        }
        Ok(None) => false,
        Err(e) => {
            warn!(%outpoint, %e, "indexer error, treating outpoint as inscription-bearing");
            true
        }
    }
}

/// Picks the first two inscription-free outputs inside the dummy band,
/// scanning `utxos` in the given order.
///
/// Returns `None` when fewer than two qualify; the purchase cannot
/// proceed until the buyer creates fresh dummies.
pub async fn select_dummy_utxos<N, I, U, F, M>(
    session: &Session<N, I, U, F, M>,
    utxos: &[Utxo],
) -> Option<(Utxo, Utxo)>
where
    N: NodeProvider,
    I: ItemProvider,
{
    let config = &session.config;
    let mut first: Option<Utxo> = None;
    for utxo in utxos {
        if utxo.value < config.dummy_utxo_min_value || utxo.value > config.dummy_utxo_max_value {
            continue;
        }
        if contains_inscription(session, utxo).await {
            continue;
        }
        match first.take() {
            None => first = Some(utxo.clone()),
            Some(a) => {
                debug!(first = %a.outpoint(), second = %utxo.outpoint(), "selected dummies");
                return Some((a, utxo.clone()));
            }
        }
    }
    None
}

/// Accumulates payment coins, largest first, until they cover `amount`
/// plus the estimated fee of the growing transaction.
///
/// Outputs at or below the dummy denomination are held back so future
/// purchases can still find dummies, and inscription-bearing coins are
/// never spent as payment.
pub async fn select_payment_utxos<N, I, U, F, M>(
    session: &Session<N, I, U, F, M>,
    utxos: &[Utxo],
    amount: u64,
    base_vins: usize,
    base_vouts: usize,
    tier: FeeRateTier,
) -> Result<Vec<Utxo>>
where
    N: NodeProvider,
    I: ItemProvider,
    F: FeeProvider,
{
    let rate = rate_for_tier(&session.fees, tier, session.chain.min_fee_rate).await?;

    let mut candidates: Vec<&Utxo> = utxos
        .iter()
        .filter(|u| u.value > session.config.dummy_utxo_value)
        .collect();
    candidates.sort_by(|a, b| b.value.cmp(&a.value));

    let mut selected: Vec<Utxo> = Vec::new();
    let mut sum = 0u64;
    let mut tainted = 0usize;
    for utxo in candidates {
        if sum >= amount + estimate_tx_fee(base_vins + selected.len(), base_vouts, rate) {
            break;
        }
        if contains_inscription(session, utxo).await {
            tainted += 1;
            continue;
        }
        sum += utxo.value;
        selected.push(utxo.clone());
    }

    let required = amount + estimate_tx_fee(base_vins + selected.len(), base_vouts, rate);
    if sum < required {
        if tainted > 0 {
            warn!(
                tainted,
                "payment selection exhausted; {tainted} candidate(s) held inscriptions"
            );
        }
        return Err(Error::InsufficientFunds {
            required,
            available: sum,
        });
    }
    debug!(
        count = selected.len(),
        sum, required, "selected payment coins"
    );
    Ok(selected)
}
