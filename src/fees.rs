use crate::{
    error::Result,
    traits::FeeProvider,
    types::FeeRateTier,
};

/// Cost of one input under the legacy size model.
///
/// Conservative for segwit chains, exact for legacy chains, so fees are
/// never underestimated across the multi-chain target set.
pub const BYTES_PER_INPUT: u64 = 180;

/// Cost of one output under the legacy size model.
pub const BYTES_PER_OUTPUT: u64 = 34;

/// Fixed transaction overhead under the legacy size model.
pub const TX_BASE_BYTES: u64 = 10;

/// Estimates the fee of a transaction with `vins` inputs and `vouts`
/// outputs at `sat_per_vb`.
pub fn estimate_tx_fee(vins: usize, vouts: usize, sat_per_vb: u64) -> u64 {
    let size = BYTES_PER_INPUT * vins as u64 + BYTES_PER_OUTPUT * vouts as u64 + TX_BASE_BYTES;
    size * sat_per_vb
}

/// Resolves `tier` against the oracle, clamped from below by the chain's
/// relay floor so a stale oracle cannot produce unrelayable transactions.
pub async fn rate_for_tier<F: FeeProvider>(
    fees: &F,
    tier: FeeRateTier,
    min_fee_rate: u64,
) -> Result<u64> {
    let rate = fees.get_fee(tier).await?;
    Ok(rate.max(min_fee_rate))
}
