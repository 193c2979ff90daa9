use bitcoin::{
    absolute::LockTime, consensus::encode::serialize, psbt, transaction::Version,
    EcdsaSighashType, OutPoint, ScriptBuf, Sequence, TapSighashType, Transaction, TxIn, TxOut,
    Witness, XOnlyPublicKey,
};
use hex::DisplayHex;
use tracing::*;

/// Transaction version used by both transaction halves.
///
/// The `ANYONECANPAY` sighash commits to the version, so the listing and
/// purchase builders must agree on it.
pub const TX_VERSION: Version = Version::TWO;

/// Locktime used by both transaction halves; committed by the sighash like
/// the version.
pub const TX_LOCK_TIME: LockTime = LockTime::ZERO;

/// Sequence of every constructed input. The seller's sequence is committed
/// by their signature and travels with the input through the merge.
pub const DEFAULT_SEQUENCE: Sequence = Sequence::MAX;

/// A skeleton input spending `outpoint`, with signing metadata left to the
/// PSBT layer.
pub fn txin(outpoint: OutPoint) -> TxIn {
    TxIn {
        previous_output: outpoint,
        script_sig: ScriptBuf::new(),
        sequence: DEFAULT_SEQUENCE,
        witness: Witness::new(),
    }
}

/// The script shape of a PSBT input, carrying only the signing metadata
/// valid for that shape.
///
/// The PSBT serializer emits the matching fields: a legacy input gets the
/// full (witness-stripped) parent transaction, witness inputs get the spent
/// [`TxOut`], a wrapped-segwit input additionally gets its redeem script
/// and a taproot input its x-only internal key.
#[derive(Clone, Debug, PartialEq)]
pub enum InputKind {
    /// Pre-segwit input; signers hash the whole parent transaction.
    Legacy {
        /// The parent transaction, witness-stripped.
        prev_tx: Transaction,
    },
    /// Segwit v0 spend wrapped in pay-to-script-hash.
    NestedSegwit {
        /// The output being spent.
        prev_txout: TxOut,
        /// The wrapped witness program.
        redeem_script: ScriptBuf,
    },
    /// Native segwit v0 spend.
    NativeSegwit {
        /// The output being spent.
        prev_txout: TxOut,
    },
    /// Taproot key-path spend.
    Taproot {
        /// The output being spent.
        prev_txout: TxOut,
        /// The untweaked internal key.
        internal_key: XOnlyPublicKey,
    },
}

impl InputKind {
    /// Builds a legacy input from the fetched parent transaction,
    /// normalizing it to its non-witness serialization first. Some nodes
    /// return segwit-serialized transactions; legacy signing hashes the
    /// stripped form.
    pub fn legacy(mut prev_tx: Transaction) -> Self {
        strip_witnesses(&mut prev_tx);
        trace!(
            txid = %prev_tx.compute_txid(),
            raw = %serialize(&prev_tx).to_lower_hex_string(),
            "normalized non-witness parent"
        );
        Self::Legacy { prev_tx }
    }

    /// The `SINGLE | ANYONECANPAY` sighash flag in the encoding this input
    /// shape signs with.
    pub fn sighash_single_anyone_can_pay(&self) -> psbt::PsbtSighashType {
        match self {
            Self::Taproot { .. } => TapSighashType::SinglePlusAnyoneCanPay.into(),
            _ => EcdsaSighashType::SinglePlusAnyoneCanPay.into(),
        }
    }

    /// Converts the input shape into a PSBT input carrying `sighash_type`.
    pub fn into_psbt_input(self, sighash_type: Option<psbt::PsbtSighashType>) -> psbt::Input {
        let mut input = psbt::Input {
            sighash_type,
            ..Default::default()
        };
        match self {
            Self::Legacy { prev_tx } => {
                input.non_witness_utxo = Some(prev_tx);
            }
            Self::NestedSegwit {
                prev_txout,
                redeem_script,
            } => {
                input.witness_utxo = Some(prev_txout);
                input.redeem_script = Some(redeem_script);
            }
            Self::NativeSegwit { prev_txout } => {
                input.witness_utxo = Some(prev_txout);
            }
            Self::Taproot {
                prev_txout,
                internal_key,
            } => {
                input.witness_utxo = Some(prev_txout);
                input.tap_internal_key = Some(internal_key);
            }
        }
        input
    }
}

/// Clears the witness of every input of `tx`, yielding the legacy
/// serialization when re-encoded.
pub fn strip_witnesses(tx: &mut Transaction) {
    for input in &mut tx.input {
        input.witness = Witness::new();
    }
}

/// Whether a finalized taproot witness is the unsigned placeholder some
/// signers emit: a single 65-byte Schnorr slot left zeroed, or no element
/// at all.
pub fn is_empty_schnorr_witness(witness: &Witness) -> bool {
    match witness.len() {
        0 => true,
        1 => witness
            .iter()
            .next()
            .is_some_and(|sig| sig.iter().all(|b| *b == 0)),
        _ => false,
    }
}

/// The script locking the output spent by a PSBT input, read from whichever
/// UTXO view the input carries.
pub fn prev_output_script<'a>(input: &'a psbt::Input, outpoint: &OutPoint) -> Option<&'a ScriptBuf> {
    if let Some(txout) = &input.witness_utxo {
        return Some(&txout.script_pubkey);
    }
    input
        .non_witness_utxo
        .as_ref()
        .and_then(|tx| tx.output.get(outpoint.vout as usize))
        .map(|txout| &txout.script_pubkey)
}
