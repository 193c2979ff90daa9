//! In-memory providers and fixtures backing the engine's tests.
//!
//! Deterministic by construction: fixed secrets, fixed txids, no network.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Once;

use bitcoin::{
    consensus::encode::serialize_hex,
    hashes::Hash,
    secp256k1::{Keypair, SecretKey, SECP256K1},
    Amount, OutPoint, Psbt, ScriptBuf, Transaction, TxOut, Txid, XOnlyPublicKey,
};

use crate::{
    chain,
    config::Config,
    error::{ClientError, ClientResult},
    psbt::{txin, TX_LOCK_TIME, TX_VERSION},
    session::Session,
    traits::{
        FeeProvider, ItemProvider, MarketFeeProvider, NodeProvider, UtxoProvider,
    },
    types::{
        AnalyzePsbtInput, AnalyzePsbtResult, BuyerTerms, FeeRateTier, FinalizePsbtResult,
        InscriptionItem, Listing, RawTransactionVerbose, RecommendedFees, SatPoint, SellerTerms,
        TestMempoolAccept, Utxo, UtxoStatus, VerboseVin, VerboseVout,
    },
};

/// Only attempts to start tracing once.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    static INIT: Once = Once::new();

    INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(EnvFilter::from_default_env())
            .try_init()
            .ok();
    });
}

/// A deterministic txid from one repeated byte.
pub fn test_txid(byte: u8) -> Txid {
    Txid::from_byte_array([byte; 32])
}

/// A taproot key fixture: keypair, internal key and key-path output script.
pub struct TaprootFixture {
    pub keypair: Keypair,
    pub internal_key: XOnlyPublicKey,
    pub script: ScriptBuf,
}

/// The seller-side taproot fixture.
pub fn p2tr_fixture() -> TaprootFixture {
    taproot_fixture_n(0x11)
}

/// A taproot fixture derived from `seed`. Seeds must be nonzero and at
/// most 0xfe to stay inside the curve order.
pub fn taproot_fixture_n(seed: u8) -> TaprootFixture {
    let secret = SecretKey::from_slice(&[seed; 32]).expect("seed within curve order");
    let keypair = Keypair::from_secret_key(SECP256K1, &secret);
    let (internal_key, _) = keypair.x_only_public_key();
    let script = ScriptBuf::new_p2tr(SECP256K1, internal_key, None);
    TaprootFixture {
        keypair,
        internal_key,
        script,
    }
}

/// A single-key fixture with its output script.
pub struct KeyFixture {
    pub pubkey: bitcoin::PublicKey,
    pub script: ScriptBuf,
}

/// The default P2WPKH fixture.
pub fn p2wpkh_fixture() -> KeyFixture {
    p2wpkh_fixture_n(0x22)
}

/// A P2WPKH fixture derived from `seed`.
pub fn p2wpkh_fixture_n(seed: u8) -> KeyFixture {
    let secret = SecretKey::from_slice(&[seed; 32]).expect("seed within curve order");
    let pubkey = bitcoin::PublicKey::new(secret.public_key(SECP256K1));
    let script = ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash().expect("compressed key"));
    KeyFixture { pubkey, script }
}

/// A P2PKH fixture derived from `seed`.
pub fn p2pkh_fixture_n(seed: u8) -> KeyFixture {
    let secret = SecretKey::from_slice(&[seed; 32]).expect("seed within curve order");
    let pubkey = bitcoin::PublicKey::new(secret.public_key(SECP256K1));
    let script = ScriptBuf::new_p2pkh(&pubkey.pubkey_hash());
    KeyFixture { pubkey, script }
}

/// A script-hash wrapped segwit fixture: pubkey, redeem script and the
/// wrapping P2SH output script.
pub struct NestedFixture {
    pub pubkey: bitcoin::PublicKey,
    pub redeem: ScriptBuf,
    pub script: ScriptBuf,
}

/// A P2SH-P2WPKH fixture derived from `seed`.
pub fn p2sh_wpkh_fixture_n(seed: u8) -> NestedFixture {
    let secret = SecretKey::from_slice(&[seed; 32]).expect("seed within curve order");
    let pubkey = bitcoin::PublicKey::new(secret.public_key(SECP256K1));
    let redeem = ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash().expect("compressed key"));
    let script = ScriptBuf::new_p2sh(&redeem.script_hash());
    NestedFixture {
        pubkey,
        redeem,
        script,
    }
}

/// A one-output funding transaction paying `value` to `script`.
pub fn fund_tx(script: ScriptBuf, value: u64) -> Transaction {
    fund_tx_from(0xfe, script, value)
}

/// A funding transaction with a seeded input so equal payments get
/// distinct txids.
pub fn fund_tx_from(seed: u8, script: ScriptBuf, value: u64) -> Transaction {
    Transaction {
        version: TX_VERSION,
        lock_time: TX_LOCK_TIME,
        input: vec![txin(OutPoint::new(test_txid(seed), 0))],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script,
        }],
    }
}

/// A one-input one-output transaction spending `parent:vout`.
pub fn spend_tx(parent: Txid, vout: u32, script: ScriptBuf, value: u64) -> Transaction {
    Transaction {
        version: TX_VERSION,
        lock_time: TX_LOCK_TIME,
        input: vec![txin(OutPoint::new(parent, vout))],
        output: vec![TxOut {
            value: Amount::from_sat(value),
            script_pubkey: script,
        }],
    }
}

/// A confirmed UTXO record.
pub fn confirmed_utxo(txid: Txid, vout: u32, value: u64) -> Utxo {
    Utxo {
        txid,
        vout,
        value,
        status: UtxoStatus {
            confirmed: true,
            block_height: Some(100),
            block_hash: None,
            block_time: Some(1_700_000_000),
        },
    }
}

/// A mempool UTXO record.
pub fn unconfirmed_utxo(txid: Txid, vout: u32, value: u64) -> Utxo {
    Utxo {
        txid,
        vout,
        value,
        status: UtxoStatus::default(),
    }
}

/// In-memory node: a map of transactions with confirmation counts, plus
/// switchable mempool acceptance.
#[derive(Clone, Debug)]
pub struct MockNode {
    pub txs: HashMap<Txid, (Transaction, u32)>,
    pub accept: bool,
    pub reject_reason: Option<String>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self {
            txs: HashMap::new(),
            accept: true,
            reject_reason: None,
        }
    }
}

impl MockNode {
    /// Stores `tx` with the given confirmation count.
    pub fn insert_tx(&mut self, tx: Transaction, confirmations: u32) {
        self.txs.insert(tx.compute_txid(), (tx, confirmations));
    }

    /// A stored transaction, by txid. Panics when absent.
    pub fn tx(&self, txid: &Txid) -> Transaction {
        self.txs.get(txid).expect("transaction in mock node").0.clone()
    }

    fn lookup(&self, txid: &Txid) -> ClientResult<&(Transaction, u32)> {
        self.txs.get(txid).ok_or(ClientError::Server(
            -5,
            "No such mempool or blockchain transaction".to_string(),
        ))
    }
}

impl NodeProvider for MockNode {
    async fn get_raw_transaction(&self, txid: &Txid) -> ClientResult<Transaction> {
        Ok(self.lookup(txid)?.0.clone())
    }

    async fn get_raw_transaction_verbose(
        &self,
        txid: &Txid,
    ) -> ClientResult<RawTransactionVerbose> {
        let (tx, confirmations) = self.lookup(txid)?;
        Ok(RawTransactionVerbose {
            txid: *txid,
            transaction: tx.clone(),
            blockhash: None,
            blocktime: None,
            confirmations: (*confirmations > 0).then_some(*confirmations),
            vin: tx
                .input
                .iter()
                .map(|input| VerboseVin {
                    txid: (input.previous_output != OutPoint::null())
                        .then_some(input.previous_output.txid),
                    vout: (input.previous_output != OutPoint::null())
                        .then_some(input.previous_output.vout),
                    script_sig: None,
                    sequence: input.sequence.0,
                    witness: None,
                })
                .collect(),
            vout: tx
                .output
                .iter()
                .enumerate()
                .map(|(n, output)| VerboseVout {
                    value: output.value.to_btc(),
                    n: n as u32,
                })
                .collect(),
        })
    }

    async fn analyze_psbt(&self, psbt_b64: &str) -> ClientResult<AnalyzePsbtResult> {
        let psbt = Psbt::from_str(psbt_b64).map_err(|e| ClientError::Parse(e.to_string()))?;
        let inputs = psbt
            .inputs
            .iter()
            .map(|input| AnalyzePsbtInput {
                has_utxo: input.witness_utxo.is_some() || input.non_witness_utxo.is_some(),
                is_final: input.final_script_witness.is_some()
                    || input.final_script_sig.is_some(),
                next: None,
            })
            .collect();
        Ok(AnalyzePsbtResult {
            inputs,
            next: None,
        })
    }

    async fn finalize_psbt(&self, psbt_b64: &str) -> ClientResult<FinalizePsbtResult> {
        let psbt = Psbt::from_str(psbt_b64).map_err(|e| ClientError::Parse(e.to_string()))?;
        let complete = psbt
            .inputs
            .iter()
            .all(|i| i.final_script_witness.is_some() || i.final_script_sig.is_some());
        if !complete {
            return Ok(FinalizePsbtResult {
                psbt: Some(psbt.to_string()),
                hex: None,
                complete: false,
            });
        }
        let mut tx = psbt.unsigned_tx.clone();
        for (txin, meta) in tx.input.iter_mut().zip(&psbt.inputs) {
            txin.script_sig = meta.final_script_sig.clone().unwrap_or_default();
            txin.witness = meta.final_script_witness.clone().unwrap_or_default();
        }
        Ok(FinalizePsbtResult {
            psbt: None,
            hex: Some(serialize_hex(&tx)),
            complete: true,
        })
    }

    async fn test_mempool_accept(&self, tx: &Transaction) -> ClientResult<Vec<TestMempoolAccept>> {
        Ok(vec![TestMempoolAccept {
            txid: tx.compute_txid(),
            wtxid: None,
            allowed: self.accept,
            vsize: self.accept.then(|| tx.vsize() as u64),
            fees: None,
            reject_reason: if self.accept {
                None
            } else {
                self.reject_reason
                    .clone()
                    .or_else(|| Some("test-reject".to_string()))
            },
        }])
    }

    async fn send_raw_transaction(&self, tx: &Transaction) -> ClientResult<Txid> {
        Ok(tx.compute_txid())
    }

    async fn get_raw_mempool(&self) -> ClientResult<Vec<Txid>> {
        Ok(self
            .txs
            .iter()
            .filter(|(_, (_, confirmations))| *confirmations == 0)
            .map(|(txid, _)| *txid)
            .collect())
    }
}

/// In-memory inscription index; `fail` turns every call into a transport
/// error to exercise the fail-closed policy.
#[derive(Clone, Debug, Default)]
pub struct MockItems {
    pub by_output: HashMap<OutPoint, InscriptionItem>,
    pub fail: bool,
}

impl MockItems {
    /// Indexes a bare inscription at `txid:vout`.
    pub fn insert_inscription(&mut self, txid: Txid, vout: u32, id: &str, output_value: u64) {
        let outpoint = OutPoint::new(txid, vout);
        self.insert_item(InscriptionItem {
            id: id.to_string(),
            owner: String::new(),
            location: SatPoint {
                outpoint,
                offset: 0,
            },
            output: outpoint,
            output_value,
        });
    }

    /// Indexes a fully described item.
    pub fn insert_item(&mut self, item: InscriptionItem) {
        self.by_output.insert(item.output, item);
    }
}

impl ItemProvider for MockItems {
    async fn get_token_by_output(
        &self,
        outpoint: &OutPoint,
    ) -> ClientResult<Option<InscriptionItem>> {
        if self.fail {
            return Err(ClientError::Timeout);
        }
        Ok(self.by_output.get(outpoint).cloned())
    }

    async fn get_token_by_id(&self, id: &str) -> ClientResult<Option<InscriptionItem>> {
        if self.fail {
            return Err(ClientError::Timeout);
        }
        Ok(self.by_output.values().find(|item| item.id == id).cloned())
    }
}

/// In-memory address-UTXO index.
#[derive(Clone, Debug, Default)]
pub struct MockUtxos(pub HashMap<String, Vec<Utxo>>);

impl UtxoProvider for MockUtxos {
    async fn get_address_utxos(&self, address: &str) -> ClientResult<Vec<Utxo>> {
        Ok(self.0.get(address).cloned().unwrap_or_default())
    }
}

/// Fixed fee oracle.
#[derive(Clone, Copy, Debug)]
pub struct MockFees(pub RecommendedFees);

impl Default for MockFees {
    fn default() -> Self {
        Self(RecommendedFees {
            fastest_fee: 40,
            half_hour_fee: 20,
            hour_fee: 10,
            minimum_fee: 1,
        })
    }
}

impl FeeProvider for MockFees {
    async fn get_fee(&self, tier: FeeRateTier) -> ClientResult<u64> {
        Ok(self.0.tier(tier))
    }

    async fn get_fees_recommended(&self) -> ClientResult<RecommendedFees> {
        Ok(self.0)
    }
}

/// Fixed marketplace fee schedule.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockMarket {
    pub maker_bp: u16,
    pub taker_bp: u16,
}

impl MarketFeeProvider for MockMarket {
    async fn get_maker_fee_bp(&self, _address: &str) -> ClientResult<u16> {
        Ok(self.maker_bp)
    }

    async fn get_taker_fee_bp(&self, _address: &str) -> ClientResult<u16> {
        Ok(self.taker_bp)
    }
}

/// The all-mock session used across the test-suite.
pub type MockSession = Session<MockNode, MockItems, MockUtxos, MockFees>;

/// A mock session with a marketplace fee schedule attached.
pub type MockMarketSession = Session<MockNode, MockItems, MockUtxos, MockFees, MockMarket>;

/// A bitcoin-mainnet session over the given node and index mocks.
pub fn session_with(node: MockNode, items: MockItems) -> MockSession {
    Session::new(
        chain::BITCOIN,
        Config::default(),
        node,
        items,
        MockUtxos::default(),
        MockFees::default(),
    )
    .expect("bitcoin profile is consistent")
}

/// A junkcoin session over the given node and index mocks.
pub fn junkcoin_session(node: MockNode, items: MockItems) -> MockSession {
    Session::new(
        chain::JUNKCOIN,
        Config::default(),
        node,
        items,
        MockUtxos::default(),
        MockFees::default(),
    )
    .expect("junkcoin profile is consistent")
}

/// A taproot listing on bitcoin: price 100 000, maker fee 100 bp, postage
/// 10 000, inscription offset 0.
pub fn taproot_listing() -> (MockSession, Listing) {
    let seller_keys = p2tr_fixture();
    let ord_address = chain::BITCOIN
        .script_to_address(&seller_keys.script)
        .expect("taproot address");
    let ord_parent = fund_tx_from(0xa0, seller_keys.script.clone(), 10_000);
    let outpoint = OutPoint::new(ord_parent.compute_txid(), 0);
    let item = InscriptionItem {
        id: "intrepid-ordinal-1".to_string(),
        owner: ord_address.clone(),
        location: SatPoint {
            outpoint,
            offset: 0,
        },
        output: outpoint,
        output_value: 10_000,
    };

    let mut items = MockItems::default();
    items.insert_item(item.clone());
    let mut session = session_with(MockNode::default(), items);
    session.config.platform_fee_address = Some(
        chain::BITCOIN
            .script_to_address(&p2wpkh_fixture_n(0x55).script)
            .expect("fee address"),
    );

    let receive_address = chain::BITCOIN
        .script_to_address(&p2wpkh_fixture_n(0x44).script)
        .expect("receive address");
    let listing = Listing::new(SellerTerms {
        maker_fee_bp: 100,
        ord_address,
        price: 100_000,
        ord_item: item,
        receive_address,
        tap_internal_key: Some(seller_keys.internal_key),
        unsigned_listing_psbt: None,
        signed_listing_psbt: None,
    });
    (session, listing)
}

/// The taproot listing extended with a P2WPKH buyer holding two 600-sat
/// dummies and one 200 000-sat payment coin.
pub fn taproot_purchase() -> (MockSession, Listing) {
    let (mut session, mut listing) = taproot_listing();
    let pay = p2wpkh_fixture_n(0x66);
    let payment_address = chain::BITCOIN
        .script_to_address(&pay.script)
        .expect("payment address");
    let token_receive_address = chain::BITCOIN
        .script_to_address(&taproot_fixture_n(0x77).script)
        .expect("token receive address");

    session.utxos.0.insert(
        payment_address.clone(),
        vec![
            confirmed_utxo(test_txid(0xe1), 0, 600),
            confirmed_utxo(test_txid(0xe2), 0, 600),
            confirmed_utxo(test_txid(0xe3), 0, 200_000),
        ],
    );

    listing.buyer = Some(BuyerTerms::new(payment_address, token_receive_address, 200));
    (session, listing)
}

/// A legacy listing on junkcoin: price 100 000 000, maker fee 100 bp,
/// postage 10 000, inscription offset 3 000.
pub fn legacy_listing() -> (MockSession, Listing) {
    let seller = p2pkh_fixture_n(0x88);
    let ord_address = chain::JUNKCOIN
        .script_to_address(&seller.script)
        .expect("ord address");
    let ord_parent = fund_tx_from(0xa1, seller.script.clone(), 10_000);
    let outpoint = OutPoint::new(ord_parent.compute_txid(), 0);
    let item = InscriptionItem {
        id: "junk-ordinal-1".to_string(),
        owner: ord_address.clone(),
        location: SatPoint {
            outpoint,
            offset: 3_000,
        },
        output: outpoint,
        output_value: 10_000,
    };

    let mut node = MockNode::default();
    node.insert_tx(ord_parent, 3);
    let mut items = MockItems::default();
    items.insert_item(item.clone());
    let mut session = junkcoin_session(node, items);
    session.config.platform_fee_address = Some(
        chain::JUNKCOIN
            .script_to_address(&p2pkh_fixture_n(0x99).script)
            .expect("fee address"),
    );

    let receive_address = chain::JUNKCOIN
        .script_to_address(&p2pkh_fixture_n(0xaa).script)
        .expect("receive address");
    let listing = Listing::new(SellerTerms {
        maker_fee_bp: 100,
        ord_address,
        price: 100_000_000,
        ord_item: item,
        receive_address,
        tap_internal_key: None,
        unsigned_listing_psbt: None,
        signed_listing_psbt: None,
    });
    (session, listing)
}

/// The legacy listing extended with a P2PKH buyer holding two 600-sat
/// dummies and two 0.6-coin payment outputs, all with funding
/// transactions in the mock node.
pub fn legacy_purchase() -> (MockSession, Listing) {
    let (mut session, mut listing) = legacy_listing();
    let buyer = p2pkh_fixture_n(0xbb);
    let payment_address = chain::JUNKCOIN
        .script_to_address(&buyer.script)
        .expect("payment address");
    let token_receive_address = chain::JUNKCOIN
        .script_to_address(&p2pkh_fixture_n(0xcc).script)
        .expect("token receive address");

    let mut utxos = Vec::new();
    for (seed, value) in [
        (0xe4u8, 600u64),
        (0xe5, 600),
        (0xe6, 60_000_000),
        (0xe7, 60_000_000),
    ] {
        let tx = fund_tx_from(seed, buyer.script.clone(), value);
        utxos.push(confirmed_utxo(tx.compute_txid(), 0, value));
        session.node.insert_tx(tx, 2);
    }
    session.utxos.0.insert(payment_address.clone(), utxos);

    listing.buyer = Some(BuyerTerms::new(payment_address, token_receive_address, 0));
    (session, listing)
}
