use bech32::{segwit, Fe32, Hrp};
use bitcoin::{
    base58, hashes::Hash, PubkeyHash, Script, ScriptBuf, ScriptHash, WitnessProgram,
    WitnessVersion,
};

use crate::error::{Error, Result};

/// The script shape behind an address, derived once per address so that
/// downstream code branches on a closed enum instead of re-parsing strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressType {
    /// Pay-to-pubkey-hash.
    P2pkh,
    /// Pay-to-script-hash (includes script-hash-wrapped segwit).
    P2sh,
    /// Segwit v0 keyhash.
    P2wpkh,
    /// Segwit v0 scripthash.
    P2wsh,
    /// Segwit v1 (taproot).
    P2tr,
    /// Not an address of the given chain.
    Unknown,
}

/// Consensus and encoding parameters of one Bitcoin-family chain.
///
/// Pure data; every builder consults the profile to encode and decode
/// addresses and to choose input shapes.
///
/// # Note
///
/// An empty `bech32_hrp` disables segwit and taproot for the chain, and
/// the capability flags must agree ([`ChainParams::validate`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainParams {
    /// Human-readable chain name.
    pub name: &'static str,
    /// Ticker symbol.
    pub symbol: &'static str,
    /// Base58 version byte of pay-to-pubkey-hash addresses.
    pub pub_key_hash: u8,
    /// Base58 version byte of pay-to-script-hash addresses.
    pub script_hash: u8,
    /// Bech32 human-readable part; empty on legacy-only chains.
    pub bech32_hrp: &'static str,
    /// Whether segwit v0 outputs are standard on this chain.
    pub supports_segwit: bool,
    /// Whether segwit v1 (taproot) outputs are standard on this chain.
    pub supports_taproot: bool,
    /// Smallest standard output value in sats.
    pub dust_limit: u64,
    /// Relay floor in sat/vB.
    pub min_fee_rate: u64,
}

/// Bitcoin mainnet.
pub const BITCOIN: ChainParams = ChainParams {
    name: "bitcoin",
    symbol: "BTC",
    pub_key_hash: 0x00,
    script_hash: 0x05,
    bech32_hrp: "bc",
    supports_segwit: true,
    supports_taproot: true,
    dust_limit: 546,
    min_fee_rate: 1,
};

/// Bitcoin testnet (test3/signet address space).
pub const TESTNET: ChainParams = ChainParams {
    name: "testnet",
    symbol: "tBTC",
    pub_key_hash: 0x6f,
    script_hash: 0xc4,
    bech32_hrp: "tb",
    supports_segwit: true,
    supports_taproot: true,
    dust_limit: 546,
    min_fee_rate: 1,
};

/// Litecoin mainnet. Taproot is not standard there yet.
pub const LITECOIN: ChainParams = ChainParams {
    name: "litecoin",
    symbol: "LTC",
    pub_key_hash: 0x30,
    script_hash: 0x32,
    bech32_hrp: "ltc",
    supports_segwit: true,
    supports_taproot: false,
    dust_limit: 546,
    min_fee_rate: 1,
};

/// Dogecoin mainnet, legacy-only.
pub const DOGECOIN: ChainParams = ChainParams {
    name: "dogecoin",
    symbol: "DOGE",
    pub_key_hash: 0x1e,
    script_hash: 0x16,
    bech32_hrp: "",
    supports_segwit: false,
    supports_taproot: false,
    dust_limit: 1_000_000,
    min_fee_rate: 1_000,
};

/// Junkcoin mainnet, legacy-only.
pub const JUNKCOIN: ChainParams = ChainParams {
    name: "junkcoin",
    symbol: "JKC",
    pub_key_hash: 0x10,
    script_hash: 0x05,
    bech32_hrp: "",
    supports_segwit: false,
    supports_taproot: false,
    dust_limit: 546,
    min_fee_rate: 1,
};

/// All built-in chain profiles.
pub const CHAINS: &[ChainParams] = &[BITCOIN, TESTNET, LITECOIN, DOGECOIN, JUNKCOIN];

/// Looks up a built-in profile by ticker symbol.
pub fn by_symbol(symbol: &str) -> Option<&'static ChainParams> {
    CHAINS.iter().find(|c| c.symbol == symbol)
}

impl ChainParams {
    /// Checks the internal consistency of the profile: a chain without a
    /// bech32 HRP cannot claim segwit or taproot support, and taproot
    /// requires segwit.
    pub fn validate(&self) -> Result<()> {
        if self.bech32_hrp.is_empty() && (self.supports_segwit || self.supports_taproot) {
            return Err(Error::invalid(format!(
                "chain {} has no bech32 HRP but claims witness support",
                self.name
            )));
        }
        if self.supports_taproot && !self.supports_segwit {
            return Err(Error::invalid(format!(
                "chain {} claims taproot without segwit",
                self.name
            )));
        }
        Ok(())
    }

    /// Classifies `address` against this chain's encodings.
    ///
    /// Base58-check is attempted first; on failure (or a foreign version
    /// byte) the address is decoded as bech32 constrained to the chain's
    /// HRP. Anything else is [`AddressType::Unknown`].
    pub fn classify_address(&self, address: &str) -> AddressType {
        if let Ok(payload) = base58::decode_check(address) {
            if payload.len() == 21 {
                if payload[0] == self.pub_key_hash {
                    return AddressType::P2pkh;
                }
                if payload[0] == self.script_hash {
                    return AddressType::P2sh;
                }
            }
        }
        if !self.bech32_hrp.is_empty() {
            if let Ok((hrp, version, program)) = segwit::decode(address) {
                let expected = match Hrp::parse(self.bech32_hrp) {
                    Ok(expected) => expected,
                    Err(_) => return AddressType::Unknown,
                };
                if hrp != expected {
                    return AddressType::Unknown;
                }
                return match (version.to_u8(), program.len()) {
                    (0, 20) if self.supports_segwit => AddressType::P2wpkh,
                    (0, 32) if self.supports_segwit => AddressType::P2wsh,
                    (1, 32) if self.supports_taproot => AddressType::P2tr,
                    _ => AddressType::Unknown,
                };
            }
        }
        AddressType::Unknown
    }

    /// Whether `address` is spendable-to on this chain.
    pub fn is_valid_address(&self, address: &str) -> bool {
        self.classify_address(address) != AddressType::Unknown
    }

    /// Decodes `address` into its output script.
    pub fn address_to_script(&self, address: &str) -> Result<ScriptBuf> {
        match self.classify_address(address) {
            AddressType::P2pkh => {
                let payload = base58::decode_check(address)
                    .map_err(|e| Error::invalid(format!("bad base58 address {address}: {e}")))?;
                let hash = PubkeyHash::from_slice(&payload[1..])
                    .map_err(|e| Error::invalid(format!("bad pubkey hash in {address}: {e}")))?;
                Ok(ScriptBuf::new_p2pkh(&hash))
            }
            AddressType::P2sh => {
                let payload = base58::decode_check(address)
                    .map_err(|e| Error::invalid(format!("bad base58 address {address}: {e}")))?;
                let hash = ScriptHash::from_slice(&payload[1..])
                    .map_err(|e| Error::invalid(format!("bad script hash in {address}: {e}")))?;
                Ok(ScriptBuf::new_p2sh(&hash))
            }
            AddressType::P2wpkh | AddressType::P2wsh | AddressType::P2tr => {
                let (_, version, program) = segwit::decode(address)
                    .map_err(|e| Error::invalid(format!("bad bech32 address {address}: {e}")))?;
                let version = WitnessVersion::try_from(version.to_u8())
                    .map_err(|e| Error::invalid(format!("bad witness version: {e}")))?;
                let program = WitnessProgram::new(version, &program)
                    .map_err(|e| Error::invalid(format!("bad witness program: {e}")))?;
                Ok(ScriptBuf::new_witness_program(&program))
            }
            AddressType::Unknown => Err(Error::invalid(format!(
                "address {address} is not valid for chain {}",
                self.name
            ))),
        }
    }

    /// Encodes an output script as an address of this chain.
    pub fn script_to_address(&self, script: &Script) -> Result<String> {
        if script.is_p2pkh() {
            let mut payload = vec![self.pub_key_hash];
            payload.extend_from_slice(&script.as_bytes()[3..23]);
            return Ok(base58::encode_check(&payload));
        }
        if script.is_p2sh() {
            let mut payload = vec![self.script_hash];
            payload.extend_from_slice(&script.as_bytes()[2..22]);
            return Ok(base58::encode_check(&payload));
        }
        if let Some(version) = script.witness_version() {
            if self.bech32_hrp.is_empty() {
                return Err(Error::invalid(format!(
                    "chain {} cannot encode witness outputs",
                    self.name
                )));
            }
            let hrp = Hrp::parse(self.bech32_hrp)
                .map_err(|e| Error::invalid(format!("bad chain HRP {}: {e}", self.bech32_hrp)))?;
            let version = Fe32::try_from(version.to_num())
                .map_err(|e| Error::invalid(format!("bad witness version: {e}")))?;
            return segwit::encode(hrp, version, &script.as_bytes()[2..])
                .map_err(|e| Error::invalid(format!("unencodable witness program: {e}")));
        }
        Err(Error::invalid(format!(
            "script {:x} has no address form on chain {}",
            script, self.name
        )))
    }
}
