use std::env::var;

/// Protocol constants for one engine instance.
///
/// Defaults match the values the swap layout was designed around; every
/// field can be overridden per [`Session`](crate::session::Session) or from
/// the process environment via [`Config::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Value of freshly created dummy outputs, in sats.
    pub dummy_utxo_value: u64,

    /// Smallest output value accepted as a dummy, in sats.
    pub dummy_utxo_min_value: u64,

    /// Largest output value accepted as a dummy, in sats.
    pub dummy_utxo_max_value: u64,

    /// Value of the output carrying the inscription to the buyer, in sats.
    pub ordinals_postage_value: u64,

    /// Address receiving the combined maker+taker platform fee.
    ///
    /// When `None` the platform-fee output is suppressed entirely.
    pub platform_fee_address: Option<String>,

    /// Sentinel price marking a listing as withdrawn out-of-band.
    pub delist_magic_price: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dummy_utxo_value: 600,
            dummy_utxo_min_value: 580,
            dummy_utxo_max_value: 1_000,
            ordinals_postage_value: 10_000,
            platform_fee_address: None,
            delist_magic_price: 20_000_000 * 100_000_000,
        }
    }
}

impl Config {
    /// Builds a [`Config`] from the process environment.
    ///
    /// Recognized keys: `ORDSWAP_DUMMY_UTXO_VALUE`,
    /// `ORDSWAP_DUMMY_UTXO_MIN_VALUE`, `ORDSWAP_DUMMY_UTXO_MAX_VALUE`,
    /// `ORDSWAP_ORDINALS_POSTAGE_VALUE`, `ORDSWAP_PLATFORM_FEE_ADDRESS`
    /// and `ORDSWAP_DELIST_MAGIC_PRICE`. Unset or unparseable keys fall
    /// back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_u64("ORDSWAP_DUMMY_UTXO_VALUE") {
            config.dummy_utxo_value = v;
        }
        if let Some(v) = env_u64("ORDSWAP_DUMMY_UTXO_MIN_VALUE") {
            config.dummy_utxo_min_value = v;
        }
        if let Some(v) = env_u64("ORDSWAP_DUMMY_UTXO_MAX_VALUE") {
            config.dummy_utxo_max_value = v;
        }
        if let Some(v) = env_u64("ORDSWAP_ORDINALS_POSTAGE_VALUE") {
            config.ordinals_postage_value = v;
        }
        if let Ok(addr) = var("ORDSWAP_PLATFORM_FEE_ADDRESS") {
            if !addr.is_empty() {
                config.platform_fee_address = Some(addr);
            }
        }
        if let Some(v) = env_u64("ORDSWAP_DELIST_MAGIC_PRICE") {
            config.delist_magic_price = v;
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    var(key).ok().and_then(|v| v.parse().ok())
}
