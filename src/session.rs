use std::sync::{Arc, RwLock};

use crate::{
    chain::ChainParams,
    client::Client,
    config::Config,
    error::Result,
    traits::NoMarketFees,
};

/// Everything one swap construction needs: the chain profile, the protocol
/// constants and the provider handles.
///
/// Sessions are cheap to build and exclusively owned by the calling task;
/// the engine keeps no other shared state.
#[derive(Debug, Clone)]
pub struct Session<N, I, U, F, M = NoMarketFees> {
    /// Chain parameters all address and input decisions derive from.
    pub chain: ChainParams,
    /// Protocol constants.
    pub config: Config,
    /// Node RPC endpoint.
    pub node: N,
    /// Inscription indexer.
    pub items: I,
    /// Address-UTXO indexer.
    pub utxos: U,
    /// Fee oracle.
    pub fees: F,
    /// Marketplace fee schedule; [`NoMarketFees`] when the marketplace
    /// charges nothing.
    pub market: M,
}

impl<N, I, U, F> Session<N, I, U, F> {
    /// Creates a session without a marketplace fee schedule.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when the chain profile is internally
    /// inconsistent.
    pub fn new(
        chain: ChainParams,
        config: Config,
        node: N,
        items: I,
        utxos: U,
        fees: F,
    ) -> Result<Self> {
        chain.validate()?;
        Ok(Self {
            chain,
            config,
            node,
            items,
            utxos,
            fees,
            market: NoMarketFees,
        })
    }
}

impl<N, I, U, F, M> Session<N, I, U, F, M> {
    /// Replaces the marketplace fee schedule.
    pub fn with_market<M2>(self, market: M2) -> Session<N, I, U, F, M2> {
        Session {
            chain: self.chain,
            config: self.config,
            node: self.node,
            items: self.items,
            utxos: self.utxos,
            fees: self.fees,
            market,
        }
    }
}

static DEFAULT_NODE: RwLock<Option<Arc<Client>>> = RwLock::new(None);

/// Installs a process-wide default node handle.
///
/// Compatibility shim for callers that configure one node at startup;
/// new code should pass providers through a [`Session`] instead.
pub fn set_default_node(client: Client) {
    let mut slot = DEFAULT_NODE
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = Some(Arc::new(client));
}

/// The process-wide default node handle, if one was installed.
pub fn default_node() -> Option<Arc<Client>> {
    DEFAULT_NODE
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}
