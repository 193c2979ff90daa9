pub mod buyer;
pub mod chain;
pub mod client;
pub mod combine;
pub mod config;
pub mod error;
pub mod esplora;
pub mod fees;
pub mod indexer;
pub mod psbt;
pub mod selection;
pub mod seller;
pub mod session;
pub mod traits;
pub mod types;

#[cfg(test)]
pub mod test_utils;

pub use client::*;
pub use config::Config;
pub use error::{ClientError, Error, Result};
pub use session::Session;
