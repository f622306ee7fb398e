//! Trading module - quoting, signing/submission and execution coordination

pub mod executor;
pub mod quote;
pub mod wallet;

pub use executor::{ExecutionCoordinator, SellOutcome};
pub use quote::{JupiterClient, SwapQuote, SwapProvider};
pub use wallet::{PaperSubmitter, RpcSubmitter, TxSubmitter};
