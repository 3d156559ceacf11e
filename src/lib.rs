#![deny(unreachable_pub)]
//! Grid trading agent for cryptocurrency spot exchanges.
//!
//! For each configured pair the agent keeps two symmetric ladders of
//! resting limit orders, a sell grid above the market midpoint and a buy
//! grid below it, re-synthesising them as they fill so the account harvests
//! price oscillation within a band. The program is episodic: a scheduler
//! re-invokes it, each run loads the persisted [`trader::Trader`], reacts
//! to fills through the [`exchange::ExchangePort`], and persists again.

pub mod config;
pub mod consts;
pub mod dispatch;
pub mod errors;
pub mod exchange;
pub mod grid;
pub mod logging;
pub mod money;
pub mod notify;
pub mod pair;
pub mod persist;
pub mod trader;

pub use consts::DUST_EPSILON;
pub use errors::{Error, Result};
pub use exchange::{ExchangePort, OrderId, Ticker};
pub use grid::{Grid, Side};
pub use pair::Pair;
pub use trader::{PairGrids, Trader};
