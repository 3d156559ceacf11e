//! The exchange port: the only mutable outside world the core touches.
//!
//! Concrete REST adapters implement [`ExchangePort`] and register in
//! [`exchange_for`]; the core never speaks a venue's idioms directly. The
//! in-memory [`paper::PaperExchange`] ships with the crate for tests and
//! dry runs.

pub mod paper;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::errors::{Error, Result};
use crate::grid::Side;
use crate::pair::Pair;

/// Exchange-assigned order identifier, opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Best ask and best bid for one pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ticker {
    pub lowest_ask: Decimal,
    pub highest_bid: Decimal,
}

/// One coin's account balance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Balance {
    pub available: Decimal,
    pub on_orders: Decimal,
    pub total: Decimal,
}

/// One level of the sell book; books are ordered ascending by rate.
#[derive(Debug, Clone, Copy)]
pub struct BookEntry {
    pub rate: Decimal,
    pub quantity: Decimal,
}

/// Diagnostic order state for `--status-of`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatus {
    pub id: OrderId,
    pub pair: Pair,
    pub side: Side,
    pub rate: Decimal,
    pub amount: Decimal,
    pub remaining: Decimal,
    pub open: bool,
}

/// Common venue interface. Every method may fail with `Transport`; `buy` and
/// `sell` additionally fail with `NotEnoughCoin` (insufficient funds) or
/// `DustTrade` (below the venue minimum).
#[async_trait]
pub trait ExchangePort: Send + Sync {
    async fn ticker_for(&self, pair: &Pair) -> Result<Ticker>;

    async fn balances(&self) -> Result<BTreeMap<String, Balance>>;

    /// Balances with a non-zero total.
    async fn positive_balances(&self) -> Result<BTreeMap<String, Balance>> {
        let all = self.balances().await?;
        Ok(all
            .into_iter()
            .filter(|(_, balance)| balance.total > Decimal::ZERO)
            .collect())
    }

    /// Total holding of the pair's counter currency.
    async fn balance_of_counter(&self, pair: &Pair) -> Result<Decimal>;

    async fn sell_order_book(&self, pair: &Pair) -> Result<Vec<BookEntry>>;

    async fn buy(&self, pair: &Pair, rate: Decimal, amount: Decimal) -> Result<OrderId>;

    async fn sell(&self, pair: &Pair, rate: Decimal, amount: Decimal) -> Result<OrderId>;

    /// True while the order still has an unfilled remainder above the
    /// venue's fully-filled threshold.
    async fn is_open(&self, id: &OrderId) -> Result<bool>;

    async fn order_status(&self, id: &OrderId) -> Result<OrderStatus>;

    /// Best-effort cancel; unknown or already-closed ids are ignored.
    async fn cancel_orders(&self, ids: &[OrderId]) -> Result<()>;

    /// Cancel every open order on the account, including ones this program
    /// did not place.
    async fn cancel_all_open(&self) -> Result<()>;

    /// Venue-specific naming of the counter asset.
    fn base_of(&self, pair: &Pair) -> String {
        pair.counter().to_string()
    }
}

/// Venue factory. Real REST adapters register here keyed by exchange name;
/// `paper` resolves to the built-in in-memory venue.
pub fn exchange_for(name: &str, config: &AppConfig) -> Result<Arc<dyn ExchangePort>> {
    match name {
        "paper" => Ok(Arc::new(paper::PaperExchange::new(config.epsilon))),
        other => Err(Error::InvalidConfig(format!(
            "no adapter for exchange {other:?}"
        ))),
    }
}
