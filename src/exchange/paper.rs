//! In-memory venue for tests and dry runs.
//!
//! Balances are debited on placement and settled on simulated fills, so
//! `NotEnoughCoin` and `DustTrade` behave like they do on a real venue.
//! Tests drive the market by seeding tickers and closing orders.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::debug;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::consts::DUST_EPSILON;
use crate::errors::{Error, Result};
use crate::grid::Side;
use crate::money;
use crate::pair::Pair;

use super::{Balance, BookEntry, ExchangePort, OrderId, OrderStatus, Ticker};

/// One resting order on the paper book.
#[derive(Debug, Clone)]
pub struct PaperOrder {
    pub id: OrderId,
    pub pair: Pair,
    pub side: Side,
    pub rate: Decimal,
    pub amount: Decimal,
    pub remaining: Decimal,
    pub cancelled: bool,
}

#[derive(Default)]
struct Inner {
    tickers: BTreeMap<Pair, Ticker>,
    balances: BTreeMap<String, Balance>,
    books: BTreeMap<Pair, Vec<BookEntry>>,
    /// Placement order preserved; the ladders' scan order depends on it.
    orders: Vec<PaperOrder>,
    cancelled: Vec<OrderId>,
    min_notional: Decimal,
    fail_next_place: Option<Error>,
}

/// The built-in venue behind `--exchange paper`.
pub struct PaperExchange {
    inner: Mutex<Inner>,
    epsilon: Decimal,
}

impl PaperExchange {
    pub fn new(epsilon: Decimal) -> Self {
        Self {
            inner: Mutex::new(Inner {
                min_notional: Decimal::new(1, 4),
                ..Inner::default()
            }),
            epsilon,
        }
    }

    pub async fn set_ticker(&self, pair: &Pair, lowest_ask: Decimal, highest_bid: Decimal) {
        self.inner.lock().await.tickers.insert(
            pair.clone(),
            Ticker {
                lowest_ask,
                highest_bid,
            },
        );
    }

    /// Add to a coin's available (and total) balance.
    pub async fn credit(&self, coin: &str, amount: Decimal) {
        let mut inner = self.inner.lock().await;
        let balance = inner.balances.entry(coin.to_string()).or_default();
        balance.available += amount;
        balance.total += amount;
    }

    pub async fn set_sell_book(&self, pair: &Pair, entries: Vec<BookEntry>) {
        self.inner.lock().await.books.insert(pair.clone(), entries);
    }

    pub async fn set_min_notional(&self, notional: Decimal) {
        self.inner.lock().await.min_notional = notional;
    }

    /// Make the next `buy`/`sell` fail with `err`.
    pub async fn fail_next_place(&self, err: Error) {
        self.inner.lock().await.fail_next_place = Some(err);
    }

    /// Simulate a complete fill: the remainder goes to zero and the
    /// proceeds settle into the account balances.
    pub async fn close_order(&self, id: &OrderId) {
        let mut inner = self.inner.lock().await;
        let Some(index) = inner.orders.iter().position(|o| &o.id == id) else {
            return;
        };
        let order = inner.orders[index].clone();
        if order.cancelled || order.remaining.is_zero() {
            return;
        }
        let (spend_coin, cost) = spending(&order.pair, order.side, order.rate, order.amount);
        let (gain_coin, proceeds) = proceeds(&order.pair, order.side, order.rate, order.amount);
        {
            let spent = inner.balances.entry(spend_coin).or_default();
            spent.on_orders -= cost;
            spent.total -= cost;
        }
        {
            let gained = inner.balances.entry(gain_coin).or_default();
            gained.available += proceeds;
            gained.total += proceeds;
        }
        inner.orders[index].remaining = Decimal::ZERO;
    }

    /// Every order ever placed, in placement order.
    pub async fn orders(&self) -> Vec<PaperOrder> {
        self.inner.lock().await.orders.clone()
    }

    /// Ids passed to `cancel_orders`/`cancel_all_open`, in call order.
    pub async fn cancelled_ids(&self) -> Vec<OrderId> {
        self.inner.lock().await.cancelled.clone()
    }

    async fn place(
        &self,
        pair: &Pair,
        side: Side,
        rate: Decimal,
        amount: Decimal,
    ) -> Result<OrderId> {
        let mut inner = self.inner.lock().await;
        if let Some(err) = inner.fail_next_place.take() {
            return Err(err);
        }

        if rate * amount <= inner.min_notional {
            return Err(Error::DustTrade(format!(
                "{pair} {} {amount} @ {rate} below venue minimum",
                side.as_str()
            )));
        }

        let (coin, cost) = spending(pair, side, rate, amount);
        let balance = inner.balances.entry(coin.clone()).or_default();
        if balance.available < cost {
            return Err(Error::NotEnoughCoin(format!(
                "{coin}: need {cost}, have {}",
                balance.available
            )));
        }
        balance.available -= cost;
        balance.on_orders += cost;

        let id = OrderId(Uuid::new_v4().to_string());
        debug!("paper {} {pair} {amount} @ {rate} -> {id}", side.as_str());
        inner.orders.push(PaperOrder {
            id: id.clone(),
            pair: pair.clone(),
            side,
            rate,
            amount,
            remaining: amount,
            cancelled: false,
        });
        Ok(id)
    }

    fn cancel_locked(inner: &mut Inner, id: &OrderId) {
        inner.cancelled.push(id.clone());
        let Some(index) = inner.orders.iter().position(|o| &o.id == id) else {
            return;
        };
        let order = inner.orders[index].clone();
        if order.cancelled || order.remaining.is_zero() {
            return;
        }
        let (coin, cost) = spending(&order.pair, order.side, order.rate, order.amount);
        let balance = inner.balances.entry(coin).or_default();
        balance.on_orders -= cost;
        balance.available += cost;
        inner.orders[index].cancelled = true;
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new(DUST_EPSILON)
    }
}

/// Coin and amount a resting order escrows: sells escrow the counter asset,
/// buys escrow the pricing asset.
fn spending(pair: &Pair, side: Side, rate: Decimal, amount: Decimal) -> (String, Decimal) {
    match side {
        Side::Sell => (pair.counter().to_string(), amount),
        Side::Buy => (pair.base().to_string(), rate * amount),
    }
}

fn proceeds(pair: &Pair, side: Side, rate: Decimal, amount: Decimal) -> (String, Decimal) {
    match side {
        Side::Sell => (pair.base().to_string(), rate * amount),
        Side::Buy => (pair.counter().to_string(), amount),
    }
}

#[async_trait]
impl ExchangePort for PaperExchange {
    async fn ticker_for(&self, pair: &Pair) -> Result<Ticker> {
        self.inner
            .lock()
            .await
            .tickers
            .get(pair)
            .copied()
            .ok_or_else(|| Error::Transport(format!("no ticker for {pair}")))
    }

    async fn balances(&self) -> Result<BTreeMap<String, Balance>> {
        Ok(self.inner.lock().await.balances.clone())
    }

    async fn balance_of_counter(&self, pair: &Pair) -> Result<Decimal> {
        let inner = self.inner.lock().await;
        Ok(inner
            .balances
            .get(pair.counter())
            .map(|b| b.total)
            .unwrap_or_default())
    }

    async fn sell_order_book(&self, pair: &Pair) -> Result<Vec<BookEntry>> {
        Ok(self
            .inner
            .lock()
            .await
            .books
            .get(pair)
            .cloned()
            .unwrap_or_default())
    }

    async fn buy(&self, pair: &Pair, rate: Decimal, amount: Decimal) -> Result<OrderId> {
        self.place(pair, Side::Buy, rate, amount).await
    }

    async fn sell(&self, pair: &Pair, rate: Decimal, amount: Decimal) -> Result<OrderId> {
        self.place(pair, Side::Sell, rate, amount).await
    }

    async fn is_open(&self, id: &OrderId) -> Result<bool> {
        let inner = self.inner.lock().await;
        let order = inner
            .orders
            .iter()
            .find(|o| &o.id == id)
            .ok_or_else(|| Error::OrderNotFound(id.to_string()))?;
        Ok(!order.cancelled && !money::is_dust_within(order.remaining, self.epsilon))
    }

    async fn order_status(&self, id: &OrderId) -> Result<OrderStatus> {
        let inner = self.inner.lock().await;
        let order = inner
            .orders
            .iter()
            .find(|o| &o.id == id)
            .ok_or_else(|| Error::OrderNotFound(id.to_string()))?;
        Ok(OrderStatus {
            id: order.id.clone(),
            pair: order.pair.clone(),
            side: order.side,
            rate: order.rate,
            amount: order.amount,
            remaining: order.remaining,
            open: !order.cancelled && !money::is_dust_within(order.remaining, self.epsilon),
        })
    }

    async fn cancel_orders(&self, ids: &[OrderId]) -> Result<()> {
        let mut inner = self.inner.lock().await;
        for id in ids {
            Self::cancel_locked(&mut inner, id);
        }
        Ok(())
    }

    async fn cancel_all_open(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let open: Vec<OrderId> = inner
            .orders
            .iter()
            .filter(|o| !o.cancelled && !o.remaining.is_zero())
            .map(|o| o.id.clone())
            .collect();
        for id in &open {
            Self::cancel_locked(&mut inner, id);
        }
        Ok(())
    }
}
