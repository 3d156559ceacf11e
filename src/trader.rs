//! The trader state machine: build, issue, poll.
//!
//! A `Trader` is created on every invocation, mutated in place, and
//! persisted whole (minus the exchange port) between runs. Within `poll`
//! the buy side of a pair is always processed before its sell side: the
//! profit-taking sells triggered by buy fills must be on the book before
//! the sell-side logic re-anchors the buy ladder, otherwise the rebuilt
//! ladder would be scanned for activity it just created.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::errors::{Error, Result};
use crate::exchange::{ExchangePort, OrderId, Ticker};
use crate::grid::{Grid, Side};
use crate::money;
use crate::pair::Pair;

/// Both ladders for one pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairGrids {
    pub sell: Grid,
    pub buy: Grid,
}

/// Sink `poll` uses to make take-profit issuance durable before the run
/// completes; `persist::Snapshot` implements it, `()` discards.
pub trait Checkpoint: Send + Sync {
    fn save(&self, trader: &Trader) -> Result<()>;
}

impl Checkpoint for () {
    fn save(&self, _trader: &Trader) -> Result<()> {
        Ok(())
    }
}

/// Per-account trading state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trader {
    account: String,
    config: AppConfig,
    grids: BTreeMap<Pair, PairGrids>,
    /// Tickers snapshotted at issuance time, diagnostics only.
    market: BTreeMap<Pair, Ticker>,
    /// Buy order id -> take-profit sell already issued for it. Replaying
    /// `poll` against unchanged exchange state skips ids recorded here.
    take_profits: BTreeMap<OrderId, OrderId>,
}

impl Trader {
    pub fn new(account: impl Into<String>, config: AppConfig) -> Self {
        Self {
            account: account.into(),
            config,
            grids: BTreeMap::new(),
            market: BTreeMap::new(),
            take_profits: BTreeMap::new(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn grids(&self) -> &BTreeMap<Pair, PairGrids> {
        &self.grids
    }

    pub fn take_profits(&self) -> &BTreeMap<OrderId, OrderId> {
        &self.take_profits
    }

    fn pair_grids(&self, pair: &Pair) -> Result<&PairGrids> {
        self.grids
            .get(pair)
            .ok_or_else(|| Error::InvariantViolation(format!("no grids for {pair}")))
    }

    fn pair_grids_mut(&mut self, pair: &Pair) -> Result<&mut PairGrids> {
        self.grids
            .get_mut(pair)
            .ok_or_else(|| Error::InvariantViolation(format!("no grids for {pair}")))
    }

    fn core_position_for<E: ExchangePort + ?Sized>(
        &self,
        exchange: &E,
        pair: &Pair,
    ) -> Result<Decimal> {
        self.config.core_position(&exchange.base_of(pair))
    }

    /// Construct fresh sell and buy ladders around each pair's midpoint.
    /// No orders are placed here.
    pub async fn build<E: ExchangePort + ?Sized>(&mut self, exchange: &E) -> Result<()> {
        let mut grids = BTreeMap::new();
        info!("creating buy and sell grids");
        for pair in self.config.pairs.clone() {
            let ticker = exchange.ticker_for(&pair).await?;
            let mid = money::midpoint(ticker.lowest_ask, ticker.highest_bid);
            debug!("{pair} midpoint = {mid} (ask={}, bid={})", ticker.lowest_ask, ticker.highest_bid);

            let core = self.core_position_for(exchange, &pair)?;
            let sell = Grid::build(Side::Sell, pair.clone(), mid, &self.config.sell_grid, core)?;
            let buy = Grid::build(Side::Buy, pair.clone(), mid, &self.config.buy_grid, core)?;
            debug!("{sell}");
            debug!("{buy}");
            grids.insert(pair, PairGrids { sell, buy });
        }
        self.grids = grids;
        self.take_profits.clear();
        Ok(())
    }

    /// Place every ladder's orders, buy side then sell side per pair, and
    /// snapshot the ticker for diagnostics. Per-rung placement failures are
    /// absorbed inside `place_orders`; transport errors abort.
    pub async fn issue_all<E: ExchangePort + ?Sized>(&mut self, exchange: &E) -> Result<()> {
        let pairs: Vec<Pair> = self.grids.keys().cloned().collect();
        for pair in pairs {
            let ticker = exchange.ticker_for(&pair).await?;
            self.market.insert(pair.clone(), ticker);

            let grids = self.pair_grids_mut(&pair)?;
            grids.buy.place_orders(exchange).await?;
            grids.sell.place_orders(exchange).await?;
        }
        Ok(())
    }

    /// React to fills since the last invocation. Buy side strictly before
    /// sell side for each pair; pairs are independent.
    pub async fn poll<E: ExchangePort + ?Sized>(
        &mut self,
        exchange: &E,
        checkpoint: &dyn Checkpoint,
    ) -> Result<()> {
        self.prune_take_profits();

        let pairs: Vec<Pair> = self.grids.keys().cloned().collect();
        for pair in pairs {
            let grids = self.pair_grids(&pair)?;
            grids.buy.check_alignment()?;
            grids.sell.check_alignment()?;

            let holdings = exchange.balance_of_counter(&pair).await?;
            debug!("analyzing {pair}; current holdings = {holdings}");

            self.poll_buy_side(exchange, &pair, checkpoint).await?;
            self.poll_sell_side(exchange, &pair).await?;
        }
        Ok(())
    }

    /// Drop ledger entries whose buy order has left every ladder; they can
    /// never be scanned again.
    fn prune_take_profits(&mut self) {
        let live: BTreeSet<OrderId> = self
            .grids
            .values()
            .flat_map(|grids| grids.buy.order_ids().iter().cloned())
            .collect();
        self.take_profits.retain(|buy_id, _| live.contains(buy_id));
    }

    async fn poll_buy_side<E: ExchangePort + ?Sized>(
        &mut self,
        exchange: &E,
        pair: &Pair,
        checkpoint: &dyn Checkpoint,
    ) -> Result<()> {
        debug!("checking {pair} buy activity");
        let deepest = {
            let buy = &self.pair_grids(pair)?.buy;
            match buy.trade_activity(exchange).await? {
                None => {
                    debug!(
                        "no {pair} buy trade activity across {} order(s)",
                        buy.order_ids().len()
                    );
                    return Ok(());
                }
                Some(d) => d,
            }
        };

        let (fills, rung_size, profit_target) = {
            let buy = &self.pair_grids(pair)?.buy;
            info!(
                "{pair} buy trade activity at index {deepest} of {}",
                buy.order_ids().len().saturating_sub(1)
            );
            let fills: Vec<(OrderId, Decimal)> = (0..=deepest)
                .rev()
                .map(|i| (buy.order_ids()[i].clone(), buy.rungs()[i]))
                .collect();
            (fills, buy.rung_size, self.config.buy_grid.profit_target)
        };

        let mut issued = false;
        for (buy_id, fill_rate) in fills {
            if profit_target <= Decimal::ZERO {
                debug!("accumulating {pair} purchase at {fill_rate} instead of selling for profit");
                continue;
            }
            if self.take_profits.contains_key(&buy_id) {
                debug!("take-profit for {pair} buy {buy_id} already issued, skipping");
                continue;
            }
            let sell_rate = money::apply_percent(fill_rate, profit_target);
            info!("creating {pair} take-profit sell size={rung_size} rate={sell_rate}");
            let sell_id = exchange.sell(pair, sell_rate, rung_size).await?;
            self.take_profits.insert(buy_id, sell_id);
            issued = true;
        }
        if issued {
            // make the issued sells durable before anything else can fail
            checkpoint.save(self)?;
        }

        self.pair_grids_mut(pair)?.buy.purge_closed(deepest)?;

        if self.pair_grids(pair)?.buy.is_exhausted() {
            let ticker = exchange.ticker_for(pair).await?;
            info!(
                "{pair} buy grid exhausted; rebuilding at highest bid {} (lowest ask {})",
                ticker.highest_bid, ticker.lowest_ask
            );
            let core = self.core_position_for(exchange, pair)?;
            let mut buy = Grid::build(
                Side::Buy,
                pair.clone(),
                ticker.highest_bid,
                &self.config.buy_grid,
                core,
            )?;
            buy.place_orders(exchange).await?;
            self.pair_grids_mut(pair)?.buy = buy;
        }
        Ok(())
    }

    async fn poll_sell_side<E: ExchangePort + ?Sized>(
        &mut self,
        exchange: &E,
        pair: &Pair,
    ) -> Result<()> {
        debug!("checking {pair} sell activity");
        let activity = {
            let sell = &self.pair_grids(pair)?.sell;
            let found = sell.trade_activity(exchange).await?;
            if found.is_none() {
                debug!(
                    "no {pair} sell trade activity across {} order(s)",
                    sell.order_ids().len()
                );
            }
            found
        };

        if let Some(deepest) = activity {
            let (deepest_filled_rate, buy_ids) = {
                let grids = self.pair_grids_mut(pair)?;
                let rate = grids.sell.rungs()[deepest];
                info!(
                    "{pair} sell trade activity at index {deepest}; deepest filled rate = {rate}"
                );
                grids.sell.purge_closed(deepest)?;
                (rate, grids.buy.order_ids().to_vec())
            };

            info!("cancelling and elevating the {pair} buy grid");
            exchange.cancel_orders(&buy_ids).await?;

            let core = self.core_position_for(exchange, pair)?;
            let mut buy = Grid::build(
                Side::Buy,
                pair.clone(),
                deepest_filled_rate,
                &self.config.buy_grid,
                core,
            )?;
            buy.place_orders(exchange).await?;
            self.pair_grids_mut(pair)?.buy = buy;
        }

        if self.pair_grids(pair)?.sell.is_exhausted() {
            let ticker = exchange.ticker_for(pair).await?;
            info!(
                "{pair} sell grid exhausted; rebuilding at lowest ask {}",
                ticker.lowest_ask
            );
            let core = self.core_position_for(exchange, pair)?;
            let mut sell = Grid::build(
                Side::Sell,
                pair.clone(),
                ticker.lowest_ask,
                &self.config.sell_grid,
                core,
            )?;
            sell.place_orders(exchange).await?;
            self.pair_grids_mut(pair)?.sell = sell;
        }
        Ok(())
    }
}
