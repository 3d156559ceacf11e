//! One side of the ladder: rung geometry, placement, fill detection.
//!
//! A grid is a sequence of resting limit orders walking away from the
//! market: upward for sells, downward for buys. Rung zero is nearest the
//! market; deeper indices are further out. Because shallower rungs fill
//! first, the deepest closed rung implies every shallower rung closed too.

use std::fmt;

use log::{debug, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::GridParams;
use crate::errors::{Error, Result};
use crate::exchange::{ExchangePort, OrderId};
use crate::money;
use crate::pair::Pair;

/// Which side of the market a ladder rests on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Sell,
    Buy,
}

impl Side {
    /// Sign a percent offset in this side's away-from-market direction.
    fn away(self, percent: Decimal) -> Decimal {
        match self {
            Side::Sell => percent,
            Side::Buy => -percent,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Sell => "sell",
            Side::Buy => "buy",
        }
    }
}

/// A ladder of resting limit orders on one side of one pair.
///
/// `rungs` and `order_ids` stay aligned 1:1 from placement on: a rung whose
/// placement the venue refuses is dropped, and purges cut both sequences at
/// the same index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    pub side: Side,
    pub pair: Pair,
    /// Midpoint offset by `majorLevel`; rung zero.
    pub starting_price: Decimal,
    rungs: Vec<Decimal>,
    /// Identical for every rung on construction.
    pub rung_size: Decimal,
    order_ids: Vec<OrderId>,
}

impl Grid {
    /// Derive ladder geometry from config and the current market price. No
    /// orders are placed here.
    pub fn build(
        side: Side,
        pair: Pair,
        current_market_price: Decimal,
        params: &GridParams,
        core_position: Decimal,
    ) -> Result<Self> {
        if params.number_of_orders == 0 {
            return Err(Error::InvalidConfig(
                "numberOfOrders must not be zero".into(),
            ));
        }

        let starting_price =
            money::apply_percent(current_market_price, side.away(params.major_level));

        let mut rungs = Vec::with_capacity(params.number_of_orders as usize);
        let mut price = starting_price;
        for _ in 0..params.number_of_orders {
            rungs.push(price);
            price = money::apply_percent(price, side.away(params.increments));
        }

        let rung_size = money::div_round(
            money::percent_to_ratio(params.size) * core_position,
            Decimal::from(params.number_of_orders),
        );

        debug!(
            "built {} {pair} grid from market price {current_market_price}: start={starting_price} rungs={} size={rung_size}",
            side.as_str(),
            rungs.len()
        );

        Ok(Self {
            side,
            pair,
            starting_price,
            rungs,
            rung_size,
            order_ids: Vec::new(),
        })
    }

    pub fn rungs(&self) -> &[Decimal] {
        &self.rungs
    }

    pub fn order_ids(&self) -> &[OrderId] {
        &self.order_ids
    }

    /// No resting orders left.
    pub fn is_exhausted(&self) -> bool {
        self.order_ids.is_empty()
    }

    /// `InvariantViolation` unless rungs and order ids line up. Run before
    /// trusting a grid that came out of a snapshot.
    pub fn check_alignment(&self) -> Result<()> {
        if self.order_ids.len() != self.rungs.len() {
            return Err(Error::InvariantViolation(format!(
                "{} {} grid has {} order ids for {} rungs",
                self.pair,
                self.side.as_str(),
                self.order_ids.len(),
                self.rungs.len()
            )));
        }
        Ok(())
    }

    /// Place one limit order per rung in natural order. A rung the venue
    /// refuses as dust or unaffordable is logged and dropped, leaving the
    /// ladder partial; any other failure propagates.
    pub async fn place_orders<E: ExchangePort + ?Sized>(&mut self, exchange: &E) -> Result<()> {
        debug_assert!(self.order_ids.is_empty());

        let mut kept = Vec::with_capacity(self.rungs.len());
        let mut ids = Vec::with_capacity(self.rungs.len());
        for rate in self.rungs.clone() {
            let placed = match self.side {
                Side::Sell => exchange.sell(&self.pair, rate, self.rung_size).await,
                Side::Buy => exchange.buy(&self.pair, rate, self.rung_size).await,
            };
            match placed {
                Ok(id) => {
                    kept.push(rate);
                    ids.push(id);
                }
                Err(e) if e.is_recoverable_placement() => {
                    warn!(
                        "{} {} rung at {rate} skipped: {e}",
                        self.pair,
                        self.side.as_str()
                    );
                }
                Err(e) => {
                    self.rungs = kept;
                    self.order_ids = ids;
                    return Err(e);
                }
            }
        }
        self.rungs = kept;
        self.order_ids = ids;
        debug!("{self} placed");
        Ok(())
    }

    /// Deepest-first scan for trade activity: the index of the furthest
    /// rung whose order is no longer open, or `None` when every order still
    /// rests. Shallower rungs fill first, so one hit covers the whole head.
    pub async fn trade_activity<E: ExchangePort + ?Sized>(
        &self,
        exchange: &E,
    ) -> Result<Option<usize>> {
        for i in (0..self.order_ids.len()).rev() {
            if !exchange.is_open(&self.order_ids[i]).await? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    /// Drop everything at or shallower than the deepest filled rung; the
    /// surviving tail keeps its order ids.
    pub fn purge_closed(&mut self, deepest: usize) -> Result<()> {
        if self.order_ids.len() > self.rungs.len() {
            return Err(Error::InvariantViolation(format!(
                "{} {} grid has more order ids ({}) than rungs ({})",
                self.pair,
                self.side.as_str(),
                self.order_ids.len(),
                self.rungs.len()
            )));
        }

        let cut = deepest + 1;
        let mut rungs = std::mem::take(&mut self.rungs);
        self.rungs = rungs.split_off(cut.min(rungs.len()));
        let mut ids = std::mem::take(&mut self.order_ids);
        self.order_ids = ids.split_off(cut.min(ids.len()));
        Ok(())
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} grid: start={} size={} open={}/{}",
            self.pair,
            self.side.as_str(),
            self.starting_price,
            self.rung_size,
            self.order_ids.len(),
            self.rungs.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::paper::PaperExchange;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn pair() -> Pair {
        "BTC-ETH".parse().unwrap()
    }

    fn params(n: u32) -> GridParams {
        GridParams {
            major_level: dec!(1),
            number_of_orders: n,
            increments: dec!(1),
            size: dec!(30),
            profit_target: Decimal::ZERO,
        }
    }

    #[test]
    fn test_sell_grid_geometry() {
        let grid = Grid::build(Side::Sell, pair(), dec!(100), &params(3), dec!(300)).unwrap();

        assert_eq!(grid.starting_price, dec!(101));
        assert_eq!(grid.rungs(), &[dec!(101), dec!(102.01), dec!(103.0301)]);
        assert_eq!(grid.rung_size, dec!(30));
        assert!(grid.order_ids().is_empty());
    }

    #[test]
    fn test_buy_grid_geometry() {
        let grid = Grid::build(Side::Buy, pair(), dec!(100), &params(3), dec!(300)).unwrap();

        assert_eq!(grid.starting_price, dec!(99));
        assert_eq!(grid.rungs(), &[dec!(99), dec!(98.01), dec!(97.0299)]);
        assert_eq!(grid.rung_size, dec!(30));
    }

    #[test]
    fn test_zero_orders_rejected() {
        let result = Grid::build(Side::Sell, pair(), dec!(100), &params(0), dec!(300));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_place_orders_collects_ids_in_rung_order() {
        let venue = PaperExchange::default();
        venue.credit("ETH", dec!(300)).await;

        let mut grid = Grid::build(Side::Sell, pair(), dec!(100), &params(3), dec!(300)).unwrap();
        grid.place_orders(&venue).await.unwrap();

        assert_eq!(grid.order_ids().len(), 3);
        let placed = venue.orders().await;
        assert_eq!(placed.len(), 3);
        assert_eq!(placed[0].rate, dec!(101));
        assert_eq!(placed[2].rate, dec!(103.0301));
        for (i, order) in placed.iter().enumerate() {
            assert_eq!(order.id, grid.order_ids()[i]);
        }
    }

    #[tokio::test]
    async fn test_unaffordable_rungs_dropped_keeps_alignment() {
        let venue = PaperExchange::default();
        // enough ETH for two 30-unit rungs, not three
        venue.credit("ETH", dec!(65)).await;

        let mut grid = Grid::build(Side::Sell, pair(), dec!(100), &params(3), dec!(300)).unwrap();
        grid.place_orders(&venue).await.unwrap();

        assert_eq!(grid.rungs().len(), 2);
        assert_eq!(grid.order_ids().len(), 2);
        assert_eq!(grid.rungs(), &[dec!(101), dec!(102.01)]);
    }

    #[tokio::test]
    async fn test_dust_rungs_all_skipped_without_error() {
        let venue = PaperExchange::default();
        venue.credit("ETH", dec!(300)).await;

        let mut grid = Grid::build(
            Side::Sell,
            pair(),
            dec!(100),
            &params(3),
            dec!(0.000000005),
        )
        .unwrap();
        assert_eq!(grid.rung_size, dec!(0.0000000005));

        grid.place_orders(&venue).await.unwrap();
        assert!(grid.order_ids().is_empty());
        assert!(grid.is_exhausted());
        assert!(venue.orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let venue = PaperExchange::default();
        venue.credit("ETH", dec!(300)).await;
        venue
            .fail_next_place(Error::Transport("connection reset".into()))
            .await;

        let mut grid = Grid::build(Side::Sell, pair(), dec!(100), &params(3), dec!(300)).unwrap();
        let result = grid.place_orders(&venue).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_trade_activity_returns_deepest_closed() {
        let venue = PaperExchange::default();
        venue.credit("ETH", dec!(300)).await;

        let mut grid = Grid::build(Side::Sell, pair(), dec!(100), &params(3), dec!(300)).unwrap();
        grid.place_orders(&venue).await.unwrap();

        assert_eq!(grid.trade_activity(&venue).await.unwrap(), None);

        venue.close_order(&grid.order_ids()[0].clone()).await;
        assert_eq!(grid.trade_activity(&venue).await.unwrap(), Some(0));

        venue.close_order(&grid.order_ids()[1].clone()).await;
        assert_eq!(grid.trade_activity(&venue).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_purge_keeps_deeper_tail() {
        let venue = PaperExchange::default();
        venue.credit("ETH", dec!(300)).await;

        let mut grid = Grid::build(Side::Sell, pair(), dec!(100), &params(3), dec!(300)).unwrap();
        grid.place_orders(&venue).await.unwrap();
        let deepest_id = grid.order_ids()[2].clone();

        grid.purge_closed(1).unwrap();
        assert_eq!(grid.rungs(), &[dec!(103.0301)]);
        assert_eq!(grid.order_ids(), &[deepest_id]);

        grid.purge_closed(0).unwrap();
        assert!(grid.is_exhausted());
        assert!(grid.rungs().is_empty());
    }

    #[test]
    fn test_purge_detects_misaligned_ids() {
        let mut grid = Grid {
            side: Side::Sell,
            pair: pair(),
            starting_price: dec!(101),
            rungs: vec![dec!(101)],
            rung_size: dec!(30),
            order_ids: vec![OrderId("a".into()), OrderId("b".into())],
        };
        assert!(matches!(
            grid.purge_closed(0),
            Err(Error::InvariantViolation(_))
        ));
    }

    fn decimal(units: u32, scale: u32) -> Decimal {
        Decimal::new(units as i64, scale)
    }

    proptest! {
        #[test]
        fn prop_sell_rungs_strictly_increase(
            mid in 1u32..100_000,
            n in 1u32..32,
            major in 0u32..500,
            incr in 1u32..500,
        ) {
            let p = GridParams {
                major_level: decimal(major, 2),
                number_of_orders: n,
                increments: decimal(incr, 2),
                size: dec!(30),
                profit_target: Decimal::ZERO,
            };
            let grid = Grid::build(Side::Sell, pair(), Decimal::from(mid), &p, dec!(300)).unwrap();
            prop_assert_eq!(grid.rungs().len(), n as usize);
            for pairw in grid.rungs().windows(2) {
                prop_assert!(pairw[1] > pairw[0]);
            }
        }

        #[test]
        fn prop_buy_rungs_strictly_decrease(
            mid in 1u32..100_000,
            n in 1u32..32,
            major in 0u32..500,
            incr in 1u32..500,
        ) {
            let p = GridParams {
                major_level: decimal(major, 2),
                number_of_orders: n,
                increments: decimal(incr, 2),
                size: dec!(30),
                profit_target: Decimal::ZERO,
            };
            let grid = Grid::build(Side::Buy, pair(), Decimal::from(mid), &p, dec!(300)).unwrap();
            prop_assert_eq!(grid.rungs().len(), n as usize);
            for pairw in grid.rungs().windows(2) {
                prop_assert!(pairw[1] < pairw[0]);
                prop_assert!(pairw[1] > Decimal::ZERO);
            }
        }

        #[test]
        fn prop_purge_arithmetic(n in 1usize..32, d in 0usize..32) {
            prop_assume!(d < n);
            let rungs: Vec<Decimal> = (0..n).map(|i| Decimal::from(100 + i as u32)).collect();
            let ids: Vec<OrderId> = (0..n).map(|i| OrderId(format!("order-{i}"))).collect();
            let mut grid = Grid {
                side: Side::Sell,
                pair: pair(),
                starting_price: rungs[0],
                rungs: rungs.clone(),
                rung_size: dec!(1),
                order_ids: ids.clone(),
            };

            grid.purge_closed(d).unwrap();

            prop_assert_eq!(grid.rungs().len(), n - d - 1);
            prop_assert_eq!(grid.order_ids().len(), n - d - 1);
            for (i, rung) in grid.rungs().iter().enumerate() {
                // survivors were strictly deeper than d in the old grid
                prop_assert_eq!(*rung, rungs[d + 1 + i]);
                prop_assert_eq!(&grid.order_ids()[i], &ids[d + 1 + i]);
            }
        }
    }
}
