//! Maps the externally-triggered verbs onto trader operations.
//!
//! Verbs combine within one invocation and always apply in the same order:
//! cancel-all, init, monitor, balances, set-balances, status-of. Any error
//! unwinds here, is logged, and is handed to the admin notifier.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Local;
use log::{debug, error, info, warn};
use rust_decimal::Decimal;

use crate::config::{self, AppConfig};
use crate::errors::Result;
use crate::exchange::{ExchangePort, OrderId};
use crate::notify::Notifier;
use crate::persist::Snapshot;
use crate::trader::Trader;

/// The verbs one invocation may combine.
#[derive(Debug, Clone, Default)]
pub struct Actions {
    pub cancel_all: bool,
    pub init: bool,
    pub monitor: bool,
    pub balances: bool,
    pub set_balances: bool,
    pub status_of: Option<String>,
}

impl Actions {
    /// Compact rendering for log file names and the session banner.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.cancel_all {
            parts.push("cancel-all".into());
        }
        if self.init {
            parts.push("init".into());
        }
        if self.monitor {
            parts.push("monitor".into());
        }
        if self.balances {
            parts.push("balances".into());
        }
        if self.set_balances {
            parts.push("set-balances".into());
        }
        if let Some(id) = &self.status_of {
            parts.push(format!("status-of={id}"));
        }
        if parts.is_empty() {
            "none".into()
        } else {
            parts.join(",")
        }
    }
}

/// One invocation's wiring: who we are, where config and state live.
pub struct Dispatcher<'a> {
    pub exchange_name: &'a str,
    pub account: &'a str,
    pub config_path: PathBuf,
    pub config: AppConfig,
    pub snapshot: Snapshot,
}

impl Dispatcher<'_> {
    /// Apply the requested verbs in order. Errors are logged, reported to
    /// the notifier, and returned for the exit status.
    pub async fn run<E, N>(&self, actions: &Actions, exchange: &E, notifier: &N) -> Result<()>
    where
        E: ExchangePort + ?Sized,
        N: Notifier + ?Sized,
    {
        let summary = actions.summary();
        session_banner(&summary, exchange, false).await;

        let outcome = self.execute(actions, exchange).await;
        if let Err(e) = &outcome {
            error!("aborting: {e}");
            let subject = format!("gridpad {}/{} aborted", self.exchange_name, self.account);
            if let Err(notify_err) = notifier.notify(&subject, &e.to_string()).await {
                error!("notifier failed: {notify_err}");
            }
        }

        session_banner(&summary, exchange, true).await;
        outcome
    }

    async fn execute<E: ExchangePort + ?Sized>(
        &self,
        actions: &Actions,
        exchange: &E,
    ) -> Result<()> {
        if actions.cancel_all {
            info!("cancelling all open orders");
            exchange.cancel_all_open().await?;
        }

        if actions.init {
            self.init(&self.config, exchange).await?;
        }

        if actions.monitor {
            info!("evaluating trade activity since last invocation");
            let mut trader = self.snapshot.retrieve()?;
            trader.poll(exchange, &self.snapshot).await?;
            self.snapshot.store(&trader)?;
        }

        if actions.balances {
            info!("getting balances");
            balances_report(exchange).await?;
        }

        if actions.set_balances {
            info!("capturing live balances as core positions");
            let totals: BTreeMap<String, Decimal> = exchange
                .positive_balances()
                .await?
                .into_iter()
                .map(|(coin, balance)| (coin, balance.total))
                .collect();
            config::rewrite_core_positions(&self.config_path, &totals)?;
            let refreshed = AppConfig::load(&self.config_path, self.exchange_name)?;
            self.init(&refreshed, exchange).await?;
        }

        if let Some(id) = &actions.status_of {
            info!("getting status of order {id}");
            let status = exchange.order_status(&OrderId(id.clone())).await?;
            match serde_json::to_string_pretty(&status) {
                Ok(rendered) => info!("order status:\n{rendered}"),
                Err(e) => warn!("could not render order status: {e}"),
            }
        }

        Ok(())
    }

    /// cancel-all, build, issue, persist.
    async fn init<E: ExchangePort + ?Sized>(
        &self,
        config: &AppConfig,
        exchange: &E,
    ) -> Result<()> {
        exchange.cancel_all_open().await?;

        info!("building trade grids");
        let mut trader = Trader::new(self.account, config.clone());
        trader.build(exchange).await?;

        info!("issuing trades on created grids");
        trader.issue_all(exchange).await?;

        info!("storing trader snapshot");
        self.snapshot.store(&trader)?;
        Ok(())
    }
}

/// Log positive holdings plus ready-to-paste config sections.
async fn balances_report<E: ExchangePort + ?Sized>(exchange: &E) -> Result<()> {
    let balances = exchange.positive_balances().await?;

    let mut pairs_line = String::new();
    for coin in balances.keys() {
        if coin == "BTC" {
            continue;
        }
        if !pairs_line.is_empty() {
            pairs_line.push(' ');
        }
        pairs_line.push_str(&format!("BTC-{coin}"));
    }

    let mut positions = String::new();
    for (coin, balance) in &balances {
        positions.push_str(&format!("{coin} = {}\n", balance.total));
    }

    info!("suggested config sections:\n[pairs]\npairs = {pairs_line}\n\n[initialcorepositions]\n{positions}");
    Ok(())
}

/// Opening/closing log line with args, holdings and date. Best effort; a
/// venue hiccup here must not kill the run.
async fn session_banner<E: ExchangePort + ?Sized>(args: &str, exchange: &E, end: bool) {
    let slash = if end { "/" } else { "" };
    match exchange.positive_balances().await {
        Ok(balances) => {
            let holdings: Vec<String> = balances
                .iter()
                .map(|(coin, balance)| format!("{coin}={}", balance.total))
                .collect();
            debug!(
                "<{slash}session args={args} balances={} date={}>",
                holdings.join(","),
                Local::now().to_rfc2822()
            );
        }
        Err(e) => warn!("session banner unavailable: {e}"),
    }
}
