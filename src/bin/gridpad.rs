//! gridpad command-line entry point.
//!
//! ```bash
//! gridpad polo terrence --init
//! gridpad polo terrence --monitor          # from a scheduler
//! gridpad paper terrence --balances
//! ```
//!
//! Config is read from `config/<exchange>/<account>.ini`, state lives at
//! `persistence/<account>.storage`, and each run writes its own log file
//! under `log/<exchange>/<account>/`. Exit status is zero only when every
//! requested verb completed.

use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use gridpad::config::{config_file_name, AppConfig};
use gridpad::dispatch::{Actions, Dispatcher};
use gridpad::exchange::exchange_for;
use gridpad::logging;
use gridpad::notify::LogNotifier;
use gridpad::persist::{RunLock, Snapshot};

/// Grid trading agent: maintains symmetric buy/sell ladders per pair.
#[derive(Parser, Debug)]
#[command(name = "gridpad", version, about)]
struct Cli {
    /// Venue to trade on (e.g. polo, trex, paper)
    exchange_name: String,

    /// Account whose API keys and config we use
    account: String,

    /// Cancel all open orders, even ones this program did not open
    #[arg(long)]
    cancel_all: bool,

    /// Create new trade grids, issue trades and persist them
    #[arg(long)]
    init: bool,

    /// React to grid fills since the last invocation
    #[arg(long)]
    monitor: bool,

    /// List coin holdings and suggested config sections
    #[arg(long)]
    balances: bool,

    /// Capture live balances as [initialcorepositions], then run init
    #[arg(long)]
    set_balances: bool,

    /// Look up one order by id (diagnostic)
    #[arg(long, value_name = "ID")]
    status_of: Option<String>,
}

impl Cli {
    fn actions(&self) -> Actions {
        Actions {
            cancel_all: self.cancel_all,
            init: self.init,
            monitor: self.monitor,
            balances: self.balances,
            set_balances: self.set_balances,
            status_of: self.status_of.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let actions = cli.actions();

    // optional .env, e.g. for RUST_LOG; the core reads no env vars
    let _ = dotenvy::dotenv();

    let log_path = match logging::init(&cli.exchange_name, &cli.account, &actions.summary()) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("could not initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!("session log at {}", log_path.display());

    match run(&cli, &actions).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, actions: &Actions) -> gridpad::Result<()> {
    let _lock = RunLock::acquire(&cli.account)?;

    let config_path = config_file_name(&cli.exchange_name, &cli.account);
    let config = AppConfig::load(&config_path, &cli.exchange_name)?;
    let exchange = exchange_for(&cli.exchange_name, &config)?;

    let dispatcher = Dispatcher {
        exchange_name: &cli.exchange_name,
        account: &cli.account,
        config_path,
        config,
        snapshot: Snapshot::for_account(&cli.account),
    };
    dispatcher.run(actions, &*exchange, &LogNotifier).await
}
