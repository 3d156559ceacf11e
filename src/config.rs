//! INI configuration: loading, validation and the `set-balances` rewrite.
//!
//! One file per account at `config/<exchange>/<account>.ini`:
//!
//! ```ini
//! [pairs]
//! pairs = BTC-ETH BTC-XMR
//!
//! [initialcorepositions]
//! ETH = 300
//! XMR = 1250
//!
//! [sellgrid]
//! majorLevel = 1
//! numberOfOrders = 3
//! increments = 1
//! size = 30
//!
//! [buygrid]
//! majorLevel = 1
//! numberOfOrders = 3
//! increments = 1
//! size = 30
//! profitTarget = 2
//!
//! [polo]
//! apikey = ...
//! secret = ...
//! ```
//!
//! Percent values are decimals where `1.0` means one percent. Key lookup is
//! case-insensitive, matching the original operator configs.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use config::{Config as RawConfig, File, FileFormat};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::consts::DUST_EPSILON;
use crate::errors::{Error, Result};
use crate::money;
use crate::pair::Pair;

/// Per-side ladder parameters from `[sellgrid]` / `[buygrid]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridParams {
    /// Percent offset of the first rung from the current midpoint.
    pub major_level: Decimal,
    /// Rung count.
    pub number_of_orders: u32,
    /// Percent step between adjacent rungs.
    pub increments: Decimal,
    /// Percent of the initial core position the whole ladder consumes.
    pub size: Decimal,
    /// Percent markup for the paired take-profit sell. Zero or negative
    /// accumulates instead of selling; always zero on the sell side.
    pub profit_target: Decimal,
}

/// Typed view of one account's config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub pairs: Vec<Pair>,
    /// Balance snapshot grid sizing reads from, keyed by coin symbol.
    /// Captured by `set-balances`, never read from live balances.
    pub initial_core_positions: BTreeMap<String, Decimal>,
    pub sell_grid: GridParams,
    pub buy_grid: GridParams,
    /// Fully-filled / minimum-lot threshold handed to the venue adapter.
    pub epsilon: Decimal,
    /// Opaque `[<exchange>]` credential section; never persisted.
    #[serde(skip)]
    pub credentials: BTreeMap<String, String>,
}

pub fn config_file_name(exchange: &str, account: &str) -> PathBuf {
    PathBuf::from(format!("config/{exchange}/{account}.ini"))
}

impl AppConfig {
    /// Load and validate `path`, taking credentials from the `[exchange]`
    /// section. Missing sections, missing keys and malformed decimals are
    /// all `InvalidConfig`.
    pub fn load(path: &Path, exchange: &str) -> Result<Self> {
        let raw = RawConfig::builder()
            .add_source(File::from(path).format(FileFormat::Ini))
            .build()?;

        let mut pairs = Vec::new();
        for symbol in section_value(&raw, "pairs", "pairs")?.split_whitespace() {
            pairs.push(symbol.parse::<Pair>()?);
        }
        if pairs.is_empty() {
            return Err(Error::InvalidConfig("[pairs] names no pairs".into()));
        }

        // The section may legitimately be absent until set-balances runs;
        // sizing fails later only for pairs that actually need an entry.
        let mut initial_core_positions = BTreeMap::new();
        if let Ok(table) = raw.get_table("initialcorepositions") {
            for (coin, value) in table {
                let total = money::parse(&value.into_string()?)?;
                initial_core_positions.insert(coin.to_uppercase(), total);
            }
        }

        let epsilon = match section_value(&raw, "limits", "epsilon") {
            Ok(value) => money::parse(&value)?,
            Err(_) => DUST_EPSILON,
        };

        let credentials = match raw.get_table(&exchange.to_lowercase()) {
            Ok(table) => table
                .into_iter()
                .filter_map(|(k, v)| v.into_string().ok().map(|v| (k, v)))
                .collect(),
            Err(_) => BTreeMap::new(),
        };

        let config = Self {
            pairs,
            initial_core_positions,
            sell_grid: grid_params(&raw, "sellgrid", false)?,
            buy_grid: grid_params(&raw, "buygrid", true)?,
            epsilon,
            credentials,
        };
        debug!(
            "loaded config for {} pair(s), {} core position(s)",
            config.pairs.len(),
            config.initial_core_positions.len()
        );
        Ok(config)
    }

    /// The reference balance for a coin, or `InvalidConfig` if the snapshot
    /// has never been captured for it.
    pub fn core_position(&self, coin: &str) -> Result<Decimal> {
        self.initial_core_positions
            .get(&coin.to_uppercase())
            .copied()
            .ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "no [initialcorepositions] entry for {coin}; run --set-balances"
                ))
            })
    }
}

fn grid_params(raw: &RawConfig, section: &str, with_profit_target: bool) -> Result<GridParams> {
    let number_of_orders: u32 = section_value(raw, section, "numberoforders")?
        .parse()
        .map_err(|_| {
            Error::InvalidConfig(format!(
                "[{section}] numberOfOrders must be a positive integer"
            ))
        })?;
    if number_of_orders == 0 {
        return Err(Error::InvalidConfig(format!(
            "[{section}] numberOfOrders must not be zero"
        )));
    }

    let profit_target = if with_profit_target {
        money::parse(&section_value(raw, section, "profittarget")?)?
    } else {
        Decimal::ZERO
    };

    Ok(GridParams {
        major_level: money::parse(&section_value(raw, section, "majorlevel")?)?,
        number_of_orders,
        increments: money::parse(&section_value(raw, section, "increments")?)?,
        size: money::parse(&section_value(raw, section, "size")?)?,
        profit_target,
    })
}

/// Option names are case-insensitive, like the original operator configs.
fn section_value(raw: &RawConfig, section: &str, key: &str) -> Result<String> {
    let table = raw
        .get_table(section)
        .map_err(|_| Error::InvalidConfig(format!("missing [{section}] section")))?;
    for (name, value) in table {
        if name.eq_ignore_ascii_case(key) {
            return Ok(value.into_string()?);
        }
    }
    Err(Error::InvalidConfig(format!("[{section}] is missing {key}")))
}

/// Overwrite the `[initialcorepositions]` section with live totals, leaving
/// the rest of the file untouched. The replacement is written to a temp file
/// and renamed over the original.
pub fn rewrite_core_positions(path: &Path, totals: &BTreeMap<String, Decimal>) -> Result<()> {
    let text = fs::read_to_string(path).map_err(|e| Error::Io(e.to_string()))?;

    let mut section = String::from("[initialcorepositions]\n");
    for (coin, total) in totals {
        section.push_str(&format!("{} = {}\n", coin.to_uppercase(), total));
    }

    let mut out = String::with_capacity(text.len() + section.len());
    let mut skipping = false;
    let mut replaced = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("[initialcorepositions]") {
            out.push_str(&section);
            skipping = true;
            replaced = true;
            continue;
        }
        if skipping && trimmed.starts_with('[') {
            skipping = false;
        }
        if !skipping {
            out.push_str(line);
            out.push('\n');
        }
    }
    if !replaced {
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
        }
        out.push_str(&section);
    }

    let tmp = path.with_extension("ini.tmp");
    fs::write(&tmp, out).map_err(|e| Error::Io(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| Error::Io(e.to_string()))?;
    debug!("rewrote core positions in {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    const SAMPLE: &str = "\
[pairs]
pairs = BTC-ETH BTC-XMR

[initialcorepositions]
ETH = 300
XMR = 1250.5

[sellgrid]
majorLevel = 1
numberOfOrders = 3
increments = 1
size = 30

[buygrid]
majorLevel = 1
numberOfOrders = 3
increments = 1
size = 30
profitTarget = 2

[polo]
apikey = abc
secret = def
";

    fn write_sample(dir: &tempfile::TempDir, text: &str) -> PathBuf {
        let path = dir.path().join("terrence.ini");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, SAMPLE);

        let config = AppConfig::load(&path, "polo").unwrap();
        assert_eq!(config.pairs.len(), 2);
        assert_eq!(config.pairs[0].to_string(), "BTC-ETH");
        assert_eq!(config.core_position("ETH").unwrap(), dec!(300));
        assert_eq!(config.core_position("eth").unwrap(), dec!(300));
        assert_eq!(config.sell_grid.number_of_orders, 3);
        assert_eq!(config.sell_grid.profit_target, dec!(0));
        assert_eq!(config.buy_grid.profit_target, dec!(2));
        assert_eq!(config.epsilon, DUST_EPSILON);
        assert_eq!(config.credentials.get("apikey").unwrap(), "abc");
    }

    #[test]
    fn test_missing_section_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, "[pairs]\npairs = BTC-ETH\n");

        match AppConfig::load(&path, "polo") {
            Err(Error::InvalidConfig(_)) => {}
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_orders_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, &SAMPLE.replace("numberOfOrders = 3", "numberOfOrders = 0"));

        assert!(matches!(
            AppConfig::load(&path, "polo"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_malformed_decimal_is_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, &SAMPLE.replace("size = 30", "size = lots"));

        assert!(matches!(
            AppConfig::load(&path, "polo"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_core_position_fails_at_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, &SAMPLE.replace("ETH = 300\n", ""));

        let config = AppConfig::load(&path, "polo").unwrap();
        assert!(config.core_position("ETH").is_err());
        assert!(config.core_position("XMR").is_ok());
    }

    #[test]
    fn test_rewrite_replaces_only_core_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sample(&dir, SAMPLE);

        let totals = BTreeMap::from([
            ("BTC".to_string(), dec!(2.5)),
            ("ETH".to_string(), dec!(410)),
        ]);
        rewrite_core_positions(&path, &totals).unwrap();

        let config = AppConfig::load(&path, "polo").unwrap();
        assert_eq!(config.core_position("BTC").unwrap(), dec!(2.5));
        assert_eq!(config.core_position("ETH").unwrap(), dec!(410));
        assert!(config.core_position("XMR").is_err());
        // untouched sections survive
        assert_eq!(config.buy_grid.profit_target, dec!(2));
        assert_eq!(config.credentials.get("secret").unwrap(), "def");
    }

    #[test]
    fn test_rewrite_appends_when_section_missing() {
        let dir = tempfile::tempdir().unwrap();
        let without = SAMPLE.replace("[initialcorepositions]\nETH = 300\nXMR = 1250.5\n\n", "");
        let path = write_sample(&dir, &without);

        let totals = BTreeMap::from([("ETH".to_string(), dec!(7))]);
        rewrite_core_positions(&path, &totals).unwrap();

        let config = AppConfig::load(&path, "polo").unwrap();
        assert_eq!(config.core_position("ETH").unwrap(), dec!(7));
    }
}
