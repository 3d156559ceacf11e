//! Trading pair symbols.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Error;

/// An ordered market symbol in canonical `BASE-QUOTE` form, e.g. `BTC-ETH`.
///
/// The first component is the pricing asset; [`Pair::counter`] names the coin
/// the account actually accumulates and that grid sizing reads balances for
/// (`ETH` for `BTC-ETH`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Pair {
    base: String,
    quote: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// The pricing asset (`BTC` for `BTC-ETH`).
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The counter currency (`ETH` for `BTC-ETH`).
    pub fn counter(&self) -> &str {
        &self.quote
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for Pair {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('-') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() && !quote.contains('-') => {
                Ok(Self::new(base, quote))
            }
            _ => Err(Error::InvalidConfig(format!(
                "pair {s:?} is not in BASE-QUOTE form"
            ))),
        }
    }
}

impl From<Pair> for String {
    fn from(pair: Pair) -> Self {
        pair.to_string()
    }
}

impl TryFrom<String> for Pair {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_round_trip() {
        let pair: Pair = "BTC-ETH".parse().unwrap();
        assert_eq!(pair.base(), "BTC");
        assert_eq!(pair.counter(), "ETH");
        assert_eq!(pair.to_string(), "BTC-ETH");
    }

    #[test]
    fn test_rejects_malformed_symbols() {
        assert!("BTCETH".parse::<Pair>().is_err());
        assert!("-ETH".parse::<Pair>().is_err());
        assert!("BTC-".parse::<Pair>().is_err());
        assert!("BTC-ETH-X".parse::<Pair>().is_err());
    }

    #[test]
    fn test_serde_as_canonical_string() {
        let pair: Pair = "BTC-ETH".parse().unwrap();
        let json = serde_json::to_string(&pair).unwrap();
        assert_eq!(json, "\"BTC-ETH\"");
        let back: Pair = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pair);
    }
}
