use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque storage key of a tracked instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentId(pub i64);

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asset category of a tracked instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetCategory {
    Stock,
    Etf,
    Crypto,
}

impl AssetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Stock => "STOCK",
            AssetCategory::Etf => "ETF",
            AssetCategory::Crypto => "CRYPTO",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STOCK" => Ok(AssetCategory::Stock),
            "ETF" => Ok(AssetCategory::Etf),
            "CRYPTO" => Ok(AssetCategory::Crypto),
            other => Err(format!("unknown asset category '{other}'")),
        }
    }
}

/// A tracked tradable asset.
///
/// Created on first sighting of a symbol, never deleted by the reconciler.
/// The symbol may be corrected later if it was misresolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub symbol: String,
    pub category: AssetCategory,
}

impl Instrument {
    pub fn new(id: InstrumentId, symbol: impl Into<String>, category: AssetCategory) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            category,
        }
    }
}
