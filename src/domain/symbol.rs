use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A validated trading-pair identifier, e.g. `ETHBTC`.
///
/// Construction always goes through [`Symbol::parse`], so a `Symbol` in
/// hand is guaranteed non-empty ASCII-uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, String> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err("symbol must not be empty".to_string());
        }
        if !raw.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()) {
            return Err(format!("symbol '{raw}' must be ASCII uppercase"));
        }
        Ok(Self(Arc::from(raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Symbol::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_symbol() {
        let symbol = Symbol::parse("ETHBTC").unwrap();
        assert_eq!(symbol.as_str(), "ETHBTC");
    }

    #[test]
    fn rejects_empty() {
        assert!(Symbol::parse("").is_err());
        assert!(Symbol::parse("   ").is_err());
    }

    #[test]
    fn rejects_lowercase() {
        assert!(Symbol::parse("ethbtc").is_err());
    }
}
