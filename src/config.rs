use serde::Deserialize;

use crate::domain::Symbol;
use crate::error::{AggrResult, ConfigError};

/// Process configuration, loaded once at startup from the environment.
///
/// Field names match the bare environment variable names (`ADDR`,
/// `DBURI`, ...); there is no prefix.
#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_dburi")]
    pub dburi: String,
    #[serde(default = "default_symbols", deserialize_with = "deserialize_symbols")]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub log_level: i32,
    #[serde(default = "default_true")]
    pub enable_push: bool,
    #[serde(default)]
    pub enable_persist: bool,
}

fn default_addr() -> String {
    "localhost:8080".to_string()
}

/// Placeholder only: a real deployment must set `DBURI` explicitly. Kept
/// as a default so the persist worker's absence (`ENABLE_PERSIST=false`)
/// doesn't force every deployment to also set a database URL.
fn default_dburi() -> String {
    "postgres://localhost/candle_aggr".to_string()
}

fn default_symbols() -> Vec<Symbol> {
    vec![
        Symbol::parse("ETHBTC").expect("literal default symbol"),
        Symbol::parse("BNBBTC").expect("literal default symbol"),
    ]
}

fn default_true() -> bool {
    true
}

fn deserialize_symbols<'de, D>(deserializer: D) -> Result<Vec<Symbol>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Symbol::parse(s).map_err(serde::de::Error::custom))
        .collect()
}

impl Settings {
    /// Loads settings from process environment variables, layered over
    /// the defaults above. Returns a startup-fatal error on anything
    /// malformed; the caller is expected to exit the process non-zero.
    pub fn load() -> AggrResult<Settings> {
        let settings: Settings = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .map_err(ConfigError::Load)?
            .try_deserialize()
            .map_err(ConfigError::Load)?;

        if settings.symbols.is_empty() {
            return Err(ConfigError::NoSymbols.into());
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_symbols() {
        #[derive(Deserialize)]
        struct Wrapper {
            #[serde(deserialize_with = "deserialize_symbols")]
            symbols: Vec<Symbol>,
        }
        let wrapper: Wrapper = serde_json::from_str(r#"{"symbols":"ETHBTC, BNBBTC"}"#).unwrap();
        assert_eq!(
            wrapper.symbols,
            vec![Symbol::parse("ETHBTC").unwrap(), Symbol::parse("BNBBTC").unwrap()]
        );
    }

    #[test]
    fn default_symbols_match_the_documented_fallback() {
        assert_eq!(
            default_symbols(),
            vec![Symbol::parse("ETHBTC").unwrap(), Symbol::parse("BNBBTC").unwrap()]
        );
    }

    #[test]
    fn default_dburi_is_a_placeholder_not_empty() {
        assert!(!default_dburi().is_empty());
    }
}
