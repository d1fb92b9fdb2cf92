//! Application configuration.

use crate::error::{AppError, AppResult};
use las_api::ApiConfig;
use las_channel::LndConfig;
use las_core::ReconnectPolicy;
use las_feed::BitmexFeedConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the hex-encoded LND macaroon.
pub const MACAROON_ENV: &str = "LND_MACAROON_HEX";

/// Request handling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Margin invoice as a percentage of the collateral.
    #[serde(default = "default_percent_margin")]
    pub percent_margin: Decimal,
}

fn default_percent_margin() -> Decimal {
    Decimal::ONE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            percent_margin: default_percent_margin(),
        }
    }
}

/// Supported assets and their fixed cross rates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Asset the price feed quotes.
    #[serde(default = "default_reference")]
    pub reference: String,
    /// Units of each asset per unit of the reference asset.
    #[serde(default = "default_cross_rates")]
    pub cross_rates: BTreeMap<String, Decimal>,
}

fn default_reference() -> String {
    "USD".to_string()
}

fn default_cross_rates() -> BTreeMap<String, Decimal> {
    BTreeMap::from([
        ("USD".to_string(), Decimal::ONE),
        ("NOK".to_string(), Decimal::TEN),
    ])
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            reference: default_reference(),
            cross_rates: default_cross_rates(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Open contracts not rebalanced for this long are liquidated.
    #[serde(default = "default_staleness_timeout_ms")]
    pub staleness_timeout_ms: u64,
    /// Periodic sweep interval (0 = price-driven sweeps only).
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_staleness_timeout_ms() -> u64 {
    30_000
}

fn default_sweep_interval_ms() -> u64 {
    10_000
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            staleness_timeout_ms: default_staleness_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl RebalanceConfig {
    pub fn staleness_timeout(&self) -> Duration {
        Duration::from_millis(self.staleness_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }
}

/// Timeouts for calls to the node, peers and hedge venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

impl ExternalConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database directory. A leading `~` is the home directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "~/.las".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    /// Database path with `~` expanded.
    pub fn data_path(&self) -> PathBuf {
        expand_home(&self.data_dir, std::env::var("HOME").ok().as_deref())
    }
}

fn expand_home(path: &str, home: Option<&str>) -> PathBuf {
    match (path.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            PathBuf::from(format!("{home}{rest}"))
        }
        _ => PathBuf::from(path),
    }
}

/// LND REST node settings. The macaroon is read from `LND_MACAROON_HEX`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LndSection {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_rest_url() -> String {
    "https://localhost:8080".to_string()
}

impl Default for LndSection {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            accept_invalid_certs: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Scheme for peer hosts given without one.
    #[serde(default = "default_peer_scheme")]
    pub scheme: String,
}

fn default_peer_scheme() -> String {
    "http".to_string()
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            scheme: default_peer_scheme(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Asset the instrument's price is recorded for.
    #[serde(default = "default_reference")]
    pub asset: String,
    /// Minimum absolute move before a tick triggers a sweep.
    #[serde(default = "default_min_change")]
    pub min_change: Decimal,
}

fn default_ws_url() -> String {
    "wss://www.bitmex.com/realtime?subscribe=instrument:XBTUSD".to_string()
}

fn default_symbol() -> String {
    "XBTUSD".to_string()
}

fn default_min_change() -> Decimal {
    Decimal::ONE
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            symbol: default_symbol(),
            asset: default_reference(),
            min_change: default_min_change(),
        }
    }
}

/// Hedge venue selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HedgeMode {
    /// Fill every order locally.
    #[default]
    Paper,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HedgeConfig {
    #[serde(default)]
    pub mode: HedgeMode,
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    #[serde(default)]
    pub external: ExternalConfig,
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub lnd: LndSection,
    #[serde(default)]
    pub peer: PeerConfig,
    #[serde(default)]
    pub price_feed: PriceFeedConfig,
    #[serde(default)]
    pub hedge: HedgeConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl AppConfig {
    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        let margin = self.server.percent_margin;
        if margin <= Decimal::ZERO || margin > Decimal::ONE_HUNDRED {
            return Err(AppError::Config(format!(
                "server.percent_margin must be in (0, 100], got {margin}"
            )));
        }
        if self.rebalance.staleness_timeout_ms == 0 {
            return Err(AppError::Config(
                "rebalance.staleness_timeout_ms must be positive".to_string(),
            ));
        }
        if self.price_feed.asset != self.assets.reference {
            return Err(AppError::Config(format!(
                "price_feed.asset {} must be the reference asset {}",
                self.price_feed.asset, self.assets.reference
            )));
        }
        Ok(())
    }

    pub fn lnd_config(&self) -> LndConfig {
        LndConfig {
            rest_url: self.lnd.rest_url.clone(),
            macaroon_hex: std::env::var(MACAROON_ENV).ok().filter(|m| !m.is_empty()),
            accept_invalid_certs: self.lnd.accept_invalid_certs,
            call_timeout: self.external.call_timeout(),
        }
    }

    pub fn feed_config(&self) -> BitmexFeedConfig {
        BitmexFeedConfig {
            url: self.price_feed.ws_url.clone(),
            symbol: self.price_feed.symbol.clone(),
            asset: self.price_feed.asset.clone(),
            min_change: self.price_feed.min_change,
            reconnect: self.reconnect.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();

        assert_eq!(config.server.percent_margin, dec!(1));
        assert_eq!(config.assets.reference, "USD");
        assert_eq!(config.assets.cross_rates.get("NOK"), Some(&dec!(10)));
        assert_eq!(config.rebalance.staleness_timeout(), Duration::from_secs(30));
        assert_eq!(config.rebalance.sweep_interval(), Some(Duration::from_secs(10)));
        assert_eq!(config.reconnect.max_attempts, 0);
        assert_eq!(config.hedge.mode, HedgeMode::Paper);
        assert_eq!(config.api.port, 8080);
        assert!(config.api.enabled);
    }

    #[test]
    fn test_shipped_config_parses() {
        let config = AppConfig::from_toml(include_str!("../../../config/default.toml")).unwrap();

        assert_eq!(config.price_feed.symbol, "XBTUSD");
        assert_eq!(config.peer.scheme, "http");
        assert!(config.assets.cross_rates.contains_key("NOK"));
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            percent_margin = "2.5"

            [rebalance]
            sweep_interval_ms = 0

            [assets]
            reference = "USD"
            cross_rates = { USD = "1", SEK = "10.5" }

            [reconnect]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.percent_margin, dec!(2.5));
        assert_eq!(config.rebalance.sweep_interval(), None);
        assert_eq!(config.assets.cross_rates.get("SEK"), Some(&dec!(10.5)));
        assert!(!config.assets.cross_rates.contains_key("NOK"));
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.feed_config().reconnect.max_attempts, 5);
    }

    #[test]
    fn test_invalid_margin_is_rejected() {
        for margin in ["0", "-1", "101"] {
            let toml = format!("[server]\npercent_margin = \"{margin}\"\n");
            assert!(matches!(
                AppConfig::from_toml(&toml),
                Err(AppError::Config(_))
            ));
        }
    }

    #[test]
    fn test_feed_asset_must_be_reference() {
        let err = AppConfig::from_toml("[price_feed]\nasset = \"NOK\"\n").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_unknown_hedge_mode_is_rejected() {
        assert!(AppConfig::from_toml("[hedge]\nmode = \"bitmex\"\n").is_err());
    }

    #[test]
    fn test_home_expansion() {
        assert_eq!(
            expand_home("~/.las", Some("/home/alice")),
            PathBuf::from("/home/alice/.las")
        );
        assert_eq!(expand_home("~", Some("/root")), PathBuf::from("/root"));
        assert_eq!(expand_home("~bob/x", Some("/root")), PathBuf::from("~bob/x"));
        assert_eq!(expand_home("/var/las", Some("/root")), PathBuf::from("/var/las"));
        assert_eq!(expand_home("~/.las", None), PathBuf::from("~/.las"));
    }
}
