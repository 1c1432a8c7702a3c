//! Settings loading from the TOML settings file.
//!
//! The file is optional; a missing file yields [`Settings::default`]. Exchange rates
//! listed in it are written to the `exchange_rates` table at start-up.
//!
//! ```toml
//! base_currency = "USD"
//! summary_includes_recurring = false
//!
//! [[exchange_rates]]
//! from = "EUR"
//! to = "USD"
//! rate = "1.0850"
//! ```

use crate::{
    core::{
        fx::{RateTable, load_rate_table, set_exchange_rate, validate_currency},
        transaction::RecurringScope,
    },
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Settings file used when `FINANCE_CONFIG` is not set.
pub const DEFAULT_SETTINGS_PATH: &str = "config.toml";

/// Contents of the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Currency aggregate views are reported in
    pub base_currency: String,
    /// Whether period summaries count transactions created from recurring templates
    pub summary_includes_recurring: bool,
    /// Rates seeded into the database at start-up
    pub exchange_rates: Vec<RateConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_currency: "USD".to_string(),
            summary_includes_recurring: false,
            exchange_rates: Vec::new(),
        }
    }
}

impl Settings {
    /// Summary scope selected by `summary_includes_recurring`.
    #[must_use]
    pub const fn recurring_scope(&self) -> RecurringScope {
        RecurringScope::from_setting(self.summary_includes_recurring)
    }

    /// Rate table built from the configured rates only.
    #[must_use]
    pub fn rate_table(&self) -> RateTable {
        let mut table = RateTable::new(self.base_currency.as_str());
        for rate in &self.exchange_rates {
            table.insert(&rate.from, &rate.to, rate.rate);
        }
        table
    }
}

/// One configured exchange rate: `1 from = rate to`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RateConfig {
    /// Source currency code
    pub from: String,
    /// Target currency code
    pub to: String,
    /// Units of `to` per unit of `from`, written as a string to keep it exact
    pub rate: Decimal,
}

/// Parses settings from TOML text and validates the currency codes.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let mut settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse settings: {e}"),
    })?;
    settings.base_currency = validate_currency(&settings.base_currency)?;
    for rate in &mut settings.exchange_rates {
        rate.from = validate_currency(&rate.from)?;
        rate.to = validate_currency(&rate.to)?;
        if rate.rate <= Decimal::ZERO {
            return Err(Error::Config {
                message: format!("Exchange rate {}/{} must be positive", rate.from, rate.to),
            });
        }
    }
    Ok(settings)
}

/// Loads settings from a TOML file. A missing file yields the defaults.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "No settings file, using defaults");
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read settings file {}: {e}", path.display()),
    })?;
    parse_settings(&contents)
}

/// Loads settings from `FINANCE_CONFIG`, or `./config.toml` when unset.
pub fn load_default_settings() -> Result<Settings> {
    let path =
        std::env::var("FINANCE_CONFIG").unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string());
    load_settings(path)
}

/// Writes the configured rates to the database, replacing stored values for the same pairs.
pub async fn seed_exchange_rates<C>(db: &C, settings: &Settings) -> Result<()>
where
    C: ConnectionTrait,
{
    for rate in &settings.exchange_rates {
        set_exchange_rate(db, &rate.from, &rate.to, rate.rate).await?;
    }
    if !settings.exchange_rates.is_empty() {
        info!(count = settings.exchange_rates.len(), "Seeded exchange rates");
    }
    Ok(())
}

/// Rate table from everything stored in the database, reporting in the base currency.
pub async fn rate_table<C>(db: &C, settings: &Settings) -> Result<RateTable>
where
    C: ConnectionTrait,
{
    load_rate_table(db, &settings.base_currency).await
}
