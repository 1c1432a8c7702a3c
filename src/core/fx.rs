//! Currency conversion for aggregate views.
//!
//! Totals that span currencies (account totals, period summaries, budget spend)
//! all go through one [`RateTable`]. A pair is resolved directly, through its
//! inverse, or through the table's base currency. A pair that cannot be resolved is
//! an error; amounts are never silently treated as 1:1.

use crate::{
    entities::{ExchangeRate, exchange_rate},
    errors::{Error, Result},
};
use rust_decimal::Decimal;
use sea_orm::{Set, prelude::*};
use std::{collections::HashMap, str::FromStr};
use tracing::debug;

/// Known rates plus the currency aggregates are reported in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateTable {
    base: String,
    rates: HashMap<(String, String), Decimal>,
}

impl RateTable {
    /// An empty table: only same-currency conversions succeed.
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: normalize_code(&base.into()),
            rates: HashMap::new(),
        }
    }

    /// Currency aggregates are expressed in.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Registers `1 from = rate to`.
    pub fn insert(&mut self, from: &str, to: &str, rate: Decimal) {
        self.rates
            .insert((normalize_code(from), normalize_code(to)), rate);
    }

    /// Builder form of [`RateTable::insert`].
    #[must_use]
    pub fn with_rate(mut self, from: &str, to: &str, rate: Decimal) -> Self {
        self.insert(from, to, rate);
        self
    }

    /// Rate for `from -> to`, if one can be derived.
    #[must_use]
    pub fn rate(&self, from: &str, to: &str) -> Option<Decimal> {
        self.resolve(&normalize_code(from), &normalize_code(to))
            .and_then(|route| route.apply(Decimal::ONE))
    }

    /// Converts `amount` from one currency to another.
    ///
    /// A pair stored only in the other direction divides by the stored rate, so
    /// converting back and forth through one rate is exact.
    pub fn convert(&self, amount: Decimal, from: &str, to: &str) -> Result<Decimal> {
        let from = normalize_code(from);
        let to = normalize_code(to);
        let route = self
            .resolve(&from, &to)
            .ok_or_else(|| Error::MissingExchangeRate { from, to })?;
        route.apply(amount).ok_or(Error::AmountOverflow)
    }

    fn resolve(&self, from: &str, to: &str) -> Option<Route> {
        if from == to {
            return Some(Route::Direct(Leg::Identity));
        }
        if let Some(leg) = self.leg(from, to) {
            return Some(Route::Direct(leg));
        }
        Some(Route::ViaBase(self.leg(from, &self.base)?, self.leg(&self.base, to)?))
    }

    fn leg(&self, from: &str, to: &str) -> Option<Leg> {
        if from == to {
            return Some(Leg::Identity);
        }
        if let Some(rate) = self.rates.get(&(from.to_string(), to.to_string())) {
            return Some(Leg::Multiply(*rate));
        }
        self.rates
            .get(&(to.to_string(), from.to_string()))
            .filter(|rate| !rate.is_zero())
            .map(|rate| Leg::Divide(*rate))
    }

    /// Converts `amount` into the base currency.
    pub fn to_base(&self, amount: Decimal, from: &str) -> Result<Decimal> {
        self.convert(amount, from, self.base())
    }
}

#[derive(Debug, Clone, Copy)]
enum Leg {
    Identity,
    Multiply(Decimal),
    Divide(Decimal),
}

impl Leg {
    fn apply(self, amount: Decimal) -> Option<Decimal> {
        match self {
            Self::Identity => Some(amount),
            Self::Multiply(rate) => amount.checked_mul(rate),
            Self::Divide(rate) => amount.checked_div(rate),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Route {
    Direct(Leg),
    ViaBase(Leg, Leg),
}

impl Route {
    fn apply(self, amount: Decimal) -> Option<Decimal> {
        match self {
            Self::Direct(leg) => leg.apply(amount),
            Self::ViaBase(to_base, from_base) => from_base.apply(to_base.apply(amount)?),
        }
    }
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Checks that `code` looks like an ISO 4217 code and returns it upper-cased.
pub fn validate_currency(code: &str) -> Result<String> {
    let code = normalize_code(code);
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(Error::validation(format!(
            "Currency must be a three-letter ISO 4217 code, got '{code}'"
        )))
    }
}

/// Loads every stored rate into a table reporting in `base`.
pub async fn load_rate_table<C>(db: &C, base: &str) -> Result<RateTable>
where
    C: ConnectionTrait,
{
    let mut table = RateTable::new(base);
    for row in ExchangeRate::find().all(db).await? {
        let rate = Decimal::from_str(&row.rate).map_err(|e| Error::Config {
            message: format!(
                "Invalid rate '{}' for {}/{}: {e}",
                row.rate, row.from_currency, row.to_currency
            ),
        })?;
        table.insert(&row.from_currency, &row.to_currency, rate);
    }
    debug!(base, pairs = table.rates.len(), "Loaded exchange rates");
    Ok(table)
}

/// Inserts or replaces the rate for `from -> to`.
pub async fn set_exchange_rate<C>(
    db: &C,
    from: &str,
    to: &str,
    rate: Decimal,
) -> Result<exchange_rate::Model>
where
    C: ConnectionTrait,
{
    let from = validate_currency(from)?;
    let to = validate_currency(to)?;
    if rate <= Decimal::ZERO {
        return Err(Error::validation("Exchange rate must be positive"));
    }
    let now = chrono::Utc::now();

    let existing = ExchangeRate::find()
        .filter(exchange_rate::Column::FromCurrency.eq(from.as_str()))
        .filter(exchange_rate::Column::ToCurrency.eq(to.as_str()))
        .one(db)
        .await?;

    if let Some(row) = existing {
        let mut active_model: exchange_rate::ActiveModel = row.into();
        active_model.rate = Set(rate.to_string());
        active_model.updated_at = Set(now);
        active_model.update(db).await.map_err(Into::into)
    } else {
        exchange_rate::ActiveModel {
            from_currency: Set(from),
            to_currency: Set(to),
            rate: Set(rate.to_string()),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(Into::into)
    }
}
