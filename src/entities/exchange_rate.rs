//! Exchange rate entity - How many units of `to_currency` one unit of `from_currency` buys.
//!
//! Rates are stored as decimal text so they survive SQLite without float rounding.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Exchange rate database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "exchange_rates")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Source currency code
    pub from_currency: String,
    /// Target currency code
    pub to_currency: String,
    /// Decimal rate, e.g. `"110.25000000"`
    pub rate: String,
    /// When the rate was last set
    pub updated_at: DateTimeUtc,
}

/// `ExchangeRate` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
