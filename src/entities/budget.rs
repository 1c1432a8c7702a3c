//! Budget entity - A spending limit for one category, or for all categories, over a period.

use crate::core::money::Money;
use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Length of a budget window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    /// Seven days
    #[sea_orm(string_value = "weekly")]
    Weekly,
    /// One calendar month
    #[sea_orm(string_value = "monthly")]
    Monthly,
    /// One calendar year
    #[sea_orm(string_value = "yearly")]
    Yearly,
}

/// Budget database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    /// Unique identifier for the budget
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user
    pub owner_id: String,
    /// Tracked category; `None` tracks every expense
    pub category_id: Option<i64>,
    /// Display name
    pub name: String,
    /// Spending limit for the window
    #[sea_orm(column_type = "BigInteger")]
    pub amount: Money,
    /// ISO 4217 currency code of `amount`
    pub currency: String,
    /// Window length used when `end_date` is absent
    pub period: BudgetPeriod,
    /// First day of the window
    pub start_date: NaiveDate,
    /// Explicit last day of the window
    pub end_date: Option<NaiveDate>,
    /// Percentage of the limit at which an alert fires
    pub alert_threshold: i32,
    /// Whether unspent budget carries into the next window
    pub allow_rollover: bool,
    /// Whether alerts fire at all
    pub alert_enabled: bool,
    /// Inactive budgets are kept but not evaluated in bulk
    pub is_active: bool,
    /// When the budget was created
    pub created_at: DateTimeUtc,
    /// When the budget was last modified
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
