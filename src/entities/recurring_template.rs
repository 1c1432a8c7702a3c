//! Recurring template entity - A repeatable transaction pattern (rent, salary, a subscription).
//!
//! `next_occurrence` and `last_created` are written only by the recurring processor;
//! users edit everything else.

use super::transaction::TransactionType;
use crate::core::money::Money;
use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// How often a template repeats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every day
    #[sea_orm(string_value = "daily")]
    Daily,
    /// Every 7 days
    #[sea_orm(string_value = "weekly")]
    Weekly,
    /// Every 14 days
    #[sea_orm(string_value = "biweekly")]
    Biweekly,
    /// Every calendar month
    #[sea_orm(string_value = "monthly")]
    Monthly,
    /// Every three calendar months
    #[sea_orm(string_value = "quarterly")]
    Quarterly,
    /// Every calendar year
    #[sea_orm(string_value = "yearly")]
    Yearly,
}

/// Recurring template database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "recurring_templates")]
pub struct Model {
    /// Unique identifier for the template
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user
    pub owner_id: String,
    /// Account the materialized transactions are booked against
    pub account_id: i64,
    /// Optional category copied onto materialized transactions
    pub category_id: Option<i64>,
    /// Display name (e.g., "Rent")
    pub name: String,
    /// Description copied onto materialized transactions; falls back to `name`
    pub description: Option<String>,
    /// Income or expense
    pub transaction_type: TransactionType,
    /// Amount of each occurrence
    #[sea_orm(column_type = "BigInteger")]
    pub amount: Money,
    /// ISO 4217 currency code
    pub currency: String,
    /// Repetition rule
    pub frequency: Frequency,
    /// First day of the schedule
    pub start_date: NaiveDate,
    /// Last day on which occurrences may be materialized; `None` repeats indefinitely
    pub end_date: Option<NaiveDate>,
    /// Date of the next occurrence to materialize
    pub next_occurrence: NaiveDate,
    /// Preferred day of month for monthly and quarterly schedules (1-31)
    pub day_of_month: Option<i32>,
    /// Preferred weekday for weekly and biweekly schedules (0 = Sunday .. 6)
    pub day_of_week: Option<i32>,
    /// Inactive templates are never materialized
    pub is_active: bool,
    /// Whether the processor may materialize without a user action
    pub auto_create: bool,
    /// When the processor last materialized this template
    pub last_created: Option<DateTimeUtc>,
    /// When the template was created
    pub created_at: DateTimeUtc,
    /// When the template was last modified
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
