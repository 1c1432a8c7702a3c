//! Transaction entity - A single dated movement of money.
//!
//! Income and expense touch one account; a transfer moves `amount` from `account_id`
//! to `to_account_id`. `recurring_template_id` records which template, if any,
//! materialized the row.

use crate::core::money::Money;
use chrono::NaiveDate;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Money coming in
    #[sea_orm(string_value = "income")]
    Income,
    /// Money going out
    #[sea_orm(string_value = "expense")]
    Expense,
    /// Money moving between two accounts of the same owner
    #[sea_orm(string_value = "transfer")]
    Transfer,
}

/// Transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    /// Unique identifier for the transaction
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user
    pub owner_id: String,
    /// Source account (the only account for income and expense)
    pub account_id: i64,
    /// Optional category
    pub category_id: Option<i64>,
    /// Income, expense or transfer
    pub transaction_type: TransactionType,
    /// Always strictly positive; direction comes from `transaction_type`
    #[sea_orm(column_type = "BigInteger")]
    pub amount: Money,
    /// ISO 4217 currency code
    pub currency: String,
    /// Booking date
    pub date: NaiveDate,
    /// Short description
    pub description: Option<String>,
    /// Longer notes
    pub notes: Option<String>,
    /// Who was paid or who paid
    pub payee: Option<String>,
    /// Invoice number, cheque number and the like
    pub reference: Option<String>,
    /// Destination account, present exactly for transfers
    pub to_account_id: Option<i64>,
    /// Template that materialized this transaction
    pub recurring_template_id: Option<i64>,
    /// When the transaction was created
    pub created_at: DateTimeUtc,
    /// When the transaction was last modified
    pub updated_at: DateTimeUtc,
}

/// Splits and balances are maintained by the transaction service.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
