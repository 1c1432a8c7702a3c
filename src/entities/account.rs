//! Account entity - A place money lives: a bank account, a wallet, a credit card.
//!
//! `current_balance` is only ever changed through
//! [`crate::core::account::apply_delta`]; it always equals `initial_balance` plus the
//! signed effect of every transaction that references the account.

use crate::core::money::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of account, used for display and grouping only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    /// Everyday bank account
    #[sea_orm(string_value = "checking")]
    Checking,
    /// Savings account
    #[sea_orm(string_value = "savings")]
    Savings,
    /// Credit card, usually carrying a negative balance
    #[sea_orm(string_value = "credit_card")]
    CreditCard,
    /// Physical cash
    #[sea_orm(string_value = "cash")]
    Cash,
    /// Brokerage or investment account
    #[sea_orm(string_value = "investment")]
    Investment,
    /// Loan or mortgage
    #[sea_orm(string_value = "loan")]
    Loan,
    /// Anything else
    #[sea_orm(string_value = "other")]
    Other,
}

/// Account database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    /// Unique identifier for the account
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user
    pub owner_id: String,
    /// Human-readable name (e.g., "Everyday", "Visa")
    pub name: String,
    /// Kind of account
    pub account_type: AccountType,
    /// ISO 4217 currency code
    pub currency: String,
    /// Balance the account was opened with
    #[sea_orm(column_type = "BigInteger")]
    pub initial_balance: Money,
    /// Running balance
    #[sea_orm(column_type = "BigInteger")]
    pub current_balance: Money,
    /// Optional free-text description
    pub description: Option<String>,
    /// Deactivated accounts keep their history but accept no new transactions
    pub is_active: bool,
    /// When the account was created
    pub created_at: DateTimeUtc,
    /// When the account was last modified
    pub updated_at: DateTimeUtc,
}

/// Accounts are referenced by transactions and templates, but cleanup is explicit.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
