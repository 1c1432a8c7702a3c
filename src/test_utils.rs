//! Shared test utilities.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

#![allow(clippy::unwrap_used)]

use crate::{
    core::{
        account::{NewAccount, create_account},
        category::{NewCategory, create_category},
        money::Money,
        recurring::{NewTemplate, create_template},
        transaction::{NewTransaction, create_transaction},
    },
    entities::{
        AccountType, CategoryType, Frequency, TransactionType, account, category,
        recurring_template, transaction,
    },
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Routes `tracing` output through the test harness so it shows up for failing tests.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Parses an amount literal such as `"12.50"`.
pub fn money(amount: &str) -> Money {
    Money::from_str(amount).unwrap()
}

/// Builds a calendar date.
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Creates a USD checking account.
pub async fn create_test_account(
    db: &DatabaseConnection,
    owner_id: &str,
    name: &str,
    initial_balance: &str,
) -> Result<account::Model> {
    create_test_account_in_currency(db, owner_id, name, "USD", initial_balance).await
}

/// Creates a checking account in the given currency.
pub async fn create_test_account_in_currency(
    db: &DatabaseConnection,
    owner_id: &str,
    name: &str,
    currency: &str,
    initial_balance: &str,
) -> Result<account::Model> {
    create_account(
        db,
        owner_id,
        NewAccount {
            name: name.to_string(),
            account_type: AccountType::Checking,
            currency: currency.to_string(),
            initial_balance: money(initial_balance),
            description: None,
        },
    )
    .await
}

/// Creates a top-level category.
pub async fn create_test_category(
    db: &DatabaseConnection,
    owner_id: &str,
    name: &str,
    category_type: CategoryType,
) -> Result<category::Model> {
    create_category(db, owner_id, NewCategory::new(name, category_type)).await
}

/// Books an income or expense dated 2024-03-15.
pub async fn create_test_transaction(
    db: &DatabaseConnection,
    owner_id: &str,
    account_id: i64,
    transaction_type: TransactionType,
    amount: &str,
) -> Result<transaction::Model> {
    create_transaction(
        db,
        owner_id,
        NewTransaction::new(account_id, transaction_type, money(amount), date(2024, 3, 15)),
    )
    .await
}

/// Creates a monthly, auto-created expense template starting 2024-01-01.
///
/// Its first occurrence is 2024-02-01.
pub async fn create_test_template(
    db: &DatabaseConnection,
    owner_id: &str,
    account_id: i64,
    name: &str,
    amount: &str,
) -> Result<recurring_template::Model> {
    create_template(
        db,
        owner_id,
        NewTemplate::new(
            account_id,
            name,
            money(amount),
            Frequency::Monthly,
            date(2024, 1, 1),
        ),
    )
    .await
}
