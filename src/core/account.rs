//! Account business logic - account records and the balance ledger.
//!
//! [`apply_delta`] is the only code path that changes `current_balance`. Everything
//! that books money (transaction create, update, delete and the account cascade)
//! funnels through it inside its own database transaction.

use crate::{
    core::{fx::RateTable, fx::validate_currency, money::Money, transaction},
    entities::{
        Account, AccountType, RecurringTemplate, Transaction, account, recurring_template,
        transaction as transaction_entity,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{Condition, QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{info, instrument};

/// Input for [`create_account`].
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Display name
    pub name: String,
    /// Kind of account
    pub account_type: AccountType,
    /// ISO 4217 currency code
    pub currency: String,
    /// Opening balance; may be negative (credit cards, loans)
    pub initial_balance: Money,
    /// Optional description
    pub description: Option<String>,
}

/// Partial update for [`update_account`]. The balance is never patched directly.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    /// New name
    pub name: Option<String>,
    /// New account type
    pub account_type: Option<AccountType>,
    /// New description; `Some(None)` clears it
    pub description: Option<Option<String>>,
    /// Activate or deactivate
    pub is_active: Option<bool>,
}

/// Stored balance next to the balance recomputed from history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// `current_balance` as persisted
    pub stored: Money,
    /// `initial_balance` plus the effect of every referencing transaction
    pub expected: Money,
}

impl Reconciliation {
    /// True when the stored balance matches the history.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.stored == self.expected
    }
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation("Account name cannot be empty"));
    }
    Ok(name.to_string())
}

/// Finds an account by id, treating accounts of other owners as absent.
pub(crate) async fn find_owned_account<C>(
    conn: &C,
    account_id: i64,
    owner_id: &str,
) -> Result<Option<account::Model>>
where
    C: ConnectionTrait,
{
    Account::find_by_id(account_id)
        .filter(account::Column::OwnerId.eq(owner_id))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Creates an account whose current balance starts at the opening balance.
#[instrument(skip(db, new), fields(owner = %owner_id))]
pub async fn create_account(
    db: &DatabaseConnection,
    owner_id: &str,
    new: NewAccount,
) -> Result<account::Model> {
    let name = validate_name(&new.name)?;
    let currency = validate_currency(&new.currency)?;
    let now = Utc::now();

    let account = account::ActiveModel {
        owner_id: Set(owner_id.to_string()),
        name: Set(name),
        account_type: Set(new.account_type),
        currency: Set(currency),
        initial_balance: Set(new.initial_balance),
        current_balance: Set(new.initial_balance),
        description: Set(new.description),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(account_id = account.id, "Created account");
    Ok(account)
}

/// Retrieves an owned account.
pub async fn get_account(
    db: &DatabaseConnection,
    account_id: i64,
    owner_id: &str,
) -> Result<account::Model> {
    find_owned_account(db, account_id, owner_id)
        .await?
        .ok_or(Error::AccountNotFound { id: account_id })
}

/// Lists every account of the owner, newest first.
pub async fn list_accounts(db: &DatabaseConnection, owner_id: &str) -> Result<Vec<account::Model>> {
    Account::find()
        .filter(account::Column::OwnerId.eq(owner_id))
        .order_by_desc(account::Column::CreatedAt)
        .order_by_desc(account::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists the owner's active accounts alphabetically.
pub async fn list_active_accounts(
    db: &DatabaseConnection,
    owner_id: &str,
) -> Result<Vec<account::Model>> {
    Account::find()
        .filter(account::Column::OwnerId.eq(owner_id))
        .filter(account::Column::IsActive.eq(true))
        .order_by_asc(account::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Applies a patch to an owned account.
pub async fn update_account(
    db: &DatabaseConnection,
    account_id: i64,
    owner_id: &str,
    patch: AccountPatch,
) -> Result<account::Model> {
    let existing = get_account(db, account_id, owner_id).await?;
    let mut active_model: account::ActiveModel = existing.into();

    if let Some(name) = patch.name {
        active_model.name = Set(validate_name(&name)?);
    }
    if let Some(account_type) = patch.account_type {
        active_model.account_type = Set(account_type);
    }
    if let Some(description) = patch.description {
        active_model.description = Set(description);
    }
    if let Some(is_active) = patch.is_active {
        active_model.is_active = Set(is_active);
    }
    active_model.updated_at = Set(Utc::now());

    active_model.update(db).await.map_err(Into::into)
}

/// Soft-deletes an account: history stays, new transactions are refused.
pub async fn deactivate_account(
    db: &DatabaseConnection,
    account_id: i64,
    owner_id: &str,
) -> Result<account::Model> {
    update_account(
        db,
        account_id,
        owner_id,
        AccountPatch {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
}

/// Adds a signed amount to an account's running balance.
///
/// Performs a single SQL statement,
/// `UPDATE accounts SET current_balance = current_balance + ? WHERE id = ?`,
/// so concurrent writers cannot lose each other's updates. Pass the caller's database
/// transaction as `conn` so the change commits or rolls back with the rest of the unit.
pub async fn apply_delta<C>(conn: &C, account_id: i64, delta: Money) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    let result = Account::update_many()
        .col_expr(
            account::Column::CurrentBalance,
            Expr::col(account::Column::CurrentBalance).add(delta.units()),
        )
        .col_expr(account::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(account::Column::Id.eq(account_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::AccountNotFound { id: account_id });
    }

    Account::find_by_id(account_id)
        .one(conn)
        .await?
        .ok_or(Error::AccountNotFound { id: account_id })
}

/// Hard-deletes an account together with everything that references it.
///
/// Every transaction touching the account is removed with its balance effect reversed,
/// so the other side of a transfer stays consistent. Templates booked against the
/// account are deleted too. Returns `false` when the account is absent or foreign.
#[instrument(skip(db), fields(owner = %owner_id))]
pub async fn delete_account(db: &DatabaseConnection, account_id: i64, owner_id: &str) -> Result<bool> {
    let txn = db.begin().await?;

    if find_owned_account(&txn, account_id, owner_id).await?.is_none() {
        return Ok(false);
    }

    let touching = Transaction::find()
        .filter(
            Condition::any()
                .add(transaction_entity::Column::AccountId.eq(account_id))
                .add(transaction_entity::Column::ToAccountId.eq(account_id)),
        )
        .all(&txn)
        .await?;
    let removed_transactions = touching.len();
    for row in &touching {
        transaction::remove_in(&txn, row).await?;
    }

    let removed_templates = RecurringTemplate::delete_many()
        .filter(recurring_template::Column::AccountId.eq(account_id))
        .exec(&txn)
        .await?
        .rows_affected;

    Account::delete_by_id(account_id).exec(&txn).await?;
    txn.commit().await?;

    info!(
        account_id,
        removed_transactions, removed_templates, "Deleted account with its history"
    );
    Ok(true)
}

/// Sums the owner's active account balances in the rate table's base currency.
pub async fn total_balance(
    db: &DatabaseConnection,
    owner_id: &str,
    rates: &RateTable,
) -> Result<Money> {
    let mut total = Decimal::ZERO;
    for account in list_active_accounts(db, owner_id).await? {
        total += rates.to_base(account.current_balance.to_decimal(), &account.currency)?;
    }
    Money::from_decimal(total)
}

/// Recomputes an account's balance from its history and compares it with the stored one.
pub async fn reconcile_account(
    db: &DatabaseConnection,
    account_id: i64,
    owner_id: &str,
) -> Result<Reconciliation> {
    let account = get_account(db, account_id, owner_id).await?;

    let touching = Transaction::find()
        .filter(
            Condition::any()
                .add(transaction_entity::Column::AccountId.eq(account_id))
                .add(transaction_entity::Column::ToAccountId.eq(account_id)),
        )
        .all(db)
        .await?;

    let mut expected = account.initial_balance;
    for row in &touching {
        for (affected, delta) in transaction::balance_effects(row) {
            if affected == account_id {
                expected = expected.checked_add(delta)?;
            }
        }
    }

    Ok(Reconciliation {
        stored: account.current_balance,
        expected,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::transaction::{NewTransaction, create_transaction},
        entities::TransactionType,
        test_utils::*,
    };
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_create_account_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();

        let result = create_account(
            &db,
            "alice",
            NewAccount {
                name: "   ".to_string(),
                account_type: AccountType::Checking,
                currency: "USD".to_string(),
                initial_balance: Money::ZERO,
                description: None,
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let result = create_account(
            &db,
            "alice",
            NewAccount {
                name: "Wallet".to_string(),
                account_type: AccountType::Cash,
                currency: "dollars".to_string(),
                initial_balance: Money::ZERO,
                description: None,
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Validation { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_starts_at_initial_balance() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Everyday", "250.75").await?;

        assert_eq!(account.initial_balance, money("250.75"));
        assert_eq!(account.current_balance, money("250.75"));
        assert_eq!(account.currency, "USD");
        assert!(account.is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_foreign_account_is_not_found() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Everyday", "10").await?;

        let result = get_account(&db, account.id, "bob").await;
        assert!(matches!(result, Err(Error::AccountNotFound { id }) if id == account.id));

        assert!(!delete_account(&db, account.id, "bob").await?);
        assert!(get_account(&db, account.id, "alice").await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_apply_delta_is_an_increment() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Everyday", "100").await?;

        apply_delta(&db, account.id, money("25.5")).await?;
        let updated = apply_delta(&db, account.id, money("-0.5")).await?;
        assert_eq!(updated.current_balance, money("125"));
        assert_eq!(updated.initial_balance, money("100"));
        Ok(())
    }

    #[tokio::test]
    async fn test_apply_delta_missing_account() -> Result<()> {
        let db = setup_test_db().await?;
        let result = apply_delta(&db, 999, money("1")).await;
        assert!(matches!(result, Err(Error::AccountNotFound { id: 999 })));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_and_deactivate() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Everyday", "100").await?;

        let updated = update_account(
            &db,
            account.id,
            "alice",
            AccountPatch {
                name: Some(" Household ".to_string()),
                description: Some(Some("joint".to_string())),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(updated.name, "Household");
        assert_eq!(updated.description.as_deref(), Some("joint"));
        assert_eq!(updated.current_balance, money("100"));

        let deactivated = deactivate_account(&db, account.id, "alice").await?;
        assert!(!deactivated.is_active);
        assert!(list_active_accounts(&db, "alice").await?.is_empty());
        assert_eq!(list_accounts(&db, "alice").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_cascades_and_restores_counterparty() -> Result<()> {
        let db = setup_test_db().await?;
        let checking = create_test_account(&db, "alice", "Checking", "500").await?;
        let savings = create_test_account(&db, "alice", "Savings", "1000").await?;

        let mut transfer = NewTransaction::new(
            savings.id,
            TransactionType::Transfer,
            money("200"),
            date(2024, 3, 1),
        );
        transfer.to_account_id = Some(checking.id);
        create_transaction(&db, "alice", transfer).await?;
        create_test_transaction(&db, "alice", checking.id, TransactionType::Expense, "50").await?;
        create_test_template(&db, "alice", checking.id, "Rent", "900").await?;

        let savings_now = get_account(&db, savings.id, "alice").await?;
        assert_eq!(savings_now.current_balance, money("800"));

        assert!(delete_account(&db, checking.id, "alice").await?);

        let savings_after = get_account(&db, savings.id, "alice").await?;
        assert_eq!(savings_after.current_balance, money("1000"));
        assert!(Transaction::find().all(&db).await?.is_empty());
        assert!(RecurringTemplate::find().all(&db).await?.is_empty());
        assert!(!delete_account(&db, checking.id, "alice").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_total_balance_converts_to_base() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_account(&db, "alice", "Everyday", "100").await?;
        create_test_account_in_currency(&db, "alice", "Euro card", "EUR", "50").await?;
        create_test_account(&db, "bob", "Other owner", "1000").await?;

        let rates = RateTable::new("USD").with_rate("EUR", "USD", Decimal::new(11, 1));
        assert_eq!(total_balance(&db, "alice", &rates).await?, money("155"));

        let no_rates = RateTable::new("USD");
        let result = total_balance(&db, "alice", &no_rates).await;
        assert!(matches!(result, Err(Error::MissingExchangeRate { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_reconcile_matches_history() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Everyday", "100").await?;
        create_test_transaction(&db, "alice", account.id, TransactionType::Income, "40").await?;
        create_test_transaction(&db, "alice", account.id, TransactionType::Expense, "15.25").await?;

        let reconciliation = reconcile_account(&db, account.id, "alice").await?;
        assert!(reconciliation.is_consistent());
        assert_eq!(reconciliation.stored, money("124.75"));

        // A raw increment that bypasses the transaction store shows up as drift
        apply_delta(&db, account.id, money("1")).await?;
        let drifted = reconcile_account(&db, account.id, "alice").await?;
        assert!(!drifted.is_consistent());
        assert_eq!(drifted.expected, money("124.75"));
        Ok(())
    }
}
