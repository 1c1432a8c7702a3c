//! Transaction business logic - booking, editing and removing money movements.
//!
//! Every write runs inside one database transaction and keeps account balances in step
//! through [`crate::core::account::apply_delta`]:
//!
//! | type     | `account_id` | `to_account_id` |
//! |----------|--------------|-----------------|
//! | income   | + amount     | n/a             |
//! | expense  | - amount     | n/a             |
//! | transfer | - amount     | + amount        |
//!
//! Updates reverse the old effects before applying the new ones, and deletes reverse
//! the effects before removing the row.

use crate::{
    core::{
        account::{apply_delta, find_owned_account},
        category::{require_category, require_optional_category},
        fx::{RateTable, validate_currency},
        money::Money,
    },
    entities::{
        Transaction, TransactionSplit, TransactionType, account, transaction, transaction_split,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{Condition, QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use serde::Serialize;
use tracing::{debug, info, instrument};

/// Default page size for [`list_transactions`].
pub const DEFAULT_LIST_LIMIT: u64 = 100;

/// One category share of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSplit {
    /// Category receiving this share
    pub category_id: i64,
    /// Share of the amount, strictly positive
    pub amount: Money,
    /// Optional note for this share
    pub description: Option<String>,
}

/// Input for [`create_transaction`].
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Source account
    pub account_id: i64,
    /// Optional category
    pub category_id: Option<i64>,
    /// Income, expense or transfer
    pub transaction_type: TransactionType,
    /// Strictly positive amount
    pub amount: Money,
    /// Currency code; defaults to the source account's currency
    pub currency: Option<String>,
    /// Booking date
    pub date: NaiveDate,
    /// Short description
    pub description: Option<String>,
    /// Longer notes
    pub notes: Option<String>,
    /// Counterparty
    pub payee: Option<String>,
    /// External reference
    pub reference: Option<String>,
    /// Destination account, required for transfers
    pub to_account_id: Option<i64>,
    /// Category shares; empty means no split
    pub splits: Vec<NewSplit>,
}

impl NewTransaction {
    /// A transaction with only the required fields set.
    #[must_use]
    pub const fn new(
        account_id: i64,
        transaction_type: TransactionType,
        amount: Money,
        date: NaiveDate,
    ) -> Self {
        Self {
            account_id,
            category_id: None,
            transaction_type,
            amount,
            currency: None,
            date,
            description: None,
            notes: None,
            payee: None,
            reference: None,
            to_account_id: None,
            splits: Vec::new(),
        }
    }
}

/// Partial update for [`update_transaction`]. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct TransactionPatch {
    /// Move to another source account
    pub account_id: Option<i64>,
    /// Change or clear the category
    pub category_id: Option<Option<i64>>,
    /// Change the direction
    pub transaction_type: Option<TransactionType>,
    /// Change the amount
    pub amount: Option<Money>,
    /// Change the currency code
    pub currency: Option<String>,
    /// Change the booking date
    pub date: Option<NaiveDate>,
    /// Change or clear the description
    pub description: Option<Option<String>>,
    /// Change or clear the notes
    pub notes: Option<Option<String>>,
    /// Change or clear the payee
    pub payee: Option<Option<String>>,
    /// Change or clear the reference
    pub reference: Option<Option<String>>,
    /// Change or clear the destination account
    pub to_account_id: Option<Option<i64>>,
    /// Replace all splits; an empty list removes them
    pub splits: Option<Vec<NewSplit>>,
}

/// Filters for [`list_transactions`]. Dates are inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionFilter {
    /// Earliest booking date
    pub start_date: Option<NaiveDate>,
    /// Latest booking date
    pub end_date: Option<NaiveDate>,
    /// Transactions touching this account on either side
    pub account_id: Option<i64>,
    /// Only this category
    pub category_id: Option<i64>,
    /// Only this direction
    pub transaction_type: Option<TransactionType>,
    /// Page size
    pub limit: u64,
    /// Rows to skip
    pub offset: u64,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            account_id: None,
            category_id: None,
            transaction_type: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

/// Whether period summaries count transactions materialized from recurring templates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecurringScope {
    /// Only hand-entered transactions
    #[default]
    Exclude,
    /// Everything in the period
    Include,
}

impl RecurringScope {
    /// Maps the `summary_includes_recurring` setting onto a scope.
    #[must_use]
    pub const fn from_setting(include_recurring: bool) -> Self {
        if include_recurring {
            Self::Include
        } else {
            Self::Exclude
        }
    }
}

/// Income and expense totals for a period, in the rate table's base currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    /// Currency the totals are expressed in
    pub currency: String,
    /// Sum of income
    pub total_income: Money,
    /// Sum of expenses
    pub total_expense: Money,
    /// Income minus expenses
    pub net_income: Money,
    /// Rows considered, transfers included
    pub transaction_count: u64,
}

/// Signed balance changes a transaction causes, as `(account_id, delta)` pairs.
#[must_use]
pub fn balance_effects(transaction: &transaction::Model) -> Vec<(i64, Money)> {
    match transaction.transaction_type {
        TransactionType::Income => vec![(transaction.account_id, transaction.amount)],
        TransactionType::Expense => vec![(transaction.account_id, -transaction.amount)],
        TransactionType::Transfer => {
            let mut effects = vec![(transaction.account_id, -transaction.amount)];
            if let Some(to_account_id) = transaction.to_account_id {
                effects.push((to_account_id, transaction.amount));
            }
            effects
        }
    }
}

fn validate_shape(
    transaction_type: TransactionType,
    account_id: i64,
    to_account_id: Option<i64>,
    amount: Money,
) -> Result<()> {
    if !amount.is_positive() {
        return Err(Error::validation("Amount must be greater than zero"));
    }
    match (transaction_type, to_account_id) {
        (TransactionType::Transfer, None) => Err(Error::validation(
            "Transfers require a destination account",
        )),
        (TransactionType::Transfer, Some(to)) if to == account_id => Err(Error::validation(
            "Transfer destination must differ from the source account",
        )),
        (TransactionType::Income | TransactionType::Expense, Some(_)) => Err(Error::validation(
            "Only transfers may have a destination account",
        )),
        _ => Ok(()),
    }
}

fn validate_splits(splits: &[NewSplit], amount: Money) -> Result<()> {
    if splits.is_empty() {
        return Ok(());
    }
    if splits.iter().any(|split| !split.amount.is_positive()) {
        return Err(Error::validation("Split amounts must be greater than zero"));
    }
    let total = Money::checked_sum(splits.iter().map(|split| split.amount))?;
    if total != amount {
        return Err(Error::validation(format!(
            "Split amounts sum to {total} but the transaction amount is {amount}"
        )));
    }
    Ok(())
}

async fn usable_account<C>(conn: &C, account_id: i64, owner_id: &str) -> Result<account::Model>
where
    C: ConnectionTrait,
{
    let account = find_owned_account(conn, account_id, owner_id)
        .await?
        .ok_or(Error::AccountNotFound { id: account_id })?;
    if !account.is_active {
        return Err(Error::AccountInactive { id: account_id });
    }
    Ok(account)
}

async fn require_categories<C>(
    conn: &C,
    owner_id: &str,
    category_id: Option<i64>,
    splits: &[NewSplit],
) -> Result<()>
where
    C: ConnectionTrait,
{
    require_optional_category(conn, category_id, owner_id).await?;
    for split in splits {
        require_category(conn, split.category_id, owner_id).await?;
    }
    Ok(())
}

async fn insert_splits<C>(conn: &C, transaction_id: i64, splits: Vec<NewSplit>) -> Result<()>
where
    C: ConnectionTrait,
{
    for split in splits {
        transaction_split::ActiveModel {
            transaction_id: Set(transaction_id),
            category_id: Set(split.category_id),
            amount: Set(split.amount),
            description: Set(split.description),
            ..Default::default()
        }
        .insert(conn)
        .await?;
    }
    Ok(())
}

async fn apply_effects<C>(conn: &C, effects: &[(i64, Money)], reverse: bool) -> Result<()>
where
    C: ConnectionTrait,
{
    for &(account_id, delta) in effects {
        let delta = if reverse { -delta } else { delta };
        apply_delta(conn, account_id, delta).await?;
    }
    Ok(())
}

fn merge_patch(
    existing: &transaction::Model,
    patch: &TransactionPatch,
) -> Result<transaction::Model> {
    let mut merged = existing.clone();
    if let Some(account_id) = patch.account_id {
        merged.account_id = account_id;
    }
    if let Some(category_id) = patch.category_id {
        merged.category_id = category_id;
    }
    if let Some(transaction_type) = patch.transaction_type {
        merged.transaction_type = transaction_type;
    }
    if let Some(amount) = patch.amount {
        merged.amount = amount;
    }
    if let Some(currency) = &patch.currency {
        merged.currency = validate_currency(currency)?;
    }
    if let Some(date) = patch.date {
        merged.date = date;
    }
    if let Some(description) = &patch.description {
        merged.description.clone_from(description);
    }
    if let Some(notes) = &patch.notes {
        merged.notes.clone_from(notes);
    }
    if let Some(payee) = &patch.payee {
        merged.payee.clone_from(payee);
    }
    if let Some(reference) = &patch.reference {
        merged.reference.clone_from(reference);
    }
    if let Some(to_account_id) = patch.to_account_id {
        merged.to_account_id = to_account_id;
    }
    Ok(merged)
}

/// Books a transaction on an existing connection or database transaction.
///
/// `recurring_template_id` records provenance for materialized occurrences.
pub(crate) async fn create_in<C>(
    conn: &C,
    owner_id: &str,
    new: NewTransaction,
    recurring_template_id: Option<i64>,
) -> Result<transaction::Model>
where
    C: ConnectionTrait,
{
    validate_shape(
        new.transaction_type,
        new.account_id,
        new.to_account_id,
        new.amount,
    )?;
    validate_splits(&new.splits, new.amount)?;

    let source = usable_account(conn, new.account_id, owner_id).await?;
    if let Some(to_account_id) = new.to_account_id {
        usable_account(conn, to_account_id, owner_id).await?;
    }
    require_categories(conn, owner_id, new.category_id, &new.splits).await?;
    let currency = match new.currency {
        Some(code) => validate_currency(&code)?,
        None => source.currency,
    };

    let now = Utc::now();
    let created = transaction::ActiveModel {
        owner_id: Set(owner_id.to_string()),
        account_id: Set(new.account_id),
        category_id: Set(new.category_id),
        transaction_type: Set(new.transaction_type),
        amount: Set(new.amount),
        currency: Set(currency),
        date: Set(new.date),
        description: Set(new.description),
        notes: Set(new.notes),
        payee: Set(new.payee),
        reference: Set(new.reference),
        to_account_id: Set(new.to_account_id),
        recurring_template_id: Set(recurring_template_id),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    insert_splits(conn, created.id, new.splits).await?;
    apply_effects(conn, &balance_effects(&created), false).await?;

    debug!(
        transaction_id = created.id,
        amount = %created.amount,
        "Booked transaction"
    );
    Ok(created)
}

/// Removes a transaction, its splits and its balance effects.
pub(crate) async fn remove_in<C>(conn: &C, existing: &transaction::Model) -> Result<()>
where
    C: ConnectionTrait,
{
    apply_effects(conn, &balance_effects(existing), true).await?;
    TransactionSplit::delete_many()
        .filter(transaction_split::Column::TransactionId.eq(existing.id))
        .exec(conn)
        .await?;
    Transaction::delete_by_id(existing.id).exec(conn).await?;
    Ok(())
}

async fn find_owned_transaction<C>(
    conn: &C,
    transaction_id: i64,
    owner_id: &str,
) -> Result<Option<transaction::Model>>
where
    C: ConnectionTrait,
{
    Transaction::find_by_id(transaction_id)
        .filter(transaction::Column::OwnerId.eq(owner_id))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Creates a transaction and moves the affected balances in one database transaction.
///
/// The amount must be positive and a transfer needs a destination other than its source.
/// Splits, when given, must add up to the amount exactly. Both accounts must belong to the
/// owner and be active, and every referenced category must belong to the owner. The row,
/// its splits and the balance changes are committed together; nothing is persisted on
/// failure.
///
/// # Arguments
/// * `owner_id` - User the transaction is booked for
/// * `new` - Accounts, type, amount, date and optional category shares
///
/// # Errors
/// `Validation` for malformed input, `AmountOverflow` when the splits overflow,
/// `AccountNotFound`/`CategoryNotFound` for absent or foreign references and
/// `AccountInactive` for deactivated accounts.
#[instrument(skip(db, new), fields(owner = %owner_id))]
pub async fn create_transaction(
    db: &DatabaseConnection,
    owner_id: &str,
    new: NewTransaction,
) -> Result<transaction::Model> {
    let txn = db.begin().await?;
    let created = create_in(&txn, owner_id, new, None).await?;
    txn.commit().await?;

    info!(transaction_id = created.id, "Created transaction");
    Ok(created)
}

/// Edits a transaction: reverse the old effects, persist the patch, apply the new effects.
///
/// The patch is merged over the stored row and the result is validated like a new
/// transaction. Accounts the patch newly references must be owned and active; an account
/// the transaction already used may stay even if it was deactivated since. When the amount
/// changes and the splits are not replaced, the existing splits must still add up.
///
/// # Arguments
/// * `transaction_id` - Transaction to edit
/// * `owner_id` - Owner the transaction must belong to
/// * `patch` - Fields to change; `None` keeps the stored value
#[instrument(skip(db, patch), fields(owner = %owner_id))]
pub async fn update_transaction(
    db: &DatabaseConnection,
    transaction_id: i64,
    owner_id: &str,
    patch: TransactionPatch,
) -> Result<transaction::Model> {
    let txn = db.begin().await?;

    let existing = find_owned_transaction(&txn, transaction_id, owner_id)
        .await?
        .ok_or(Error::TransactionNotFound { id: transaction_id })?;

    let merged = merge_patch(&existing, &patch)?;

    validate_shape(
        merged.transaction_type,
        merged.account_id,
        merged.to_account_id,
        merged.amount,
    )?;
    match &patch.splits {
        Some(splits) => validate_splits(splits, merged.amount)?,
        None if merged.amount != existing.amount => {
            let current: Vec<NewSplit> = TransactionSplit::find()
                .filter(transaction_split::Column::TransactionId.eq(transaction_id))
                .all(&txn)
                .await?
                .into_iter()
                .map(|split| NewSplit {
                    category_id: split.category_id,
                    amount: split.amount,
                    description: split.description,
                })
                .collect();
            validate_splits(&current, merged.amount)?;
        }
        None => {}
    }
    let patched_category = patch.category_id.flatten();
    require_categories(
        &txn,
        owner_id,
        patched_category,
        patch.splits.as_deref().unwrap_or_default(),
    )
    .await?;

    let old_effects = balance_effects(&existing);
    let new_effects = balance_effects(&merged);
    for (account_id, _) in &new_effects {
        if !old_effects.iter().any(|(old, _)| old == account_id) {
            usable_account(&txn, *account_id, owner_id).await?;
        }
    }

    apply_effects(&txn, &old_effects, true).await?;

    let mut active_model: transaction::ActiveModel = existing.into();
    active_model.account_id = Set(merged.account_id);
    active_model.category_id = Set(merged.category_id);
    active_model.transaction_type = Set(merged.transaction_type);
    active_model.amount = Set(merged.amount);
    active_model.currency = Set(merged.currency);
    active_model.date = Set(merged.date);
    active_model.description = Set(merged.description);
    active_model.notes = Set(merged.notes);
    active_model.payee = Set(merged.payee);
    active_model.reference = Set(merged.reference);
    active_model.to_account_id = Set(merged.to_account_id);
    active_model.updated_at = Set(Utc::now());
    let updated = active_model.update(&txn).await?;

    if let Some(splits) = patch.splits {
        TransactionSplit::delete_many()
            .filter(transaction_split::Column::TransactionId.eq(transaction_id))
            .exec(&txn)
            .await?;
        insert_splits(&txn, transaction_id, splits).await?;
    }

    apply_effects(&txn, &new_effects, false).await?;
    txn.commit().await?;

    info!(transaction_id, "Updated transaction");
    Ok(updated)
}

/// Deletes a transaction and reverses its balance effects.
///
/// Returns `false` when the transaction is absent or belongs to another owner.
#[instrument(skip(db), fields(owner = %owner_id))]
pub async fn delete_transaction(
    db: &DatabaseConnection,
    transaction_id: i64,
    owner_id: &str,
) -> Result<bool> {
    let txn = db.begin().await?;

    let Some(existing) = find_owned_transaction(&txn, transaction_id, owner_id).await? else {
        return Ok(false);
    };
    remove_in(&txn, &existing).await?;
    txn.commit().await?;

    info!(transaction_id, "Deleted transaction");
    Ok(true)
}

/// Retrieves an owned transaction.
pub async fn get_transaction(
    db: &DatabaseConnection,
    transaction_id: i64,
    owner_id: &str,
) -> Result<transaction::Model> {
    find_owned_transaction(db, transaction_id, owner_id)
        .await?
        .ok_or(Error::TransactionNotFound { id: transaction_id })
}

/// Lists the owner's transactions, newest booking date first.
pub async fn list_transactions(
    db: &DatabaseConnection,
    owner_id: &str,
    filter: &TransactionFilter,
) -> Result<Vec<transaction::Model>> {
    let mut query = Transaction::find().filter(transaction::Column::OwnerId.eq(owner_id));

    if let Some(start) = filter.start_date {
        query = query.filter(transaction::Column::Date.gte(start));
    }
    if let Some(end) = filter.end_date {
        query = query.filter(transaction::Column::Date.lte(end));
    }
    if let Some(account_id) = filter.account_id {
        query = query.filter(
            Condition::any()
                .add(transaction::Column::AccountId.eq(account_id))
                .add(transaction::Column::ToAccountId.eq(account_id)),
        );
    }
    if let Some(category_id) = filter.category_id {
        query = query.filter(transaction::Column::CategoryId.eq(category_id));
    }
    if let Some(transaction_type) = filter.transaction_type {
        query = query.filter(transaction::Column::TransactionType.eq(transaction_type));
    }

    query
        .order_by_desc(transaction::Column::Date)
        .order_by_desc(transaction::Column::Id)
        .limit(filter.limit)
        .offset(filter.offset)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Category splits of an owned transaction.
pub async fn get_splits(
    db: &DatabaseConnection,
    transaction_id: i64,
    owner_id: &str,
) -> Result<Vec<transaction_split::Model>> {
    get_transaction(db, transaction_id, owner_id).await?;
    TransactionSplit::find()
        .filter(transaction_split::Column::TransactionId.eq(transaction_id))
        .order_by_asc(transaction_split::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Income, expense and net totals over an inclusive date range.
///
/// Amounts are converted into `rates.base()`. Transfers count towards
/// `transaction_count` but not towards either total.
pub async fn get_summary(
    db: &DatabaseConnection,
    owner_id: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    rates: &RateTable,
    scope: RecurringScope,
) -> Result<TransactionSummary> {
    let mut query = Transaction::find()
        .filter(transaction::Column::OwnerId.eq(owner_id))
        .filter(transaction::Column::Date.between(start_date, end_date));
    if scope == RecurringScope::Exclude {
        query = query.filter(transaction::Column::RecurringTemplateId.is_null());
    }
    let rows = query.all(db).await?;

    let mut income = Decimal::ZERO;
    let mut expense = Decimal::ZERO;
    for row in &rows {
        match row.transaction_type {
            TransactionType::Income => {
                income += rates.to_base(row.amount.to_decimal(), &row.currency)?;
            }
            TransactionType::Expense => {
                expense += rates.to_base(row.amount.to_decimal(), &row.currency)?;
            }
            TransactionType::Transfer => {}
        }
    }

    let total_income = Money::from_decimal(income)?;
    let total_expense = Money::from_decimal(expense)?;
    Ok(TransactionSummary {
        currency: rates.base().to_string(),
        total_income,
        total_expense,
        net_income: total_income.checked_sub(total_expense)?,
        transaction_count: rows.len() as u64,
    })
}
