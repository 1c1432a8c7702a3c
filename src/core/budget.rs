//! Budget business logic - spending limits and how much of them has been used.
//!
//! A budget covers `[start_date, end_date]`, or one period from its start when no end
//! date is set. Only expense transactions count towards it.

use crate::{
    core::{
        category::require_optional_category, fx::RateTable, fx::validate_currency, money::Money,
    },
    entities::{Budget, BudgetPeriod, Transaction, TransactionType, budget, transaction},
    errors::{Error, Result},
};
use chrono::{Days, Months, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Serialize;
use tracing::{debug, info};

/// Alert threshold used when none is given, in percent.
pub const DEFAULT_ALERT_THRESHOLD: i32 = 80;

/// Input for [`create_budget`].
#[derive(Debug, Clone)]
pub struct NewBudget {
    /// Restrict to one category; `None` tracks all spending
    pub category_id: Option<i64>,
    /// Display name
    pub name: String,
    /// Spending limit
    pub amount: Money,
    /// Currency of the limit
    pub currency: String,
    /// Length of one budget period
    pub period: BudgetPeriod,
    /// First day covered
    pub start_date: NaiveDate,
    /// Last day covered; defaults to one period after the start
    pub end_date: Option<NaiveDate>,
    /// Percentage of the limit at which to alert
    pub alert_threshold: i32,
    /// Carry unspent money into the next period
    pub allow_rollover: bool,
    /// Whether alerts are raised at all
    pub alert_enabled: bool,
}

impl NewBudget {
    /// An all-category budget with the default alert settings.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        amount: Money,
        currency: impl Into<String>,
        period: BudgetPeriod,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            category_id: None,
            name: name.into(),
            amount,
            currency: currency.into(),
            period,
            start_date,
            end_date: None,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            allow_rollover: false,
            alert_enabled: true,
        }
    }
}

/// Partial update for [`update_budget`]. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct BudgetPatch {
    /// Change or clear the category
    pub category_id: Option<Option<i64>>,
    /// Rename
    pub name: Option<String>,
    /// Change the limit
    pub amount: Option<Money>,
    /// Change the currency
    pub currency: Option<String>,
    /// Change the period
    pub period: Option<BudgetPeriod>,
    /// Move the start
    pub start_date: Option<NaiveDate>,
    /// Change or clear the end
    pub end_date: Option<Option<NaiveDate>>,
    /// Change the alert threshold
    pub alert_threshold: Option<i32>,
    /// Switch rollover
    pub allow_rollover: Option<bool>,
    /// Switch alerts
    pub alert_enabled: Option<bool>,
    /// Activate or deactivate
    pub is_active: Option<bool>,
}

/// A budget together with what has been spent against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BudgetStatus {
    /// The evaluated budget
    pub budget: budget::Model,
    /// First day counted
    pub period_start: NaiveDate,
    /// Last day counted
    pub period_end: NaiveDate,
    /// Expenses in the window, in the budget's currency
    pub spent: Money,
    /// Limit minus spent; negative once over budget
    pub remaining: Money,
    /// Spent as a percentage of the limit, two decimal places
    pub percentage: Decimal,
    /// Spent exceeds the limit
    pub over_budget: bool,
    /// Alerts are enabled and the threshold is reached
    pub alert_triggered: bool,
}

/// End of the first period starting at `start`.
#[must_use]
pub fn computed_end_date(start: NaiveDate, period: BudgetPeriod) -> Option<NaiveDate> {
    match period {
        BudgetPeriod::Weekly => start.checked_add_days(Days::new(7)),
        BudgetPeriod::Monthly => start.checked_add_months(Months::new(1)),
        BudgetPeriod::Yearly => start.checked_add_months(Months::new(12)),
    }
}

fn validate(
    name: &str,
    amount: Money,
    alert_threshold: i32,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("Budget name cannot be empty"));
    }
    if !amount.is_positive() {
        return Err(Error::validation("Budget amount must be greater than zero"));
    }
    if !(0..=100).contains(&alert_threshold) {
        return Err(Error::validation("Alert threshold must be between 0 and 100"));
    }
    if end_date.is_some_and(|end| end < start_date) {
        return Err(Error::validation("End date cannot be before the start date"));
    }
    Ok(())
}

/// Creates a budget.
pub async fn create_budget(
    db: &DatabaseConnection,
    owner_id: &str,
    new: NewBudget,
) -> Result<budget::Model> {
    validate(
        &new.name,
        new.amount,
        new.alert_threshold,
        new.start_date,
        new.end_date,
    )?;
    let currency = validate_currency(&new.currency)?;
    require_optional_category(db, new.category_id, owner_id).await?;
    let now = Utc::now();

    let budget = budget::ActiveModel {
        owner_id: Set(owner_id.to_string()),
        category_id: Set(new.category_id),
        name: Set(new.name.trim().to_string()),
        amount: Set(new.amount),
        currency: Set(currency),
        period: Set(new.period),
        start_date: Set(new.start_date),
        end_date: Set(new.end_date),
        alert_threshold: Set(new.alert_threshold),
        allow_rollover: Set(new.allow_rollover),
        alert_enabled: Set(new.alert_enabled),
        is_active: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(budget_id = budget.id, owner = %owner_id, "Created budget");
    Ok(budget)
}

/// Retrieves an owned budget.
pub async fn get_budget(
    db: &DatabaseConnection,
    budget_id: i64,
    owner_id: &str,
) -> Result<budget::Model> {
    Budget::find_by_id(budget_id)
        .filter(budget::Column::OwnerId.eq(owner_id))
        .one(db)
        .await?
        .ok_or(Error::BudgetNotFound { id: budget_id })
}

/// Lists every budget of the owner, newest first.
pub async fn list_budgets(db: &DatabaseConnection, owner_id: &str) -> Result<Vec<budget::Model>> {
    Budget::find()
        .filter(budget::Column::OwnerId.eq(owner_id))
        .order_by_desc(budget::Column::CreatedAt)
        .order_by_desc(budget::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists the owner's active budgets alphabetically.
pub async fn list_active_budgets(
    db: &DatabaseConnection,
    owner_id: &str,
) -> Result<Vec<budget::Model>> {
    Budget::find()
        .filter(budget::Column::OwnerId.eq(owner_id))
        .filter(budget::Column::IsActive.eq(true))
        .order_by_asc(budget::Column::Name)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Applies a patch to an owned budget.
pub async fn update_budget(
    db: &DatabaseConnection,
    budget_id: i64,
    owner_id: &str,
    patch: BudgetPatch,
) -> Result<budget::Model> {
    let existing = get_budget(db, budget_id, owner_id).await?;

    let name = patch.name.unwrap_or_else(|| existing.name.clone());
    let amount = patch.amount.unwrap_or(existing.amount);
    let alert_threshold = patch.alert_threshold.unwrap_or(existing.alert_threshold);
    let start_date = patch.start_date.unwrap_or(existing.start_date);
    let end_date = patch.end_date.unwrap_or(existing.end_date);
    validate(&name, amount, alert_threshold, start_date, end_date)?;

    let mut active_model: budget::ActiveModel = existing.into();
    active_model.name = Set(name.trim().to_string());
    active_model.amount = Set(amount);
    active_model.alert_threshold = Set(alert_threshold);
    active_model.start_date = Set(start_date);
    active_model.end_date = Set(end_date);
    if let Some(category_id) = patch.category_id {
        require_optional_category(db, category_id, owner_id).await?;
        active_model.category_id = Set(category_id);
    }
    if let Some(currency) = patch.currency {
        active_model.currency = Set(validate_currency(&currency)?);
    }
    if let Some(period) = patch.period {
        active_model.period = Set(period);
    }
    if let Some(allow_rollover) = patch.allow_rollover {
        active_model.allow_rollover = Set(allow_rollover);
    }
    if let Some(alert_enabled) = patch.alert_enabled {
        active_model.alert_enabled = Set(alert_enabled);
    }
    if let Some(is_active) = patch.is_active {
        active_model.is_active = Set(is_active);
    }
    active_model.updated_at = Set(Utc::now());

    active_model.update(db).await.map_err(Into::into)
}

/// Deletes an owned budget. Returns `false` when absent or foreign.
pub async fn delete_budget(db: &DatabaseConnection, budget_id: i64, owner_id: &str) -> Result<bool> {
    let result = Budget::delete_many()
        .filter(budget::Column::Id.eq(budget_id))
        .filter(budget::Column::OwnerId.eq(owner_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Window of days a budget counts spending over.
pub fn budget_window(budget: &budget::Model) -> Result<(NaiveDate, NaiveDate)> {
    let end = match budget.end_date {
        Some(end) => end,
        None => computed_end_date(budget.start_date, budget.period)
            .ok_or_else(|| Error::validation("Budget period runs past the supported date range"))?,
    };
    Ok((budget.start_date, end))
}

/// Compares a budget's limit with the owner's expenses in its window.
///
/// Only expenses dated inside [`budget_window`] count, restricted to the budget's category
/// when it has one. Expenses in other currencies are converted into the budget's currency
/// through `rates`. The percentage is rounded to two places and an alert fires once it
/// reaches the threshold, if alerts are enabled.
///
/// # Arguments
/// * `budget` - Budget to evaluate, already owned by the caller
/// * `rates` - Rates used for expenses not in the budget's currency
pub async fn evaluate(
    db: &DatabaseConnection,
    budget: &budget::Model,
    rates: &RateTable,
) -> Result<BudgetStatus> {
    let (period_start, period_end) = budget_window(budget)?;

    let mut query = Transaction::find()
        .filter(transaction::Column::OwnerId.eq(budget.owner_id.as_str()))
        .filter(transaction::Column::TransactionType.eq(TransactionType::Expense))
        .filter(transaction::Column::Date.between(period_start, period_end));
    if let Some(category_id) = budget.category_id {
        query = query.filter(transaction::Column::CategoryId.eq(category_id));
    }

    let mut spent = Decimal::ZERO;
    for row in query.all(db).await? {
        spent += rates.convert(row.amount.to_decimal(), &row.currency, &budget.currency)?;
    }
    let spent = Money::from_decimal(spent)?;
    let remaining = budget.amount.checked_sub(spent)?;

    let limit = budget.amount.to_decimal();
    let percentage = if limit.is_zero() {
        Decimal::ZERO
    } else {
        (spent.to_decimal() * Decimal::ONE_HUNDRED / limit)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    };
    let alert_triggered =
        budget.alert_enabled && percentage >= Decimal::from(budget.alert_threshold);

    debug!(budget_id = budget.id, %spent, %percentage, "Evaluated budget");
    Ok(BudgetStatus {
        budget: budget.clone(),
        period_start,
        period_end,
        spent,
        remaining,
        percentage,
        over_budget: spent > budget.amount,
        alert_triggered,
    })
}

/// Evaluates every active budget of the owner.
pub async fn evaluate_all(
    db: &DatabaseConnection,
    owner_id: &str,
    rates: &RateTable,
) -> Result<Vec<BudgetStatus>> {
    let mut statuses = Vec::new();
    for budget in list_active_budgets(db, owner_id).await? {
        statuses.push(evaluate(db, &budget, rates).await?);
    }
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::transaction::{NewTransaction, create_transaction},
        entities::CategoryType,
        test_utils::*,
    };
    use sea_orm::{DatabaseBackend, MockDatabase};

    async fn book(
        db: &DatabaseConnection,
        account_id: i64,
        kind: TransactionType,
        amount: &str,
        on: NaiveDate,
        category_id: Option<i64>,
    ) -> Result<()> {
        let mut new = NewTransaction::new(account_id, kind, money(amount), on);
        new.category_id = category_id;
        create_transaction(db, "alice", new).await?;
        Ok(())
    }

    #[test]
    fn test_computed_end_date() {
        let start = date(2024, 1, 31);
        assert_eq!(computed_end_date(start, BudgetPeriod::Weekly), Some(date(2024, 2, 7)));
        assert_eq!(computed_end_date(start, BudgetPeriod::Monthly), Some(date(2024, 2, 29)));
        assert_eq!(computed_end_date(start, BudgetPeriod::Yearly), Some(date(2025, 1, 31)));
    }

    #[tokio::test]
    async fn test_create_budget_validation() -> Result<()> {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let base = NewBudget::new("Food", money("100"), "USD", BudgetPeriod::Monthly, date(2024, 3, 1));

        let mut zero = base.clone();
        zero.amount = Money::ZERO;
        let mut threshold = base.clone();
        threshold.alert_threshold = 101;
        let mut backwards = base.clone();
        backwards.end_date = Some(date(2024, 2, 1));
        let mut currency = base;
        currency.currency = "EURO".to_string();

        for new in [zero, threshold, backwards, currency] {
            let result = create_budget(&db, "alice", new).await;
            assert!(matches!(result, Err(Error::Validation { .. })), "{result:?}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_all_category_budget_counts_only_expenses() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Checking", "1000").await?;
        let budget = create_budget(
            &db,
            "alice",
            NewBudget::new("Everything", money("100"), "USD", BudgetPeriod::Monthly, date(2024, 3, 1)),
        )
        .await?;
        let food = create_test_category(&db, "alice", "Food", CategoryType::Expense).await?;

        book(&db, account.id, TransactionType::Expense, "50", date(2024, 3, 5), Some(food.id)).await?;
        book(&db, account.id, TransactionType::Expense, "30", date(2024, 3, 20), None).await?;
        book(&db, account.id, TransactionType::Income, "20", date(2024, 3, 21), None).await?;

        let status = evaluate(&db, &budget, &RateTable::new("USD")).await?;
        assert_eq!(status.spent.to_string(), "80.0000");
        assert_eq!(status.remaining, money("20"));
        assert_eq!(status.percentage, Decimal::new(8000, 2));
        assert!(!status.over_budget);
        assert!(status.alert_triggered);
        assert_eq!(status.period_end, date(2024, 4, 1));
        Ok(())
    }

    #[tokio::test]
    async fn test_category_filter_and_window() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Checking", "1000").await?;
        let groceries = create_test_category(&db, "alice", "Groceries", CategoryType::Expense).await?;
        let fuel = create_test_category(&db, "alice", "Fuel", CategoryType::Expense).await?;
        let mut new = NewBudget::new("Groceries", money("3"), "USD", BudgetPeriod::Weekly, date(2024, 3, 1));
        new.category_id = Some(groceries.id);
        let budget = create_budget(&db, "alice", new).await?;

        let tracked = Some(groceries.id);
        book(&db, account.id, TransactionType::Expense, "1", date(2024, 3, 1), tracked).await?;
        book(&db, account.id, TransactionType::Expense, "1", date(2024, 3, 8), tracked).await?;
        book(&db, account.id, TransactionType::Expense, "1", date(2024, 3, 9), tracked).await?;
        book(&db, account.id, TransactionType::Expense, "5", date(2024, 3, 2), Some(fuel.id)).await?;

        let status = evaluate(&db, &budget, &RateTable::new("USD")).await?;
        assert_eq!(status.spent, money("2"));
        assert_eq!(status.percentage, Decimal::new(6667, 2));
        assert!(!status.alert_triggered);
        Ok(())
    }

    #[tokio::test]
    async fn test_category_must_be_owned() -> Result<()> {
        let db = setup_test_db().await?;
        let theirs = create_test_category(&db, "bob", "Food", CategoryType::Expense).await?;
        let mine = create_test_category(&db, "alice", "Food", CategoryType::Expense).await?;

        let mut new = NewBudget::new("Food", money("100"), "USD", BudgetPeriod::Monthly, date(2024, 3, 1));
        new.category_id = Some(theirs.id);
        let result = create_budget(&db, "alice", new.clone()).await;
        assert!(matches!(result, Err(Error::CategoryNotFound { id }) if id == theirs.id));
        assert!(list_budgets(&db, "alice").await?.is_empty());

        new.category_id = Some(mine.id);
        let budget = create_budget(&db, "alice", new).await?;
        let result = update_budget(
            &db,
            budget.id,
            "alice",
            BudgetPatch {
                category_id: Some(Some(theirs.id)),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(result, Err(Error::CategoryNotFound { .. })));
        assert_eq!(get_budget(&db, budget.id, "alice").await?.category_id, Some(mine.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_over_budget_and_conversion() -> Result<()> {
        let db = setup_test_db().await?;
        let euro = create_test_account_in_currency(&db, "alice", "Euro", "EUR", "1000").await?;
        let mut new = NewBudget::new("Travel", money("100"), "USD", BudgetPeriod::Yearly, date(2024, 1, 1));
        new.alert_enabled = false;
        let budget = create_budget(&db, "alice", new).await?;

        book(&db, euro.id, TransactionType::Expense, "100", date(2024, 6, 1), None).await?;

        let result = evaluate(&db, &budget, &RateTable::new("USD")).await;
        assert!(matches!(result, Err(Error::MissingExchangeRate { .. })));

        let rates = RateTable::new("USD").with_rate("EUR", "USD", Decimal::new(11, 1));
        let status = evaluate(&db, &budget, &rates).await?;
        assert_eq!(status.spent, money("110"));
        assert_eq!(status.remaining, money("-10"));
        assert!(status.over_budget);
        assert!(!status.alert_triggered);
        Ok(())
    }

    #[tokio::test]
    async fn test_budget_crud_and_evaluate_all() -> Result<()> {
        let db = setup_test_db().await?;
        let food = create_budget(
            &db,
            "alice",
            NewBudget::new("Food", money("200"), "USD", BudgetPeriod::Monthly, date(2024, 3, 1)),
        )
        .await?;
        let fun = create_budget(
            &db,
            "alice",
            NewBudget::new("Fun", money("50"), "USD", BudgetPeriod::Monthly, date(2024, 3, 1)),
        )
        .await?;

        let result = get_budget(&db, food.id, "bob").await;
        assert!(matches!(result, Err(Error::BudgetNotFound { .. })));

        let updated = update_budget(
            &db,
            fun.id,
            "alice",
            BudgetPatch {
                amount: Some(money("75")),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;
        assert_eq!(updated.amount, money("75"));
        assert!(!updated.is_active);

        let statuses = evaluate_all(&db, "alice", &RateTable::new("USD")).await?;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].budget.id, food.id);
        assert_eq!(statuses[0].spent, Money::ZERO);

        assert_eq!(list_budgets(&db, "alice").await?.len(), 2);
        assert!(!delete_budget(&db, food.id, "bob").await?);
        assert!(delete_budget(&db, food.id, "alice").await?);
        assert_eq!(list_budgets(&db, "alice").await?.len(), 1);
        Ok(())
    }
}
