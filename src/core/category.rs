//! Category business logic - the owner's income and expense labels.
//!
//! Transactions, splits, recurring templates and budgets refer to categories by id.
//! Every write that sets such a reference goes through `require_category`, so a
//! reference always names a category of the same owner.

use crate::{
    entities::{
        Budget, Category, CategoryType, RecurringTemplate, Transaction, TransactionSplit, budget,
        category, recurring_template, transaction, transaction_split,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{PaginatorTrait, QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use tracing::{info, instrument};

/// Input for [`create_category`].
#[derive(Debug, Clone)]
pub struct NewCategory {
    /// Display name
    pub name: String,
    /// Income or expense
    pub category_type: CategoryType,
    /// Hex colour; defaults to [`DEFAULT_COLOR`]
    pub color: Option<String>,
    /// Icon name or emoji
    pub icon: Option<String>,
    /// Parent category of the same owner and type
    pub parent_id: Option<i64>,
    /// Free-form description
    pub description: Option<String>,
    /// Protect the category from deletion
    pub is_system: bool,
}

/// Colour given to categories created without one.
pub const DEFAULT_COLOR: &str = "#3b82f6";

impl NewCategory {
    /// A user category with no parent.
    #[must_use]
    pub fn new(name: impl Into<String>, category_type: CategoryType) -> Self {
        Self {
            name: name.into(),
            category_type,
            color: None,
            icon: None,
            parent_id: None,
            description: None,
            is_system: false,
        }
    }
}

/// Finds a category by id, treating categories of other owners as absent.
pub(crate) async fn find_owned_category<C>(
    conn: &C,
    category_id: i64,
    owner_id: &str,
) -> Result<Option<category::Model>>
where
    C: ConnectionTrait,
{
    Category::find_by_id(category_id)
        .filter(category::Column::OwnerId.eq(owner_id))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Fails with `CategoryNotFound` unless the category exists and belongs to the owner.
pub(crate) async fn require_category<C>(conn: &C, category_id: i64, owner_id: &str) -> Result<()>
where
    C: ConnectionTrait,
{
    find_owned_category(conn, category_id, owner_id)
        .await?
        .map(|_| ())
        .ok_or(Error::CategoryNotFound { id: category_id })
}

/// `require_category` for an optional reference.
pub(crate) async fn require_optional_category<C>(
    conn: &C,
    category_id: Option<i64>,
    owner_id: &str,
) -> Result<()>
where
    C: ConnectionTrait,
{
    match category_id {
        Some(id) => require_category(conn, id, owner_id).await,
        None => Ok(()),
    }
}

/// Creates a category for the owner.
///
/// A parent must belong to the same owner and classify the same direction of money.
#[instrument(skip(db, new), fields(owner = %owner_id))]
pub async fn create_category(
    db: &DatabaseConnection,
    owner_id: &str,
    new: NewCategory,
) -> Result<category::Model> {
    let name = new.name.trim();
    if name.is_empty() {
        return Err(Error::validation("Category name cannot be empty"));
    }
    if let Some(parent_id) = new.parent_id {
        let parent = find_owned_category(db, parent_id, owner_id)
            .await?
            .ok_or(Error::CategoryNotFound { id: parent_id })?;
        if parent.category_type != new.category_type {
            return Err(Error::validation(
                "A subcategory must have the same type as its parent",
            ));
        }
    }

    let now = Utc::now();
    let category = category::ActiveModel {
        owner_id: Set(owner_id.to_string()),
        name: Set(name.to_string()),
        category_type: Set(new.category_type),
        color: Set(Some(new.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()))),
        icon: Set(new.icon),
        parent_id: Set(new.parent_id),
        description: Set(new.description),
        is_system: Set(new.is_system),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(category_id = category.id, "Created category");
    Ok(category)
}

/// Retrieves an owned category.
pub async fn get_category(
    db: &DatabaseConnection,
    category_id: i64,
    owner_id: &str,
) -> Result<category::Model> {
    find_owned_category(db, category_id, owner_id)
        .await?
        .ok_or(Error::CategoryNotFound { id: category_id })
}

/// Lists every category of the owner, newest first.
pub async fn list_categories(
    db: &DatabaseConnection,
    owner_id: &str,
) -> Result<Vec<category::Model>> {
    Category::find()
        .filter(category::Column::OwnerId.eq(owner_id))
        .order_by_desc(category::Column::CreatedAt)
        .order_by_desc(category::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists the owner's income or expense categories, newest first.
pub async fn list_categories_by_type(
    db: &DatabaseConnection,
    owner_id: &str,
    category_type: CategoryType,
) -> Result<Vec<category::Model>> {
    Category::find()
        .filter(category::Column::OwnerId.eq(owner_id))
        .filter(category::Column::CategoryType.eq(category_type))
        .order_by_desc(category::Column::CreatedAt)
        .order_by_desc(category::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Deletes an owned category. Returns `false` if it does not exist.
///
/// System categories and categories that splits still use are refused with
/// `CategoryInUse`. Transactions, templates and subcategories lose the reference;
/// budgets tracking the category are deleted with it.
#[instrument(skip(db), fields(owner = %owner_id))]
pub async fn delete_category(
    db: &DatabaseConnection,
    category_id: i64,
    owner_id: &str,
) -> Result<bool> {
    let txn = db.begin().await?;

    let Some(existing) = find_owned_category(&txn, category_id, owner_id).await? else {
        return Ok(false);
    };
    if existing.is_system {
        return Err(Error::CategoryInUse {
            id: category_id,
            reason: "system categories are permanent".to_string(),
        });
    }
    let split_count = TransactionSplit::find()
        .filter(transaction_split::Column::CategoryId.eq(category_id))
        .count(&txn)
        .await?;
    if split_count > 0 {
        return Err(Error::CategoryInUse {
            id: category_id,
            reason: format!("{split_count} transaction splits use it"),
        });
    }

    Transaction::update_many()
        .col_expr(transaction::Column::CategoryId, Expr::value(None::<i64>))
        .filter(transaction::Column::CategoryId.eq(category_id))
        .exec(&txn)
        .await?;
    RecurringTemplate::update_many()
        .col_expr(recurring_template::Column::CategoryId, Expr::value(None::<i64>))
        .filter(recurring_template::Column::CategoryId.eq(category_id))
        .exec(&txn)
        .await?;
    Category::update_many()
        .col_expr(category::Column::ParentId, Expr::value(None::<i64>))
        .filter(category::Column::ParentId.eq(category_id))
        .exec(&txn)
        .await?;
    let removed_budgets = Budget::delete_many()
        .filter(budget::Column::CategoryId.eq(category_id))
        .exec(&txn)
        .await?
        .rows_affected;

    Category::delete_by_id(category_id).exec(&txn).await?;
    txn.commit().await?;

    info!(category_id, removed_budgets, "Deleted category");
    Ok(true)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::{
        core::{
            budget::{NewBudget, create_budget, get_budget},
            transaction::{NewSplit, NewTransaction, create_transaction, get_transaction},
        },
        entities::{BudgetPeriod, TransactionType},
        test_utils::{
            create_test_account, create_test_category, create_test_template, date, money,
            setup_test_db,
        },
    };

    #[tokio::test]
    async fn test_create_and_list_by_type() -> Result<()> {
        let db = setup_test_db().await?;
        let salary = create_test_category(&db, "alice", "Salary", CategoryType::Income).await?;
        let food = create_test_category(&db, "alice", "Food", CategoryType::Expense).await?;
        let rent = create_test_category(&db, "alice", "Rent", CategoryType::Expense).await?;
        create_test_category(&db, "bob", "Food", CategoryType::Expense).await?;

        assert_eq!(food.color.as_deref(), Some(DEFAULT_COLOR));

        let all: Vec<i64> = list_categories(&db, "alice")
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(all, vec![rent.id, food.id, salary.id]);

        let expenses: Vec<i64> = list_categories_by_type(&db, "alice", CategoryType::Expense)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(expenses, vec![rent.id, food.id]);

        let income = list_categories_by_type(&db, "alice", CategoryType::Income).await?;
        assert_eq!(income.len(), 1);
        assert_eq!(income[0].name, "Salary");
        Ok(())
    }

    #[tokio::test]
    async fn test_create_validation() -> Result<()> {
        let db = setup_test_db().await?;
        let salary = create_test_category(&db, "alice", "Salary", CategoryType::Income).await?;
        let theirs = create_test_category(&db, "bob", "Food", CategoryType::Expense).await?;

        let result = create_category(&db, "alice", NewCategory::new("  ", CategoryType::Expense)).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let mut mixed = NewCategory::new("Groceries", CategoryType::Expense);
        mixed.parent_id = Some(salary.id);
        let result = create_category(&db, "alice", mixed).await;
        assert!(matches!(result, Err(Error::Validation { .. })));

        let mut foreign_parent = NewCategory::new("Groceries", CategoryType::Expense);
        foreign_parent.parent_id = Some(theirs.id);
        let result = create_category(&db, "alice", foreign_parent).await;
        assert!(matches!(result, Err(Error::CategoryNotFound { id }) if id == theirs.id));
        Ok(())
    }

    #[tokio::test]
    async fn test_get_hides_other_owners() -> Result<()> {
        let db = setup_test_db().await?;
        let theirs = create_test_category(&db, "bob", "Food", CategoryType::Expense).await?;
        let result = get_category(&db, theirs.id, "alice").await;
        assert!(matches!(result, Err(Error::CategoryNotFound { .. })));
        assert!(!delete_category(&db, theirs.id, "alice").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_clears_references_and_drops_budgets() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Checking", "100").await?;
        let food = create_test_category(&db, "alice", "Food", CategoryType::Expense).await?;
        let mut child = NewCategory::new("Snacks", CategoryType::Expense);
        child.parent_id = Some(food.id);
        let snacks = create_category(&db, "alice", child).await?;

        let mut new = NewTransaction::new(account.id, TransactionType::Expense, money("10"), date(2024, 3, 1));
        new.category_id = Some(food.id);
        let booked = create_transaction(&db, "alice", new).await?;

        let template = create_test_template(&db, "alice", account.id, "Groceries", "50").await?;
        crate::core::recurring::update_template(
            &db,
            template.id,
            "alice",
            crate::core::recurring::TemplatePatch {
                category_id: Some(Some(food.id)),
                ..Default::default()
            },
        )
        .await?;

        let mut budget = NewBudget::new("Food", money("200"), "USD", BudgetPeriod::Monthly, date(2024, 3, 1));
        budget.category_id = Some(food.id);
        let budget = create_budget(&db, "alice", budget).await?;

        assert!(delete_category(&db, food.id, "alice").await?);

        assert_eq!(get_transaction(&db, booked.id, "alice").await?.category_id, None);
        let template = crate::core::recurring::get_template(&db, template.id, "alice").await?;
        assert_eq!(template.category_id, None);
        assert_eq!(get_category(&db, snacks.id, "alice").await?.parent_id, None);
        assert!(matches!(
            get_budget(&db, budget.id, "alice").await,
            Err(Error::BudgetNotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_refuses_system_and_split_categories() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Checking", "100").await?;

        let mut system = NewCategory::new("Uncategorized", CategoryType::Expense);
        system.is_system = true;
        let system = create_category(&db, "alice", system).await?;
        let result = delete_category(&db, system.id, "alice").await;
        assert!(matches!(result, Err(Error::CategoryInUse { .. })));

        let food = create_test_category(&db, "alice", "Food", CategoryType::Expense).await?;
        let mut new = NewTransaction::new(account.id, TransactionType::Expense, money("10"), date(2024, 3, 1));
        new.splits = vec![NewSplit {
            category_id: food.id,
            amount: money("10"),
            description: None,
        }];
        create_transaction(&db, "alice", new).await?;

        let result = delete_category(&db, food.id, "alice").await;
        assert!(matches!(result, Err(Error::CategoryInUse { id, .. }) if id == food.id));
        assert_eq!(get_category(&db, food.id, "alice").await?.name, "Food");
        Ok(())
    }
}
