//! Recurring template business logic - the patterns the processor materializes.
//!
//! A template's `next_occurrence` starts at the schedule rule applied to its start date
//! and afterwards only moves when the processor materializes an occurrence or the start
//! date is edited.

use crate::{
    core::{
        account::find_owned_account,
        category::require_optional_category,
        fx::validate_currency,
        money::Money,
        schedule::Schedule,
    },
    entities::{
        Frequency, RecurringTemplate, Transaction, TransactionType, recurring_template,
        transaction,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use tracing::{info, instrument};

/// Input for [`create_template`].
#[derive(Debug, Clone)]
pub struct NewTemplate {
    /// Account occurrences are booked against
    pub account_id: i64,
    /// Optional category
    pub category_id: Option<i64>,
    /// Display name
    pub name: String,
    /// Description copied onto occurrences
    pub description: Option<String>,
    /// Income or expense
    pub transaction_type: TransactionType,
    /// Amount of each occurrence
    pub amount: Money,
    /// Currency code; defaults to the account's currency
    pub currency: Option<String>,
    /// Repetition rule
    pub frequency: Frequency,
    /// First day of the schedule
    pub start_date: NaiveDate,
    /// Last day occurrences may be materialized
    pub end_date: Option<NaiveDate>,
    /// Preferred day of month (1-31)
    pub day_of_month: Option<u32>,
    /// Preferred weekday (0 = Sunday .. 6)
    pub day_of_week: Option<u32>,
    /// Let the processor materialize without a user action
    pub auto_create: bool,
}

impl NewTemplate {
    /// An auto-created expense template with no anchors or end date.
    #[must_use]
    pub fn new(
        account_id: i64,
        name: impl Into<String>,
        amount: Money,
        frequency: Frequency,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            account_id,
            category_id: None,
            name: name.into(),
            description: None,
            transaction_type: TransactionType::Expense,
            amount,
            currency: None,
            frequency,
            start_date,
            end_date: None,
            day_of_month: None,
            day_of_week: None,
            auto_create: true,
        }
    }
}

/// Partial update for [`update_template`]. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default)]
pub struct TemplatePatch {
    /// Book against another account
    pub account_id: Option<i64>,
    /// Change or clear the category
    pub category_id: Option<Option<i64>>,
    /// Rename
    pub name: Option<String>,
    /// Change or clear the description
    pub description: Option<Option<String>>,
    /// Switch between income and expense
    pub transaction_type: Option<TransactionType>,
    /// Change the amount
    pub amount: Option<Money>,
    /// Change the currency
    pub currency: Option<String>,
    /// Change the repetition rule
    pub frequency: Option<Frequency>,
    /// Move the start date; recomputes the next occurrence
    pub start_date: Option<NaiveDate>,
    /// Change or clear the end date
    pub end_date: Option<Option<NaiveDate>>,
    /// Change or clear the preferred day of month
    pub day_of_month: Option<Option<u32>>,
    /// Change or clear the preferred weekday
    pub day_of_week: Option<Option<u32>>,
    /// Switch automatic materialization
    pub auto_create: Option<bool>,
}

/// Where a template stands relative to a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    /// Deactivated by the user or by expiry
    Inactive,
    /// Past its end date but not yet deactivated by the processor
    Expired,
    /// Due, but waits for the user to materialize it
    ManualDue,
    /// Due and will be picked up by the processor
    Due,
    /// Next occurrence lies in the future
    Pending,
}

/// Classifies a template as of `today`.
#[must_use]
pub fn template_status(template: &recurring_template::Model, today: NaiveDate) -> TemplateStatus {
    if !template.is_active {
        TemplateStatus::Inactive
    } else if template.end_date.is_some_and(|end| today > end) {
        TemplateStatus::Expired
    } else if template.next_occurrence > today {
        TemplateStatus::Pending
    } else if template.auto_create {
        TemplateStatus::Due
    } else {
        TemplateStatus::ManualDue
    }
}

fn anchor_to_db(value: Option<u32>) -> Option<i32> {
    value.and_then(|v| i32::try_from(v).ok())
}

fn anchor_from_db(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

/// The schedule stored on a template.
#[must_use]
pub fn schedule_of(template: &recurring_template::Model) -> Schedule {
    Schedule {
        frequency: template.frequency,
        day_of_month: anchor_from_db(template.day_of_month),
        day_of_week: anchor_from_db(template.day_of_week),
    }
}

struct Rule<'a> {
    name: &'a str,
    transaction_type: TransactionType,
    amount: Money,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    day_of_month: Option<u32>,
    day_of_week: Option<u32>,
}

fn validate_rule(rule: &Rule<'_>) -> Result<()> {
    if rule.name.trim().is_empty() {
        return Err(Error::validation("Template name cannot be empty"));
    }
    if !rule.amount.is_positive() {
        return Err(Error::validation("Amount must be greater than zero"));
    }
    if rule.transaction_type == TransactionType::Transfer {
        return Err(Error::validation(
            "Recurring templates must be income or expense",
        ));
    }
    if rule.day_of_month.is_some_and(|day| !(1..=31).contains(&day)) {
        return Err(Error::validation("Day of month must be between 1 and 31"));
    }
    if rule.day_of_week.is_some_and(|day| day > 6) {
        return Err(Error::validation(
            "Day of week must be between 0 (Sunday) and 6 (Saturday)",
        ));
    }
    if rule.end_date.is_some_and(|end| end < rule.start_date) {
        return Err(Error::validation("End date cannot be before the start date"));
    }
    Ok(())
}

fn first_occurrence(schedule: &Schedule, start_date: NaiveDate) -> Result<NaiveDate> {
    schedule
        .next_after(start_date)
        .ok_or_else(|| Error::validation("Schedule runs past the supported date range"))
}

/// Creates a template whose first occurrence is the schedule rule applied to its start date.
#[instrument(skip(db, new), fields(owner = %owner_id))]
pub async fn create_template(
    db: &DatabaseConnection,
    owner_id: &str,
    new: NewTemplate,
) -> Result<recurring_template::Model> {
    validate_rule(&Rule {
        name: &new.name,
        transaction_type: new.transaction_type,
        amount: new.amount,
        start_date: new.start_date,
        end_date: new.end_date,
        day_of_month: new.day_of_month,
        day_of_week: new.day_of_week,
    })?;

    let account = find_owned_account(db, new.account_id, owner_id)
        .await?
        .ok_or(Error::AccountNotFound { id: new.account_id })?;
    require_optional_category(db, new.category_id, owner_id).await?;
    let currency = match new.currency {
        Some(code) => validate_currency(&code)?,
        None => account.currency,
    };

    let schedule = Schedule {
        frequency: new.frequency,
        day_of_month: new.day_of_month,
        day_of_week: new.day_of_week,
    };
    let next_occurrence = first_occurrence(&schedule, new.start_date)?;
    let now = Utc::now();

    let template = recurring_template::ActiveModel {
        owner_id: Set(owner_id.to_string()),
        account_id: Set(new.account_id),
        category_id: Set(new.category_id),
        name: Set(new.name.trim().to_string()),
        description: Set(new.description),
        transaction_type: Set(new.transaction_type),
        amount: Set(new.amount),
        currency: Set(currency),
        frequency: Set(new.frequency),
        start_date: Set(new.start_date),
        end_date: Set(new.end_date),
        next_occurrence: Set(next_occurrence),
        day_of_month: Set(anchor_to_db(new.day_of_month)),
        day_of_week: Set(anchor_to_db(new.day_of_week)),
        is_active: Set(true),
        auto_create: Set(new.auto_create),
        last_created: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(
        template_id = template.id,
        next_occurrence = %template.next_occurrence,
        "Created recurring template"
    );
    Ok(template)
}

pub(crate) async fn find_owned_template<C>(
    conn: &C,
    template_id: i64,
    owner_id: &str,
) -> Result<Option<recurring_template::Model>>
where
    C: ConnectionTrait,
{
    RecurringTemplate::find_by_id(template_id)
        .filter(recurring_template::Column::OwnerId.eq(owner_id))
        .one(conn)
        .await
        .map_err(Into::into)
}

/// Retrieves an owned template.
pub async fn get_template(
    db: &DatabaseConnection,
    template_id: i64,
    owner_id: &str,
) -> Result<recurring_template::Model> {
    find_owned_template(db, template_id, owner_id)
        .await?
        .ok_or(Error::TemplateNotFound { id: template_id })
}

/// Lists every template of the owner, newest first.
pub async fn list_templates(
    db: &DatabaseConnection,
    owner_id: &str,
) -> Result<Vec<recurring_template::Model>> {
    RecurringTemplate::find()
        .filter(recurring_template::Column::OwnerId.eq(owner_id))
        .order_by_desc(recurring_template::Column::CreatedAt)
        .order_by_desc(recurring_template::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists the owner's active templates, soonest occurrence first.
pub async fn list_active_templates(
    db: &DatabaseConnection,
    owner_id: &str,
) -> Result<Vec<recurring_template::Model>> {
    RecurringTemplate::find()
        .filter(recurring_template::Column::OwnerId.eq(owner_id))
        .filter(recurring_template::Column::IsActive.eq(true))
        .order_by_asc(recurring_template::Column::NextOccurrence)
        .order_by_asc(recurring_template::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Applies a patch to an owned template.
///
/// Moving the start date recomputes `next_occurrence` from the merged rule; other
/// edits leave the schedule position alone.
#[instrument(skip(db, patch), fields(owner = %owner_id))]
pub async fn update_template(
    db: &DatabaseConnection,
    template_id: i64,
    owner_id: &str,
    patch: TemplatePatch,
) -> Result<recurring_template::Model> {
    let existing = get_template(db, template_id, owner_id).await?;

    let account_id = patch.account_id.unwrap_or(existing.account_id);
    let name = patch.name.unwrap_or_else(|| existing.name.clone());
    let transaction_type = patch.transaction_type.unwrap_or(existing.transaction_type);
    let amount = patch.amount.unwrap_or(existing.amount);
    let frequency = patch.frequency.unwrap_or(existing.frequency);
    let start_date = patch.start_date.unwrap_or(existing.start_date);
    let end_date = patch.end_date.unwrap_or(existing.end_date);
    let day_of_month = patch
        .day_of_month
        .unwrap_or_else(|| anchor_from_db(existing.day_of_month));
    let day_of_week = patch
        .day_of_week
        .unwrap_or_else(|| anchor_from_db(existing.day_of_week));

    validate_rule(&Rule {
        name: &name,
        transaction_type,
        amount,
        start_date,
        end_date,
        day_of_month,
        day_of_week,
    })?;

    if account_id != existing.account_id {
        find_owned_account(db, account_id, owner_id)
            .await?
            .ok_or(Error::AccountNotFound { id: account_id })?;
    }

    let start_moved = start_date != existing.start_date;
    let mut active_model: recurring_template::ActiveModel = existing.into();

    if start_moved {
        let schedule = Schedule {
            frequency,
            day_of_month,
            day_of_week,
        };
        active_model.next_occurrence = Set(first_occurrence(&schedule, start_date)?);
    }
    if let Some(category_id) = patch.category_id {
        require_optional_category(db, category_id, owner_id).await?;
        active_model.category_id = Set(category_id);
    }
    if let Some(description) = patch.description {
        active_model.description = Set(description);
    }
    if let Some(currency) = patch.currency {
        active_model.currency = Set(validate_currency(&currency)?);
    }
    if let Some(auto_create) = patch.auto_create {
        active_model.auto_create = Set(auto_create);
    }
    active_model.account_id = Set(account_id);
    active_model.name = Set(name.trim().to_string());
    active_model.transaction_type = Set(transaction_type);
    active_model.amount = Set(amount);
    active_model.frequency = Set(frequency);
    active_model.start_date = Set(start_date);
    active_model.end_date = Set(end_date);
    active_model.day_of_month = Set(anchor_to_db(day_of_month));
    active_model.day_of_week = Set(anchor_to_db(day_of_week));
    active_model.updated_at = Set(Utc::now());

    active_model.update(db).await.map_err(Into::into)
}

/// Deletes an owned template. Returns `false` when the template is absent or foreign.
///
/// Transactions it already produced are kept and lose their `recurring_template_id`,
/// so from then on they count as ordinary transactions in summaries.
#[instrument(skip(db), fields(owner = %owner_id))]
pub async fn delete_template(
    db: &DatabaseConnection,
    template_id: i64,
    owner_id: &str,
) -> Result<bool> {
    let txn = db.begin().await?;

    let result = RecurringTemplate::delete_many()
        .filter(recurring_template::Column::Id.eq(template_id))
        .filter(recurring_template::Column::OwnerId.eq(owner_id))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Ok(false);
    }

    let detached = Transaction::update_many()
        .col_expr(
            transaction::Column::RecurringTemplateId,
            Expr::value(None::<i64>),
        )
        .filter(transaction::Column::RecurringTemplateId.eq(template_id))
        .exec(&txn)
        .await?
        .rows_affected;
    txn.commit().await?;

    info!(template_id, detached, "Deleted recurring template");
    Ok(true)
}

/// Flips `is_active` and nothing else.
pub async fn toggle_active(
    db: &DatabaseConnection,
    template_id: i64,
    owner_id: &str,
) -> Result<recurring_template::Model> {
    let existing = get_template(db, template_id, owner_id).await?;
    let is_active = !existing.is_active;

    let mut active_model: recurring_template::ActiveModel = existing.into();
    active_model.is_active = Set(is_active);
    active_model.updated_at = Set(Utc::now());
    let updated = active_model.update(db).await?;

    info!(template_id, is_active, "Toggled recurring template");
    Ok(updated)
}

/// Active, auto-created templates of one owner whose next occurrence is on or before `today`.
pub async fn find_due<C>(
    conn: &C,
    owner_id: &str,
    today: NaiveDate,
) -> Result<Vec<recurring_template::Model>>
where
    C: ConnectionTrait,
{
    RecurringTemplate::find()
        .filter(recurring_template::Column::OwnerId.eq(owner_id))
        .filter(recurring_template::Column::IsActive.eq(true))
        .filter(recurring_template::Column::AutoCreate.eq(true))
        .filter(recurring_template::Column::NextOccurrence.lte(today))
        .order_by_asc(recurring_template::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Same as [`find_due`] across every owner.
pub async fn find_all_due<C>(conn: &C, today: NaiveDate) -> Result<Vec<recurring_template::Model>>
where
    C: ConnectionTrait,
{
    RecurringTemplate::find()
        .filter(recurring_template::Column::IsActive.eq(true))
        .filter(recurring_template::Column::AutoCreate.eq(true))
        .filter(recurring_template::Column::NextOccurrence.lte(today))
        .order_by_asc(recurring_template::Column::Id)
        .all(conn)
        .await
        .map_err(Into::into)
}

/// Previews up to `count` upcoming occurrence dates, honouring the end date.
pub async fn upcoming(
    db: &DatabaseConnection,
    template_id: i64,
    owner_id: &str,
    count: usize,
) -> Result<Vec<NaiveDate>> {
    let template = get_template(db, template_id, owner_id).await?;
    if !template.is_active {
        return Ok(Vec::new());
    }
    Ok(schedule_of(&template)
        .occurrences(template.next_occurrence, template.end_date)
        .take(count)
        .collect())
}
