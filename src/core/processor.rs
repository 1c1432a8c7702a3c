//! Recurring processor - turns due templates into concrete transactions.
//!
//! Each template is handled in its own database transaction: the occurrence is booked
//! through the transaction store, then the template's `next_occurrence` is advanced
//! with a compare-and-set on the value that was read. If another run advanced the
//! template first, the guard matches no row and the whole unit rolls back, so an
//! occurrence is never booked twice and never booked without its schedule advance.
//!
//! Batch runs collect per-template failures as messages and keep going.

use crate::{
    core::{
        clock::Clock,
        recurring::{find_all_due, find_due, find_owned_template, schedule_of},
        transaction::{NewTransaction, create_in},
    },
    entities::{RecurringTemplate, recurring_template, transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Outcome of materializing one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialization {
    /// A transaction was booked and the schedule advanced
    Created(Box<transaction::Model>),
    /// The template was past its end date and has been deactivated
    Expired,
}

/// Result of [`process_due_for_user`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    /// Transactions booked
    pub created: usize,
    /// One message per template that failed
    pub errors: Vec<String>,
}

/// Result of [`process_all_due`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Due templates looked at
    pub processed: usize,
    /// Transactions booked
    pub created: usize,
    /// One message per template that failed
    pub errors: Vec<String>,
}

fn occurrence_for(template: &recurring_template::Model) -> NewTransaction {
    let mut new = NewTransaction::new(
        template.account_id,
        template.transaction_type,
        template.amount,
        template.next_occurrence,
    );
    new.category_id = template.category_id;
    new.currency = Some(template.currency.clone());
    new.description = Some(
        template
            .description
            .clone()
            .unwrap_or_else(|| template.name.clone()),
    );
    new.notes = Some(format!("Auto-created from recurring: {}", template.name));
    new
}

async fn materialize_in<C>(
    conn: &C,
    template: &recurring_template::Model,
    now: DateTime<Utc>,
) -> Result<Materialization>
where
    C: ConnectionTrait,
{
    if template.end_date.is_some_and(|end| now.date_naive() > end) {
        let mut active_model: recurring_template::ActiveModel = template.clone().into();
        active_model.is_active = Set(false);
        active_model.updated_at = Set(now);
        active_model.update(conn).await?;
        return Ok(Materialization::Expired);
    }

    let created = create_in(
        conn,
        &template.owner_id,
        occurrence_for(template),
        Some(template.id),
    )
    .await?;

    let next_occurrence = schedule_of(template)
        .next_after(template.next_occurrence)
        .ok_or_else(|| Error::validation("Schedule runs past the supported date range"))?;

    let advanced = RecurringTemplate::update_many()
        .col_expr(
            recurring_template::Column::NextOccurrence,
            Expr::value(next_occurrence),
        )
        .col_expr(recurring_template::Column::LastCreated, Expr::value(now))
        .col_expr(recurring_template::Column::UpdatedAt, Expr::value(now))
        .filter(recurring_template::Column::Id.eq(template.id))
        .filter(recurring_template::Column::NextOccurrence.eq(template.next_occurrence))
        .exec(conn)
        .await?;
    if advanced.rows_affected == 0 {
        return Err(Error::ScheduleConflict { id: template.id });
    }

    Ok(Materialization::Created(Box::new(created)))
}

/// Materializes one template as a single unit of work.
///
/// A template past its end date is deactivated and reported as [`Materialization::Expired`].
/// Otherwise one transaction is booked on `next_occurrence` and the template moves to the
/// following occurrence. The reschedule only succeeds if `next_occurrence` still holds the
/// value read by the caller, so two sweeps racing on one template book it once.
///
/// # Arguments
/// * `template` - The row as read by the caller
/// * `now` - Timestamp recorded as `last_created`; its date decides expiry
///
/// # Errors
/// `ScheduleConflict` when another run rescheduled the template first. Every error rolls
/// back the booked transaction together with the reschedule.
pub async fn materialize(
    db: &DatabaseConnection,
    template: &recurring_template::Model,
    now: DateTime<Utc>,
) -> Result<Materialization> {
    let txn = db.begin().await?;
    let outcome = materialize_in(&txn, template, now).await?;
    txn.commit().await?;

    match &outcome {
        Materialization::Created(created) => info!(
            template_id = template.id,
            transaction_id = created.id,
            date = %created.date,
            "Materialized recurring template"
        ),
        Materialization::Expired => info!(
            template_id = template.id,
            "Recurring template expired and was deactivated"
        ),
    }
    Ok(outcome)
}

/// Materializes every due template of one owner.
///
/// A failing template is reported in `errors` and skipped; earlier successes stay
/// committed. Expired templates are deactivated and not counted as created.
#[instrument(skip(db, clock), fields(owner = %owner_id))]
pub async fn process_due_for_user(
    db: &DatabaseConnection,
    clock: &dyn Clock,
    owner_id: &str,
) -> Result<ProcessReport> {
    let now = clock.now();
    let due = find_due(db, owner_id, clock.today()).await?;

    let mut report = ProcessReport::default();
    for template in &due {
        match materialize(db, template, now).await {
            Ok(Materialization::Created(_)) => report.created += 1,
            Ok(Materialization::Expired) => {}
            Err(e) => {
                warn!(template_id = template.id, error = %e, "Recurring template failed");
                report.errors.push(format!(
                    "Failed to create transaction for recurring {}: {e}",
                    template.id
                ));
            }
        }
    }

    info!(
        due = due.len(),
        created = report.created,
        failed = report.errors.len(),
        "Processed due recurring templates"
    );
    Ok(report)
}

/// Materializes every due template of every owner. Intended for a scheduled job.
///
/// Due templates are those active, auto-created ones whose `next_occurrence` is on or
/// before the clock's date. Each one is processed once per run as its own unit of work,
/// so a template several periods behind catches up over successive runs. A failing
/// template is logged and recorded in [`SweepReport::errors`] and the sweep moves on.
///
/// # Arguments
/// * `clock` - Source of today's date and of the `last_created` timestamp
#[instrument(skip(db, clock))]
pub async fn process_all_due(db: &DatabaseConnection, clock: &dyn Clock) -> Result<SweepReport> {
    let now = clock.now();
    let due = find_all_due(db, clock.today()).await?;

    let mut report = SweepReport {
        processed: due.len(),
        ..Default::default()
    };
    for template in &due {
        match materialize(db, template, now).await {
            Ok(Materialization::Created(_)) => report.created += 1,
            Ok(Materialization::Expired) => {}
            Err(e) => {
                warn!(
                    template_id = template.id,
                    owner = %template.owner_id,
                    error = %e,
                    "Recurring template failed"
                );
                report.errors.push(format!(
                    "Failed to create transaction for recurring {} (user: {}): {e}",
                    template.id, template.owner_id
                ));
            }
        }
    }

    info!(
        processed = report.processed,
        created = report.created,
        failed = report.errors.len(),
        "Recurring sweep finished"
    );
    Ok(report)
}

/// Materializes an owned template immediately, ignoring whether it is due.
///
/// Fails with `TemplateNotFound` for absent or foreign templates and `TemplateInactive`
/// for deactivated ones. An expired template is deactivated instead.
pub async fn create_now(
    db: &DatabaseConnection,
    clock: &dyn Clock,
    template_id: i64,
    owner_id: &str,
) -> Result<Materialization> {
    let template = find_owned_template(db, template_id, owner_id)
        .await?
        .ok_or(Error::TemplateNotFound { id: template_id })?;
    if !template.is_active {
        return Err(Error::TemplateInactive { id: template_id });
    }
    materialize(db, &template, clock.now()).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::{
            account::get_account,
            clock::FixedClock,
            recurring::{NewTemplate, create_template, get_template, toggle_active},
        },
        entities::{Account, CategoryType, Frequency, Transaction, TransactionType},
        test_utils::*,
    };

    #[tokio::test]
    async fn test_expired_template_is_deactivated_without_transaction() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Checking", "100").await?;
        let mut new = NewTemplate::new(
            account.id,
            "Trial",
            money("10"),
            Frequency::Monthly,
            date(2024, 1, 1),
        );
        new.end_date = Some(date(2024, 1, 31));
        let template = create_template(&db, "alice", new).await?;

        let clock = FixedClock::at_date(date(2024, 2, 5));
        let report = process_due_for_user(&db, &clock, "alice").await?;

        assert_eq!(report.created, 0);
        assert!(report.errors.is_empty());
        assert!(!get_template(&db, template.id, "alice").await?.is_active);
        assert!(Transaction::find().all(&db).await?.is_empty());
        assert_eq!(get_account(&db, account.id, "alice").await?.current_balance, money("100"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_batch_continues() -> Result<()> {
        init_test_tracing();
        let db = setup_test_db().await?;
        let checking = create_test_account(&db, "alice", "Checking", "1000").await?;
        let doomed = create_test_account(&db, "alice", "Closed", "0").await?;

        let rent = create_test_template(&db, "alice", checking.id, "Rent", "900").await?;
        let broken = create_test_template(&db, "alice", doomed.id, "Gym", "30").await?;
        let phone = create_test_template(&db, "alice", checking.id, "Phone", "40").await?;
        Account::delete_by_id(doomed.id).exec(&db).await?;

        let clock = FixedClock::at_date(date(2024, 2, 1));
        let report = process_due_for_user(&db, &clock, "alice").await?;

        assert_eq!(report.created, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(
            report.errors[0].starts_with(&format!(
                "Failed to create transaction for recurring {}:",
                broken.id
            )),
            "{}",
            report.errors[0]
        );

        assert_eq!(get_account(&db, checking.id, "alice").await?.current_balance, money("60"));
        assert_eq!(get_template(&db, rent.id, "alice").await?.next_occurrence, date(2024, 3, 1));
        assert_eq!(get_template(&db, phone.id, "alice").await?.next_occurrence, date(2024, 3, 1));
        assert_eq!(get_template(&db, broken.id, "alice").await?.next_occurrence, date(2024, 2, 1));
        assert_eq!(Transaction::find().all(&db).await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_processing_twice_materializes_once() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Checking", "1000").await?;
        create_test_template(&db, "alice", account.id, "Rent", "900").await?;

        let clock = FixedClock::at_date(date(2024, 2, 10));
        assert_eq!(process_due_for_user(&db, &clock, "alice").await?.created, 1);
        assert_eq!(process_due_for_user(&db, &clock, "alice").await?.created, 0);

        assert_eq!(Transaction::find().all(&db).await?.len(), 1);
        assert_eq!(get_account(&db, account.id, "alice").await?.current_balance, money("100"));
        Ok(())
    }

    #[tokio::test]
    async fn test_materialized_transaction_carries_provenance() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Checking", "0").await?;
        let wages = create_test_category(&db, "alice", "Wages", CategoryType::Income).await?;
        let mut new = NewTemplate::new(
            account.id,
            "Salary",
            money("2500"),
            Frequency::Monthly,
            date(2024, 1, 31),
        );
        new.transaction_type = TransactionType::Income;
        new.day_of_month = Some(31);
        new.category_id = Some(wages.id);
        let template = create_template(&db, "alice", new).await?;

        let clock = FixedClock::at_date(date(2024, 3, 1));
        let outcome = create_now(&db, &clock, template.id, "alice").await?;
        let Materialization::Created(created) = outcome else {
            return Err(Error::validation("expected a created transaction"));
        };

        assert_eq!(created.recurring_template_id, Some(template.id));
        assert_eq!(created.transaction_type, TransactionType::Income);
        assert_eq!(created.date, date(2024, 2, 29));
        assert_eq!(created.description.as_deref(), Some("Salary"));
        assert_eq!(created.notes.as_deref(), Some("Auto-created from recurring: Salary"));
        assert_eq!(created.category_id, Some(wages.id));

        let advanced = get_template(&db, template.id, "alice").await?;
        assert_eq!(advanced.next_occurrence, date(2024, 3, 31));
        assert_eq!(advanced.last_created, Some(clock.now()));
        assert_eq!(get_account(&db, account.id, "alice").await?.current_balance, money("2500"));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_now_errors() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Checking", "0").await?;
        let template = create_test_template(&db, "alice", account.id, "Rent", "900").await?;
        let clock = FixedClock::at_date(date(2024, 1, 2));

        let result = create_now(&db, &clock, template.id, "bob").await;
        assert!(matches!(result, Err(Error::TemplateNotFound { .. })));

        toggle_active(&db, template.id, "alice").await?;
        let result = create_now(&db, &clock, template.id, "alice").await;
        assert!(matches!(result, Err(Error::TemplateInactive { id }) if id == template.id));

        // Ignores the due check once active again
        toggle_active(&db, template.id, "alice").await?;
        let outcome = create_now(&db, &clock, template.id, "alice").await?;
        assert!(matches!(outcome, Materialization::Created(_)));
        assert_eq!(get_account(&db, account.id, "alice").await?.current_balance, money("-900"));
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_read_is_a_schedule_conflict() -> Result<()> {
        let db = setup_test_db().await?;
        let account = create_test_account(&db, "alice", "Checking", "0").await?;
        let stale = create_test_template(&db, "alice", account.id, "Rent", "900").await?;
        let clock = FixedClock::at_date(date(2024, 2, 1));

        materialize(&db, &stale, clock.now()).await?;
        let result = materialize(&db, &stale, clock.now()).await;

        assert!(matches!(result, Err(Error::ScheduleConflict { id }) if id == stale.id));
        assert_eq!(Transaction::find().all(&db).await?.len(), 1);
        assert_eq!(get_account(&db, account.id, "alice").await?.current_balance, money("-900"));
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_covers_every_owner() -> Result<()> {
        init_test_tracing();
        let db = setup_test_db().await?;
        let alice = create_test_account(&db, "alice", "Checking", "0").await?;
        let bob = create_test_account(&db, "bob", "Checking", "0").await?;
        let carol = create_test_account(&db, "carol", "Checking", "0").await?;

        create_test_template(&db, "alice", alice.id, "Rent", "900").await?;
        create_test_template(&db, "bob", bob.id, "Rent", "700").await?;
        let broken = create_test_template(&db, "carol", carol.id, "Rent", "500").await?;
        Account::delete_by_id(carol.id).exec(&db).await?;

        let clock = FixedClock::at_date(date(2024, 2, 1));
        let report = process_all_due(&db, &clock).await?;

        assert_eq!(report.processed, 3);
        assert_eq!(report.created, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains(&format!("recurring {} (user: carol)", broken.id)));
        assert_eq!(get_account(&db, bob.id, "bob").await?.current_balance, money("-700"));

        let again = process_all_due(&db, &clock).await?;
        assert_eq!(again.processed, 1);
        assert_eq!(again.created, 0);
        assert_eq!(get_account(&db, alice.id, "alice").await?.current_balance, money("-900"));
        Ok(())
    }
}
