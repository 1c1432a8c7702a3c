/// Account store and the balance ledger
pub mod account;

/// Budget store and budget-vs-spend evaluation
pub mod budget;

/// Income and expense categories
pub mod category;

/// Injectable time source
pub mod clock;

/// Exchange rates and currency conversion for aggregates
pub mod fx;

/// Fixed-point money type
pub mod money;

/// Materialization of due recurring templates
pub mod processor;

/// Recurring template store
pub mod recurring;

/// Next-occurrence date rules
pub mod schedule;

/// Transaction store and balance effects
pub mod transaction;
