//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables of the ledger.
//! Each entity has a Model struct for data and an Entity struct for operations.
//!
//! Tables carry no foreign-key rules; referential cleanup is done explicitly by
//! the services in [`crate::core`].

pub mod account;
pub mod budget;
pub mod category;
pub mod exchange_rate;
pub mod recurring_template;
pub mod transaction;
pub mod transaction_split;

// Re-export specific types to avoid conflicts
pub use account::{AccountType, Column as AccountColumn, Entity as Account, Model as AccountModel};
pub use budget::{BudgetPeriod, Column as BudgetColumn, Entity as Budget, Model as BudgetModel};
pub use category::{
    CategoryType, Column as CategoryColumn, Entity as Category, Model as CategoryModel,
};
pub use exchange_rate::{
    Column as ExchangeRateColumn, Entity as ExchangeRate, Model as ExchangeRateModel,
};
pub use recurring_template::{
    Column as RecurringTemplateColumn, Entity as RecurringTemplate, Frequency,
    Model as RecurringTemplateModel,
};
pub use transaction::{
    Column as TransactionColumn, Entity as Transaction, Model as TransactionModel,
    TransactionType,
};
pub use transaction_split::{
    Column as TransactionSplitColumn, Entity as TransactionSplit, Model as TransactionSplitModel,
};
