//! Error types shared by every layer of the crate.
//!
//! Each variant belongs to one [`ErrorKind`], which is what the HTTP boundary uses to
//! pick a status code. Storage failures keep their cause for logging but only ever
//! expose a generic message to callers.

use thiserror::Error;

/// Broad classes of failure, used to map errors onto boundary responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The entity is absent or belongs to another owner.
    NotFound,
    /// Malformed input or a missing cross-field requirement.
    Validation,
    /// Well-formed input that a business rule forbids.
    BusinessRule,
    /// Infrastructure failure.
    Storage,
}

/// All errors produced by the ledger core.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings file or environment problem.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// Input failed validation.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the problem
        message: String,
    },

    /// An amount string or value that is not a valid fixed-point amount.
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected input
        amount: String,
    },

    /// Account missing or not owned by the caller.
    #[error("Account not found: {id}")]
    AccountNotFound {
        /// Requested account id
        id: i64,
    },

    /// Category missing or not owned by the caller.
    #[error("Category not found: {id}")]
    CategoryNotFound {
        /// Requested category id
        id: i64,
    },

    /// Transaction missing or not owned by the caller.
    #[error("Transaction not found: {id}")]
    TransactionNotFound {
        /// Requested transaction id
        id: i64,
    },

    /// Recurring template missing or not owned by the caller.
    #[error("Recurring template not found: {id}")]
    TemplateNotFound {
        /// Requested template id
        id: i64,
    },

    /// Budget missing or not owned by the caller.
    #[error("Budget not found: {id}")]
    BudgetNotFound {
        /// Requested budget id
        id: i64,
    },

    /// Attempt to book a transaction against a deactivated account.
    #[error("Account {id} is not active")]
    AccountInactive {
        /// The deactivated account
        id: i64,
    },

    /// Deleting a system category, or one that splits still reference.
    #[error("Category {id} cannot be deleted: {reason}")]
    CategoryInUse {
        /// The protected category
        id: i64,
        /// Why deletion was refused
        reason: String,
    },

    /// Manual materialization of a deactivated template.
    #[error("Recurring template {id} is not active")]
    TemplateInactive {
        /// The deactivated template
        id: i64,
    },

    /// The template was rescheduled by someone else between read and write.
    #[error("Recurring template {id} was rescheduled concurrently")]
    ScheduleConflict {
        /// The contended template
        id: i64,
    },

    /// No rate is known to convert between two currencies.
    #[error("No exchange rate from {from} to {to}")]
    MissingExchangeRate {
        /// Source currency
        from: String,
        /// Target currency
        to: String,
    },

    /// Arithmetic left the representable range of an amount.
    #[error("Amount overflow")]
    AmountOverflow,

    /// Database error from SeaORM.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O error, e.g. reading the settings file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classifies the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AccountNotFound { .. }
            | Self::CategoryNotFound { .. }
            | Self::TransactionNotFound { .. }
            | Self::TemplateNotFound { .. }
            | Self::BudgetNotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } | Self::InvalidAmount { .. } | Self::AmountOverflow => {
                ErrorKind::Validation
            }
            Self::AccountInactive { .. }
            | Self::TemplateInactive { .. }
            | Self::CategoryInUse { .. }
            | Self::ScheduleConflict { .. }
            | Self::MissingExchangeRate { .. } => ErrorKind::BusinessRule,
            Self::Config { .. } | Self::Database(_) | Self::Io(_) => ErrorKind::Storage,
        }
    }

    /// HTTP status code for the boundary layer.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::Validation | ErrorKind::BusinessRule => 400,
            ErrorKind::Storage => 500,
        }
    }

    /// Message safe to show to a client. Storage failures never leak their cause.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Storage => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
