//! Transaction split entity - Allocation of part of a transaction to a category.
//!
//! Splits of one transaction sum to its amount. They never affect balances.

use crate::core::money::Money;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction split database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "transaction_splits")]
pub struct Model {
    /// Unique identifier for the split
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Parent transaction
    pub transaction_id: i64,
    /// Category receiving this part
    pub category_id: i64,
    /// Portion of the parent amount
    #[sea_orm(column_type = "BigInteger")]
    pub amount: Money,
    /// Optional note for this part
    pub description: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
