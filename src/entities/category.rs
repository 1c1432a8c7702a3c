//! Category entity - An owner's label for income or expense, optionally nested under a parent.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Direction of money a category classifies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    /// Money coming in
    #[sea_orm(string_value = "income")]
    Income,
    /// Money going out
    #[sea_orm(string_value = "expense")]
    Expense,
}

/// Category database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    /// Unique identifier for the category
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning user
    pub owner_id: String,
    /// Display name
    pub name: String,
    /// Income or expense
    pub category_type: CategoryType,
    /// Hex colour such as `#3b82f6`
    pub color: Option<String>,
    /// Icon name or emoji
    pub icon: Option<String>,
    /// Parent category for subcategories
    pub parent_id: Option<i64>,
    /// Free-form description
    pub description: Option<String>,
    /// System categories cannot be deleted
    pub is_system: bool,
    /// When the category was created
    pub created_at: DateTimeUtc,
    /// When the category was last modified
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
