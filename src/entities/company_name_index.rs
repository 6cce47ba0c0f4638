//! `company_name_index`: normalized name -> company id cache

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "company_name_index")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub normalized_name: String,
    pub company_id: String,
    pub match_type: String,
    #[sea_orm(column_type = "Double")]
    pub confidence: f64,
    pub source: String,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
