use sea_orm::entity::prelude::*;
use serde::Serialize;

use crate::entities::category::Category;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub product_id: String,
    pub name: String,
    #[sea_orm(nullable)]
    pub brand: Option<String>,
    pub category: Category,
    #[sea_orm(nullable)]
    pub subcategory: Option<String>,
    pub price: f64,
    #[sea_orm(column_type = "Text")]
    pub image_url: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "crate::entities::specification::Entity")]
    Specification,
    #[sea_orm(has_many = "crate::entities::review::Entity")]
    Review,
}

impl Related<crate::entities::specification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Specification.def()
    }
}

impl Related<crate::entities::review::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Review.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
