use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue;
use serde::Serialize;

use crate::entities::category::Category;
use crate::entities::product::Entity as Product;

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 5.0;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "reviews")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub review_id: i32,
    #[sea_orm(indexed)]
    pub product_id: String,
    pub user_alias: String,
    #[sea_orm(column_type = "Text")]
    pub review_text: String,
    #[sea_orm(nullable)]
    pub rating: Option<f64>,
    pub category: Category,
    #[sea_orm(nullable)]
    pub subcategory: Option<String>,
    #[sea_orm(nullable)]
    pub brand: Option<String>,
    pub date_posted: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Product",
        from = "crate::entities::review::Column::ProductId",
        to = "crate::entities::product::Column::ProductId",
        on_update = "Cascade",
        on_delete = "Restrict"
    )]
    Product,
}

impl Related<crate::entities::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    // Range check for rows written through the active model.
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if let ActiveValue::Set(Some(rating)) = &self.rating {
            if !(MIN_RATING..=MAX_RATING).contains(rating) {
                return Err(DbErr::Custom(format!(
                    "rating {} is outside {}..={}",
                    rating, MIN_RATING, MAX_RATING
                )));
            }
        }
        Ok(self)
    }
}
