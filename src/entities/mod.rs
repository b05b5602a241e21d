pub mod blog;
pub mod category;
pub mod product;
pub mod review;
pub mod specification;

use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use crate::entities::{
    blog::Entity as Blog,
    product::Entity as Product,
    review::Entity as Review,
    specification::Entity as Specification,
};

pub const SPEC_NAME_INDEX: &str = "uq_product_specifications_product_spec_name";

/// Creates every table (parents first) and its indexes if they do not exist yet.
pub async fn setup_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, Product).await?;
    create_table(db, Specification).await?;
    create_table(db, Review).await?;
    create_table(db, Blog).await?;

    let backend = db.get_database_backend();
    let unique_spec_name = Index::create()
        .name(SPEC_NAME_INDEX)
        .table(Specification)
        .col(specification::Column::ProductId)
        .col(specification::Column::SpecName)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(backend.build(&unique_spec_name)).await?;

    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait + Copy,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut create_table = schema.create_table_from_entity(entity);
    create_table.if_not_exists();
    db.execute(backend.build(&create_table)).await?;

    for mut create_index in schema.create_index_from_entity(entity) {
        create_index.if_not_exists();
        db.execute(backend.build(&create_index)).await?;
    }

    tracing::debug!(table = %entity.table_name(), "Schema ready");
    Ok(())
}
