use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    ModelTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::api::{
    fetch_page, product::find_product, settle, PageLimits, PageQuery, PageResponse, Pagination,
};
use crate::entities::{
    product::Entity as ProductEntity,
    specification::{self, Entity as SpecEntity},
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::logging::to_response;

pub const SPEC_PAGES: PageLimits = PageLimits {
    default: 50,
    max: 200,
};

//ROUTERS
pub fn specification_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/specs", get(get_specs).post(create_specs))
        .route("/specs/", get(get_specs).post(create_specs))
        .route(
            "/specs/product/:product_id",
            get(get_specs_by_product).delete(delete_specs_by_product),
        )
        .route(
            "/specs/:spec_id",
            get(get_spec).put(update_spec).delete(delete_spec),
        )
        .layer(Extension(db))
}

//ROUTES
async fn get_specs(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
) -> ApiResult<Response> {
    let pagination = Pagination::from_query(&paging, SPEC_PAGES);

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let select = SpecEntity::find().order_by_asc(specification::Column::SpecId);
        Ok(fetch_page(select, &txn, pagination).await?)
    }
    .await;
    let page = settle(txn, outcome).await?;

    Ok(to_response(
        (StatusCode::OK, Json(PageResponse::new(page, pagination))),
        Ok(()),
    ))
}

async fn get_spec(
    Path(spec_id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> ApiResult<Response> {
    let txn = db.begin().await?;
    let outcome = find_spec(&txn, spec_id).await;
    let spec = settle(txn, outcome).await?;

    Ok(to_response((StatusCode::OK, Json(spec)), Ok(())))
}

async fn get_specs_by_product(
    Path(product_id): Path<String>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> ApiResult<Response> {
    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let product = find_product(&txn, &product_id).await?;
        Ok(product
            .find_related(SpecEntity)
            .order_by_asc(specification::Column::SpecId)
            .all(&txn)
            .await?)
    }
    .await;
    let specs = settle(txn, outcome).await?;

    Ok(to_response((StatusCode::OK, Json(specs)), Ok(())))
}

async fn create_specs(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    payload: Result<Json<SpecPayload>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;

    match payload {
        SpecPayload::One(item) => create_spec(&db, item).await,
        SpecPayload::Many(items) => create_spec_batch(&db, items).await,
    }
}

async fn create_spec(db: &DatabaseConnection, item: NewSpec) -> ApiResult<Response> {
    let product_id =
        spec_field(item.product_id.as_ref(), "product_id").map_err(ApiError::Validation)?;
    let spec_name =
        spec_field(item.spec_name.as_ref(), "spec_name").map_err(ApiError::Validation)?;
    let spec_value =
        spec_field(item.spec_value.as_ref(), "spec_value").map_err(ApiError::Validation)?;

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        find_product(&txn, &product_id).await?;
        ensure_unique_name(&txn, &product_id, &spec_name, None).await?;

        let new_spec = specification::ActiveModel {
            product_id: Set(product_id.clone()),
            spec_name: Set(spec_name),
            spec_value: Set(spec_value),
            ..Default::default()
        };
        Ok(new_spec.insert(&txn).await?)
    }
    .await;
    let spec = settle(txn, outcome).await?;

    info!(spec_id = spec.spec_id, product_id = %spec.product_id, "Created specification");
    Ok(to_response(
        (
            StatusCode::CREATED,
            Json(json!({
                "message": "Specification added successfully!",
                "spec_id": spec.spec_id
            })),
        ),
        Ok(()),
    ))
}

/// All-or-nothing: every item is validated before anything is written, and the
/// rows go in with a single insert inside one transaction.
async fn create_spec_batch(db: &DatabaseConnection, items: Vec<NewSpec>) -> ApiResult<Response> {
    if items.is_empty() {
        return Err(ApiError::validation("Empty array provided"));
    }

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let mut errors = Vec::new();
        let mut rows = Vec::with_capacity(items.len());
        let mut known_products = HashSet::new();

        for (idx, item) in items.iter().enumerate() {
            let product_id = spec_field(item.product_id.as_ref(), "product_id");
            let spec_name = spec_field(item.spec_name.as_ref(), "spec_name");
            let spec_value = spec_field(item.spec_value.as_ref(), "spec_value");

            if let Ok(product_id) = &product_id {
                if !known_products.contains(product_id) {
                    if ProductEntity::find_by_id(product_id.as_str())
                        .one(&txn)
                        .await?
                        .is_some()
                    {
                        known_products.insert(product_id.clone());
                    } else {
                        errors.push(format!("Item {idx}: Product {product_id} not found"));
                    }
                }
            }

            match (product_id, spec_name, spec_value) {
                (Ok(product_id), Ok(spec_name), Ok(spec_value)) => {
                    rows.push((product_id, spec_name, spec_value));
                }
                (product_id, spec_name, spec_value) => {
                    for message in [product_id.err(), spec_name.err(), spec_value.err()]
                        .into_iter()
                        .flatten()
                    {
                        errors.push(format!("Item {idx}: {message}"));
                    }
                }
            }
        }

        if !errors.is_empty() {
            return Err(ApiError::InvalidBatch(errors));
        }

        let mut seen = HashSet::new();
        for (product_id, spec_name, _) in &rows {
            if !seen.insert((product_id.as_str(), spec_name.as_str())) {
                return Err(ApiError::Conflict(format!(
                    "Specification '{spec_name}' appears more than once for product {product_id}"
                )));
            }
            ensure_unique_name(&txn, product_id, spec_name, None).await?;
        }

        let count = rows.len();
        let models = rows
            .into_iter()
            .map(|(product_id, spec_name, spec_value)| specification::ActiveModel {
                product_id: Set(product_id),
                spec_name: Set(spec_name),
                spec_value: Set(spec_value),
                ..Default::default()
            });
        SpecEntity::insert_many(models).exec(&txn).await?;
        Ok(count)
    }
    .await;
    let count = settle(txn, outcome).await?;

    info!(count, "Created specifications in bulk");
    Ok(to_response(
        (
            StatusCode::CREATED,
            Json(json!({
                "message": format!("{count} specification(s) added successfully!"),
                "count": count
            })),
        ),
        Ok(()),
    ))
}

async fn update_spec(
    Path(spec_id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    payload: Result<Json<SpecUpdate>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;

    let spec_name = optional_spec_field(payload.spec_name.as_ref(), "spec_name")?;
    let spec_value = optional_spec_field(payload.spec_value.as_ref(), "spec_value")?;
    let product_id = payload.product_id.as_ref().and_then(text_of);

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let existing = find_spec(&txn, spec_id).await?;

        if product_id.as_ref().is_some_and(|id| *id != existing.product_id) {
            return Err(ApiError::validation(
                "Cannot change product_id. Delete and recreate the specification instead.",
            ));
        }
        if let Some(spec_name) = &spec_name {
            ensure_unique_name(&txn, &existing.product_id, spec_name, Some(spec_id)).await?;
        }

        let mut spec: specification::ActiveModel = existing.into();
        if let Some(spec_name) = spec_name {
            spec.spec_name = Set(spec_name);
        }
        if let Some(spec_value) = spec_value {
            spec.spec_value = Set(spec_value);
        }
        if spec.is_changed() {
            spec.update(&txn).await?;
        }
        Ok(())
    }
    .await;
    settle(txn, outcome).await?;

    info!(spec_id, "Updated specification");
    Ok(to_response(
        (
            StatusCode::OK,
            Json(json!({
                "message": "Specification updated successfully!"
            })),
        ),
        Ok(()),
    ))
}

async fn delete_spec(
    Path(spec_id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> ApiResult<Response> {
    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let spec = find_spec(&txn, spec_id).await?;
        spec.delete(&txn).await?;
        Ok(())
    }
    .await;
    settle(txn, outcome).await?;

    info!(spec_id, "Deleted specification");
    Ok(to_response(
        (
            StatusCode::OK,
            Json(json!({
                "message": "Specification deleted successfully!"
            })),
        ),
        Ok(()),
    ))
}

async fn delete_specs_by_product(
    Path(product_id): Path<String>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> ApiResult<Response> {
    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        find_product(&txn, &product_id).await?;
        let result = SpecEntity::delete_many()
            .filter(specification::Column::ProductId.eq(product_id.as_str()))
            .exec(&txn)
            .await?;
        Ok(result.rows_affected)
    }
    .await;
    let count = settle(txn, outcome).await?;

    info!(product_id = %product_id, count, "Deleted specifications of product");
    Ok(to_response(
        (
            StatusCode::OK,
            Json(json!({
                "message": format!("{count} specification(s) deleted successfully!"),
                "count": count
            })),
        ),
        Ok(()),
    ))
}

//Helpers
async fn find_spec(txn: &DatabaseTransaction, spec_id: i32) -> ApiResult<specification::Model> {
    SpecEntity::find_by_id(spec_id)
        .one(txn)
        .await?
        .ok_or_else(|| ApiError::not_found("Specification not found"))
}

async fn ensure_unique_name(
    txn: &DatabaseTransaction,
    product_id: &str,
    spec_name: &str,
    exclude: Option<i32>,
) -> ApiResult<()> {
    let mut query = SpecEntity::find()
        .filter(specification::Column::ProductId.eq(product_id))
        .filter(specification::Column::SpecName.eq(spec_name));
    if let Some(spec_id) = exclude {
        query = query.filter(specification::Column::SpecId.ne(spec_id));
    }

    match query.one(txn).await? {
        Some(_) => Err(ApiError::Conflict(format!(
            "Specification '{spec_name}' already exists for product {product_id}"
        ))),
        None => Ok(()),
    }
}

// Strings and numbers are both accepted as text.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn spec_field(value: Option<&Value>, field: &str) -> Result<String, String> {
    match value.and_then(text_of) {
        None => Err(format!("Missing {field}")),
        Some(text) if text.trim().is_empty() => Err(format!("{field} cannot be empty")),
        Some(text) => Ok(text.trim().to_owned()),
    }
}

fn optional_spec_field(value: Option<&Value>, field: &str) -> ApiResult<Option<String>> {
    match value.filter(|value| !value.is_null()) {
        None => Ok(None),
        Some(value) => spec_field(Some(value), field)
            .map(Some)
            .map_err(ApiError::Validation),
    }
}

//Structs
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum SpecPayload {
    Many(Vec<NewSpec>),
    One(NewSpec),
}

#[derive(Deserialize, Debug)]
struct NewSpec {
    product_id: Option<Value>,
    spec_name: Option<Value>,
    spec_value: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct SpecUpdate {
    product_id: Option<Value>,
    spec_name: Option<Value>,
    spec_value: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_fields_accept_numbers_and_trim() {
        assert_eq!(spec_field(Some(&json!(" 16GB ")), "spec_value").unwrap(), "16GB");
        assert_eq!(spec_field(Some(&json!(512)), "spec_value").unwrap(), "512");
    }

    #[test]
    fn spec_field_messages() {
        assert_eq!(spec_field(None, "spec_name").unwrap_err(), "Missing spec_name");
        assert_eq!(
            spec_field(Some(&json!(null)), "spec_name").unwrap_err(),
            "Missing spec_name"
        );
        assert_eq!(
            spec_field(Some(&json!("  ")), "spec_value").unwrap_err(),
            "spec_value cannot be empty"
        );
    }

    #[test]
    fn payload_accepts_object_or_array() {
        let one: SpecPayload = serde_json::from_value(json!({
            "product_id": "P1",
            "spec_name": "RAM",
            "spec_value": "16GB"
        }))
        .unwrap();
        assert!(matches!(one, SpecPayload::One(_)));

        let many: SpecPayload = serde_json::from_value(json!([
            {"product_id": "P1", "spec_name": "RAM", "spec_value": "16GB"},
            {"product_id": "P1", "spec_name": "CPU"}
        ]))
        .unwrap();
        assert!(matches!(many, SpecPayload::Many(items) if items.len() == 2));
    }
}
