use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    LoaderTrait, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::api::{
    catalog_condition, contains_ci, fetch_page, settle, PageLimits, PageQuery, PageResponse,
    Paged, Pagination,
};
use crate::entities::{
    category::Category,
    product::{self, Entity as ProductEntity},
    review, specification,
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::logging::to_response;
use crate::validation::{
    apply_category_rules, check_filter, check_subcategory, non_empty_text, parse_category,
    parse_flag, required_text, search_term, validate_positive_number, CatalogFilter,
};

pub const PRODUCT_PAGES: PageLimits = PageLimits {
    default: 24,
    max: 100,
};

//ROUTERS
pub fn product_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/products", get(get_products).post(create_product))
        .route("/products/", get(get_products).post(create_product))
        .route("/products/search", get(search_products))
        .route("/products/filter", get(get_products))
        .route("/products/category/:category", get(get_products_by_category))
        .route(
            "/products/category/:category/subcategory/:subcategory",
            get(get_products_by_subcategory),
        )
        .route(
            "/products/category/:category/brand/:brand",
            get(get_products_by_brand),
        )
        .route(
            "/products/:product_id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .layer(Extension(db))
}

//ROUTES
async fn get_products(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
    Query(params): Query<CatalogQuery>,
) -> ApiResult<Response> {
    let filter = check_filter(
        params.category.as_deref(),
        params.subcategory.as_deref(),
        params.brand.as_deref(),
    )?;
    list_products(&db, filter, &paging, params.card_mode.as_deref()).await
}

async fn get_products_by_category(
    Path(category): Path<String>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
    Query(params): Query<CardQuery>,
) -> ApiResult<Response> {
    let filter = CatalogFilter {
        category: Some(parse_category(&category)?),
        ..Default::default()
    };
    list_products(&db, filter, &paging, params.card_mode.as_deref()).await
}

async fn get_products_by_subcategory(
    Path((category, subcategory)): Path<(String, String)>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
    Query(params): Query<CardQuery>,
) -> ApiResult<Response> {
    let category = parse_category(&category)?;
    let filter = CatalogFilter {
        category: Some(category),
        subcategory: Some(check_subcategory(category, &subcategory)?),
        brand: None,
    };
    list_products(&db, filter, &paging, params.card_mode.as_deref()).await
}

async fn get_products_by_brand(
    Path((category, brand)): Path<(String, String)>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
    Query(params): Query<CardQuery>,
) -> ApiResult<Response> {
    let filter = check_filter(Some(category.as_str()), None, Some(brand.as_str()))?;
    list_products(&db, filter, &paging, params.card_mode.as_deref()).await
}

async fn search_products(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Response> {
    let term = search_term(params.q.as_deref())?;
    let pagination = Pagination::from_query(&paging, PRODUCT_PAGES);
    let card_mode = parse_flag(params.card_mode.as_deref(), false);

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let select = ProductEntity::find()
            .filter(contains_ci(product::Column::Name, &term))
            .order_by_asc(product::Column::ProductId);
        let page = fetch_page(select, &txn, pagination).await?;
        render_page(&txn, page, card_mode).await
    }
    .await;
    let page = settle(txn, outcome).await?;

    let body = PageResponse::new(page, pagination).echo("search_term", term);
    Ok(to_response((StatusCode::OK, Json(body)), Ok(())))
}

async fn get_product(
    Path(product_id): Path<String>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> ApiResult<Response> {
    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let product = find_product(&txn, &product_id).await?;
        let specifications = product
            .find_related(specification::Entity)
            .order_by_asc(specification::Column::SpecId)
            .all(&txn)
            .await?;
        Ok(ProductFull::new(product, specifications))
    }
    .await;
    let product = settle(txn, outcome).await?;

    Ok(to_response((StatusCode::OK, Json(product)), Ok(())))
}

async fn create_product(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    payload: Result<Json<CreateProductPayload>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;

    let product_id = required_text(payload.product_id.as_deref(), "product_id")?;
    let name = required_text(payload.name.as_deref(), "name")?;
    let category = parse_category(&required_text(payload.category.as_deref(), "category")?)?;
    let price = match payload.price.as_ref().filter(|value| !value.is_null()) {
        Some(value) => validate_positive_number(value, "Price")?,
        None => return Err(ApiError::validation("Missing required field: price")),
    };
    let image_url = required_text(payload.image_url.as_deref(), "image_url")?;
    let classification = apply_category_rules(
        category,
        payload.brand.as_deref(),
        payload.subcategory.as_deref(),
    )?;

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        if ProductEntity::find_by_id(product_id.as_str())
            .one(&txn)
            .await?
            .is_some()
        {
            return Err(ApiError::Conflict(format!(
                "Product ID {product_id} already exists"
            )));
        }

        let new_product = product::ActiveModel {
            product_id: Set(product_id.clone()),
            name: Set(name),
            brand: Set(classification.brand),
            category: Set(classification.category),
            subcategory: Set(classification.subcategory),
            price: Set(price),
            image_url: Set(image_url),
        };
        ProductEntity::insert(new_product).exec(&txn).await?;
        Ok(())
    }
    .await;
    settle(txn, outcome).await?;

    info!(product_id = %product_id, "Created product");
    Ok(to_response(
        (
            StatusCode::CREATED,
            Json(json!({
                "message": "Product added successfully!",
                "product_id": product_id
            })),
        ),
        Ok(()),
    ))
}

async fn update_product(
    Path(product_id): Path<String>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    payload: Result<Json<UpdateProductPayload>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;

    let name = non_empty_text(payload.name.as_deref(), "name")?;
    let image_url = non_empty_text(payload.image_url.as_deref(), "image_url")?;
    let category = payload
        .category
        .as_deref()
        .map(parse_category)
        .transpose()?;
    let price = payload
        .price
        .as_ref()
        .filter(|value| !value.is_null())
        .map(|value| validate_positive_number(value, "Price"))
        .transpose()?;

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let existing = find_product(&txn, &product_id).await?;

        // Rule table re-applied to the merged row; supplied values win over stored ones.
        let classification = apply_category_rules(
            category.unwrap_or(existing.category),
            payload.brand.as_deref().or(existing.brand.as_deref()),
            payload
                .subcategory
                .as_deref()
                .or(existing.subcategory.as_deref()),
        )?;

        let mut product: product::ActiveModel = existing.into();
        if let Some(name) = name {
            product.name = Set(name);
        }
        if let Some(price) = price {
            product.price = Set(price);
        }
        if let Some(image_url) = image_url {
            product.image_url = Set(image_url);
        }
        product.category = Set(classification.category);
        product.brand = Set(classification.brand);
        product.subcategory = Set(classification.subcategory);

        product.update(&txn).await?;
        Ok(())
    }
    .await;
    settle(txn, outcome).await?;

    info!(product_id = %product_id, "Updated product");
    Ok(to_response(
        (
            StatusCode::OK,
            Json(json!({
                "message": "Product updated successfully!",
                "product_id": product_id
            })),
        ),
        Ok(()),
    ))
}

async fn delete_product(
    Path(product_id): Path<String>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> ApiResult<Response> {
    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let product = find_product(&txn, &product_id).await?;

        let review_count = review::Entity::find()
            .filter(review::Column::ProductId.eq(product_id.as_str()))
            .count(&txn)
            .await?;
        if review_count > 0 {
            return Err(ApiError::Conflict(format!(
                "Cannot delete product. It has {review_count} review(s). Delete reviews first."
            )));
        }

        let removed = specification::Entity::delete_many()
            .filter(specification::Column::ProductId.eq(product_id.as_str()))
            .exec(&txn)
            .await?;
        product.delete(&txn).await?;
        Ok(removed.rows_affected)
    }
    .await;
    let removed_specs = settle(txn, outcome).await?;

    info!(product_id = %product_id, removed_specs, "Deleted product");
    Ok(to_response(
        (
            StatusCode::OK,
            Json(json!({
                "message": "Product deleted successfully!"
            })),
        ),
        Ok(()),
    ))
}

//Helpers
pub(crate) async fn find_product(
    txn: &DatabaseTransaction,
    product_id: &str,
) -> ApiResult<product::Model> {
    ProductEntity::find_by_id(product_id)
        .one(txn)
        .await?
        .ok_or_else(|| ApiError::not_found("Product not found"))
}

async fn list_products(
    db: &DatabaseConnection,
    filter: CatalogFilter,
    paging: &PageQuery,
    card_mode: Option<&str>,
) -> ApiResult<Response> {
    let pagination = Pagination::from_query(paging, PRODUCT_PAGES);
    let card_mode = parse_flag(card_mode, false);

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let select = ProductEntity::find()
            .filter(catalog_condition(
                &filter,
                product::Column::Category,
                product::Column::Subcategory,
                product::Column::Brand,
            ))
            .order_by_asc(product::Column::ProductId);
        let page = fetch_page(select, &txn, pagination).await?;
        render_page(&txn, page, card_mode).await
    }
    .await;
    let page = settle(txn, outcome).await?;

    let body = PageResponse::new(page, pagination).echo_filter(&filter);
    Ok(to_response((StatusCode::OK, Json(body)), Ok(())))
}

async fn render_page(
    txn: &DatabaseTransaction,
    page: Paged<product::Model>,
    card_mode: bool,
) -> ApiResult<Paged<ProductView>> {
    if card_mode {
        return Ok(page.map(|product| ProductView::Card(ProductCard::new(product))));
    }

    let mut specifications = page
        .items
        .load_many(specification::Entity, txn)
        .await?
        .into_iter();
    Ok(page.map(|product| {
        let specs = specifications.next().unwrap_or_default();
        ProductView::Full(ProductFull::new(product, specs))
    }))
}

//Structs
#[derive(Deserialize, Debug)]
struct CatalogQuery {
    category: Option<String>,
    subcategory: Option<String>,
    brand: Option<String>,
    card_mode: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CardQuery {
    card_mode: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SearchQuery {
    q: Option<String>,
    card_mode: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CreateProductPayload {
    product_id: Option<String>,
    name: Option<String>,
    brand: Option<String>,
    category: Option<String>,
    subcategory: Option<String>,
    price: Option<Value>,
    image_url: Option<String>,
}

#[derive(Deserialize, Debug)]
struct UpdateProductPayload {
    name: Option<String>,
    brand: Option<String>,
    category: Option<String>,
    subcategory: Option<String>,
    price: Option<Value>,
    image_url: Option<String>,
}

/// Card projection for grids, or the full row with its specifications.
#[derive(Serialize, Debug)]
#[serde(untagged)]
pub enum ProductView {
    Card(ProductCard),
    Full(ProductFull),
}

#[derive(Serialize, Debug)]
pub struct ProductCard {
    product_id: String,
    name: String,
    price: f64,
    image_url: String,
}

impl ProductCard {
    fn new(value: product::Model) -> ProductCard {
        ProductCard {
            product_id: value.product_id,
            name: value.name,
            price: value.price,
            image_url: value.image_url,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ProductFull {
    product_id: String,
    name: String,
    brand: Option<String>,
    category: Category,
    subcategory: Option<String>,
    price: f64,
    image_url: String,
    specifications: Vec<SpecEntry>,
}

impl ProductFull {
    fn new(value: product::Model, specifications: Vec<specification::Model>) -> ProductFull {
        ProductFull {
            product_id: value.product_id,
            name: value.name,
            brand: value.brand,
            category: value.category,
            subcategory: value.subcategory,
            price: value.price,
            image_url: value.image_url,
            specifications: specifications
                .into_iter()
                .map(|spec| SpecEntry {
                    spec_name: spec.spec_name,
                    spec_value: spec.spec_value,
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Debug)]
struct SpecEntry {
    spec_name: String,
    spec_value: String,
}
