use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DatabaseTransaction, EntityTrait, LoaderTrait,
    ModelTrait, QueryFilter, QueryOrder, Select, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::api::{
    catalog_condition, fetch_page, product::find_product, settle, PageLimits, PageQuery,
    PageResponse, Paged, Pagination,
};
use crate::entities::{
    category::Category,
    product::Entity as ProductEntity,
    review::{self, Entity as ReviewEntity},
};
use crate::error::{ApiError, ApiResult};
use crate::middleware::logging::to_response;
use crate::validation::{
    apply_category_rules, check, check_filter, non_empty_text, parse_category, parse_flag,
    required_text,
};

pub const REVIEW_PAGES: PageLimits = PageLimits {
    default: 20,
    max: 100,
};

const DATE_POSTED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const RATING_MESSAGE: &str = "Rating must be a number between 1 and 5";

//ROUTERS
pub fn review_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/reviews", get(get_reviews).post(create_review))
        .route("/reviews/", get(get_reviews).post(create_review))
        .route("/reviews/filter", get(filter_reviews))
        .route("/reviews/product/:product_id", get(get_reviews_by_product))
        .route(
            "/reviews/:review_id",
            get(get_review).put(update_review).delete(delete_review),
        )
        .layer(Extension(db))
}

//ROUTES
async fn get_reviews(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
    Query(params): Query<ReviewListQuery>,
) -> ApiResult<Response> {
    let pagination = Pagination::from_query(&paging, REVIEW_PAGES);
    let with_product_name = parse_flag(params.include_product_name.as_deref(), false);

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let page = fetch_page(newest_first(ReviewEntity::find()), &txn, pagination).await?;
        if !with_product_name {
            return Ok(page.map(|review| ReviewView::new(review, None)));
        }
        with_product_names(&txn, page).await
    }
    .await;
    let page = settle(txn, outcome).await?;

    Ok(to_response(
        (StatusCode::OK, Json(PageResponse::new(page, pagination))),
        Ok(()),
    ))
}

async fn get_review(
    Path(review_id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> ApiResult<Response> {
    let txn = db.begin().await?;
    let outcome = find_review(&txn, review_id).await;
    let review = settle(txn, outcome).await?;

    Ok(to_response(
        (StatusCode::OK, Json(ReviewView::new(review, None))),
        Ok(()),
    ))
}

async fn get_reviews_by_product(
    Path(product_id): Path<String>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
) -> ApiResult<Response> {
    let pagination = Pagination::from_query(&paging, REVIEW_PAGES);

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let product = find_product(&txn, &product_id).await?;
        let select = newest_first(product.find_related(ReviewEntity));
        let page = fetch_page(select, &txn, pagination).await?;
        let name = product.name.clone();
        Ok((
            product,
            page.map(|review| ReviewView::new(review, Some(name.clone()))),
        ))
    }
    .await;
    let (product, page) = settle(txn, outcome).await?;

    let body = PageResponse::new(page, pagination)
        .echo("product_id", product.product_id)
        .echo("product_name", product.name);
    Ok(to_response((StatusCode::OK, Json(body)), Ok(())))
}

async fn filter_reviews(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
    Query(params): Query<ReviewFilterQuery>,
) -> ApiResult<Response> {
    let filter = check_filter(
        params.category.as_deref(),
        params.subcategory.as_deref(),
        params.brand.as_deref(),
    )?;
    let pagination = Pagination::from_query(&paging, REVIEW_PAGES);

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let select = newest_first(ReviewEntity::find().filter(catalog_condition(
            &filter,
            review::Column::Category,
            review::Column::Subcategory,
            review::Column::Brand,
        )));
        let page = fetch_page(select, &txn, pagination).await?;
        Ok(page.map(|review| ReviewView::new(review, None)))
    }
    .await;
    let page = settle(txn, outcome).await?;

    let body = PageResponse::new(page, pagination).echo_filter(&filter);
    Ok(to_response((StatusCode::OK, Json(body)), Ok(())))
}

async fn create_review(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    payload: Result<Json<CreateReviewPayload>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;

    let product_id = required_text(payload.product_id.as_deref(), "product_id")?;
    let user_alias = required_text(payload.user_alias.as_deref(), "user_alias")?;
    let review_text = required_text(payload.review_text.as_deref(), "review_text")?;
    let category = parse_category(&required_text(payload.category.as_deref(), "category")?)?;
    let rating = parse_rating(payload.rating.as_ref())?;
    check(&ReviewFields {
        user_alias: Some(user_alias.clone()),
        review_text: Some(review_text.clone()),
        rating,
    })?;
    let classification = apply_category_rules(
        category,
        payload.brand.as_deref(),
        payload.subcategory.as_deref(),
    )?;

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        find_product(&txn, &product_id).await?;

        // Goes through the active model so the rating range check runs.
        let new_review = review::ActiveModel {
            product_id: Set(product_id.clone()),
            user_alias: Set(user_alias),
            review_text: Set(review_text),
            rating: Set(rating),
            category: Set(classification.category),
            subcategory: Set(classification.subcategory),
            brand: Set(classification.brand),
            date_posted: Set(Utc::now()),
            ..Default::default()
        };
        Ok(new_review.insert(&txn).await?)
    }
    .await;
    let review = settle(txn, outcome).await?;

    info!(review_id = review.review_id, product_id = %review.product_id, "Created review");
    Ok(to_response(
        (
            StatusCode::CREATED,
            Json(json!({
                "message": "Review added successfully!",
                "review_id": review.review_id
            })),
        ),
        Ok(()),
    ))
}

async fn update_review(
    Path(review_id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    payload: Result<Json<UpdateReviewPayload>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;

    let user_alias = non_empty_text(payload.user_alias.as_deref(), "user_alias")?;
    let review_text = non_empty_text(payload.review_text.as_deref(), "review_text")?;
    let category = payload
        .category
        .as_deref()
        .map(parse_category)
        .transpose()?;
    let rating = parse_rating(payload.rating.as_ref())?;
    check(&ReviewFields {
        user_alias: user_alias.clone(),
        review_text: review_text.clone(),
        rating,
    })?;

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let existing = find_review(&txn, review_id).await?;

        let classification = apply_category_rules(
            category.unwrap_or(existing.category),
            payload.brand.as_deref().or(existing.brand.as_deref()),
            payload
                .subcategory
                .as_deref()
                .or(existing.subcategory.as_deref()),
        )?;

        let mut review: review::ActiveModel = existing.into();
        if let Some(user_alias) = user_alias {
            review.user_alias = Set(user_alias);
        }
        if let Some(review_text) = review_text {
            review.review_text = Set(review_text);
        }
        if rating.is_some() {
            review.rating = Set(rating);
        }
        review.category = Set(classification.category);
        review.brand = Set(classification.brand);
        review.subcategory = Set(classification.subcategory);

        review.update(&txn).await?;
        Ok(())
    }
    .await;
    settle(txn, outcome).await?;

    info!(review_id, "Updated review");
    Ok(to_response(
        (
            StatusCode::OK,
            Json(json!({
                "message": "Review updated successfully!"
            })),
        ),
        Ok(()),
    ))
}

async fn delete_review(
    Path(review_id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> ApiResult<Response> {
    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let review = find_review(&txn, review_id).await?;
        review.delete(&txn).await?;
        Ok(())
    }
    .await;
    settle(txn, outcome).await?;

    info!(review_id, "Deleted review");
    Ok(to_response(
        (
            StatusCode::OK,
            Json(json!({
                "message": "Review deleted successfully!"
            })),
        ),
        Ok(()),
    ))
}

//Helpers
async fn find_review(txn: &DatabaseTransaction, review_id: i32) -> ApiResult<review::Model> {
    ReviewEntity::find_by_id(review_id)
        .one(txn)
        .await?
        .ok_or_else(|| ApiError::not_found("Review not found"))
}

fn newest_first(select: Select<ReviewEntity>) -> Select<ReviewEntity> {
    select
        .order_by_desc(review::Column::DatePosted)
        .order_by_desc(review::Column::ReviewId)
}

async fn with_product_names(
    txn: &DatabaseTransaction,
    page: Paged<review::Model>,
) -> ApiResult<Paged<ReviewView>> {
    let mut products = page.items.load_one(ProductEntity, txn).await?.into_iter();
    Ok(page.map(|review| {
        let name = products.next().flatten().map(|product| product.name);
        ReviewView::new(review, name)
    }))
}

/// Rating must be a JSON number when present; null counts as absent.
fn parse_rating(value: Option<&Value>) -> ApiResult<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_f64()
            .map(Some)
            .ok_or_else(|| ApiError::validation(RATING_MESSAGE)),
        Some(_) => Err(ApiError::validation(RATING_MESSAGE)),
    }
}

//Structs
#[derive(Deserialize, Debug)]
struct ReviewListQuery {
    include_product_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ReviewFilterQuery {
    category: Option<String>,
    subcategory: Option<String>,
    brand: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CreateReviewPayload {
    product_id: Option<String>,
    user_alias: Option<String>,
    review_text: Option<String>,
    rating: Option<Value>,
    category: Option<String>,
    subcategory: Option<String>,
    brand: Option<String>,
}

#[derive(Deserialize, Debug)]
struct UpdateReviewPayload {
    user_alias: Option<String>,
    review_text: Option<String>,
    rating: Option<Value>,
    category: Option<String>,
    subcategory: Option<String>,
    brand: Option<String>,
}

#[derive(Validate, Debug)]
struct ReviewFields {
    #[validate(length(
        min = 2,
        max = 50,
        message = "User alias must be between 2 and 50 characters long"
    ))]
    user_alias: Option<String>,
    #[validate(length(min = 10, message = "Review text must be at least 10 characters long"))]
    review_text: Option<String>,
    #[validate(range(min = 1.0, max = 5.0, message = "Rating must be a number between 1 and 5"))]
    rating: Option<f64>,
}

#[derive(Serialize, Debug)]
pub struct ReviewView {
    review_id: i32,
    product_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_name: Option<String>,
    user_alias: String,
    review_text: String,
    rating: Option<f64>,
    category: Category,
    subcategory: Option<String>,
    brand: Option<String>,
    date_posted: String,
}

impl ReviewView {
    fn new(value: review::Model, product_name: Option<String>) -> ReviewView {
        ReviewView {
            review_id: value.review_id,
            product_id: value.product_id,
            product_name,
            user_alias: value.user_alias,
            review_text: value.review_text,
            rating: value.rating,
            category: value.category,
            subcategory: value.subcategory,
            brand: value.brand,
            date_posted: value.date_posted.format(DATE_POSTED_FORMAT).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_must_be_a_number() {
        assert_eq!(parse_rating(None).unwrap(), None);
        assert_eq!(parse_rating(Some(&json!(null))).unwrap(), None);
        assert_eq!(parse_rating(Some(&json!(4))).unwrap(), Some(4.0));
        assert_eq!(parse_rating(Some(&json!(3.5))).unwrap(), Some(3.5));
        assert!(parse_rating(Some(&json!("5"))).is_err());
    }

    #[test]
    fn review_fields_enforce_lengths_and_range() {
        let fields = |alias: &str, text: &str, rating: Option<f64>| ReviewFields {
            user_alias: Some(alias.to_owned()),
            review_text: Some(text.to_owned()),
            rating,
        };

        assert!(check(&fields("Jo", "Solid build quality.", Some(5.0))).is_ok());
        assert!(check(&fields("Jo", "Solid build quality.", None)).is_ok());

        let err = check(&fields("J", "Solid build quality.", None)).unwrap_err();
        assert!(err.to_string().contains("User alias"));

        let err = check(&fields(&"x".repeat(51), "Solid build quality.", None)).unwrap_err();
        assert!(err.to_string().contains("User alias"));

        let err = check(&fields("Jo", "Too short", None)).unwrap_err();
        assert!(err.to_string().contains("Review text"));

        let err = check(&fields("Jo", "Solid build quality.", Some(6.0))).unwrap_err();
        assert!(err.to_string().contains(RATING_MESSAGE));
    }

    #[test]
    fn partial_updates_skip_absent_fields() {
        let fields = ReviewFields {
            user_alias: None,
            review_text: None,
            rating: None,
        };
        assert!(check(&fields).is_ok());
    }
}
