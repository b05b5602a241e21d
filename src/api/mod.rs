pub mod blog;
pub mod product;
pub mod review;
pub mod specification;

use axum::{middleware::from_fn, routing::get, Router};
use sea_orm::{
    sea_query::{Expr, Func, LikeExpr, SimpleExpr},
    ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, Select,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::ApiResult;
use crate::middleware::logging::logging_middleware;
use crate::validation::{validate_positive_int, CatalogFilter};

use blog::blog_router;
use product::product_router;
use review::review_router;
use specification::specification_router;

pub fn create_api_router(shared_db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/", get(home))
        .merge(product_router(shared_db.clone()))
        .merge(specification_router(shared_db.clone()))
        .merge(review_router(shared_db.clone()))
        .merge(blog_router(shared_db))
        .layer(from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
}

async fn home() -> &'static str {
    "PC Concept Backend is running!"
}

/// Default and maximum page size of one resource group.
#[derive(Clone, Copy, Debug)]
pub struct PageLimits {
    pub default: u64,
    pub max: u64,
}

// Raw strings so bad values fall back to defaults instead of rejecting the request.
#[derive(Deserialize, Debug, Default)]
pub struct PageQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

impl Pagination {
    /// `per_page` above the cap is clamped, never rejected. `page` is capped so
    /// the row offset `(page - 1) * per_page` fits the store's signed 64-bit OFFSET.
    pub fn from_query(query: &PageQuery, limits: PageLimits) -> Self {
        let per_page = validate_positive_int(query.per_page.as_deref(), limits.default)
            .min(limits.max)
            .max(1);
        let last_page = i64::MAX as u64 / per_page + 1;
        let page = validate_positive_int(query.page.as_deref(), 1).min(last_page);
        Self { page, per_page }
    }
}

pub struct Paged<M> {
    pub items: Vec<M>,
    pub total: u64,
    pub pages: u64,
}

impl<M> Paged<M> {
    pub fn map<T>(self, f: impl FnMut(M) -> T) -> Paged<T> {
        Paged {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            pages: self.pages,
        }
    }
}

pub async fn fetch_page<'db, E>(
    select: Select<E>,
    txn: &'db DatabaseTransaction,
    pagination: Pagination,
) -> Result<Paged<E::Model>, DbErr>
where
    E: EntityTrait,
    E::Model: Sync + 'db,
{
    let paginator = select.paginate(txn, pagination.per_page);
    let totals = paginator.num_items_and_pages().await?;
    let items = paginator.fetch_page(pagination.page - 1).await?;

    Ok(Paged {
        items,
        total: totals.number_of_items,
        pages: totals.number_of_pages,
    })
}

/// List envelope: `{items, page, per_page, total, pages, ..echoed filters}`.
#[derive(Serialize, Debug)]
pub struct PageResponse<T: Serialize> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub pages: u64,
    #[serde(flatten)]
    pub echo: Map<String, Value>,
}

impl<T: Serialize> PageResponse<T> {
    pub fn new(paged: Paged<T>, pagination: Pagination) -> Self {
        Self {
            items: paged.items,
            page: pagination.page,
            per_page: pagination.per_page,
            total: paged.total,
            pages: paged.pages,
            echo: Map::new(),
        }
    }

    pub fn echo(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.echo.insert(key.to_owned(), value.into());
        self
    }

    pub fn echo_filter(self, filter: &CatalogFilter) -> Self {
        let mut response = self;
        if let Some(category) = filter.category {
            response = response.echo("category", category.as_str());
        }
        if let Some(subcategory) = &filter.subcategory {
            response = response.echo("subcategory", subcategory.as_str());
        }
        if let Some(brand) = &filter.brand {
            response = response.echo("brand", brand.as_str());
        }
        response
    }
}

/// Category/subcategory/brand equality conditions for whichever entity carries them.
pub fn catalog_condition<C: ColumnTrait>(
    filter: &CatalogFilter,
    category: C,
    subcategory: C,
    brand: C,
) -> Condition {
    let mut condition = Condition::all();
    if let Some(value) = filter.category {
        condition = condition.add(category.eq(value));
    }
    if let Some(value) = &filter.subcategory {
        condition = condition.add(subcategory.eq(value.as_str()));
    }
    if let Some(value) = &filter.brand {
        condition = condition.add(brand.eq(value.as_str()));
    }
    condition
}

/// Literal substring match, case-insensitive for ASCII letters only: SQLite's
/// `lower()` leaves non-ASCII characters alone, so the term is folded the same way.
pub fn contains_ci<C: ColumnTrait>(column: C, term: &str) -> SimpleExpr {
    let pattern = format!("%{}%", escape_like(&term.to_ascii_lowercase()));
    Expr::expr(Func::lower(Expr::col(column.as_column_ref())))
        .like(LikeExpr::new(pattern).escape(LIKE_ESCAPE))
}

const LIKE_ESCAPE: char = '\\';

// `%` and `_` in user input match themselves.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Commits on success, rolls back on failure; the transaction never outlives the handler.
pub async fn settle<T>(txn: DatabaseTransaction, outcome: ApiResult<T>) -> ApiResult<T> {
    match outcome {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = txn.rollback().await {
                warn!(error = %rollback_err, "Failed to roll back transaction");
            }
            Err(err)
        }
    }
}
