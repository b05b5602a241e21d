use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DatabaseTransaction,
    EntityTrait, ModelTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::api::{
    contains_ci, fetch_page, settle, PageLimits, PageQuery, PageResponse, Pagination,
};
use crate::entities::blog::{self, Entity as BlogEntity};
use crate::error::{ApiError, ApiResult};
use crate::middleware::logging::to_response;
use crate::validation::{
    check, non_empty_text, parse_flag, required_text, search_term, validate_date,
    validate_positive_int, DATE_FORMAT,
};

pub const BLOG_PAGES: PageLimits = PageLimits {
    default: 10,
    max: 50,
};

const LATEST_DEFAULT: u64 = 5;
const LATEST_MAX: u64 = 20;
const EXCERPT_LEN: usize = 200;

static IMAGE_URL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://").unwrap());

//ROUTERS
pub fn blog_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/blogs", get(get_blogs).post(create_blog))
        .route("/blogs/", get(get_blogs).post(create_blog))
        .route("/blogs/latest", get(get_latest_blogs))
        .route("/blogs/search", get(search_blogs))
        .route("/blogs/author/:author", get(get_blogs_by_author))
        .route(
            "/blogs/:blog_id",
            get(get_blog).put(update_blog).delete(delete_blog),
        )
        .layer(Extension(db))
}

//ROUTES
async fn get_blogs(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
    Query(params): Query<PreviewQuery>,
) -> ApiResult<Response> {
    let pagination = Pagination::from_query(&paging, BLOG_PAGES);
    let preview = parse_flag(params.preview.as_deref(), true);

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        Ok(fetch_page(newest_first(BlogEntity::find()), &txn, pagination).await?)
    }
    .await;
    let page = settle(txn, outcome).await?;

    let page = page.map(|blog| BlogView::new(blog, preview));
    Ok(to_response(
        (StatusCode::OK, Json(PageResponse::new(page, pagination))),
        Ok(()),
    ))
}

async fn get_latest_blogs(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(params): Query<LatestQuery>,
) -> ApiResult<Response> {
    let limit = validate_positive_int(params.limit.as_deref(), LATEST_DEFAULT).min(LATEST_MAX);

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        Ok(newest_first(BlogEntity::find())
            .limit(limit)
            .all(&txn)
            .await?)
    }
    .await;
    let blogs = settle(txn, outcome).await?;

    let blogs: Vec<BlogView> = blogs
        .into_iter()
        .map(|blog| BlogView::new(blog, true))
        .collect();
    Ok(to_response((StatusCode::OK, Json(blogs)), Ok(())))
}

async fn get_blog(
    Path(blog_id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> ApiResult<Response> {
    let txn = db.begin().await?;
    let outcome = find_blog(&txn, blog_id).await;
    let blog = settle(txn, outcome).await?;

    Ok(to_response(
        (StatusCode::OK, Json(BlogView::new(blog, false))),
        Ok(()),
    ))
}

async fn search_blogs(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Response> {
    let term = search_term(params.q.as_deref())?;
    let pagination = Pagination::from_query(&paging, BLOG_PAGES);

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let select = newest_first(
            BlogEntity::find().filter(
                Condition::any()
                    .add(contains_ci(blog::Column::Title, &term))
                    .add(contains_ci(blog::Column::Introduction, &term))
                    .add(contains_ci(blog::Column::Body, &term))
                    .add(contains_ci(blog::Column::Conclusion, &term)),
            ),
        );
        Ok(fetch_page(select, &txn, pagination).await?)
    }
    .await;
    let page = settle(txn, outcome).await?;

    let page = page.map(|blog| BlogView::new(blog, true));
    let body = PageResponse::new(page, pagination).echo("search_term", term);
    Ok(to_response((StatusCode::OK, Json(body)), Ok(())))
}

async fn get_blogs_by_author(
    Path(author): Path<String>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Query(paging): Query<PageQuery>,
) -> ApiResult<Response> {
    let pagination = Pagination::from_query(&paging, BLOG_PAGES);

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let select =
            newest_first(BlogEntity::find().filter(blog::Column::Author.eq(author.as_str())));
        Ok(fetch_page(select, &txn, pagination).await?)
    }
    .await;
    let page = settle(txn, outcome).await?;

    let page = page.map(|blog| BlogView::new(blog, true));
    let body = PageResponse::new(page, pagination).echo("author", author);
    Ok(to_response((StatusCode::OK, Json(body)), Ok(())))
}

async fn create_blog(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    payload: Result<Json<BlogPayload>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;

    let fields = BlogFields {
        title: Some(required_text(payload.title.as_deref(), "title")?),
        author: Some(required_text(payload.author.as_deref(), "author")?),
        introduction: Some(required_text(payload.introduction.as_deref(), "introduction")?),
        body: Some(required_text(payload.body.as_deref(), "body")?),
        conclusion: Some(required_text(payload.conclusion.as_deref(), "conclusion")?),
        image_url: Some(required_text(payload.image_url.as_deref(), "image_url")?),
    };
    check(&fields)?;
    // A blank date on create means "not supplied".
    let date_published = match payload.date_published.as_deref().map(str::trim) {
        Some(date) if !date.is_empty() => validate_date(date)?,
        _ => today(),
    };

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let new_blog = blog::ActiveModel {
            title: Set(fields.title.unwrap_or_default()),
            author: Set(fields.author.unwrap_or_default()),
            introduction: Set(fields.introduction.unwrap_or_default()),
            body: Set(fields.body.unwrap_or_default()),
            conclusion: Set(fields.conclusion.unwrap_or_default()),
            image_url: Set(fields.image_url.unwrap_or_default()),
            date_published: Set(date_published),
            ..Default::default()
        };
        Ok(new_blog.insert(&txn).await?)
    }
    .await;
    let blog = settle(txn, outcome).await?;

    info!(blog_id = blog.blog_id, author = %blog.author, "Created blog");
    Ok(to_response(
        (
            StatusCode::CREATED,
            Json(json!({
                "message": "Blog added successfully!",
                "blog_id": blog.blog_id
            })),
        ),
        Ok(()),
    ))
}

async fn update_blog(
    Path(blog_id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    payload: Result<Json<BlogPayload>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(payload) = payload?;

    let fields = BlogFields {
        title: non_empty_text(payload.title.as_deref(), "title")?,
        author: non_empty_text(payload.author.as_deref(), "author")?,
        introduction: non_empty_text(payload.introduction.as_deref(), "introduction")?,
        body: non_empty_text(payload.body.as_deref(), "body")?,
        conclusion: non_empty_text(payload.conclusion.as_deref(), "conclusion")?,
        image_url: non_empty_text(payload.image_url.as_deref(), "image_url")?,
    };
    check(&fields)?;
    let date_published = payload
        .date_published
        .as_deref()
        .map(validate_date)
        .transpose()?;

    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let mut blog: blog::ActiveModel = find_blog(&txn, blog_id).await?.into();
        if let Some(title) = fields.title {
            blog.title = Set(title);
        }
        if let Some(author) = fields.author {
            blog.author = Set(author);
        }
        if let Some(introduction) = fields.introduction {
            blog.introduction = Set(introduction);
        }
        if let Some(body) = fields.body {
            blog.body = Set(body);
        }
        if let Some(conclusion) = fields.conclusion {
            blog.conclusion = Set(conclusion);
        }
        if let Some(image_url) = fields.image_url {
            blog.image_url = Set(image_url);
        }
        if let Some(date_published) = date_published {
            blog.date_published = Set(date_published);
        }
        if blog.is_changed() {
            blog.update(&txn).await?;
        }
        Ok(())
    }
    .await;
    settle(txn, outcome).await?;

    info!(blog_id, "Updated blog");
    Ok(to_response(
        (
            StatusCode::OK,
            Json(json!({
                "message": "Blog updated successfully!"
            })),
        ),
        Ok(()),
    ))
}

async fn delete_blog(
    Path(blog_id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> ApiResult<Response> {
    let txn = db.begin().await?;
    let outcome: ApiResult<_> = async {
        let blog = find_blog(&txn, blog_id).await?;
        blog.delete(&txn).await?;
        Ok(())
    }
    .await;
    settle(txn, outcome).await?;

    info!(blog_id, "Deleted blog");
    Ok(to_response(
        (
            StatusCode::OK,
            Json(json!({
                "message": "Blog deleted successfully!"
            })),
        ),
        Ok(()),
    ))
}

//Helpers
async fn find_blog(txn: &DatabaseTransaction, blog_id: i32) -> ApiResult<blog::Model> {
    BlogEntity::find_by_id(blog_id)
        .one(txn)
        .await?
        .ok_or_else(|| ApiError::not_found("Blog not found"))
}

fn newest_first(select: Select<BlogEntity>) -> Select<BlogEntity> {
    select
        .order_by_desc(blog::Column::DatePublished)
        .order_by_desc(blog::Column::BlogId)
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// First `EXCERPT_LEN` characters with trailing whitespace dropped, plus `...`.
pub fn excerpt(text: &str) -> String {
    match text.char_indices().nth(EXCERPT_LEN) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_owned(),
    }
}

//Structs
#[derive(Deserialize, Debug)]
struct PreviewQuery {
    preview: Option<String>,
}

#[derive(Deserialize, Debug)]
struct LatestQuery {
    limit: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize, Debug)]
struct BlogPayload {
    title: Option<String>,
    author: Option<String>,
    introduction: Option<String>,
    body: Option<String>,
    conclusion: Option<String>,
    image_url: Option<String>,
    date_published: Option<String>,
}

#[derive(Validate, Debug)]
struct BlogFields {
    #[validate(length(max = 200, message = "Title must not exceed 200 characters"))]
    title: Option<String>,
    #[validate(length(max = 100, message = "Author name must not exceed 100 characters"))]
    author: Option<String>,
    introduction: Option<String>,
    body: Option<String>,
    conclusion: Option<String>,
    #[validate(regex(
        path = *IMAGE_URL_REGEX,
        message = "image_url must be an http(s) URL"
    ))]
    image_url: Option<String>,
}

/// Preview rows carry an `excerpt` in place of the three body parts.
#[derive(Serialize, Debug)]
pub struct BlogView {
    blog_id: i32,
    title: String,
    author: String,
    date_published: String,
    image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    introduction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conclusion: Option<String>,
}

impl BlogView {
    fn new(value: blog::Model, preview: bool) -> BlogView {
        let date_published = value.date_published.format(DATE_FORMAT).to_string();
        if preview {
            return BlogView {
                blog_id: value.blog_id,
                title: value.title,
                author: value.author,
                date_published,
                image_url: value.image_url,
                excerpt: Some(excerpt(&value.introduction)),
                introduction: None,
                body: None,
                conclusion: None,
            };
        }
        BlogView {
            blog_id: value.blog_id,
            title: value.title,
            author: value.author,
            date_published,
            image_url: value.image_url,
            excerpt: None,
            introduction: Some(value.introduction),
            body: Some(value.body),
            conclusion: Some(value.conclusion),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_its_own_excerpt() {
        assert_eq!(excerpt("A short intro."), "A short intro.");
        assert_eq!(excerpt(&"a".repeat(200)), "a".repeat(200));
    }

    #[test]
    fn long_text_is_cut_on_a_char_boundary() {
        let text = format!("{} tail", "é".repeat(199));
        let cut = excerpt(&text);
        assert_eq!(cut, format!("{}...", "é".repeat(199)));
    }

    #[test]
    fn blog_fields_reject_long_titles_and_bad_urls() {
        let fields = |title: &str, url: &str| BlogFields {
            title: Some(title.to_owned()),
            author: Some("Ana".to_owned()),
            introduction: None,
            body: None,
            conclusion: None,
            image_url: Some(url.to_owned()),
        };

        assert!(check(&fields("Building a quiet PC", "http://img")).is_ok());

        let err = check(&fields(&"t".repeat(201), "http://img")).unwrap_err();
        assert!(err.to_string().contains("Title must not exceed 200 characters"));

        let err = check(&fields("Title", "ftp://img")).unwrap_err();
        assert!(err.to_string().contains("image_url"));
    }

    #[test]
    fn preview_swaps_body_for_excerpt() {
        let model = blog::Model {
            blog_id: 1,
            title: "T".to_owned(),
            author: "A".to_owned(),
            introduction: "I".to_owned(),
            body: "B".to_owned(),
            conclusion: "C".to_owned(),
            image_url: "http://img".to_owned(),
            date_published: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        };

        let preview = serde_json::to_value(BlogView::new(model.clone(), true)).unwrap();
        assert_eq!(preview["excerpt"], "I");
        assert!(preview.get("body").is_none());
        assert_eq!(preview["date_published"], "2024-05-01");

        let full = serde_json::to_value(BlogView::new(model, false)).unwrap();
        assert_eq!(full["conclusion"], "C");
        assert!(full.get("excerpt").is_none());
    }
}
