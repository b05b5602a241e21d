mod common;

use chrono::Utc;
use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{body, spawn_app, TestApp};

fn blog(title: &str, author: &str, date: Option<&str>) -> Value {
    let mut payload = json!({
        "title": title,
        "author": author,
        "introduction": "I",
        "body": "B",
        "conclusion": "C",
        "image_url": "http://img"
    });
    if let Some(date) = date {
        payload["date_published"] = json!(date);
    }
    payload
}

async fn create_blog(app: &TestApp, payload: &Value) -> i64 {
    let response = app.post("/blogs/", payload).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body(response).await["blog_id"].as_i64().unwrap()
}

#[tokio::test]
async fn blog_round_trip_defaults_to_today() {
    let app = spawn_app().await;
    let blog_id = create_blog(&app, &blog("X", "Y", None)).await;

    let fetched = body(app.get(&format!("/blogs/{blog_id}")).await).await;
    assert_eq!(fetched["blog_id"], blog_id);
    assert_eq!(fetched["title"], "X");
    assert_eq!(fetched["author"], "Y");
    assert_eq!(fetched["introduction"], "I");
    assert_eq!(fetched["body"], "B");
    assert_eq!(fetched["conclusion"], "C");
    assert_eq!(fetched["image_url"], "http://img");
    assert_eq!(
        fetched["date_published"],
        Utc::now().date_naive().format("%Y-%m-%d").to_string()
    );

    let blog_id = create_blog(&app, &blog("Dated", "Y", Some("2024-02-29"))).await;
    let fetched = body(app.get(&format!("/blogs/{blog_id}")).await).await;
    assert_eq!(fetched["date_published"], "2024-02-29");
}

#[tokio::test]
async fn invalid_blogs_are_rejected() {
    let app = spawn_app().await;

    let mut payload = blog("X", "Y", None);
    payload.as_object_mut().unwrap().remove("conclusion");
    let response = app.post("/blogs/", &payload).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body(response).await["error"], "Missing required field: conclusion");

    let response = app.post("/blogs/", &blog(&"t".repeat(201), "Y", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body(response).await["error"], "Title must not exceed 200 characters");

    let response = app.post("/blogs/", &blog("X", "Y", Some("29-02-2024"))).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body(response).await["error"], "Invalid date format. Use YYYY-MM-DD");

    let mut payload = blog("X", "Y", None);
    payload["image_url"] = json!("img.png");
    let response = app.post("/blogs/", &payload).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let listing = body(app.get("/blogs/").await).await;
    assert_eq!(listing["total"], 0);
}

#[tokio::test]
async fn listing_is_newest_first_with_previews() {
    let app = spawn_app().await;
    let old = create_blog(&app, &blog("Old", "Ana", Some("2023-01-01"))).await;
    let new = create_blog(&app, &blog("New", "Ana", Some("2024-06-01"))).await;

    let mut long = blog("Long", "Bo", Some("2024-01-01"));
    long["introduction"] = json!("word ".repeat(60));
    let long_id = create_blog(&app, &long).await;

    let listing = body(app.get("/blogs/").await).await;
    let ids: Vec<i64> = listing["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["blog_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![new, long_id, old]);

    let preview = &listing["items"][1];
    let excerpt = preview["excerpt"].as_str().unwrap();
    assert!(excerpt.ends_with("..."));
    assert_eq!(excerpt.chars().count(), 199 + 3);
    assert!(preview.get("body").is_none());

    let listing = body(app.get("/blogs/?preview=false&per_page=500&page=0").await).await;
    assert_eq!(listing["per_page"], 50);
    assert_eq!(listing["page"], 1);
    assert_eq!(listing["items"][0]["body"], "B");
    assert!(listing["items"][0].get("excerpt").is_none());

    let latest = body(app.get("/blogs/latest?limit=2").await).await;
    let latest = latest.as_array().unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0]["blog_id"], new);
}

#[tokio::test]
async fn search_and_author_listing() {
    let app = spawn_app().await;
    let mut quiet = blog("Building a quiet PC", "Ana", None);
    quiet["body"] = json!("Pick large fans and a solid case.");
    create_blog(&app, &quiet).await;
    create_blog(&app, &blog("Monitor guide", "Bo", None)).await;

    let response = app.get("/blogs/search?q=%20").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body(response).await["error"],
        "Search term is required (use ?q=search_term)"
    );

    let response = app.get("/blogs/search?q=q").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let found = body(app.get("/blogs/search?q=QUIET").await).await;
    assert_eq!(found["total"], 1);
    assert_eq!(found["search_term"], "QUIET");

    let found = body(app.get("/blogs/search?q=fans").await).await;
    assert_eq!(found["total"], 1);

    let by_author = body(app.get("/blogs/author/Bo").await).await;
    assert_eq!(by_author["total"], 1);
    assert_eq!(by_author["author"], "Bo");
    assert_eq!(by_author["items"][0]["title"], "Monitor guide");
}

#[tokio::test]
async fn update_and_delete_blog() {
    let app = spawn_app().await;
    let blog_id = create_blog(&app, &blog("X", "Y", Some("2024-01-01"))).await;
    let path = format!("/blogs/{blog_id}");

    let response = app
        .put(&path, &json!({"title": "Renamed", "date_published": "2024-03-15"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body(app.get(&path).await).await;
    assert_eq!(fetched["title"], "Renamed");
    assert_eq!(fetched["date_published"], "2024-03-15");
    assert_eq!(fetched["body"], "B");

    let response = app.put(&path, &json!({"date_published": ""})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body(response).await["error"], "Date is required");

    let response = app.put(&path, &json!({"title": "  "})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.delete(&path).await.status(), StatusCode::OK);
    assert_eq!(app.get(&path).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        app.put(&path, &json!({"title": "Ghost"})).await.status(),
        StatusCode::NOT_FOUND
    );
}
