mod common;

use reqwest::StatusCode;
use serde_json::{json, Value};

use common::{body, spawn_app, TestApp};

fn laptop_review(product_id: &str, alias: &str) -> Value {
    json!({
        "product_id": product_id,
        "user_alias": alias,
        "review_text": "Battery lasts all day long.",
        "rating": 4,
        "category": "Laptops",
        "brand": "asus"
    })
}

async fn create_review(app: &TestApp, payload: &Value) -> i64 {
    let response = app.post("/reviews/", payload).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body(response).await["review_id"].as_i64().unwrap()
}

#[tokio::test]
async fn create_and_fetch_review() {
    let app = spawn_app().await;
    app.create_laptop("P1").await;

    let review_id = create_review(&app, &laptop_review("P1", "  Sam  ")).await;

    let review = body(app.get(&format!("/reviews/{review_id}")).await).await;
    assert_eq!(review["user_alias"], "Sam");
    assert_eq!(review["brand"], "ASUS");
    assert!(review["subcategory"].is_null());
    assert_eq!(review["rating"], 4.0);
    let date_posted = review["date_posted"].as_str().unwrap();
    assert!(
        chrono::NaiveDateTime::parse_from_str(date_posted, "%Y-%m-%d %H:%M:%S").is_ok(),
        "{date_posted}"
    );

    let mut without_rating = laptop_review("P1", "Kim");
    without_rating.as_object_mut().unwrap().remove("rating");
    let review_id = create_review(&app, &without_rating).await;
    let review = body(app.get(&format!("/reviews/{review_id}")).await).await;
    assert!(review["rating"].is_null());
}

#[tokio::test]
async fn invalid_reviews_are_rejected() {
    let app = spawn_app().await;
    app.create_laptop("P1").await;

    let mut payload = laptop_review("P1", "Sam");
    payload["rating"] = json!(6);
    let response = app.post("/reviews/", &payload).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body(response).await["error"],
        "Rating must be a number between 1 and 5"
    );

    payload["rating"] = json!("five");
    let response = app.post("/reviews/", &payload).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.post("/reviews/", &laptop_review("P1", "S")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut short_text = laptop_review("P1", "Sam");
    short_text["review_text"] = json!("Meh.");
    let response = app.post("/reviews/", &short_text).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut no_brand = laptop_review("P1", "Sam");
    no_brand.as_object_mut().unwrap().remove("brand");
    let response = app.post("/reviews/", &no_brand).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.post("/reviews/", &laptop_review("GHOST", "Sam")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let listing = body(app.get("/reviews/").await).await;
    assert_eq!(listing["total"], 0);
}

#[tokio::test]
async fn listings_are_newest_first_with_product_names() {
    let app = spawn_app().await;
    app.create_laptop("P1").await;
    app.create_laptop("P2").await;

    let first = create_review(&app, &laptop_review("P1", "Ann")).await;
    let second = create_review(&app, &laptop_review("P2", "Ben")).await;
    let third = create_review(&app, &laptop_review("P1", "Cal")).await;

    let listing = body(app.get("/reviews/?include_product_name=true").await).await;
    let items = listing["items"].as_array().unwrap();
    let ids: Vec<i64> = items.iter().map(|r| r["review_id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![third, second, first]);
    assert_eq!(items[1]["product_name"], "Laptop P2");

    let listing = body(app.get("/reviews/").await).await;
    assert!(listing["items"][0].get("product_name").is_none());

    let listing = body(app.get("/reviews/product/P1").await).await;
    assert_eq!(listing["total"], 2);
    assert_eq!(listing["product_id"], "P1");
    assert_eq!(listing["product_name"], "Laptop P1");
    assert_eq!(listing["items"][0]["review_id"], third);

    let response = app.get("/reviews/product/GHOST").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let listing = body(app.get("/reviews/?per_page=500&page=0").await).await;
    assert_eq!(listing["per_page"], 100);
    assert_eq!(listing["page"], 1);
}

#[tokio::test]
async fn filter_follows_category_rules() {
    let app = spawn_app().await;
    app.create_laptop("P1").await;
    create_review(&app, &laptop_review("P1", "Ann")).await;
    create_review(
        &app,
        &json!({
            "product_id": "P1",
            "user_alias": "Ben",
            "review_text": "Clicky keys, nice travel.",
            "category": "Accessories",
            "subcategory": "Keyboard"
        }),
    )
    .await;

    let listing = body(app.get("/reviews/filter?category=Laptops&brand=ASUS").await).await;
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["items"][0]["user_alias"], "Ann");

    let listing = body(app.get("/reviews/filter?subcategory=Keyboard").await).await;
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["items"][0]["user_alias"], "Ben");

    let response = app
        .get("/reviews/filter?category=Speakers&brand=ASUS")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body(response).await["error"],
        "Speakers cannot be filtered by brand or subcategory"
    );
}

#[tokio::test]
async fn update_and_delete_review() {
    let app = spawn_app().await;
    app.create_laptop("P1").await;
    let review_id = create_review(&app, &laptop_review("P1", "Ann")).await;
    let path = format!("/reviews/{review_id}");

    let response = app
        .put(
            &path,
            &json!({
                "rating": 2.5,
                "category": "Speakers",
                "review_text": "Changed my mind later."
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let review = body(app.get(&path).await).await;
    assert_eq!(review["rating"], 2.5);
    assert_eq!(review["category"], "Speakers");
    assert!(review["brand"].is_null());
    assert_eq!(review["user_alias"], "Ann");

    let response = app.put(&path, &json!({"rating": 0})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.delete(&path).await.status(), StatusCode::OK);
    assert_eq!(app.get(&path).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.delete(&path).await.status(), StatusCode::NOT_FOUND);
}
