#![allow(dead_code)]

use reqwest::{Client, Response, StatusCode};
use sea_orm::{Database, DatabaseConnection};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use pc_concept::api::create_api_router;
use pc_concept::entities::setup_schema;

pub struct TestApp {
    pub base_url: String,
    pub client: Client,
    pub db: Arc<DatabaseConnection>,
}

/// Serves the full router on an ephemeral port over a fresh SQLite file.
pub async fn spawn_app() -> TestApp {
    let path = std::env::temp_dir().join(format!("pc_concept_test_{}.db", Uuid::new_v4()));
    let database_url = format!("sqlite://{}?mode=rwc", path.display());

    let db = Database::connect(&database_url)
        .await
        .expect("Failed to open test database");
    setup_schema(&db).await.expect("Failed to create schema");
    let db = Arc::new(db);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Listener has no address");
    let app = create_api_router(db.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });

    TestApp {
        base_url: format!("http://{addr}"),
        client: Client::new(),
        db,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request")
    }

    pub async fn post(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request")
    }

    pub async fn put(&self, path: &str, body: &Value) -> Response {
        self.client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send PUT request")
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("Failed to send DELETE request")
    }

    pub async fn create_laptop(&self, product_id: &str) {
        let response = self
            .post(
                "/products/",
                &json!({
                    "product_id": product_id,
                    "name": format!("Laptop {product_id}"),
                    "brand": "asus",
                    "category": "Laptops",
                    "price": 999.99,
                    "image_url": "http://img/laptop.png"
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }
}

pub async fn body(response: Response) -> Value {
    response
        .json::<Value>()
        .await
        .expect("Failed to parse response JSON")
}
