mod common;

use auth_rs::routes::health;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_is_always_ok() {
    let pool = common::setup_pool().await;
    let app = health::router(pool);

    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_ready_when_database_answers() {
    let pool = common::setup_pool().await;
    let app = health::router(pool);

    let response = app.oneshot(get("/api/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_not_ready_once_pool_is_closed() {
    let pool = common::setup_pool().await;
    let app = health::router(pool.clone());
    pool.close().await;

    let response = app.oneshot(get("/api/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
