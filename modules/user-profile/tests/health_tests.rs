mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use user_profile_rs::routes::health;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_and_ready() {
    let pool = common::setup_pool().await;

    let response = health::router(pool.clone())
        .oneshot(get("/api/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = health::router(pool).oneshot(get("/api/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_not_ready_without_database() {
    let pool = common::setup_pool().await;
    let app = health::router(pool.clone());
    pool.close().await;

    let response = app.oneshot(get("/api/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
