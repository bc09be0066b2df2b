//! Tests for the status, health and CORS surface.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use common::{Setup, body_json, build};
use meshgen_runtime::DeviceKind;
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_status_reports_ready_device() {
    let t = common::app();

    let resp = t.app.clone().oneshot(get("/")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ready");
    assert_eq!(json["device"], "cuda");
}

#[tokio::test]
async fn test_status_reports_unavailable_model() {
    let t = build(Setup {
        loaded: false,
        device: DeviceKind::Cpu,
        ..Setup::default()
    });

    let resp = t.app.clone().oneshot(get("/")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "unavailable");
    assert_eq!(json["device"], "cpu");
}

#[tokio::test]
async fn test_health_is_always_ok() {
    let t = build(Setup {
        loaded: false,
        ..Setup::default()
    });

    let resp = t.app.clone().oneshot(get("/health")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let t = common::app();

    let resp = t.app.clone().oneshot(get("/nope")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin() {
    let t = common::app();

    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/convert")
        .header(header::ORIGIN, "https://viewer.example.org")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let resp = t.app.clone().oneshot(req).await.unwrap();

    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "https://viewer.example.org"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_cors_headers_on_simple_request() {
    let t = common::app();

    let req = Request::builder()
        .uri("/")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let resp = t.app.clone().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );
}
