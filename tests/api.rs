//! HTTP surface tests, run against the in-process router with no network
//! and no pdfium. Everything exercised here is validation, routing, and
//! the crop path, which are fully deterministic.

#![cfg(feature = "server")]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use image::{DynamicImage, Rgb, RgbImage};
use mcq_vision::api::router;
use mcq_vision::pipeline::encode;
use mcq_vision::ServiceConfig;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_router() -> axum::Router {
    router(ServiceConfig::default())
}

async fn body_json(body: Body) -> Value {
    let bytes = to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn multipart_request(uri: &str, file_name: &str, content: &[u8]) -> Request<Body> {
    let boundary = "X-TEST-BOUNDARY";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(uri: &str, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_version_and_key_state() {
    let response = test_router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["geminiConfigured"], false);
}

#[tokio::test]
async fn root_serves_health_too() {
    let response = test_router()
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn non_pdf_upload_is_rejected_before_processing() {
    let response = test_router()
        .oneshot(multipart_request("/api/analyze-pdf", "notes.txt", b"hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["detail"], "File must be a PDF");
}

#[tokio::test]
async fn missing_file_field_is_rejected() {
    let boundary = "X-TEST-BOUNDARY";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nexam\r\n--{boundary}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/analyze-pdf")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = test_router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["detail"], "No file provided");
}

#[tokio::test]
async fn empty_image_payload_is_rejected() {
    let response = test_router()
        .oneshot(json_request("/api/analyze", json!({ "image": "" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn crop_endpoint_round_trips_a_real_image() {
    // 100×100 page; a whole-image box with the default padding of 10 must
    // clamp back to exactly the full image.
    let page = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([200, 200, 200])));
    let page_url = encode::encode_png_data_url(&page).unwrap();

    let payload = json!({
        "image": page_url,
        "segments": [{
            "id": "1",
            "text": "Sample question",
            "boundingBox": { "ymin": 0, "xmin": 0, "ymax": 1000, "xmax": 1000 }
        }]
    });

    let response = test_router()
        .oneshot(json_request("/api/crop", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["success"], true);
    let crop_url = json["segments"][0]["cropUrl"].as_str().unwrap();
    assert!(crop_url.starts_with("data:image/png;base64,"));

    let crop = encode::decode_image(crop_url).unwrap();
    assert_eq!((crop.width(), crop.height()), (100, 100));
}

#[tokio::test]
async fn crop_with_undecodable_image_is_a_business_failure() {
    let payload = json!({
        "image": "QUJD",
        "segments": [{
            "id": "1",
            "text": "",
            "boundingBox": { "ymin": 0, "xmin": 0, "ymax": 1000, "xmax": 1000 }
        }]
    });

    let response = test_router()
        .oneshot(json_request("/api/crop", payload))
        .await
        .unwrap();
    // Pipeline failures are 200 + success=false, not protocol errors.
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response.into_body()).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().unwrap().contains("Invalid image"));
}

#[tokio::test]
async fn unknown_task_is_404() {
    let response = test_router()
        .oneshot(
            Request::get("/api/tasks/pdf_0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
