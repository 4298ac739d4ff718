//! End-to-end flow through the public router: upload, configure, display.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use inky_frame::display::Simulator;
use inky_frame::{api, AppContext, Settings};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 200) as u8, (y % 200) as u8, 80]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

async fn call(ctx: &AppContext, request: Request<Body>) -> (StatusCode, Value) {
    let response: Response = api::router(ctx.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn upload_configure_and_display() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        data_dir: dir.path().to_path_buf(),
        ..Settings::default()
    };
    let cancel = CancellationToken::new();
    let (ctx, scheduler) = AppContext::start(&settings, Arc::new(Simulator), cancel.clone()).unwrap();

    // Upload a cropped landscape photo.
    let image = format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg(1200, 900)));
    let (status, body) = call(
        &ctx,
        post(
            "/api/photos/upload-cropped",
            json!({
                "image": image,
                "filename": "a.jpg",
                "crop": {"x": 100, "y": 100, "width": 1000, "height": 600},
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["name"], "a.jpg");
    assert_eq!((body["width"].as_u64(), body["height"].as_u64()), (Some(800), Some(480)));

    // Interval below the minimum is rejected and nothing changes.
    let (status, _) = call(&ctx, post("/api/config", json!({"cycle_interval": 30}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(ctx.config.snapshot().cycle_interval, 3600);

    let (status, body) = call(
        &ctx,
        post("/api/config", json!({"cycle_interval": 120, "cycle_enabled": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cycle_interval"], 120);

    // The config survives a reload from disk.
    let reloaded = inky_frame::config::load(&settings.config_path());
    assert_eq!(reloaded.cycle_interval, 120);
    assert!(reloaded.cycle_enabled);

    // Display now restarts the cycle timer.
    let requested_at = Utc::now();
    let (status, body) = call(
        &ctx,
        Request::post("/api/display/a.jpg").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["displayed"], "a.jpg");

    let mut rx = ctx.scheduler.subscribe();
    let status = tokio::time::timeout(
        Duration::from_secs(30),
        rx.wait_for(|s| s.last_presented.as_deref() == Some("a.jpg") && s.next_fire.is_some()),
    )
    .await
    .expect("scheduler did not present in time")
    .unwrap()
    .clone();

    let next_fire = status.next_fire.unwrap();
    let delta = (next_fire - requested_at).num_seconds();
    assert!((118..=125).contains(&delta), "next fire {}s after request", delta);
    assert_eq!(ctx.config.snapshot().active_photo.as_deref(), Some("a.jpg"));

    let (_, polled) = call(&ctx, Request::get("/api/scheduler").body(Body::empty()).unwrap()).await;
    assert_eq!(polled["state"], "waiting");
    assert_eq!(polled["last_presented"], "a.jpg");

    // Deleting the active photo clears it.
    let (status, body) = call(
        &ctx,
        Request::delete("/api/photos/a.jpg").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);
    assert_eq!(ctx.config.snapshot().active_photo, None);

    cancel.cancel();
    scheduler.await.unwrap();
}
