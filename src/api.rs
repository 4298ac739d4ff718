//! REST API router.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET/POST | `/api/config` | read / partially update the config |
//! | GET | `/api/photos` | ordered photo list |
//! | POST | `/api/photos/upload` | multipart upload (field `file`) |
//! | POST | `/api/photos/upload-cropped` | base64 upload with crop |
//! | DELETE | `/api/photos/{name}` | delete a photo |
//! | GET | `/api/photos/original/{name}` | raw original upload |
//! | GET | `/api/preview/{name}` | thumbnail data URL |
//! | POST | `/api/display/{name}` | show a photo now (202) |
//! | GET | `/photos/{name}` | stored display copy |
//! | GET | `/photos/{name}/with-widgets` | PNG with widgets composited |
//! | GET | `/api/widgets` | configured and available widgets |
//! | GET/POST | `/api/widgets/{type}` | one widget's settings |
//! | GET | `/api/widgets/{type}/options` | option metadata |
//! | POST | `/api/widgets/preview` | preview with trial settings |
//! | GET | `/api/scheduler` | scheduler status |
//!
//! Image work runs on blocking threads; panel refreshes only ever happen on
//! the scheduler task.

use std::collections::BTreeMap;

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::app::AppContext;
use crate::axum_ext::{JsonBody, PhotoName};
use crate::config::Config;
use crate::messages::{
    png_data_url, ConfigUpdate, CroppedUpload, DeleteResponse, DisplayResponse, PreviewRequest,
    PreviewResponse, ThumbnailResponse, UploadResponse, WidgetInfo, WidgetUpdateResponse,
    WidgetsResponse,
};
use crate::photos::{content_type, PhotoInfo};
use crate::render::{encode_png, prepare_frame};
use crate::scheduler::SchedulerStatus;
use crate::widgets::{self, Widget, WidgetSettings};
use crate::{Error, MAX_UPLOAD_SIZE};

/// Largest side of `/api/preview` thumbnails.
const THUMBNAIL_SIZE: u32 = 200;

/// Build the API router.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/photos", get(list_photos))
        .route("/api/photos/upload", post(upload))
        .route("/api/photos/upload-cropped", post(upload_cropped))
        .route("/api/photos/{name}", axum::routing::delete(delete_photo))
        .route("/api/photos/original/{name}", get(original))
        .route("/api/preview/{name}", get(thumbnail))
        .route("/api/display/{name}", post(display_now))
        .route("/photos/{name}", get(photo))
        .route("/photos/{name}/with-widgets", get(photo_with_widgets))
        .route("/api/widgets", get(list_widgets))
        .route("/api/widgets/preview", post(preview_widgets))
        .route("/api/widgets/{widget_type}", get(get_widget).post(update_widget))
        .route("/api/widgets/{widget_type}/options", get(widget_options))
        .route("/api/scheduler", get(scheduler_status))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn get_config(State(ctx): State<AppContext>) -> Json<Config> {
    Json(ctx.config.snapshot())
}

async fn update_config(
    State(ctx): State<AppContext>,
    JsonBody(update): JsonBody<ConfigUpdate>,
) -> Result<Json<Config>, Error> {
    let store = ctx.config.clone();
    let (was_enabled, config) = tokio::task::spawn_blocking(move || {
        store.update(|cfg| {
            let was_enabled = cfg.cycle_enabled;
            update.apply(cfg);
            Ok((was_enabled, cfg.clone()))
        })
    })
    .await??;

    match (was_enabled, config.cycle_enabled) {
        (false, true) => ctx.scheduler.enable()?,
        (true, false) => ctx.scheduler.disable()?,
        _ => {}
    }
    Ok(Json(config))
}

async fn list_photos(State(ctx): State<AppContext>) -> Result<Json<Vec<PhotoInfo>>, Error> {
    let order = ctx.config.snapshot().photo_order;
    Ok(Json(ctx.photos.list(&order)?))
}

async fn upload(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, Error> {
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::validation(e.body_text()))?;
        file = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = file.ok_or_else(|| Error::validation("no file provided"))?;
    if filename.trim().is_empty() {
        return Err(Error::validation("no file selected"));
    }

    let orientation = ctx.config.snapshot().orientation;
    let photos = ctx.photos.clone();
    let stored =
        tokio::task::spawn_blocking(move || photos.add(&bytes, &filename, orientation)).await??;
    Ok(Json(stored.into()))
}

async fn upload_cropped(
    State(ctx): State<AppContext>,
    JsonBody(request): JsonBody<CroppedUpload>,
) -> Result<Json<UploadResponse>, Error> {
    let bytes = request.image_bytes()?;
    let orientation = request
        .orientation
        .unwrap_or_else(|| ctx.config.snapshot().orientation);
    let photos = ctx.photos.clone();
    let stored = tokio::task::spawn_blocking(move || {
        photos.add_cropped(
            &bytes,
            request.filename(),
            request.crop,
            orientation,
            request.is_recrop,
        )
    })
    .await??;
    Ok(Json(stored.into()))
}

async fn delete_photo(
    State(ctx): State<AppContext>,
    PhotoName(name): PhotoName,
) -> Result<Json<DeleteResponse>, Error> {
    let (photos, config) = (ctx.photos.clone(), ctx.config.clone());
    let deleted = tokio::task::spawn_blocking(move || photos.delete(&name, &config)).await??;
    Ok(Json(DeleteResponse {
        success: true,
        deleted,
    }))
}

async fn display_now(
    State(ctx): State<AppContext>,
    PhotoName(name): PhotoName,
) -> Result<impl IntoResponse, Error> {
    if !ctx.photos.exists(&name) {
        return Err(Error::not_found(format!("photo '{}'", name)));
    }
    ctx.scheduler.display_now(name.clone())?;
    tracing::info!(photo = %name, "Display requested");
    Ok((StatusCode::ACCEPTED, Json(DisplayResponse::new(name))))
}

async fn photo(
    State(ctx): State<AppContext>,
    PhotoName(name): PhotoName,
) -> Result<impl IntoResponse, Error> {
    let bytes = tokio::fs::read(ctx.photos.path(&name)?).await?;
    Ok(([(CONTENT_TYPE, content_type(&bytes))], bytes))
}

async fn original(
    State(ctx): State<AppContext>,
    PhotoName(name): PhotoName,
) -> Result<impl IntoResponse, Error> {
    let bytes = tokio::fs::read(ctx.photos.original_path(&name)?).await?;
    Ok(([(CONTENT_TYPE, content_type(&bytes))], bytes))
}

async fn photo_with_widgets(
    State(ctx): State<AppContext>,
    PhotoName(name): PhotoName,
) -> Result<impl IntoResponse, Error> {
    let path = ctx.photos.path(&name)?;
    let config = ctx.config.snapshot();
    let png = tokio::task::spawn_blocking(move || {
        let frame = prepare_frame(&path, config.orientation, &config.widgets, config.now())?;
        encode_png(&frame)
    })
    .await??;
    Ok(([(CONTENT_TYPE, "image/png")], png))
}

async fn thumbnail(
    State(ctx): State<AppContext>,
    PhotoName(name): PhotoName,
) -> Result<Json<ThumbnailResponse>, Error> {
    let photos = ctx.photos.clone();
    let png = tokio::task::spawn_blocking(move || photos.thumbnail(&name, THUMBNAIL_SIZE)).await??;
    Ok(Json(ThumbnailResponse {
        thumbnail: png_data_url(&png),
    }))
}

async fn list_widgets(State(ctx): State<AppContext>) -> Json<WidgetsResponse> {
    let available = widgets::registry()
        .iter()
        .map(|w| {
            (
                w.widget_type().to_string(),
                WidgetInfo {
                    name: w.display_name().to_string(),
                    default_config: w.default_settings(),
                },
            )
        })
        .collect();
    Json(WidgetsResponse {
        current: ctx.config.snapshot().widgets,
        available,
    })
}

fn widget_or(widget_type: &str, err: fn(String) -> Error) -> Result<&'static dyn Widget, Error> {
    widgets::lookup(widget_type)
        .ok_or_else(|| err(format!("unknown widget type '{}'", widget_type)))
}

async fn get_widget(
    State(ctx): State<AppContext>,
    Path(widget_type): Path<String>,
) -> Result<Json<WidgetSettings>, Error> {
    let widget = widget_or(&widget_type, Error::NotFound)?;
    let settings = ctx
        .config
        .snapshot()
        .widgets
        .remove(&widget_type)
        .unwrap_or_else(|| WidgetSettings {
            enabled: false,
            ..widget.default_settings()
        });
    Ok(Json(settings))
}

async fn update_widget(
    State(ctx): State<AppContext>,
    Path(widget_type): Path<String>,
    JsonBody(settings): JsonBody<WidgetSettings>,
) -> Result<Json<WidgetUpdateResponse>, Error> {
    let widget = widget_or(&widget_type, Error::Validation)?;
    widget.validate(&settings)?;
    let (store, key, stored) = (ctx.config.clone(), widget_type.clone(), settings.clone());
    tokio::task::spawn_blocking(move || {
        store.update(|cfg| {
            cfg.widgets.insert(key, stored);
            Ok(())
        })
    })
    .await??;
    tracing::info!(widget = %widget_type, enabled = settings.enabled, "Widget updated");
    Ok(Json(WidgetUpdateResponse {
        success: true,
        config: settings,
    }))
}

async fn widget_options(Path(widget_type): Path<String>) -> Result<Json<serde_json::Value>, Error> {
    let widget = widget_or(&widget_type, Error::NotFound)?;
    Ok(Json(widget.options()))
}

async fn preview_widgets(
    State(ctx): State<AppContext>,
    JsonBody(request): JsonBody<PreviewRequest>,
) -> Result<Json<PreviewResponse>, Error> {
    let config = ctx.config.snapshot();
    let path = match &request.photo {
        Some(name) => ctx.photos.path(name)?,
        None => {
            let first = ctx
                .photos
                .list(&config.photo_order)?
                .into_iter()
                .next()
                .ok_or_else(|| Error::not_found("no photos available for preview"))?;
            ctx.photos.path(&first.name)?
        }
    };
    let widgets: BTreeMap<String, WidgetSettings> =
        request.widgets.unwrap_or_else(|| config.widgets.clone());
    let orientation = request.orientation.unwrap_or(config.orientation);
    let now = config.now();

    let png = tokio::task::spawn_blocking(move || {
        let frame = prepare_frame(&path, orientation, &widgets, now)?;
        encode_png(&frame)
    })
    .await??;
    Ok(Json(PreviewResponse {
        preview: png_data_url(&png),
    }))
}

async fn scheduler_status(State(ctx): State<AppContext>) -> Json<SchedulerStatus> {
    Json(ctx.scheduler.status())
}
