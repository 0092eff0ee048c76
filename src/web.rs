// src/web.rs
use crate::app::SignalApp;
use crate::capture::CaptureMode;
use crate::error::{AppError, Result};
use crate::frame::ImageFrame;
use crate::signal::{AnalysisResult, Outcome};
use actix_web::http::header::CONTENT_TYPE;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, Responder, delete, get, post, web};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub app: Arc<SignalApp>,
}

#[derive(Serialize)]
struct Ack {
    success: bool,
}

const ACK: Ack = Ack { success: true };

#[derive(Serialize)]
struct ModeResponse {
    mode: CaptureMode,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    /// Nothing was analysed: another call was in flight or no frame was ready.
    skipped: bool,
    result: Option<AnalysisResult>,
}

impl From<Option<AnalysisResult>> for AnalyzeResponse {
    fn from(result: Option<AnalysisResult>) -> Self {
        AnalyzeResponse {
            skipped: result.is_none(),
            result,
        }
    }
}

fn content_type(req: &HttpRequest) -> &str {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[get("/api/status")]
async fn status(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.app.status().await)
}

#[get("/api/mode")]
async fn get_mode(state: web::Data<AppState>) -> impl Responder {
    let mode = state.app.mode().await;
    HttpResponse::Ok().json(ModeResponse { mode })
}

#[post("/api/mode/{mode}")]
async fn set_mode(state: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse> {
    let mode: CaptureMode = path.into_inner().parse()?;
    state.app.set_mode(mode).await?;
    Ok(HttpResponse::Ok().json(ModeResponse { mode }))
}

/// Raw image body; the MIME type is taken from `Content-Type`.
#[post("/api/upload")]
async fn upload(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    state.app.upload(body.to_vec(), content_type(&req)).await?;
    Ok(HttpResponse::Ok().json(ACK))
}

#[delete("/api/upload")]
async fn clear_upload(state: web::Data<AppState>) -> impl Responder {
    state.app.clear_upload().await;
    HttpResponse::Ok().json(ACK)
}

#[post("/api/analyze")]
async fn analyze(state: web::Data<AppState>) -> Result<HttpResponse> {
    let result = state.app.analyze_upload().await?;
    Ok(HttpResponse::Ok().json(AnalyzeResponse::from(result)))
}

#[post("/api/live/connect")]
async fn live_connect(state: web::Data<AppState>) -> Result<HttpResponse> {
    state.app.connect().await?;
    Ok(HttpResponse::Ok().json(ACK))
}

/// Called by the page when `getDisplayMedia` was refused.
#[post("/api/live/denied")]
async fn live_denied(state: web::Data<AppState>) -> impl Responder {
    state.app.capture_denied().await;
    HttpResponse::Ok().json(state.app.status().await)
}

#[post("/api/live/disconnect")]
async fn live_disconnect(state: web::Data<AppState>) -> impl Responder {
    state.app.disconnect().await;
    HttpResponse::Ok().json(ACK)
}

#[post("/api/live/sync")]
async fn live_sync(state: web::Data<AppState>) -> Result<HttpResponse> {
    state.app.sync_timer().await?;
    Ok(HttpResponse::Ok().json(ACK))
}

#[post("/api/live/scan")]
async fn live_scan(state: web::Data<AppState>) -> Result<HttpResponse> {
    let result = state.app.force_scan().await?;
    Ok(HttpResponse::Ok().json(AnalyzeResponse::from(result)))
}

/// Raw image body, or a `text/plain` data URL straight from `canvas.toDataURL`.
#[post("/api/live/frame")]
async fn live_frame(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let mime = content_type(&req);
    let frame = if mime.starts_with("text/plain") {
        let url = std::str::from_utf8(&body)
            .map_err(|_| AppError::Validation("data URL is not valid UTF-8".into()))?;
        ImageFrame::from_data_url(url.trim())?
    } else {
        ImageFrame::from_upload(body.to_vec(), mime)?
    };
    state.app.push_frame(frame).await?;
    Ok(HttpResponse::Ok().json(ACK))
}

#[get("/api/history")]
async fn history(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.app.history().await)
}

#[get("/api/history/stats")]
async fn history_stats(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.app.history_stats().await)
}

#[delete("/api/history")]
async fn clear_history(state: web::Data<AppState>) -> Result<HttpResponse> {
    state.app.clear_history().await?;
    Ok(HttpResponse::Ok().json(ACK))
}

/// /api/history/{id}/win or /api/history/{id}/loss
#[post("/api/history/{id}/{outcome}")]
async fn mark_outcome(
    state: web::Data<AppState>,
    path: web::Path<(i64, String)>,
) -> Result<HttpResponse> {
    let (id, outcome) = path.into_inner();
    let outcome: Outcome = outcome.parse().map_err(AppError::Validation)?;
    let entry = state.app.mark_outcome(id, outcome).await?;
    Ok(HttpResponse::Ok().json(entry))
}

/// API routes, shared by the server and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(status)
        .service(get_mode)
        .service(set_mode)
        .service(upload)
        .service(clear_upload)
        .service(analyze)
        .service(live_connect)
        .service(live_denied)
        .service(live_disconnect)
        .service(live_sync)
        .service(live_scan)
        .service(live_frame)
        .service(history)
        .service(history_stats)
        .service(clear_history)
        .service(mark_outcome);
}

pub async fn start_web(app: Arc<SignalApp>) -> std::io::Result<()> {
    let server = app.get_config().server.clone();
    let state = AppState { app };

    info!("Starting web server at {}:{}", server.host, server.port);
    let static_dir = server.static_dir.clone();
    let limit = server.max_upload_bytes;
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::PayloadConfig::new(limit))
            .configure(configure)
            .service(actix_files::Files::new("/", &static_dir).index_file("index.html"))
    })
    .bind((server.host.as_str(), server.port))?
    .run()
    .await
}
