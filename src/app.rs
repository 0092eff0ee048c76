// src/app.rs
use crate::capture::{BusyGate, CaptureController, CaptureMode, CaptureSnapshot};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::frame::{FrameSource, ImageFrame};
use crate::history::HistoryStore;
use crate::model::{AnalysisKind, SignalModel};
use crate::parser::parse_response;
use crate::signal::{AnalysisResult, HistoryEntry, HistoryStats, Outcome};

use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, warn};

pub const CAPTURE_DENIED_MESSAGE: &str =
    "Could not capture the screen. Check the browser permissions.";

#[derive(Debug, Serialize)]
pub struct AppStatus {
    #[serde(flatten)]
    pub capture: CaptureSnapshot,
    pub loading: bool,
    pub result: Option<AnalysisResult>,
    pub error: Option<String>,
    pub history: HistoryStats,
}

/// Ties the capture controller, the model and the history together.
pub struct SignalApp {
    config: Arc<AppConfig>,
    model: Arc<dyn SignalModel>,
    frames: Arc<dyn FrameSource>,
    history: Arc<HistoryStore>,
    capture: Mutex<CaptureController>,
    busy: BusyGate,
    last_result: RwLock<Option<AnalysisResult>>,
    last_error: RwLock<Option<String>>,
    countdown_task: Mutex<Option<JoinHandle<()>>>,
}

impl SignalApp {
    pub fn new(
        config: Arc<AppConfig>,
        model: Arc<dyn SignalModel>,
        frames: Arc<dyn FrameSource>,
        history: Arc<HistoryStore>,
    ) -> Arc<Self> {
        let capture = CaptureController::new(config.live.period_secs, config.live.trigger_at_secs);
        Arc::new(Self {
            config,
            model,
            frames,
            history,
            capture: Mutex::new(capture),
            busy: BusyGate::new(),
            last_result: RwLock::new(None),
            last_error: RwLock::new(None),
            countdown_task: Mutex::new(None),
        })
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn status(&self) -> AppStatus {
        let capture = self.capture.lock().await.snapshot();
        let result = self.last_result.read().await.clone();
        let error = self.last_error.read().await.clone();
        AppStatus {
            capture,
            loading: self.busy.is_busy(),
            result,
            error,
            history: self.history.stats().await,
        }
    }

    pub async fn mode(&self) -> CaptureMode {
        self.capture.lock().await.mode()
    }

    #[instrument(skip(self))]
    pub async fn set_mode(&self, mode: CaptureMode) -> Result<()> {
        let changed = self.capture.lock().await.set_mode(mode);
        if changed {
            self.stop_live().await;
            self.clear_outcome().await;
            info!("Switched to {:?} mode", mode);
        }
        Ok(())
    }

    // --- Upload mode ---

    /// Invalid files are rejected without touching the current state.
    #[instrument(skip(self, data))]
    pub async fn upload(&self, data: Vec<u8>, mime: &str) -> Result<()> {
        let frame = ImageFrame::from_upload(data, mime)?;
        let mut capture = self.capture.lock().await;
        require_upload_mode(capture.mode())?;
        debug!("Accepted {} upload ({} bytes)", frame.mime(), frame.bytes().len());
        capture.accept_upload(frame);
        drop(capture);
        self.clear_outcome().await;
        Ok(())
    }

    pub async fn clear_upload(&self) {
        self.capture.lock().await.clear_upload();
        self.clear_outcome().await;
    }

    #[instrument(skip(self))]
    pub async fn analyze_upload(&self) -> Result<Option<AnalysisResult>> {
        let frame = {
            let capture = self.capture.lock().await;
            require_upload_mode(capture.mode())?;
            capture
                .upload()
                .cloned()
                .ok_or_else(|| AppError::Validation("no image uploaded".into()))?
        };

        let Some(_guard) = self.busy.try_acquire() else {
            debug!("Analysis already in flight, skipping upload analysis");
            return Ok(None);
        };

        self.clear_outcome().await;
        self.run_analysis(&frame, AnalysisKind::Upload).await.map(Some)
    }

    // --- Live mode ---

    /// Starts the frame source. On failure falls back to upload mode.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        *self.last_error.write().await = None;
        if self.capture.lock().await.mode() != CaptureMode::Live {
            return Err(AppError::Validation(
                "screen capture is only available in live mode".into(),
            ));
        }

        // a reconnect drops the old countdown, so it must be synced again
        self.stop_live().await;
        match self.frames.start().await {
            Ok(()) => {
                self.capture.lock().await.mark_connected()?;
                info!("Visual sensor connected, sync the timer");
                Ok(())
            }
            Err(e) => {
                warn!("Screen capture failed: {}", e);
                self.capture_denied().await;
                Err(e)
            }
        }
    }

    /// The browser refused `getDisplayMedia`.
    pub async fn capture_denied(&self) {
        self.stop_countdown().await;
        self.frames.stop().await;
        self.capture.lock().await.connect_failed();
        *self.last_error.write().await = Some(CAPTURE_DENIED_MESSAGE.to_string());
    }

    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        self.stop_live().await;
        self.clear_outcome().await;
        info!("System disconnected");
    }

    /// Arms the countdown and (re)starts the once-per-second timer task.
    #[instrument(skip(self))]
    pub async fn sync_timer(self: &Arc<Self>) -> Result<()> {
        self.capture.lock().await.sync()?;

        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(countdown_loop(weak));
        if let Some(old) = self.countdown_task.lock().await.replace(handle) {
            old.abort();
        }
        info!("Timer synced");
        Ok(())
    }

    /// Grabs one frame and analyses it. Skipped (`Ok(None)`) when not
    /// connected, when no frame is ready, or when an analysis is in flight.
    #[instrument(skip(self))]
    pub async fn force_scan(&self) -> Result<Option<AnalysisResult>> {
        if !self.capture.lock().await.is_connected() {
            debug!("Not connected, scan skipped");
            return Ok(None);
        }
        let Some(_guard) = self.busy.try_acquire() else {
            debug!("Analysis already in flight, scan skipped");
            return Ok(None);
        };

        let frame = match self.frames.grab().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("No frame ready, scan skipped");
                return Ok(None);
            }
            Err(e) => {
                *self.last_error.write().await = Some(e.to_string());
                return Err(e);
            }
        };

        self.run_analysis(&frame, AnalysisKind::Live).await.map(Some)
    }

    /// Stores a frame grabbed by the browser page.
    pub async fn push_frame(&self, frame: ImageFrame) -> Result<()> {
        self.frames.push(frame).await
    }

    // --- History ---

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.entries().await
    }

    pub async fn history_stats(&self) -> HistoryStats {
        self.history.stats().await
    }

    pub async fn mark_outcome(&self, id: i64, outcome: Outcome) -> Result<HistoryEntry> {
        self.history.mark(id, outcome).await
    }

    pub async fn clear_history(&self) -> Result<()> {
        self.history.clear().await
    }

    // --- internals ---

    async fn run_analysis(&self, frame: &ImageFrame, kind: AnalysisKind) -> Result<AnalysisResult> {
        let reply = match self.model.analyze(frame, kind).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Analysis failed: {}", e);
                *self.last_error.write().await = Some(e.to_string());
                return Err(e);
            }
        };

        let result = parse_response(&reply, Utc::now());
        info!(
            "Signal {} on {} ({})",
            result.signal, result.asset, result.confidence
        );
        *self.last_result.write().await = Some(result.clone());
        self.history.record(&result).await?;
        Ok(result)
    }

    async fn stop_live(&self) {
        self.stop_countdown().await;
        self.frames.stop().await;
        self.capture.lock().await.stop_capture();
    }

    async fn stop_countdown(&self) {
        if let Some(handle) = self.countdown_task.lock().await.take() {
            handle.abort();
        }
    }

    async fn clear_outcome(&self) {
        *self.last_result.write().await = None;
        *self.last_error.write().await = None;
    }
}

fn require_upload_mode(mode: CaptureMode) -> Result<()> {
    if mode != CaptureMode::Upload {
        return Err(AppError::Validation(
            "image upload is only available in upload mode".into(),
        ));
    }
    Ok(())
}

async fn countdown_loop(app: Weak<SignalApp>) {
    let mut ticker = interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(app) = app.upgrade() else {
            break;
        };
        let tick = app.capture.lock().await.tick();
        if !tick.trigger {
            continue;
        }
        if app.busy.is_busy() {
            debug!("Trigger mark reached while busy, skipping");
            continue;
        }

        // scan in its own task so the countdown keeps ticking during the call
        let scan_app = app.clone();
        tokio::spawn(async move {
            info!("Analysing candle close");
            if let Err(e) = scan_app.force_scan().await {
                warn!("Scheduled scan failed: {}", e);
            }
        });
    }
}
