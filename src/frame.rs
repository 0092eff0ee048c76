// src/frame.rs
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::error::{AppError, Result};

/// An image held in memory, either uploaded or grabbed from a live stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    mime: String,
    data: Vec<u8>,
}

impl ImageFrame {
    /// Accepts only `image/*` MIME types with a non-empty body.
    pub fn from_upload(data: Vec<u8>, mime: &str) -> Result<Self> {
        let mime = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if !mime.starts_with("image/") {
            return Err(AppError::Validation(
                "please select a valid image file".into(),
            ));
        }
        if data.is_empty() {
            return Err(AppError::Validation("image file is empty".into()));
        }
        Ok(Self { mime, data })
    }

    /// Decodes `data:<mime>;base64,<payload>`.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let (header, payload) = url
            .split_once(',')
            .ok_or_else(|| AppError::Validation("invalid base64 image format".into()))?;
        if payload.is_empty() {
            return Err(AppError::Validation("invalid base64 image format".into()));
        }
        let mime = header
            .strip_prefix("data:")
            .and_then(|h| h.strip_suffix(";base64"))
            .ok_or_else(|| AppError::Validation("invalid data URL header".into()))?;
        let data = BASE64
            .decode(payload)
            .map_err(|e| AppError::Validation(format!("invalid base64 payload: {}", e)))?;
        Self::from_upload(data, mime)
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn base64_payload(&self) -> String {
        BASE64.encode(&self.data)
    }

    #[cfg(test)]
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, self.base64_payload())
    }
}

/// Maps a file extension to an image MIME type.
pub fn mime_for_path(path: &std::path::Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// Where live-mode frames come from.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Starts the stream. Fails when capture is not permitted or unavailable.
    async fn start(&self) -> Result<()>;

    /// Latest still frame, or `None` when the stream has nothing usable yet.
    async fn grab(&self) -> Result<Option<ImageFrame>>;

    async fn stop(&self);

    /// Accepts a frame produced elsewhere. Only push-based sources support it.
    async fn push(&self, _frame: ImageFrame) -> Result<()> {
        Err(AppError::Validation(
            "this capture source does not accept pushed frames".into(),
        ))
    }
}

/// Latest frame pushed by the browser page, which owns the `getDisplayMedia`
/// stream and the canvas snapshot.
#[derive(Debug)]
pub struct BrowserFrameSlot {
    latest: RwLock<Option<(ImageFrame, DateTime<Utc>)>>,
    active: AtomicBool,
    max_age: Duration,
}

impl BrowserFrameSlot {
    pub fn new(max_age_secs: i64) -> Self {
        Self {
            latest: RwLock::new(None),
            active: AtomicBool::new(false),
            max_age: Duration::seconds(max_age_secs),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Frames pushed while the stream is stopped are rejected.
    pub async fn push_at(&self, frame: ImageFrame, at: DateTime<Utc>) -> Result<()> {
        if !self.is_active() {
            debug!("Dropping frame pushed while capture is stopped");
            return Err(AppError::Validation("screen capture is not connected".into()));
        }
        *self.latest.write().await = Some((frame, at));
        Ok(())
    }
}

#[async_trait]
impl FrameSource for BrowserFrameSlot {
    async fn start(&self) -> Result<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn grab(&self) -> Result<Option<ImageFrame>> {
        if !self.is_active() {
            return Ok(None);
        }
        let latest = self.latest.read().await;
        match latest.as_ref() {
            Some((frame, at)) if Utc::now() - *at <= self.max_age => Ok(Some(frame.clone())),
            Some((_, at)) => {
                debug!("Latest browser frame from {} is stale", at);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        *self.latest.write().await = None;
    }

    async fn push(&self, frame: ImageFrame) -> Result<()> {
        self.push_at(frame, Utc::now()).await
    }
}

/// Re-reads an image file that an external screenshot tool keeps overwriting.
#[derive(Debug)]
pub struct FileFrameSource {
    path: PathBuf,
    mime: &'static str,
    active: AtomicBool,
}

impl FileFrameSource {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mime = mime_for_path(&path).ok_or_else(|| {
            AppError::Validation(format!("{} is not an image file", path.display()))
        })?;
        Ok(Self {
            path,
            mime,
            active: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl FrameSource for FileFrameSource {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn start(&self) -> Result<()> {
        tokio::fs::metadata(&self.path).await.map_err(|e| {
            AppError::Capture(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        self.active.store(true, Ordering::SeqCst);
        info!("File frame source started");
        Ok(())
    }

    async fn grab(&self) -> Result<Option<ImageFrame>> {
        if !self.active.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let data = tokio::fs::read(&self.path).await.map_err(|e| {
            AppError::Capture(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        if data.is_empty() {
            // the writer may be mid-way through replacing the file
            return Ok(None);
        }
        ImageFrame::from_upload(data, self.mime).map(Some)
    }

    async fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
