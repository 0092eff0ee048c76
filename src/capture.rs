// src/capture.rs
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{AppError, Result};
use crate::frame::ImageFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Upload,
    Live,
}

impl std::str::FromStr for CaptureMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "upload" => Ok(CaptureMode::Upload),
            "live" => Ok(CaptureMode::Live),
            other => Err(AppError::Validation(format!("unknown mode '{}'", other))),
        }
    }
}

/// Result of one countdown step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub remaining: u32,
    /// The counter just hit the trigger mark.
    pub trigger: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaptureSnapshot {
    pub mode: CaptureMode,
    pub connected: bool,
    pub synced: bool,
    pub countdown: u32,
    pub has_upload: bool,
}

/// Upload/live mode state and the live-mode countdown. Holds no timers or
/// streams itself; the caller drives `tick()` once per second.
#[derive(Debug)]
pub struct CaptureController {
    mode: CaptureMode,
    upload: Option<ImageFrame>,
    connected: bool,
    synced: bool,
    countdown: u32,
    period: u32,
    trigger_at: u32,
}

impl CaptureController {
    pub fn new(period: u32, trigger_at: u32) -> Self {
        Self {
            mode: CaptureMode::Live,
            upload: None,
            connected: false,
            synced: false,
            countdown: period,
            period,
            trigger_at,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn countdown(&self) -> u32 {
        self.countdown
    }

    pub fn upload(&self) -> Option<&ImageFrame> {
        self.upload.as_ref()
    }

    /// Returns `false` when already in `mode`. Switching always stops live capture.
    pub fn set_mode(&mut self, mode: CaptureMode) -> bool {
        if self.mode == mode {
            return false;
        }
        self.stop_capture();
        self.mode = mode;
        true
    }

    pub fn accept_upload(&mut self, frame: ImageFrame) {
        self.upload = Some(frame);
    }

    pub fn clear_upload(&mut self) {
        self.upload = None;
    }

    pub fn mark_connected(&mut self) -> Result<()> {
        if self.mode != CaptureMode::Live {
            return Err(AppError::Validation(
                "screen capture is only available in live mode".into(),
            ));
        }
        self.connected = true;
        Ok(())
    }

    /// Capture was refused: drop back to upload mode.
    pub fn connect_failed(&mut self) {
        self.stop_capture();
        self.mode = CaptureMode::Upload;
    }

    pub fn stop_capture(&mut self) {
        self.connected = false;
        self.synced = false;
        self.countdown = self.period;
    }

    /// Arms (or re-arms) the countdown from the full period.
    pub fn sync(&mut self) -> Result<()> {
        if !self.connected {
            return Err(AppError::Validation(
                "connect to the chart before syncing the timer".into(),
            ));
        }
        self.synced = true;
        self.countdown = self.period;
        Ok(())
    }

    pub fn tick(&mut self) -> Tick {
        if !self.synced {
            return Tick {
                remaining: self.countdown,
                trigger: false,
            };
        }
        let next = self.countdown.saturating_sub(1);
        let trigger = next == self.trigger_at;
        self.countdown = if next > 0 { next } else { self.period };
        Tick {
            remaining: self.countdown,
            trigger,
        }
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            mode: self.mode,
            connected: self.connected,
            synced: self.synced,
            countdown: self.countdown,
            has_upload: self.upload.is_some(),
        }
    }
}

/// Allows at most one analysis in flight. Re-entrant attempts get `None`.
#[derive(Debug, Clone, Default)]
pub struct BusyGate {
    busy: Arc<AtomicBool>,
}

#[derive(Debug)]
pub struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl BusyGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_acquire(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard {
                busy: self.busy.clone(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
