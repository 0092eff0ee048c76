// src/history.rs
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{AppError, Result};
use crate::signal::{AnalysisResult, HistoryEntry, HistoryStats, Outcome};
use crate::storage::KeyValueStore;

/// The last few BUY/SELL signals, newest first, mirrored to a single
/// storage key as a JSON array on every mutation.
pub struct HistoryStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
    capacity: usize,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("key", &self.key)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Rehydrates from storage. Anything that is not a JSON array of entries
    /// is discarded and the key removed.
    #[instrument(skip(kv))]
    pub async fn load(kv: Arc<dyn KeyValueStore>, key: &str, capacity: usize) -> Result<Self> {
        let stored = kv.get(key).await.map_err(AppError::storage)?;

        let entries = match stored {
            None => Vec::new(),
            Some(raw) => match decode(&raw) {
                Some(mut entries) => {
                    entries.truncate(capacity);
                    info!("Loaded {} history entries", entries.len());
                    entries
                }
                None => {
                    warn!("Discarding corrupt history stored under {}", key);
                    kv.remove(key).await.map_err(AppError::storage)?;
                    Vec::new()
                }
            },
        };

        Ok(Self {
            kv,
            key: key.to_string(),
            capacity,
            entries: Mutex::new(entries),
        })
    }

    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn stats(&self) -> HistoryStats {
        HistoryStats::from_entries(&self.entries.lock().await)
    }

    /// Adds a PENDING entry for BUY/SELL results; other signals are ignored.
    #[instrument(skip(self, result), fields(signal = %result.signal))]
    pub async fn record(&self, result: &AnalysisResult) -> Result<Option<HistoryEntry>> {
        let Some(direction) = result.signal.direction() else {
            debug!("Signal not recorded in history");
            return Ok(None);
        };

        let mut entries = self.entries.lock().await;
        let now = Utc::now().timestamp_millis();
        let id = match entries.first() {
            Some(newest) if newest.id >= now => newest.id + 1,
            _ => now,
        };

        let entry = HistoryEntry {
            id,
            timestamp: result.timestamp,
            asset: result.asset.clone(),
            direction,
            outcome: Outcome::Pending,
        };
        entries.insert(0, entry.clone());
        entries.truncate(self.capacity);
        self.persist(&entries).await?;

        info!("Recorded {} on {} as entry {}", direction, entry.asset, id);
        Ok(Some(entry))
    }

    /// Sets WIN or LOSS on a single entry. Marking again overwrites.
    #[instrument(skip(self))]
    pub async fn mark(&self, id: i64, outcome: Outcome) -> Result<HistoryEntry> {
        if outcome == Outcome::Pending {
            return Err(AppError::Validation(
                "an entry can only be marked WIN or LOSS".into(),
            ));
        }

        let mut entries = self.entries.lock().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| AppError::NotFound(format!("history entry {}", id)))?;
        entry.outcome = outcome;
        let updated = entry.clone();
        self.persist(&entries).await?;

        info!("Marked entry {} as {}", id, outcome);
        Ok(updated)
    }

    pub async fn clear(&self) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.kv.remove(&self.key).await.map_err(AppError::storage)?;
        info!("History cleared");
        Ok(())
    }

    async fn persist(&self, entries: &[HistoryEntry]) -> Result<()> {
        let json = serde_json::to_string(entries)
            .map_err(|e| AppError::Storage(format!("failed to encode history: {}", e)))?;
        self.kv
            .set(&self.key, &json)
            .await
            .map_err(AppError::storage)?;
        Ok(())
    }
}

fn decode(raw: &str) -> Option<Vec<HistoryEntry>> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    if !value.is_array() {
        return None;
    }
    serde_json::from_value(value).ok()
}
