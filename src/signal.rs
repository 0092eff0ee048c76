// src/signal.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_ASSET: &str = "---";
pub const DEFAULT_CONFIDENCE: &str = "--%";

/// Categorical recommendation read from the model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Wait,
    Error,
}

impl Signal {
    /// Matches an upper-cased token against the fixed enumeration, including the
    /// Portuguese words the prompts ask the model to use.
    pub fn from_token(token: &str) -> Signal {
        match token.to_uppercase().as_str() {
            "COMPRA" | "BUY" | "CALL" => Signal::Buy,
            "VENDA" | "SELL" | "PUT" => Signal::Sell,
            "AGUARDAR" | "WAIT" | "HOLD" => Signal::Wait,
            _ => Signal::Error,
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Buy => Some(Direction::Buy),
            Signal::Sell => Some(Direction::Sell),
            Signal::Wait | Signal::Error => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Signal::Buy => "BUY",
            Signal::Sell => "SELL",
            Signal::Wait => "WAIT",
            Signal::Error => "ERROR",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.pad("BUY"),
            Direction::Sell => f.pad("SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
    Pending,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Win => "WIN",
            Outcome::Loss => "LOSS",
            Outcome::Pending => "PENDING",
        };
        f.pad(s)
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "win" => Ok(Outcome::Win),
            "loss" => Ok(Outcome::Loss),
            "pending" => Ok(Outcome::Pending),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// Parsed model reply. Replaced on every new analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub signal: Signal,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub asset: String,
    pub confidence: String,
    pub raw_reply: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Creation time in epoch milliseconds.
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub asset: String,
    pub direction: Direction,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total: usize,
    pub wins: usize,
    pub losses: usize,
    pub pending: usize,
    pub win_rate: Option<f64>,
}

impl HistoryStats {
    pub fn from_entries(entries: &[HistoryEntry]) -> Self {
        let count = |o: Outcome| entries.iter().filter(|e| e.outcome == o).count();
        let wins = count(Outcome::Win);
        let losses = count(Outcome::Loss);
        let settled = wins + losses;

        HistoryStats {
            total: entries.len(),
            wins,
            losses,
            pending: count(Outcome::Pending),
            win_rate: (settled > 0).then(|| wins as f64 / settled as f64),
        }
    }
}
