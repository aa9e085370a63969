use serde::{Deserialize, Serialize};

use super::batch::{BatchResult, MarketData};

/// What a progress event reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    /// A batch item settled (successfully or not)
    Update,
    /// A batch item settled with an error
    Error,
    /// The whole batch finished
    Complete,
}

/// Incremental batch progress, published after every item settles and
/// once more when the batch completes.
///
/// Intended to be re-published by an out-of-scope real-time transport
/// layer for live dashboards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    /// Symbol that settled (absent on the terminal event)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Fetched value, when the item succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<MarketData>,
    /// Error message, when the item failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Items settled so far
    pub completed: usize,
    /// Items in the batch
    pub total: usize,
    /// `completed / total`, in percent
    pub percentage: f64,
}

impl ProgressEvent {
    pub(crate) fn update(
        symbol: String,
        payload: MarketData,
        completed: usize,
        total: usize,
    ) -> Self {
        Self {
            kind: ProgressKind::Update,
            symbol: Some(symbol),
            payload: Some(payload),
            error: None,
            completed,
            total,
            percentage: percentage(completed, total),
        }
    }

    pub(crate) fn error(symbol: String, error: String, completed: usize, total: usize) -> Self {
        Self {
            kind: ProgressKind::Error,
            symbol: Some(symbol),
            payload: None,
            error: Some(error),
            completed,
            total,
            percentage: percentage(completed, total),
        }
    }

    pub(crate) fn complete(total: usize) -> Self {
        Self {
            kind: ProgressKind::Complete,
            symbol: None,
            payload: None,
            error: None,
            completed: total,
            total,
            percentage: 100.0,
        }
    }
}

fn percentage(completed: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        completed as f64 / total as f64 * 100.0
    }
}

/// Events published by the auto-refresh scheduler.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// A refresh tick finished; carries the batch result.
    AutoUpdate {
        result: BatchResult,
    },
    /// A refresh tick blew up; ticks keep running regardless.
    AutoUpdateError {
        message: String,
    },
}
