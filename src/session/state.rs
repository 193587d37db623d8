use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::aggregation::EnergySummary;
use crate::carbon::{BudgetStatus, CarbonFootprint};
use crate::metrics::SamplerInfo;
use crate::sensing::StopOutcome;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Running,
    Completed,
}

/// How the bracketed workload ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WorkloadOutcome {
    Succeeded,
    Failed,
    Panicked,
    /// `track` was dropped before the workload finished; the session was
    /// closed by the next `track` or `stop`.
    Abandoned,
    /// Ended through [`CarbonSession::stop`](super::CarbonSession::stop) rather than `track`.
    Unknown,
}

/// Bookkeeping for the session in progress.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub running_anchor: Option<Instant>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, session_id: String, started_at: DateTime<Utc>, now: Instant) {
        *self = Self {
            status: SessionStatus::Running,
            session_id: Some(session_id),
            started_at: Some(started_at),
            running_anchor: Some(now),
        };
    }

    pub fn elapsed(&self) -> Duration {
        match (self.status, self.running_anchor) {
            (SessionStatus::Running, Some(anchor)) => anchor.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn complete(&mut self) {
        self.status = SessionStatus::Completed;
        self.running_anchor = None;
    }
}

/// Everything a finished session produced, as plain data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: WorkloadOutcome,
    pub summary: EnergySummary,
    pub footprint: CarbonFootprint,
    pub budget: Option<BudgetStatus>,
    pub stop_outcome: StopOutcome,
    pub system: SamplerInfo,
}
