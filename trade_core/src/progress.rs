//! Advisory progress reporting. Sinks are write-only and must never influence the cycle.

use crate::chain::EvmChain;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;
use tracing::debug;

/// States of one wallet sync cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Idle,
    ResolvingRange,
    FetchingTransfers,
    Grouping,
    Classifying,
    Valuating,
    Persisting,
    CursorAdvanced,
    Failed,
}

impl CycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStage::Idle => "idle",
            CycleStage::ResolvingRange => "resolving_range",
            CycleStage::FetchingTransfers => "fetching_transfers",
            CycleStage::Grouping => "grouping",
            CycleStage::Classifying => "classifying",
            CycleStage::Valuating => "valuating",
            CycleStage::Persisting => "persisting",
            CycleStage::CursorAdvanced => "cursor_advanced",
            CycleStage::Failed => "failed",
        }
    }
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub wallet: String,
    pub chain: EvmChain,
    pub stage: CycleStage,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _update: ProgressUpdate) {}
}

/// Emits every update as a debug log line
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, update: ProgressUpdate) {
        debug!(
            wallet = %update.wallet,
            chain = %update.chain,
            stage = %update.stage,
            "[{}/{}] {}",
            update.current,
            update.total,
            update.message
        );
    }
}

/// Keeps the most recent update (last write wins) for status endpoints and tests
#[derive(Debug, Default)]
pub struct SharedProgress {
    latest: RwLock<Option<ProgressUpdate>>,
    stages: RwLock<Vec<CycleStage>>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<ProgressUpdate> {
        self.latest.read().ok().and_then(|latest| latest.clone())
    }

    /// Stage transitions in the order they happened
    pub fn stages(&self) -> Vec<CycleStage> {
        self.stages.read().map(|stages| stages.clone()).unwrap_or_default()
    }
}

impl ProgressSink for SharedProgress {
    fn report(&self, update: ProgressUpdate) {
        if let Ok(mut stages) = self.stages.write() {
            if stages.last() != Some(&update.stage) {
                stages.push(update.stage);
            }
        }
        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(stage: CycleStage, current: usize) -> ProgressUpdate {
        ProgressUpdate {
            wallet: "0xabc".to_string(),
            chain: EvmChain::Base,
            stage,
            current,
            total: 3,
            message: String::new(),
        }
    }

    #[test]
    fn test_shared_progress_keeps_last_update() {
        let progress = SharedProgress::new();
        progress.report(update(CycleStage::Classifying, 1));
        progress.report(update(CycleStage::Classifying, 2));
        progress.report(update(CycleStage::Persisting, 2));

        assert_eq!(progress.latest().unwrap().stage, CycleStage::Persisting);
        assert_eq!(progress.stages(), vec![CycleStage::Classifying, CycleStage::Persisting]);
    }
}
