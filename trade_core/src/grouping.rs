use crate::transfer::{TransferIdentity, ValidatedTransfer};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// All deduplicated transfers sharing one transaction hash
#[derive(Debug, Clone, PartialEq)]
pub struct TransferGroup {
    pub tx_hash: String,
    pub transfers: Vec<ValidatedTransfer>,
}

impl TransferGroup {
    /// Earliest block timestamp in the group
    pub fn block_timestamp(&self) -> Option<DateTime<Utc>> {
        self.transfers.iter().map(|t| t.block_timestamp).min()
    }

    /// At least one transfer out of and one into the wallet
    pub fn is_swap_candidate(&self, wallet: &str) -> bool {
        self.transfers.iter().any(|t| t.is_sent_by(wallet))
            && self.transfers.iter().any(|t| t.is_received_by(wallet))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    pub merged: usize,
    pub duplicates: usize,
    pub groups: usize,
    pub one_sided: usize,
}

#[derive(Debug, Clone, Default)]
pub struct GroupingOutcome {
    pub candidates: Vec<TransferGroup>,
    pub stats: GroupingStats,
}

/// Merge both directional result sets, drop duplicates, group by transaction and
/// keep only groups where the wallet both sends and receives.
///
/// Candidates come back ordered by block timestamp, then hash.
pub fn group_swap_candidates(
    wallet: &str,
    sent: Vec<ValidatedTransfer>,
    received: Vec<ValidatedTransfer>,
) -> GroupingOutcome {
    let mut stats = GroupingStats::default();
    let mut seen = HashSet::<TransferIdentity>::new();
    let mut index = HashMap::<String, usize>::new();
    let mut groups = Vec::<TransferGroup>::new();

    for transfer in sent.into_iter().chain(received) {
        stats.merged += 1;
        if !seen.insert(transfer.identity()) {
            stats.duplicates += 1;
            continue;
        }

        match index.get(&transfer.tx_hash).copied() {
            Some(position) => groups[position].transfers.push(transfer),
            None => {
                index.insert(transfer.tx_hash.clone(), groups.len());
                groups.push(TransferGroup {
                    tx_hash: transfer.tx_hash.clone(),
                    transfers: vec![transfer],
                });
            }
        }
    }

    stats.groups = groups.len();
    let mut candidates: Vec<TransferGroup> = groups
        .into_iter()
        .filter(|group| group.is_swap_candidate(wallet))
        .collect();
    stats.one_sided = stats.groups - candidates.len();

    candidates.sort_by(|a, b| {
        a.block_timestamp()
            .cmp(&b.block_timestamp())
            .then_with(|| a.tx_hash.cmp(&b.tx_hash))
    });

    debug!(
        "Grouped {} transfers ({} duplicates) into {} transactions, {} swap candidates for wallet {}",
        stats.merged,
        stats.duplicates,
        stats.groups,
        candidates.len(),
        wallet
    );

    GroupingOutcome { candidates, stats }
}
