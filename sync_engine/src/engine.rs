use crate::{CycleReport, Result, SyncCollaborators, SyncError, SyncLocks, SyncSettings, SyncTarget};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use trade_core::{
    format_cursor, group_swap_candidates, is_valid_evm_address, next_cursor, parse_cursor,
    BlockRange, CanonicalTrade, CycleStage, EvmChain, NoopProgress, ProgressSink, ProgressUpdate,
    RateLimiter, SwapClassifier, TransferDirection, TransferGroup, UsdValuation,
    ValidatedTransfer, ValuationOutcome,
};

/// Incremental swap sync for wallets.
///
/// One cycle resolves a block range from the stored cursor, fetches the wallet's
/// transfers in both directions, reconstructs and values swaps one transaction at a
/// time, upserts them, and finally advances the cursor. The cursor only moves when
/// every fetch succeeded.
pub struct WalletSyncEngine {
    collaborators: SyncCollaborators,
    valuation: UsdValuation,
    settings: SyncSettings,
    progress: Arc<dyn ProgressSink>,
    locks: SyncLocks,
}

impl WalletSyncEngine {
    pub fn new(collaborators: SyncCollaborators, settings: SyncSettings) -> Self {
        let valuation = UsdValuation::new(collaborators.prices.clone());
        Self {
            collaborators,
            valuation,
            settings,
            progress: Arc::new(NoopProgress),
            locks: SyncLocks::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Run one cycle for `wallet` on `chain`.
    ///
    /// Range resolution, fetch and cursor write errors fail the cycle and leave the
    /// stored cursor untouched. Per-transaction classification, pricing and storage
    /// errors are logged, counted in the report and skipped.
    pub async fn sync_wallet(&self, wallet: &str, chain: EvmChain) -> Result<CycleReport> {
        let wallet = wallet.trim().to_lowercase();
        if !is_valid_evm_address(&wallet) {
            return Err(SyncError::InvalidWallet(wallet));
        }

        let _guard = self.locks.acquire(&wallet, chain).await;
        let started = Instant::now();
        let mut report = CycleReport::new(&wallet, chain);
        info!(cycle_id = %report.cycle_id, "🔄 Starting sync for {} on {}", wallet, chain);

        match self.run_cycle(&wallet, chain, &mut report).await {
            Ok(()) => {
                report.elapsed_ms = started.elapsed().as_millis() as u64;
                info!(cycle_id = %report.cycle_id, "✅ {}", report.summary());
                Ok(report)
            }
            Err(e) => {
                self.stage(&wallet, chain, CycleStage::Failed, 0, 0, e.to_string());
                error!(
                    cycle_id = %report.cycle_id,
                    "❌ Sync failed for {} on {}: {}", wallet, chain, e
                );
                Err(e)
            }
        }
    }

    /// Sync several targets concurrently. Each target runs its own sequential cycle;
    /// one failure does not affect the others.
    pub async fn sync_all(&self, targets: &[SyncTarget]) -> Vec<(SyncTarget, Result<CycleReport>)> {
        let cycles = targets.iter().map(|target| async move {
            let result = self.sync_wallet(&target.wallet, target.chain).await;
            (target.clone(), result)
        });

        let results = join_all(cycles).await;
        let failed = results.iter().filter(|(_, r)| r.is_err()).count();
        info!(
            "Sync pass finished: {} targets, {} succeeded, {} failed",
            results.len(),
            results.len() - failed,
            failed
        );
        results
    }

    async fn run_cycle(&self, wallet: &str, chain: EvmChain, report: &mut CycleReport) -> Result<()> {
        // Resolve range
        self.stage(wallet, chain, CycleStage::ResolvingRange, 0, 0, "loading cursor and chain tip");
        let stored_cursor = self
            .collaborators
            .cursors
            .load_cursor(wallet, chain)
            .await
            .map_err(|e| SyncError::RangeResolution(format!("cursor load: {}", e)))?;
        let previous = parse_cursor(stored_cursor.as_deref());
        report.previous_cursor = stored_cursor;

        let chain_tip = self
            .collaborators
            .chain_tips
            .chain_tip(chain)
            .await
            .map_err(|e| SyncError::RangeResolution(format!("chain tip: {}", e)))?;

        let range = BlockRange::resolve(
            previous,
            self.settings.launch_floor(chain),
            chain_tip,
            self.settings.safety_margin_blocks,
        );
        report.from_block = range.from_block;
        report.to_block = range.to_block;
        debug!(wallet, %chain, from_block = range.from_block, to_block = range.to_block, "Resolved block range");

        if range.is_empty() {
            info!(
                "Nothing new for {} on {} (from {} >= tip {})",
                wallet, chain, range.from_block, range.to_block
            );
            return self.advance_cursor(wallet, chain, previous, &range, report).await;
        }

        // Fetch
        self.stage(wallet, chain, CycleStage::FetchingTransfers, 0, 2, "querying transfers");
        let sent = self.fetch(wallet, chain, &range, TransferDirection::From).await?;
        let received = self.fetch(wallet, chain, &range, TransferDirection::To).await?;
        report.transfers_fetched = sent.len() + received.len();

        let sent = self.validate(sent, report);
        let received = self.validate(received, report);

        // Group
        self.stage(wallet, chain, CycleStage::Grouping, 0, report.transfers_fetched, "grouping by transaction");
        let grouping = group_swap_candidates(wallet, sent, received);
        report.duplicates_dropped = grouping.stats.duplicates;
        report.groups_total = grouping.stats.groups;
        report.swap_candidates = grouping.candidates.len();

        // Classify, value and persist one transaction at a time
        let classifier = SwapClassifier::new(wallet, chain);
        let mut limiter = RateLimiter::new(self.settings.inter_item_delay);
        let total = grouping.candidates.len();

        for (index, group) in grouping.candidates.iter().enumerate() {
            limiter.wait().await;
            self.process_group(&classifier, group, index + 1, total, report).await;
        }

        self.advance_cursor(wallet, chain, previous, &range, report).await
    }

    async fn fetch(
        &self,
        wallet: &str,
        chain: EvmChain,
        range: &BlockRange,
        direction: TransferDirection,
    ) -> Result<Vec<trade_core::RawTransfer>> {
        self.collaborators
            .transfers
            .fetch_transfers(wallet, chain, range.from_block, range.to_block, direction)
            .await
            .map_err(|e| SyncError::Fetch(format!("{:?} transfers: {}", direction, e)))
    }

    fn validate(
        &self,
        raw: Vec<trade_core::RawTransfer>,
        report: &mut CycleReport,
    ) -> Vec<ValidatedTransfer> {
        raw.into_iter()
            .filter_map(|transfer| match ValidatedTransfer::try_from_raw(transfer) {
                Ok(validated) => Some(validated),
                Err(e) => {
                    warn!("Rejected transfer: {}", e);
                    report.transfers_rejected += 1;
                    None
                }
            })
            .collect()
    }

    async fn process_group(
        &self,
        classifier: &SwapClassifier,
        group: &TransferGroup,
        position: usize,
        total: usize,
        report: &mut CycleReport,
    ) {
        let wallet = report.wallet.clone();
        let chain = report.chain;

        self.stage(&wallet, chain, CycleStage::Classifying, position, total, &group.tx_hash);
        let mut trade: CanonicalTrade = match classifier.classify(group) {
            Ok(Some(trade)) => trade,
            Ok(None) => {
                debug!("Tx {} is not a swap, skipping", group.tx_hash);
                report.groups_skipped += 1;
                return;
            }
            Err(e) => {
                warn!("Failed to classify tx {}: {}", group.tx_hash, e);
                report.classification_failures += 1;
                return;
            }
        };
        report.trades_classified += 1;

        self.stage(&wallet, chain, CycleStage::Valuating, position, total, &group.tx_hash);
        if self.valuation.enrich(&mut trade).await == ValuationOutcome::PriceLookupFailed {
            report.price_lookup_failures += 1;
        }

        self.stage(&wallet, chain, CycleStage::Persisting, position, total, &group.tx_hash);
        match self.collaborators.trades.upsert_trade(&trade).await {
            Ok(()) => {
                report.trades_persisted += 1;
                debug!(
                    "{} {} {} for {} {} (tx {})",
                    trade.direction,
                    trade.display_leg().normalized_amount,
                    trade.display_leg().symbol,
                    trade.counter_leg().normalized_amount,
                    trade.counter_leg().symbol,
                    trade.tx_hash
                );
            }
            Err(e) => {
                warn!("Failed to persist trade {}: {}", trade.tx_hash, e);
                report.persistence_failures += 1;
            }
        }
    }

    async fn advance_cursor(
        &self,
        wallet: &str,
        chain: EvmChain,
        previous: Option<u64>,
        range: &BlockRange,
        report: &mut CycleReport,
    ) -> Result<()> {
        let next = next_cursor(previous, range);

        // Block 0 is indistinguishable from the unset sentinel
        if next == 0 {
            debug!("Chain {} still at block 0, no cursor to store for {}", chain, wallet);
            return Ok(());
        }

        let cursor = format_cursor(next);
        self.collaborators
            .cursors
            .store_cursor(wallet, chain, &cursor)
            .await
            .map_err(|e| SyncError::CursorPersistence(e.to_string()))?;

        self.stage(wallet, chain, CycleStage::CursorAdvanced, 1, 1, &cursor);
        report.new_cursor = Some(cursor);
        Ok(())
    }

    fn stage(
        &self,
        wallet: &str,
        chain: EvmChain,
        stage: CycleStage,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) {
        self.progress.report(ProgressUpdate {
            wallet: wallet.to_string(),
            chain,
            stage,
            current,
            total,
            message: message.into(),
        });
    }
}
