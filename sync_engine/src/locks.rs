use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use trade_core::EvmChain;

/// One async mutex per `(wallet, chain)`. Holding the guard makes the holder the
/// only cycle that may write that key's cursor.
#[derive(Debug, Default, Clone)]
pub struct SyncLocks {
    locks: Arc<Mutex<HashMap<(String, EvmChain), Arc<Mutex<()>>>>>,
}

impl SyncLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, wallet: &str, chain: EvmChain) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry((wallet.to_string(), chain))
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Whether a cycle currently holds the key
    pub async fn is_locked(&self, wallet: &str, chain: EvmChain) -> bool {
        let locks = self.locks.lock().await;
        locks
            .get(&(wallet.to_string(), chain))
            .map_or(false, |lock| lock.try_lock().is_err())
    }
}
