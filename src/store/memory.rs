//! In-Memory Mirror Store
//!
//! HashMap-backed `MirrorStore` for tests and ephemeral runs. Mirrors the
//! SQLite implementation's semantics, including the status guard and
//! duplicate detection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::warn;

use super::traits::{MirrorStore, StatusWrite, StoreError, StoreResult};
use super::types::{
    now_ts, status_transition, PoolRecord, StatusTransition, TokenRecord, TransferRecord,
    TransferStatus,
};

#[derive(Default)]
struct Inner {
    tokens: HashMap<String, TokenRecord>,
    pools: HashMap<String, PoolRecord>,
    /// Transfers keyed by derived address
    transfers: HashMap<String, TransferRecord>,
}

/// In-memory mirror store
#[derive(Default, Clone)]
pub struct MemoryMirrorStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryMirrorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MirrorStore for MemoryMirrorStore {
    async fn upsert_token(&self, token: &TokenRecord) -> StoreResult<TokenRecord> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.tokens.values().find(|t| t.mint == token.mint) {
            return Ok(existing.clone());
        }
        inner.tokens.insert(token.id.clone(), token.clone());
        Ok(token.clone())
    }

    async fn token_by_id(&self, id: &str) -> StoreResult<Option<TokenRecord>> {
        Ok(self.inner.read().await.tokens.get(id).cloned())
    }

    async fn token_by_mint(&self, mint: &str) -> StoreResult<Option<TokenRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .tokens
            .values()
            .find(|t| t.mint == mint)
            .cloned())
    }

    async fn token_by_symbol(&self, symbol: &str) -> StoreResult<Option<TokenRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .tokens
            .values()
            .find(|t| t.symbol.eq_ignore_ascii_case(symbol))
            .cloned())
    }

    async fn list_tokens(&self) -> StoreResult<Vec<TokenRecord>> {
        let mut tokens: Vec<_> = self.inner.read().await.tokens.values().cloned().collect();
        tokens.sort_by_key(|t| t.created_at);
        Ok(tokens)
    }

    async fn upsert_pool(&self, pool: &PoolRecord) -> StoreResult<PoolRecord> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .pools
            .values_mut()
            .find(|p| p.address == pool.address)
        {
            existing.fee_bps = pool.fee_bps;
            existing.total_deposits = pool.total_deposits;
            existing.total_withdrawals = pool.total_withdrawals;
            existing.total_escrowed = pool.total_escrowed;
            existing.total_transfers_created = pool.total_transfers_created;
            existing.total_transfers_resolved = pool.total_transfers_resolved;
            existing.collected_fees = pool.collected_fees;
            existing.is_paused = pool.is_paused;
            existing.updated_at = now_ts();
            return Ok(existing.clone());
        }
        inner.pools.insert(pool.id.clone(), pool.clone());
        Ok(pool.clone())
    }

    async fn pool_by_id(&self, id: &str) -> StoreResult<Option<PoolRecord>> {
        Ok(self.inner.read().await.pools.get(id).cloned())
    }

    async fn pool_by_address(&self, address: &str) -> StoreResult<Option<PoolRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .pools
            .values()
            .find(|p| p.address == address)
            .cloned())
    }

    async fn pool_by_token(&self, token_id: &str) -> StoreResult<Option<PoolRecord>> {
        let inner = self.inner.read().await;
        let mut pools: Vec<_> = inner
            .pools
            .values()
            .filter(|p| p.token_id == token_id)
            .collect();
        pools.sort_by_key(|p| p.created_at);
        Ok(pools.first().map(|p| (*p).clone()))
    }

    async fn first_unpaused_pool(&self) -> StoreResult<Option<PoolRecord>> {
        let inner = self.inner.read().await;
        let mut pools: Vec<_> = inner.pools.values().filter(|p| !p.is_paused).collect();
        pools.sort_by_key(|p| p.created_at);
        Ok(pools.first().map(|p| (*p).clone()))
    }

    async fn insert_transfer(&self, transfer: &TransferRecord) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.transfers.contains_key(&transfer.address) {
            return Err(StoreError::Duplicate(transfer.address.clone()));
        }
        inner
            .transfers
            .insert(transfer.address.clone(), transfer.clone());
        Ok(())
    }

    async fn upsert_transfer(&self, transfer: &TransferRecord) -> StoreResult<StatusWrite> {
        let mut inner = self.inner.write().await;

        let Some(existing) = inner.transfers.get_mut(&transfer.address) else {
            inner
                .transfers
                .insert(transfer.address.clone(), transfer.clone());
            return Ok(StatusWrite::Applied);
        };

        match status_transition(existing.status, transfer.status) {
            StatusTransition::Apply => {
                existing.sender = transfer.sender.clone();
                existing.recipient = transfer.recipient.clone();
                existing.amount = transfer.amount;
                existing.token_id = transfer.token_id.clone();
                existing.pool_id = transfer.pool_id.clone();
                existing.status = transfer.status;
                existing.memo = transfer.memo.clone();
                if transfer.create_sig.is_some() {
                    existing.create_sig = transfer.create_sig.clone();
                }
                existing.claimable_after = transfer.claimable_after;
                existing.claimable_until = transfer.claimable_until;
                existing.updated_at = now_ts();
                Ok(StatusWrite::Applied)
            }
            StatusTransition::NoOp => {
                if existing.create_sig.is_none() && transfer.create_sig.is_some() {
                    existing.create_sig = transfer.create_sig.clone();
                    existing.updated_at = now_ts();
                }
                Ok(StatusWrite::NoOp)
            }
            StatusTransition::Conflict => {
                warn!(
                    address = %transfer.address,
                    stored = %existing.status,
                    incoming = %transfer.status,
                    "refusing to overwrite terminal transfer status"
                );
                Ok(StatusWrite::Conflict {
                    existing: existing.status,
                })
            }
        }
    }

    async fn set_transfer_status(
        &self,
        address: &str,
        status: TransferStatus,
        signature: &str,
    ) -> StoreResult<StatusWrite> {
        let mut inner = self.inner.write().await;

        let Some(existing) = inner.transfers.get_mut(address) else {
            return Ok(StatusWrite::Missing);
        };

        match status_transition(existing.status, status) {
            StatusTransition::Apply => {
                existing.status = status;
                if status == TransferStatus::Claimed {
                    existing.claim_sig = Some(signature.to_string());
                } else {
                    existing.cancel_sig = Some(signature.to_string());
                }
                existing.updated_at = now_ts();
                Ok(StatusWrite::Applied)
            }
            StatusTransition::NoOp => Ok(StatusWrite::NoOp),
            StatusTransition::Conflict => {
                warn!(
                    address = %address,
                    stored = %existing.status,
                    incoming = %status,
                    "refusing to overwrite terminal transfer status"
                );
                Ok(StatusWrite::Conflict {
                    existing: existing.status,
                })
            }
        }
    }

    async fn transfer_by_address(&self, address: &str) -> StoreResult<Option<TransferRecord>> {
        Ok(self.inner.read().await.transfers.get(address).cloned())
    }

    async fn transfers_by_wallet(&self, wallet: &str) -> StoreResult<Vec<TransferRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner
            .transfers
            .values()
            .filter(|t| t.sender == wallet || t.recipient == wallet)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn recent_transfers(&self, limit: u32) -> StoreResult<Vec<TransferRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner.transfers.values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit as usize);
        Ok(records)
    }

    async fn count_transfers(&self) -> StoreResult<u64> {
        Ok(self.inner.read().await.transfers.len() as u64)
    }

    async fn status_counts(&self) -> StoreResult<HashMap<String, u64>> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for transfer in inner.transfers.values() {
            *counts.entry(transfer.status.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn sweep_stale_pending(&self, cutoff_ts: i64) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        let before = inner.transfers.len();
        inner
            .transfers
            .retain(|_, t| !(t.status == TransferStatus::Pending && t.created_at < cutoff_ts));
        Ok((before - inner.transfers.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(address: &str) -> TransferRecord {
        TransferRecord::new_pending(
            address, "sender1", "recipient1", 500_000, "tok", "pool", None, None, None,
        )
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryMirrorStore::new();
        store.insert_transfer(&pending("t1")).await.unwrap();
        assert!(matches!(
            store.insert_transfer(&pending("t1")).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_guard_matches_sqlite_semantics() {
        let store = MemoryMirrorStore::new();
        let mut record = pending("t1");
        record.status = TransferStatus::Active;
        store.insert_transfer(&record).await.unwrap();

        assert_eq!(
            store
                .set_transfer_status("t1", TransferStatus::Expired, "sig1")
                .await
                .unwrap(),
            StatusWrite::Applied
        );
        assert_eq!(
            store
                .set_transfer_status("t1", TransferStatus::Claimed, "sig2")
                .await
                .unwrap(),
            StatusWrite::Conflict {
                existing: TransferStatus::Expired
            }
        );

        let stored = store.transfer_by_address("t1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Expired);
        assert_eq!(stored.cancel_sig.as_deref(), Some("sig1"));
    }

    #[tokio::test]
    async fn test_token_get_or_create_by_mint() {
        let store = MemoryMirrorStore::new();
        let first = store
            .upsert_token(&TokenRecord::new("mintX", "USD Coin", "USDC", 6))
            .await
            .unwrap();
        let again = store
            .upsert_token(&TokenRecord::placeholder("mintX"))
            .await
            .unwrap();
        assert_eq!(first.id, again.id);
    }
}
