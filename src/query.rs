//! Mirror Query Service
//!
//! Read-only views over the mirror for UI/CLI consumers: transfers by
//! wallet, by address, recent activity, known tokens, and status counts.
//! Never touches the ledger and never mutates rows, so it keeps answering
//! while the ledger is unreachable.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::policy::compute_fee;
use crate::store::{MirrorStore, StoreResult, TokenRecord, TransferRecord, TransferStatus};
use crate::units;

/// Transfer row joined with its token and pool reference data
#[derive(Debug, Clone, Serialize)]
pub struct TransferView {
    pub address: String,
    pub sender: String,
    pub recipient: String,
    /// Raw units, stringified to survive JSON number precision
    pub amount: String,
    /// Display units
    pub amount_ui: f64,
    /// Net payout after the pool fee; equals the gross amount except for
    /// claims, which are the only fee-bearing resolution
    pub net_amount: String,
    pub status: TransferStatus,
    pub token_symbol: String,
    pub token_mint: String,
    pub decimals: u8,
    pub pool_address: Option<String>,
    pub fee_bps: Option<u16>,
    pub memo: Option<String>,
    pub create_sig: Option<String>,
    pub claim_sig: Option<String>,
    pub cancel_sig: Option<String>,
    pub claimable_after: Option<i64>,
    pub claimable_until: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Mirror-wide statistics
#[derive(Debug, Clone, Serialize)]
pub struct MirrorStats {
    pub total_transfers: u64,
    pub by_status: HashMap<String, u64>,
}

/// Read-side facade over the mirror
pub struct QueryService {
    store: Arc<dyn MirrorStore>,
}

impl QueryService {
    pub fn new(store: Arc<dyn MirrorStore>) -> Self {
        Self { store }
    }

    pub async fn transfers_by_wallet(&self, wallet: &str) -> StoreResult<Vec<TransferView>> {
        let records = self.store.transfers_by_wallet(wallet).await?;
        self.render(records).await
    }

    pub async fn transfer_by_address(&self, address: &str) -> StoreResult<Option<TransferView>> {
        match self.store.transfer_by_address(address).await? {
            None => Ok(None),
            Some(record) => Ok(self.render(vec![record]).await?.pop()),
        }
    }

    pub async fn recent_transfers(&self, limit: u32) -> StoreResult<Vec<TransferView>> {
        let records = self.store.recent_transfers(limit).await?;
        self.render(records).await
    }

    pub async fn tokens(&self) -> StoreResult<Vec<TokenRecord>> {
        self.store.list_tokens().await
    }

    pub async fn stats(&self) -> StoreResult<MirrorStats> {
        Ok(MirrorStats {
            total_transfers: self.store.count_transfers().await?,
            by_status: self.store.status_counts().await?,
        })
    }

    async fn render(&self, records: Vec<TransferRecord>) -> StoreResult<Vec<TransferView>> {
        let mut views = Vec::with_capacity(records.len());
        for record in records {
            let token = self.store.token_by_id(&record.token_id).await?;
            let pool = self.store.pool_by_id(&record.pool_id).await?;

            let (symbol, mint, decimals) = match &token {
                Some(t) => (t.symbol.clone(), t.mint.clone(), t.decimals),
                None => ("UNK".to_string(), String::new(), 6),
            };

            // Fee applies to successful claims only; every other resolution
            // returns the gross amount
            let net = match (record.status, pool.as_ref()) {
                (TransferStatus::Claimed, Some(p)) => compute_fee(record.amount, p.fee_bps).net,
                _ => record.amount,
            };

            views.push(TransferView {
                address: record.address,
                sender: record.sender,
                recipient: record.recipient,
                amount: record.amount.to_string(),
                amount_ui: units::raw_to_ui(record.amount, decimals),
                net_amount: net.to_string(),
                status: record.status,
                token_symbol: symbol,
                token_mint: mint,
                decimals,
                pool_address: pool.as_ref().map(|p| p.address.clone()),
                fee_bps: pool.as_ref().map(|p| p.fee_bps),
                memo: record.memo,
                create_sig: record.create_sig,
                claim_sig: record.claim_sig,
                cancel_sig: record.cancel_sig,
                claimable_after: record.claimable_after,
                claimable_until: record.claimable_until,
                created_at: record.created_at,
                updated_at: record.updated_at,
            });
        }
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryMirrorStore, PoolRecord};
    use crate::store::types::now_ts;

    async fn seed(store: &MemoryMirrorStore, fee_bps: u16) -> (String, String) {
        let token = store
            .upsert_token(&TokenRecord::new("mint1", "USD Coin", "USDC", 6))
            .await
            .unwrap();
        let pool = PoolRecord {
            id: uuid::Uuid::new_v4().to_string(),
            pool_id: "pid".into(),
            address: "pool_addr".into(),
            operator: "op".into(),
            token_id: token.id.clone(),
            fee_bps,
            total_deposits: 0,
            total_withdrawals: 0,
            total_escrowed: 0,
            total_transfers_created: 0,
            total_transfers_resolved: 0,
            collected_fees: 0,
            is_paused: false,
            created_at: now_ts(),
            updated_at: now_ts(),
        };
        let pool = store.upsert_pool(&pool).await.unwrap();
        (token.id, pool.id)
    }

    #[tokio::test]
    async fn test_claimed_view_reports_net_after_fee() {
        let store = Arc::new(MemoryMirrorStore::new());
        let (token_id, pool_id) = seed(&store, 250).await;

        let mut record = TransferRecord::new_pending(
            "t1", "alice", "bob", 10_000_000, &token_id, &pool_id, None, None, None,
        );
        record.status = TransferStatus::Claimed;
        store.insert_transfer(&record).await.unwrap();

        let query = QueryService::new(store);
        let view = query.transfer_by_address("t1").await.unwrap().unwrap();

        assert_eq!(view.amount, "10000000");
        assert_eq!(view.net_amount, "9750000");
        assert_eq!(view.token_symbol, "USDC");
        assert_eq!(view.fee_bps, Some(250));
    }

    #[tokio::test]
    async fn test_cancelled_view_keeps_gross_amount() {
        let store = Arc::new(MemoryMirrorStore::new());
        let (token_id, pool_id) = seed(&store, 250).await;

        let mut record = TransferRecord::new_pending(
            "t1", "alice", "bob", 10_000_000, &token_id, &pool_id, None, None, None,
        );
        record.status = TransferStatus::Cancelled;
        store.insert_transfer(&record).await.unwrap();

        let query = QueryService::new(store);
        let view = query.transfer_by_address("t1").await.unwrap().unwrap();

        // No fee on cancel - the sender gets everything back
        assert_eq!(view.net_amount, "10000000");
    }

    #[tokio::test]
    async fn test_wallet_listing_and_stats() {
        let store = Arc::new(MemoryMirrorStore::new());
        let (token_id, pool_id) = seed(&store, 0).await;

        for (address, sender, status) in [
            ("t1", "alice", TransferStatus::Active),
            ("t2", "alice", TransferStatus::Claimed),
            ("t3", "carol", TransferStatus::Active),
        ] {
            let mut record = TransferRecord::new_pending(
                address, sender, "bob", 1_000, &token_id, &pool_id, None, None, None,
            );
            record.status = status;
            store.insert_transfer(&record).await.unwrap();
        }

        let query = QueryService::new(store);

        let alice = query.transfers_by_wallet("alice").await.unwrap();
        assert_eq!(alice.len(), 2);

        let bob = query.transfers_by_wallet("bob").await.unwrap();
        assert_eq!(bob.len(), 3);

        let stats = query.stats().await.unwrap();
        assert_eq!(stats.total_transfers, 3);
        assert_eq!(stats.by_status.get("ACTIVE"), Some(&2));
        assert_eq!(stats.by_status.get("CLAIMED"), Some(&1));
    }
}
