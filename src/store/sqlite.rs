//! SQLite Mirror Store
//!
//! Durable mirror of ledger state that survives service restarts. Uses
//! connection pooling via r2d2 for concurrent access; transfer writes are
//! transactional per row, keyed on the UNIQUE derived address, with the
//! status guard applied inside the transaction.
//!
//! u64 amounts and counters are stored as TEXT to cover the full raw token
//! unit domain.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::traits::{MirrorStore, StatusWrite, StoreError, StoreResult};
use super::types::{
    now_ts, status_transition, PoolRecord, StatusTransition, TokenRecord, TransferRecord,
    TransferStatus,
};

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// SQLite-backed mirror store with connection pooling
pub struct SqliteMirrorStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteMirrorStore {
    /// Open (or create) the database at the given path and run migrations
    pub fn new<P: AsRef<Path>>(db_path: P) -> StoreResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder().max_size(10).build(manager)?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    /// In-memory store for testing
    pub fn in_memory() -> StoreResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> StoreResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn run_migrations(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tokens (
                id TEXT PRIMARY KEY,
                mint TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                symbol TEXT NOT NULL,
                decimals INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pools (
                id TEXT PRIMARY KEY,
                pool_id TEXT NOT NULL,
                address TEXT NOT NULL UNIQUE,
                operator TEXT NOT NULL,
                token_id TEXT NOT NULL REFERENCES tokens(id),
                fee_bps INTEGER NOT NULL,
                total_deposits TEXT NOT NULL DEFAULT '0',
                total_withdrawals TEXT NOT NULL DEFAULT '0',
                total_escrowed TEXT NOT NULL DEFAULT '0',
                total_transfers_created TEXT NOT NULL DEFAULT '0',
                total_transfers_resolved TEXT NOT NULL DEFAULT '0',
                collected_fees TEXT NOT NULL DEFAULT '0',
                is_paused INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transfers (
                id TEXT PRIMARY KEY,
                address TEXT NOT NULL UNIQUE,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                amount TEXT NOT NULL,
                token_id TEXT NOT NULL REFERENCES tokens(id),
                pool_id TEXT NOT NULL REFERENCES pools(id),
                status TEXT NOT NULL DEFAULT 'PENDING',
                memo TEXT,
                create_sig TEXT,
                claim_sig TEXT,
                cancel_sig TEXT,
                claimable_after INTEGER,
                claimable_until INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transfers_sender ON transfers(sender);
            CREATE INDEX IF NOT EXISTS idx_transfers_recipient ON transfers(recipient);
            CREATE INDEX IF NOT EXISTS idx_transfers_status ON transfers(status);
            CREATE INDEX IF NOT EXISTS idx_transfers_created_at ON transfers(created_at);
            CREATE INDEX IF NOT EXISTS idx_pools_token ON pools(token_id);
            "#,
        )?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // row mapping
    // ------------------------------------------------------------------

    fn parse_u64(value: String) -> rusqlite::Result<u64> {
        value.parse::<u64>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    }

    fn row_to_token(row: &rusqlite::Row) -> rusqlite::Result<TokenRecord> {
        Ok(TokenRecord {
            id: row.get("id")?,
            mint: row.get("mint")?,
            name: row.get("name")?,
            symbol: row.get("symbol")?,
            decimals: row.get::<_, i64>("decimals")? as u8,
            created_at: row.get("created_at")?,
        })
    }

    fn row_to_pool(row: &rusqlite::Row) -> rusqlite::Result<PoolRecord> {
        Ok(PoolRecord {
            id: row.get("id")?,
            pool_id: row.get("pool_id")?,
            address: row.get("address")?,
            operator: row.get("operator")?,
            token_id: row.get("token_id")?,
            fee_bps: row.get::<_, i64>("fee_bps")? as u16,
            total_deposits: Self::parse_u64(row.get("total_deposits")?)?,
            total_withdrawals: Self::parse_u64(row.get("total_withdrawals")?)?,
            total_escrowed: Self::parse_u64(row.get("total_escrowed")?)?,
            total_transfers_created: Self::parse_u64(row.get("total_transfers_created")?)?,
            total_transfers_resolved: Self::parse_u64(row.get("total_transfers_resolved")?)?,
            collected_fees: Self::parse_u64(row.get("collected_fees")?)?,
            is_paused: row.get("is_paused")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn row_to_transfer(row: &rusqlite::Row) -> rusqlite::Result<TransferRecord> {
        let status_str: String = row.get("status")?;
        let status: TransferStatus = status_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
        })?;

        Ok(TransferRecord {
            id: row.get("id")?,
            address: row.get("address")?,
            sender: row.get("sender")?,
            recipient: row.get("recipient")?,
            amount: Self::parse_u64(row.get("amount")?)?,
            token_id: row.get("token_id")?,
            pool_id: row.get("pool_id")?,
            status,
            memo: row.get("memo")?,
            create_sig: row.get("create_sig")?,
            claim_sig: row.get("claim_sig")?,
            cancel_sig: row.get("cancel_sig")?,
            claimable_after: row.get("claimable_after")?,
            claimable_until: row.get("claimable_until")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn insert_transfer_row(conn: &Connection, t: &TransferRecord) -> StoreResult<()> {
        conn.execute(
            r#"
            INSERT INTO transfers (
                id, address, sender, recipient, amount, token_id, pool_id,
                status, memo, create_sig, claim_sig, cancel_sig,
                claimable_after, claimable_until, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16
            )
            "#,
            params![
                t.id,
                t.address,
                t.sender,
                t.recipient,
                t.amount.to_string(),
                t.token_id,
                t.pool_id,
                t.status.to_string(),
                t.memo,
                t.create_sig,
                t.claim_sig,
                t.cancel_sig,
                t.claimable_after,
                t.claimable_until,
                t.created_at,
                t.updated_at,
            ],
        )
        .map_err(|e| {
            if let rusqlite::Error::SqliteFailure(ref err, _) = e {
                if err.extended_code == 1555 || err.extended_code == 2067 {
                    return StoreError::Duplicate(t.address.clone());
                }
            }
            StoreError::Database(e.to_string())
        })?;

        Ok(())
    }

    fn transfer_at(conn: &Connection, address: &str) -> StoreResult<Option<TransferRecord>> {
        let record = conn
            .query_row(
                "SELECT * FROM transfers WHERE address = ?1",
                params![address],
                Self::row_to_transfer,
            )
            .optional()?;
        Ok(record)
    }
}

#[async_trait]
impl MirrorStore for SqliteMirrorStore {
    // ------------------------------------------------------------------
    // tokens
    // ------------------------------------------------------------------

    async fn upsert_token(&self, token: &TokenRecord) -> StoreResult<TokenRecord> {
        let conn = self.conn()?;

        if let Some(existing) = conn
            .query_row(
                "SELECT * FROM tokens WHERE mint = ?1",
                params![token.mint],
                Self::row_to_token,
            )
            .optional()?
        {
            return Ok(existing);
        }

        conn.execute(
            "INSERT INTO tokens (id, mint, name, symbol, decimals, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                token.id,
                token.mint,
                token.name,
                token.symbol,
                token.decimals as i64,
                token.created_at,
            ],
        )?;

        Ok(token.clone())
    }

    async fn token_by_id(&self, id: &str) -> StoreResult<Option<TokenRecord>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT * FROM tokens WHERE id = ?1",
                params![id],
                Self::row_to_token,
            )
            .optional()?)
    }

    async fn token_by_mint(&self, mint: &str) -> StoreResult<Option<TokenRecord>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT * FROM tokens WHERE mint = ?1",
                params![mint],
                Self::row_to_token,
            )
            .optional()?)
    }

    async fn token_by_symbol(&self, symbol: &str) -> StoreResult<Option<TokenRecord>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT * FROM tokens WHERE symbol = ?1 COLLATE NOCASE",
                params![symbol],
                Self::row_to_token,
            )
            .optional()?)
    }

    async fn list_tokens(&self) -> StoreResult<Vec<TokenRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM tokens ORDER BY created_at ASC")?;
        let tokens = stmt
            .query_map([], Self::row_to_token)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens)
    }

    // ------------------------------------------------------------------
    // pools
    // ------------------------------------------------------------------

    async fn upsert_pool(&self, pool: &PoolRecord) -> StoreResult<PoolRecord> {
        let conn = self.conn()?;

        let existing = conn
            .query_row(
                "SELECT * FROM pools WHERE address = ?1",
                params![pool.address],
                Self::row_to_pool,
            )
            .optional()?;

        match existing {
            None => {
                conn.execute(
                    r#"
                    INSERT INTO pools (
                        id, pool_id, address, operator, token_id, fee_bps,
                        total_deposits, total_withdrawals, total_escrowed,
                        total_transfers_created, total_transfers_resolved,
                        collected_fees, is_paused, created_at, updated_at
                    ) VALUES (
                        ?1, ?2, ?3, ?4, ?5, ?6,
                        ?7, ?8, ?9,
                        ?10, ?11,
                        ?12, ?13, ?14, ?15
                    )
                    "#,
                    params![
                        pool.id,
                        pool.pool_id,
                        pool.address,
                        pool.operator,
                        pool.token_id,
                        pool.fee_bps as i64,
                        pool.total_deposits.to_string(),
                        pool.total_withdrawals.to_string(),
                        pool.total_escrowed.to_string(),
                        pool.total_transfers_created.to_string(),
                        pool.total_transfers_resolved.to_string(),
                        pool.collected_fees.to_string(),
                        pool.is_paused,
                        pool.created_at,
                        pool.updated_at,
                    ],
                )?;
                Ok(pool.clone())
            }
            Some(mut stored) => {
                // Fresh ledger reads supersede the stored advisory counters
                stored.fee_bps = pool.fee_bps;
                stored.total_deposits = pool.total_deposits;
                stored.total_withdrawals = pool.total_withdrawals;
                stored.total_escrowed = pool.total_escrowed;
                stored.total_transfers_created = pool.total_transfers_created;
                stored.total_transfers_resolved = pool.total_transfers_resolved;
                stored.collected_fees = pool.collected_fees;
                stored.is_paused = pool.is_paused;
                stored.updated_at = now_ts();

                conn.execute(
                    r#"
                    UPDATE pools SET
                        fee_bps = ?2,
                        total_deposits = ?3,
                        total_withdrawals = ?4,
                        total_escrowed = ?5,
                        total_transfers_created = ?6,
                        total_transfers_resolved = ?7,
                        collected_fees = ?8,
                        is_paused = ?9,
                        updated_at = ?10
                    WHERE address = ?1
                    "#,
                    params![
                        stored.address,
                        stored.fee_bps as i64,
                        stored.total_deposits.to_string(),
                        stored.total_withdrawals.to_string(),
                        stored.total_escrowed.to_string(),
                        stored.total_transfers_created.to_string(),
                        stored.total_transfers_resolved.to_string(),
                        stored.collected_fees.to_string(),
                        stored.is_paused,
                        stored.updated_at,
                    ],
                )?;
                Ok(stored)
            }
        }
    }

    async fn pool_by_id(&self, id: &str) -> StoreResult<Option<PoolRecord>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT * FROM pools WHERE id = ?1",
                params![id],
                Self::row_to_pool,
            )
            .optional()?)
    }

    async fn pool_by_address(&self, address: &str) -> StoreResult<Option<PoolRecord>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT * FROM pools WHERE address = ?1",
                params![address],
                Self::row_to_pool,
            )
            .optional()?)
    }

    async fn pool_by_token(&self, token_id: &str) -> StoreResult<Option<PoolRecord>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT * FROM pools WHERE token_id = ?1 ORDER BY created_at ASC LIMIT 1",
                params![token_id],
                Self::row_to_pool,
            )
            .optional()?)
    }

    async fn first_unpaused_pool(&self) -> StoreResult<Option<PoolRecord>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT * FROM pools WHERE is_paused = 0 ORDER BY created_at ASC LIMIT 1",
                [],
                Self::row_to_pool,
            )
            .optional()?)
    }

    // ------------------------------------------------------------------
    // transfers
    // ------------------------------------------------------------------

    async fn insert_transfer(&self, transfer: &TransferRecord) -> StoreResult<()> {
        let conn = self.conn()?;
        Self::insert_transfer_row(&conn, transfer)
    }

    async fn upsert_transfer(&self, transfer: &TransferRecord) -> StoreResult<StatusWrite> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let outcome = match Self::transfer_at(&tx, &transfer.address)? {
            None => {
                Self::insert_transfer_row(&tx, transfer)?;
                StatusWrite::Applied
            }
            Some(existing) => match status_transition(existing.status, transfer.status) {
                StatusTransition::Apply => {
                    tx.execute(
                        r#"
                        UPDATE transfers SET
                            sender = ?2,
                            recipient = ?3,
                            amount = ?4,
                            token_id = ?5,
                            pool_id = ?6,
                            status = ?7,
                            memo = ?8,
                            create_sig = COALESCE(?9, create_sig),
                            claimable_after = ?10,
                            claimable_until = ?11,
                            updated_at = ?12
                        WHERE address = ?1
                        "#,
                        params![
                            transfer.address,
                            transfer.sender,
                            transfer.recipient,
                            transfer.amount.to_string(),
                            transfer.token_id,
                            transfer.pool_id,
                            transfer.status.to_string(),
                            transfer.memo,
                            transfer.create_sig,
                            transfer.claimable_after,
                            transfer.claimable_until,
                            now_ts(),
                        ],
                    )?;
                    StatusWrite::Applied
                }
                StatusTransition::NoOp => {
                    // Re-reconciliation of the same confirmed create may
                    // carry the signature the optimistic row lacked
                    if existing.create_sig.is_none() && transfer.create_sig.is_some() {
                        tx.execute(
                            "UPDATE transfers SET create_sig = ?2, updated_at = ?3
                             WHERE address = ?1",
                            params![transfer.address, transfer.create_sig, now_ts()],
                        )?;
                    }
                    StatusWrite::NoOp
                }
                StatusTransition::Conflict => {
                    warn!(
                        address = %transfer.address,
                        stored = %existing.status,
                        incoming = %transfer.status,
                        "refusing to overwrite terminal transfer status"
                    );
                    StatusWrite::Conflict {
                        existing: existing.status,
                    }
                }
            },
        };

        tx.commit()?;
        Ok(outcome)
    }

    async fn set_transfer_status(
        &self,
        address: &str,
        status: TransferStatus,
        signature: &str,
    ) -> StoreResult<StatusWrite> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let Some(existing) = Self::transfer_at(&tx, address)? else {
            return Ok(StatusWrite::Missing);
        };

        let outcome = match status_transition(existing.status, status) {
            StatusTransition::Apply => {
                let sig_column = if status == TransferStatus::Claimed {
                    "claim_sig"
                } else {
                    "cancel_sig"
                };
                tx.execute(
                    &format!(
                        "UPDATE transfers SET status = ?2, {} = ?3, updated_at = ?4
                         WHERE address = ?1",
                        sig_column
                    ),
                    params![address, status.to_string(), signature, now_ts()],
                )?;
                StatusWrite::Applied
            }
            StatusTransition::NoOp => StatusWrite::NoOp,
            StatusTransition::Conflict => {
                warn!(
                    address = %address,
                    stored = %existing.status,
                    incoming = %status,
                    "refusing to overwrite terminal transfer status"
                );
                StatusWrite::Conflict {
                    existing: existing.status,
                }
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    async fn transfer_by_address(&self, address: &str) -> StoreResult<Option<TransferRecord>> {
        let conn = self.conn()?;
        Self::transfer_at(&conn, address)
    }

    async fn transfers_by_wallet(&self, wallet: &str) -> StoreResult<Vec<TransferRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM transfers WHERE sender = ?1 OR recipient = ?1
             ORDER BY created_at DESC",
        )?;
        let records = stmt
            .query_map(params![wallet], Self::row_to_transfer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn recent_transfers(&self, limit: u32) -> StoreResult<Vec<TransferRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT * FROM transfers ORDER BY created_at DESC LIMIT ?1")?;
        let records = stmt
            .query_map(params![limit as i64], Self::row_to_transfer)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn count_transfers(&self) -> StoreResult<u64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM transfers", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    async fn status_counts(&self) -> StoreResult<HashMap<String, u64>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM transfers GROUP BY status")?;

        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (status, count) = row?;
            counts.insert(status, count as u64);
        }
        Ok(counts)
    }

    async fn sweep_stale_pending(&self, cutoff_ts: i64) -> StoreResult<u64> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM transfers WHERE status = 'PENDING' AND created_at < ?1",
            params![cutoff_ts],
        )?;
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed_refs(store: &SqliteMirrorStore) -> (TokenRecord, PoolRecord) {
        let token = store
            .upsert_token(&TokenRecord::new("mint111", "USD Coin", "USDC", 6))
            .await
            .unwrap();
        let pool = PoolRecord {
            id: uuid::Uuid::new_v4().to_string(),
            pool_id: "poolid".into(),
            address: "pool_addr".into(),
            operator: "operator".into(),
            token_id: token.id.clone(),
            fee_bps: 250,
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
        (token, pool)
    }

    fn pending(address: &str, token_id: &str, pool_id: &str) -> TransferRecord {
        TransferRecord::new_pending(
            address, "sender1", "recipient1", 1_000_000, token_id, pool_id, None, None, None,
        )
    }

    #[tokio::test]
    async fn test_token_get_or_create() {
        let store = SqliteMirrorStore::in_memory().unwrap();

        let first = store
            .upsert_token(&TokenRecord::new("mintA", "USD Coin", "USDC", 6))
            .await
            .unwrap();
        // Second upsert with the same mint returns the stored row
        let second = store
            .upsert_token(&TokenRecord::placeholder("mintA"))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.symbol, "USDC");
    }

    #[tokio::test]
    async fn test_token_symbol_lookup_case_insensitive() {
        let store = SqliteMirrorStore::in_memory().unwrap();
        store
            .upsert_token(&TokenRecord::new("mintA", "USD Coin", "USDC", 6))
            .await
            .unwrap();

        let found = store.token_by_symbol("usdc").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_pool_upsert_refreshes_counters() {
        let store = SqliteMirrorStore::in_memory().unwrap();
        let (_, mut pool) = seed_refs(&store).await;

        pool.total_deposits = 5_000;
        pool.total_escrowed = 5_000;
        pool.is_paused = true;
        let refreshed = store.upsert_pool(&pool).await.unwrap();

        assert_eq!(refreshed.total_deposits, 5_000);
        assert!(refreshed.is_paused);

        let stored = store.pool_by_address("pool_addr").await.unwrap().unwrap();
        assert_eq!(stored.total_escrowed, 5_000);
    }

    #[tokio::test]
    async fn test_duplicate_transfer_address_rejected() {
        let store = SqliteMirrorStore::in_memory().unwrap();
        let (token, pool) = seed_refs(&store).await;

        store
            .insert_transfer(&pending("t1", &token.id, &pool.id))
            .await
            .unwrap();
        let result = store
            .insert_transfer(&pending("t1", &token.id, &pool.id))
            .await;

        assert!(matches!(result, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_upsert_promotes_pending_to_active() {
        let store = SqliteMirrorStore::in_memory().unwrap();
        let (token, pool) = seed_refs(&store).await;

        store
            .insert_transfer(&pending("t1", &token.id, &pool.id))
            .await
            .unwrap();

        let mut confirmed = pending("t1", &token.id, &pool.id);
        confirmed.status = TransferStatus::Active;
        confirmed.create_sig = Some("sig_create".into());
        let outcome = store.upsert_transfer(&confirmed).await.unwrap();
        assert_eq!(outcome, StatusWrite::Applied);

        let stored = store.transfer_by_address("t1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Active);
        assert_eq!(stored.create_sig.as_deref(), Some("sig_create"));
    }

    #[tokio::test]
    async fn test_status_guard_blocks_terminal_overwrite() {
        let store = SqliteMirrorStore::in_memory().unwrap();
        let (token, pool) = seed_refs(&store).await;

        let mut record = pending("t1", &token.id, &pool.id);
        record.status = TransferStatus::Active;
        store.insert_transfer(&record).await.unwrap();

        // Resolve as claimed
        let w = store
            .set_transfer_status("t1", TransferStatus::Claimed, "sig_claim")
            .await
            .unwrap();
        assert_eq!(w, StatusWrite::Applied);

        // Replay of the same resolution converges silently
        let w = store
            .set_transfer_status("t1", TransferStatus::Claimed, "sig_claim")
            .await
            .unwrap();
        assert_eq!(w, StatusWrite::NoOp);

        // A different terminal status is refused
        let w = store
            .set_transfer_status("t1", TransferStatus::Cancelled, "sig_cancel")
            .await
            .unwrap();
        assert_eq!(
            w,
            StatusWrite::Conflict {
                existing: TransferStatus::Claimed
            }
        );

        let stored = store.transfer_by_address("t1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Claimed);
        assert_eq!(stored.claim_sig.as_deref(), Some("sig_claim"));
        assert_eq!(stored.cancel_sig, None);
    }

    #[tokio::test]
    async fn test_set_status_on_missing_row() {
        let store = SqliteMirrorStore::in_memory().unwrap();

        let w = store
            .set_transfer_status("ghost", TransferStatus::Claimed, "sig")
            .await
            .unwrap();
        assert_eq!(w, StatusWrite::Missing);
    }

    #[tokio::test]
    async fn test_cancel_records_cancel_sig() {
        let store = SqliteMirrorStore::in_memory().unwrap();
        let (token, pool) = seed_refs(&store).await;

        let mut record = pending("t1", &token.id, &pool.id);
        record.status = TransferStatus::Active;
        store.insert_transfer(&record).await.unwrap();

        store
            .set_transfer_status("t1", TransferStatus::Cancelled, "sig_cancel")
            .await
            .unwrap();

        let stored = store.transfer_by_address("t1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Cancelled);
        assert_eq!(stored.cancel_sig.as_deref(), Some("sig_cancel"));
    }

    #[tokio::test]
    async fn test_wallet_query_matches_both_sides() {
        let store = SqliteMirrorStore::in_memory().unwrap();
        let (token, pool) = seed_refs(&store).await;

        let mut a = pending("t1", &token.id, &pool.id);
        a.sender = "alice".into();
        a.recipient = "bob".into();
        let mut b = pending("t2", &token.id, &pool.id);
        b.sender = "carol".into();
        b.recipient = "alice".into();
        let mut c = pending("t3", &token.id, &pool.id);
        c.sender = "carol".into();
        c.recipient = "dave".into();

        for record in [&a, &b, &c] {
            store.insert_transfer(record).await.unwrap();
        }

        let alice = store.transfers_by_wallet("alice").await.unwrap();
        assert_eq!(alice.len(), 2);

        let dave = store.transfers_by_wallet("dave").await.unwrap();
        assert_eq!(dave.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_stale_pending_only_removes_pending() {
        let store = SqliteMirrorStore::in_memory().unwrap();
        let (token, pool) = seed_refs(&store).await;

        let mut stale = pending("t1", &token.id, &pool.id);
        stale.created_at = 100;
        let mut active = pending("t2", &token.id, &pool.id);
        active.created_at = 100;
        active.status = TransferStatus::Active;

        store.insert_transfer(&stale).await.unwrap();
        store.insert_transfer(&active).await.unwrap();

        let removed = store.sweep_stale_pending(1_000).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.transfer_by_address("t1").await.unwrap().is_none());
        assert!(store.transfer_by_address("t2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_large_amounts_survive_round_trip() {
        let store = SqliteMirrorStore::in_memory().unwrap();
        let (token, pool) = seed_refs(&store).await;

        let mut record = pending("t1", &token.id, &pool.id);
        record.amount = u64::MAX;
        store.insert_transfer(&record).await.unwrap();

        let stored = store.transfer_by_address("t1").await.unwrap().unwrap();
        assert_eq!(stored.amount, u64::MAX);
    }
}
