use chrono::Utc;
use eyre::{bail, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::database::Database;
use crate::domain::{ContractCall, ExecutionStats, Principal, Receipt, StrategyRecord};
use crate::engine::contract::ArbitrageContract;

const ADMIN_KEY: &str = "admin";

struct HostState {
    contract: ArbitrageContract,
    block_height: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSnapshot {
    pub admin: Principal,
    pub block_height: u64,
    pub registered: bool,
    pub strategy: Option<StrategyRecord>,
    pub stats: ExecutionStats,
}

/// Applies calls to the contract one at a time and records a receipt for each.
///
/// A call runs against a scratch copy of the contract; the copy replaces the
/// live state only after its receipt has been persisted.
#[derive(Clone)]
pub struct ContractHost {
    state: Arc<Mutex<HostState>>,
    db: Database,
}

impl ContractHost {
    /// Deploy (or re-open) the contract on `db`, replaying stored receipts.
    pub async fn open(db: Database, admin: Principal) -> Result<Self> {
        match db.get_config(ADMIN_KEY).await? {
            Some(stored) if stored != admin.as_str() => {
                bail!("database was deployed by {}, not {}", stored, admin)
            }
            Some(_) => {}
            None => db.set_config(ADMIN_KEY, admin.as_str()).await?,
        }

        let mut contract = ArbitrageContract::new(admin);
        let mut block_height = 0;
        for receipt in db.get_all_receipts().await? {
            if receipt.block_height != block_height + 1 {
                bail!(
                    "receipt gap: expected block {}, found {}",
                    block_height + 1,
                    receipt.block_height
                );
            }
            let replayed = contract.call(&receipt.sender, &receipt.call);
            if replayed != receipt.result {
                bail!(
                    "replay diverged at block {}: recorded {}, replayed {}",
                    receipt.block_height,
                    receipt.result,
                    replayed
                );
            }
            block_height = receipt.block_height;
        }
        info!("Contract host ready at block {}", block_height);

        Ok(Self {
            state: Arc::new(Mutex::new(HostState {
                contract,
                block_height,
            })),
            db,
        })
    }

    pub async fn submit(&self, sender: Principal, call: ContractCall) -> Result<Receipt> {
        let mut state = self.state.lock().await;

        let mut scratch = state.contract.clone();
        let result = scratch.call(&sender, &call);
        let receipt = Receipt {
            tx_id: Uuid::new_v4(),
            block_height: state.block_height + 1,
            sender,
            call,
            result,
            timestamp: Utc::now(),
        };

        self.db.insert_receipt(&receipt).await?;
        state.contract = scratch;
        state.block_height = receipt.block_height;

        if result.is_ok() {
            info!(
                "Block {}: {} by {} -> {}",
                receipt.block_height,
                receipt.call.function_name(),
                receipt.sender,
                result
            );
        } else {
            warn!(
                "Block {}: {} by {} -> {}",
                receipt.block_height,
                receipt.call.function_name(),
                receipt.sender,
                result
            );
        }
        Ok(receipt)
    }

    pub async fn strategy(&self) -> Option<StrategyRecord> {
        self.state.lock().await.contract.get_strategy().cloned()
    }

    pub async fn stats(&self) -> ExecutionStats {
        self.state.lock().await.contract.get_stats().clone()
    }

    /// Everything the status view reports, read under a single lock.
    pub async fn snapshot(&self) -> HostSnapshot {
        let state = self.state.lock().await;
        HostSnapshot {
            admin: state.contract.get_admin().clone(),
            block_height: state.block_height,
            registered: state.contract.is_registered(),
            strategy: state.contract.get_strategy().cloned(),
            stats: state.contract.get_stats().clone(),
        }
    }

    pub async fn block_height(&self) -> u64 {
        self.state.lock().await.block_height
    }

    pub async fn is_registered(&self) -> bool {
        self.state.lock().await.contract.is_registered()
    }

    pub async fn recent_receipts(&self, limit: i64) -> Result<Vec<Receipt>> {
        self.db.get_recent_receipts(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CallResult, Value};

    fn p(s: &str) -> Principal {
        Principal::new(s).unwrap()
    }

    fn register(owner: &str, capital_limit: u128) -> ContractCall {
        ContractCall::RegisterArbitrageStrategy {
            owner: p(owner),
            capital_limit,
        }
    }

    fn execute(amount_in: u128, amount_out: u128) -> ContractCall {
        ContractCall::ExecuteArbitrage {
            amount_in,
            amount_out,
        }
    }

    async fn db_at(dir: &tempfile::TempDir) -> Database {
        let path = dir.path().join("ledger.db");
        Database::new(path.to_str().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn every_call_gets_a_receipt_in_block_order() {
        let dir = tempfile::tempdir().unwrap();
        let host = ContractHost::open(db_at(&dir).await, p("deployer")).await.unwrap();

        let r1 = host.submit(p("wallet_1"), register("wallet_1", 10_000)).await.unwrap();
        let r2 = host.submit(p("deployer"), register("wallet_1", 10_000)).await.unwrap();
        let r3 = host.submit(p("wallet_1"), execute(5_000, 5_250)).await.unwrap();

        assert_eq!(r1.result, CallResult::Err(200));
        assert_eq!(r2.result, CallResult::Ok(Value::Bool(true)));
        assert_eq!(r3.result, CallResult::Ok(Value::Uint(250)));
        assert_eq!(
            [r1.block_height, r2.block_height, r3.block_height],
            [1, 2, 3]
        );
        assert_eq!(host.block_height().await, 3);

        let recent = host.recent_receipts(10).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].tx_id, r3.tx_id);
    }

    #[tokio::test]
    async fn failed_calls_leave_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let host = ContractHost::open(db_at(&dir).await, p("deployer")).await.unwrap();
        host.submit(p("deployer"), register("wallet_1", 10_000)).await.unwrap();

        let r = host.submit(p("wallet_1"), execute(10_001, 10_500)).await.unwrap();
        assert_eq!(r.result, CallResult::Err(202));
        assert_eq!(host.stats().await, ExecutionStats::default());
        assert_eq!(host.strategy().await.unwrap().capital_limit, 10_000);
    }

    #[tokio::test]
    async fn reopening_replays_receipts() {
        let dir = tempfile::tempdir().unwrap();
        {
            let host = ContractHost::open(db_at(&dir).await, p("deployer")).await.unwrap();
            host.submit(p("deployer"), register("wallet_1", 10_000)).await.unwrap();
            host.submit(p("wallet_1"), execute(5_000, 5_250)).await.unwrap();
            host.submit(p("wallet_1"), execute(5_000, 5_000)).await.unwrap();
        }

        let host = ContractHost::open(db_at(&dir).await, p("deployer")).await.unwrap();
        assert_eq!(host.block_height().await, 3);
        assert!(host.is_registered().await);
        assert_eq!(
            host.stats().await,
            ExecutionStats {
                total_trades: 1,
                total_profit: 250,
            }
        );

        let r = host.submit(p("deployer"), register("wallet_2", 1)).await.unwrap();
        assert_eq!(r.result, CallResult::Err(204));
        assert_eq!(r.block_height, 4);
    }

    #[tokio::test]
    async fn reopening_with_a_different_admin_fails() {
        let dir = tempfile::tempdir().unwrap();
        ContractHost::open(db_at(&dir).await, p("deployer")).await.unwrap();
        let err = ContractHost::open(db_at(&dir).await, p("mallory"))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("deployed by deployer"));
    }

    #[tokio::test]
    async fn snapshot_reads_one_consistent_state() {
        let dir = tempfile::tempdir().unwrap();
        let host = ContractHost::open(db_at(&dir).await, p("deployer")).await.unwrap();

        let before = host.snapshot().await;
        assert_eq!(before.admin, p("deployer"));
        assert_eq!(before.block_height, 0);
        assert!(!before.registered);
        assert!(before.strategy.is_none());

        let mut handles = Vec::new();
        for i in 0..6u128 {
            let host = host.clone();
            handles.push(tokio::spawn(async move {
                if i == 0 {
                    host.submit(p("deployer"), register("wallet_1", 10_000)).await.unwrap();
                } else {
                    host.submit(p("wallet_1"), execute(100, 100 + i)).await.unwrap();
                }
                host.snapshot().await
            }));
        }
        for h in handles {
            let snap = h.await.unwrap();
            assert!(snap.block_height >= 1);
            // Registration and the record are always seen together.
            assert_eq!(snap.registered, snap.strategy.is_some());
            if !snap.registered {
                assert_eq!(snap.stats, ExecutionStats::default());
            }
        }

        let after = host.snapshot().await;
        assert_eq!(after.block_height, 6);
        assert!(after.registered);
        assert!(after.stats.total_trades <= 5);
    }

    #[tokio::test]
    async fn concurrent_submissions_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let host = ContractHost::open(db_at(&dir).await, p("deployer")).await.unwrap();
        host.submit(p("deployer"), register("wallet_1", 10_000)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let host = host.clone();
            handles.push(tokio::spawn(async move {
                host.submit(p("wallet_1"), execute(100, 110)).await.unwrap()
            }));
        }
        let mut heights = Vec::new();
        for h in handles {
            heights.push(h.await.unwrap().block_height);
        }
        heights.sort_unstable();
        assert_eq!(heights, (2..=9).collect::<Vec<u64>>());
        assert_eq!(host.stats().await.total_profit, 80);
    }
}
