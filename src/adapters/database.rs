use chrono::Utc;
use eyre::{eyre, Result, WrapErr};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::domain::{CallResult, ContractCall, Principal, Receipt, Value};

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_path: &str) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", db_path);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .wrap_err_with(|| format!("failed to open database at {}", db_path))?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS receipts (
                tx_id TEXT PRIMARY KEY,
                block_height INTEGER NOT NULL UNIQUE,
                sender TEXT NOT NULL,
                function TEXT NOT NULL,
                call TEXT NOT NULL,
                ok INTEGER NOT NULL,
                value TEXT,
                error_code INTEGER,
                timestamp TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // --- Receipts ---

    pub async fn insert_receipt(&self, receipt: &Receipt) -> Result<()> {
        let call = serde_json::to_string(&receipt.call)?;
        let (ok, value, error_code) = match receipt.result {
            CallResult::Ok(v) => (true, Some(v.to_string()), None),
            CallResult::Err(code) => (false, None, Some(i64::from(code))),
        };
        let height = i64::try_from(receipt.block_height)?;
        let ts = receipt.timestamp.to_rfc3339();
        sqlx::query(
            "INSERT INTO receipts (tx_id, block_height, sender, function, call, ok, value, error_code, timestamp) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(receipt.tx_id.to_string())
        .bind(height)
        .bind(receipt.sender.as_str())
        .bind(receipt.call.function_name())
        .bind(&call)
        .bind(ok)
        .bind(value)
        .bind(error_code)
        .bind(&ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent receipts first.
    pub async fn get_recent_receipts(&self, limit: i64) -> Result<Vec<Receipt>> {
        let rows = sqlx::query_as::<_, ReceiptRow>(
            "SELECT tx_id, block_height, sender, call, ok, value, error_code, timestamp FROM receipts ORDER BY block_height DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Receipt::try_from).collect()
    }

    /// Every receipt in block order, for replay.
    pub async fn get_all_receipts(&self) -> Result<Vec<Receipt>> {
        let rows = sqlx::query_as::<_, ReceiptRow>(
            "SELECT tx_id, block_height, sender, call, ok, value, error_code, timestamp FROM receipts ORDER BY block_height ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Receipt::try_from).collect()
    }

    // --- Config KV ---

    pub async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO config (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_config(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM config WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.0))
    }
}

// --- Row types for sqlx ---

#[derive(sqlx::FromRow)]
struct ReceiptRow {
    tx_id: String,
    block_height: i64,
    sender: String,
    call: String,
    ok: bool,
    value: Option<String>,
    error_code: Option<i64>,
    timestamp: String,
}

impl TryFrom<ReceiptRow> for Receipt {
    type Error = eyre::Report;

    fn try_from(r: ReceiptRow) -> Result<Self> {
        let result = if r.ok {
            let raw = r
                .value
                .ok_or_else(|| eyre!("receipt {} is ok but has no value", r.tx_id))?;
            let value =
                Value::parse(&raw).ok_or_else(|| eyre!("receipt {} has bad value {:?}", r.tx_id, raw))?;
            CallResult::Ok(value)
        } else {
            let code = r
                .error_code
                .ok_or_else(|| eyre!("receipt {} is err but has no code", r.tx_id))?;
            CallResult::Err(u32::try_from(code)?)
        };

        Ok(Receipt {
            tx_id: Uuid::parse_str(&r.tx_id)?,
            block_height: u64::try_from(r.block_height)?,
            sender: Principal::new(r.sender)?,
            call: serde_json::from_str::<ContractCall>(&r.call)
                .wrap_err_with(|| format!("receipt {} has an unreadable call", r.tx_id))?,
            result,
            timestamp: chrono::DateTime::parse_from_rfc3339(&r.timestamp)
                .map(|dt| dt.with_timezone(&Utc))
                .wrap_err_with(|| format!("receipt {} has bad timestamp {:?}", r.tx_id, r.timestamp))?,
        })
    }
}
