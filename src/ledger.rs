//! Trade ledger and session state
//!
//! Append-only record of every trade attempt plus the running balance.
//! Records are created at build time and updated in place as the attempt
//! progresses, so a crash mid-flight leaves a recoverable partial record
//! instead of silence. Closed trades adjust the balance exactly once even
//! if replayed (restart recovery re-reads the same file).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::position::manager::ClosedTrade;
use crate::strategy::types::ExitReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Building,
    Executing,
    Completed,
    Failed,
}

/// One trade attempt, success or failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub id: Uuid,
    pub token: String,
    pub symbol: String,
    pub side: TradeSide,
    pub status: TradeStatus,
    pub notional_usd: f64,
    pub price_usd: f64,
    pub tx_ref: Option<String>,
    pub failure: Option<String>,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl_usd: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the engine persists between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub balance_usd: f64,
    /// Position ids whose close already hit the balance
    pub applied_closes: HashSet<Uuid>,
    pub records: Vec<TradeRecord>,
    pub closed_trades: Vec<ClosedTrade>,
}

impl SessionState {
    fn new(starting_balance_usd: f64) -> Self {
        Self {
            balance_usd: starting_balance_usd,
            applied_closes: HashSet::new(),
            records: Vec::new(),
            closed_trades: Vec::new(),
        }
    }
}

pub struct TradeLedger {
    state: RwLock<SessionState>,
    path: Option<PathBuf>,
}

impl TradeLedger {
    /// In-memory ledger, used by tests and one-shot CLI commands
    pub fn in_memory(starting_balance_usd: f64) -> Self {
        Self {
            state: RwLock::new(SessionState::new(starting_balance_usd)),
            path: None,
        }
    }

    /// Load persisted session state, or start fresh with the configured
    /// balance when no file exists yet
    pub async fn load<P: AsRef<Path>>(path: P, starting_balance_usd: f64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let state = if path.exists() {
            let data = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Persistence(e.to_string()))?;
            let state: SessionState =
                serde_json::from_str(&data).map_err(|e| Error::Persistence(e.to_string()))?;
            info!(
                "Loaded session: balance {:.2} USD, {} records, {} closed trades",
                state.balance_usd,
                state.records.len(),
                state.closed_trades.len()
            );
            state
        } else {
            info!(
                "No session file at {}, starting with {:.2} USD",
                path.display(),
                starting_balance_usd
            );
            SessionState::new(starting_balance_usd)
        };

        Ok(Self {
            state: RwLock::new(state),
            path: Some(path),
        })
    }

    async fn save_locked(&self, state: &SessionState) -> Result<()> {
        if let Some(path) = &self.path {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir)
                    .await
                    .map_err(|e| Error::Persistence(e.to_string()))?;
            }
            let data = serde_json::to_string_pretty(state)
                .map_err(|e| Error::Persistence(e.to_string()))?;
            tokio::fs::write(path, data)
                .await
                .map_err(|e| Error::Persistence(e.to_string()))?;
            debug!("Session saved to {}", path.display());
        }
        Ok(())
    }

    /// Open a record at build time; returns the id used for in-place updates
    pub async fn open_record(
        &self,
        side: TradeSide,
        token: &str,
        symbol: &str,
        notional_usd: f64,
        price_usd: f64,
    ) -> Result<Uuid> {
        let now = Utc::now();
        let record = TradeRecord {
            id: Uuid::new_v4(),
            token: token.to_string(),
            symbol: symbol.to_string(),
            side,
            status: TradeStatus::Building,
            notional_usd,
            price_usd,
            tx_ref: None,
            failure: None,
            exit_reason: None,
            realized_pnl_usd: None,
            created_at: now,
            updated_at: now,
        };
        let id = record.id;

        let mut state = self.state.write().await;
        state.records.push(record);
        self.save_locked(&state).await?;
        Ok(id)
    }

    async fn update_record<F>(&self, id: Uuid, apply: F) -> Result<()>
    where
        F: FnOnce(&mut TradeRecord),
    {
        let mut state = self.state.write().await;
        let record = state
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| Error::Internal(format!("Unknown trade record {}", id)))?;
        apply(record);
        record.updated_at = Utc::now();
        self.save_locked(&state).await
    }

    pub async fn mark_executing(&self, id: Uuid) -> Result<()> {
        self.update_record(id, |r| r.status = TradeStatus::Executing)
            .await
    }

    pub async fn mark_completed(&self, id: Uuid, tx_ref: &str) -> Result<()> {
        self.update_record(id, |r| {
            r.status = TradeStatus::Completed;
            r.tx_ref = Some(tx_ref.to_string());
        })
        .await
    }

    pub async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        self.update_record(id, |r| {
            r.status = TradeStatus::Failed;
            r.failure = Some(reason.to_string());
        })
        .await
    }

    /// Attach the exit context to a sell record
    pub async fn annotate_sell(
        &self,
        id: Uuid,
        exit_reason: ExitReason,
        realized_pnl_usd: f64,
    ) -> Result<()> {
        self.update_record(id, |r| {
            r.exit_reason = Some(exit_reason);
            r.realized_pnl_usd = Some(realized_pnl_usd);
        })
        .await
    }

    /// Reserve the notional of a filled entry
    pub async fn debit_entry(&self, notional_usd: f64) -> Result<()> {
        let mut state = self.state.write().await;
        state.balance_usd -= notional_usd;
        self.save_locked(&state).await
    }

    /// Settle a closed trade into the balance, exactly once per position.
    /// Returns false when the close was already applied (replay).
    pub async fn apply_close(&self, trade: &ClosedTrade) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.applied_closes.insert(trade.position_id) {
            debug!(
                "Close for position {} already applied, skipping",
                trade.position_id
            );
            return Ok(false);
        }

        state.balance_usd += trade.size_usd + trade.pnl_usd;
        state.closed_trades.push(trade.clone());
        self.save_locked(&state).await?;

        info!(
            "Settled {} {}: {:+.2} USD, balance {:.2} USD",
            trade.symbol, trade.exit_reason, trade.pnl_usd, state.balance_usd
        );
        Ok(true)
    }

    pub async fn balance_usd(&self) -> f64 {
        self.state.read().await.balance_usd
    }

    /// Most recent records first
    pub async fn recent_records(&self, limit: usize) -> Vec<TradeRecord> {
        let state = self.state.read().await;
        state.records.iter().rev().take(limit).cloned().collect()
    }

    pub async fn closed_trades(&self) -> Vec<ClosedTrade> {
        self.state.read().await.closed_trades.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::manager::{ExitRules, Position};

    fn closed(position_id: Uuid, size_usd: f64, pnl_usd: f64) -> ClosedTrade {
        let position = Position {
            id: position_id,
            token: "mint_a".into(),
            symbol: "A".into(),
            entry_price: 0.001,
            entry_time: Utc::now(),
            size_usd,
            token_amount: 4_000,
            peak_price: 0.001,
            rules: ExitRules::default(),
        };
        ClosedTrade::from_position(
            &position,
            0.00106,
            ExitReason::TakeProfit,
            6.0,
            pnl_usd,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_record_lifecycle_updates_in_place() {
        let ledger = TradeLedger::in_memory(100.0);

        let id = ledger
            .open_record(TradeSide::Buy, "mint_a", "A", 4.0, 0.001)
            .await
            .unwrap();
        ledger.mark_executing(id).await.unwrap();
        ledger.mark_completed(id, "sig123").await.unwrap();

        let records = ledger.recent_records(10).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, TradeStatus::Completed);
        assert_eq!(records[0].tx_ref.as_deref(), Some("sig123"));
    }

    #[tokio::test]
    async fn test_apply_close_is_idempotent() {
        let ledger = TradeLedger::in_memory(96.0);
        let trade = closed(Uuid::new_v4(), 4.0, 0.24);

        assert!(ledger.apply_close(&trade).await.unwrap());
        assert!(!ledger.apply_close(&trade).await.unwrap());

        // 96 + 4 + 0.24, counted exactly once
        assert!((ledger.balance_usd().await - 100.24).abs() < 1e-9);
        assert_eq!(ledger.closed_trades().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_keeps_balance() {
        let ledger = TradeLedger::in_memory(100.0);

        let id = ledger
            .open_record(TradeSide::Buy, "mint_a", "A", 4.0, 0.001)
            .await
            .unwrap();
        ledger.mark_failed(id, "blockhash not found").await.unwrap();

        assert_eq!(ledger.balance_usd().await, 100.0);
        let records = ledger.recent_records(1).await;
        assert_eq!(records[0].status, TradeStatus::Failed);
        assert!(records[0].failure.is_some());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        {
            let ledger = TradeLedger::load(&path, 100.0).await.unwrap();
            let id = ledger
                .open_record(TradeSide::Buy, "mint_a", "A", 4.0, 0.001)
                .await
                .unwrap();
            ledger.mark_completed(id, "sig").await.unwrap();
            ledger.debit_entry(4.0).await.unwrap();
            ledger
                .apply_close(&closed(Uuid::new_v4(), 4.0, 0.24))
                .await
                .unwrap();
        }

        let reloaded = TradeLedger::load(&path, 100.0).await.unwrap();
        assert!((reloaded.balance_usd().await - 100.24).abs() < 1e-9);
        assert_eq!(reloaded.recent_records(10).await.len(), 1);
        assert_eq!(reloaded.closed_trades().await.len(), 1);
    }

    #[tokio::test]
    async fn test_replay_after_reload_does_not_double_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let trade = closed(Uuid::new_v4(), 4.0, 0.24);

        {
            let ledger = TradeLedger::load(&path, 96.0).await.unwrap();
            ledger.apply_close(&trade).await.unwrap();
        }

        let reloaded = TradeLedger::load(&path, 96.0).await.unwrap();
        assert!(!reloaded.apply_close(&trade).await.unwrap());
        assert!((reloaded.balance_usd().await - 100.24).abs() < 1e-9);
    }
}
