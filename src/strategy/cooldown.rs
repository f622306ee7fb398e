//! Loss memory / cooldown ledger
//!
//! Remembers which tokens recently lost money and keeps them out of
//! candidacy for an escalating window. Records expire lazily: the next
//! query after the window elapses deletes them, there is no background
//! sweep. Mutated only on losing closes; winning closes never touch it.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::CooldownConfig;

/// Injectable time source so cooldown expiry is deterministic in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-token loss memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossRecord {
    pub losses: u32,
    pub last_loss_at: DateTime<Utc>,
}

/// Cooldown ledger keyed by token address
pub struct CooldownLedger {
    records: DashMap<String, LossRecord>,
    config: CooldownConfig,
    clock: Arc<dyn Clock>,
}

impl CooldownLedger {
    pub fn new(config: CooldownConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            config,
            clock,
        }
    }

    /// Record a losing close: first loss creates the record, repeats bump
    /// the counter and refresh the timestamp.
    pub fn record_loss(&self, token: &str) {
        let now = self.clock.now();
        let losses = self
            .records
            .entry(token.to_string())
            .and_modify(|r| {
                r.losses += 1;
                r.last_loss_at = now;
            })
            .or_insert(LossRecord {
                losses: 1,
                last_loss_at: now,
            })
            .losses;

        info!("Recorded loss #{} for {}", losses, token);
    }

    /// True while the token's window has not elapsed. Escalates to the
    /// extended window once the loss counter reaches the configured
    /// threshold; an elapsed record is deleted on the spot.
    pub fn is_on_cooldown(&self, token: &str) -> bool {
        let now = self.clock.now();

        // Read guard must drop before the removal below
        if let Some(record) = self.records.get(token) {
            let window = self.window_for(record.losses);
            if now < record.last_loss_at + window {
                return true;
            }
        } else {
            return false;
        }

        self.records.remove(token);
        debug!("Cooldown elapsed for {}, record dropped", token);
        false
    }

    /// Seconds until the token is eligible again, None when not cooling
    pub fn remaining_secs(&self, token: &str) -> Option<i64> {
        let now = self.clock.now();
        let record = self.records.get(token)?;
        let until = record.last_loss_at + self.window_for(record.losses);
        let remaining = (until - now).num_seconds();
        (remaining > 0).then_some(remaining)
    }

    pub fn active_count(&self) -> usize {
        self.records.len()
    }

    fn window_for(&self, losses: u32) -> Duration {
        let secs = if losses >= self.config.max_losses_per_token {
            self.config.extended_cooldown_secs
        } else {
            self.config.token_cooldown_secs
        };
        Duration::seconds(secs as i64)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Test clock advanced by hand
    pub(crate) struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Utc::now()),
            })
        }

        pub(crate) fn advance_secs(&self, secs: i64) {
            let mut now = self.now.lock().unwrap();
            *now = *now + Duration::seconds(secs);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    fn config() -> CooldownConfig {
        CooldownConfig {
            token_cooldown_secs: 1800,
            extended_cooldown_secs: 7200,
            max_losses_per_token: 2,
        }
    }

    #[test]
    fn test_no_record_means_no_cooldown() {
        let ledger = CooldownLedger::new(config(), ManualClock::new());
        assert!(!ledger.is_on_cooldown("mint_x"));
    }

    #[test]
    fn test_base_window_applies_below_threshold() {
        let clock = ManualClock::new();
        let ledger = CooldownLedger::new(config(), clock.clone());

        // One loss: max_losses_per_token - 1, still the base window
        ledger.record_loss("mint_x");
        assert!(ledger.is_on_cooldown("mint_x"));

        clock.advance_secs(1799);
        assert!(ledger.is_on_cooldown("mint_x"));

        clock.advance_secs(1);
        assert!(!ledger.is_on_cooldown("mint_x"));
    }

    #[test]
    fn test_extended_window_at_threshold() {
        let clock = ManualClock::new();
        let ledger = CooldownLedger::new(config(), clock.clone());

        ledger.record_loss("mint_x");
        ledger.record_loss("mint_x");

        // Past the base window but inside the extended one
        clock.advance_secs(1800);
        assert!(ledger.is_on_cooldown("mint_x"));

        clock.advance_secs(5399);
        assert!(ledger.is_on_cooldown("mint_x"));

        clock.advance_secs(1);
        assert!(!ledger.is_on_cooldown("mint_x"));
    }

    #[test]
    fn test_lazy_expiry_deletes_record() {
        let clock = ManualClock::new();
        let ledger = CooldownLedger::new(config(), clock.clone());

        ledger.record_loss("mint_x");
        assert_eq!(ledger.active_count(), 1);

        clock.advance_secs(1800);
        assert!(!ledger.is_on_cooldown("mint_x"));
        assert_eq!(ledger.active_count(), 0);

        // A fresh loss after expiry starts over at the base window
        ledger.record_loss("mint_x");
        clock.advance_secs(1800);
        assert!(!ledger.is_on_cooldown("mint_x"));
    }

    #[test]
    fn test_repeat_loss_refreshes_timestamp() {
        let clock = ManualClock::new();
        let ledger = CooldownLedger::new(config(), clock.clone());

        ledger.record_loss("mint_x");
        clock.advance_secs(1000);
        ledger.record_loss("mint_x");

        // Window restarts from the second loss, now extended
        clock.advance_secs(7199);
        assert!(ledger.is_on_cooldown("mint_x"));
        clock.advance_secs(1);
        assert!(!ledger.is_on_cooldown("mint_x"));
    }

    #[test]
    fn test_remaining_secs() {
        let clock = ManualClock::new();
        let ledger = CooldownLedger::new(config(), clock.clone());

        assert_eq!(ledger.remaining_secs("mint_x"), None);
        ledger.record_loss("mint_x");
        clock.advance_secs(300);
        assert_eq!(ledger.remaining_secs("mint_x"), Some(1500));
    }
}
