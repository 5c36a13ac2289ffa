//! Accountant: balances, stake caps, streaks and cooldowns.
//!
//! Every balance movement goes through here and leaves a ledger entry:
//! `grant` when an account opens, `stake` when a parlay is placed,
//! `payout` on a win and a zero-delta `loss` on a loss (the stake was
//! already taken). So for every user, `Σ delta == balance`.
//!
//! Daily and weekly stake windows roll over lazily: each quote or
//! reservation compares the stored reset instants with the current
//! boundary in the reference zone. There is no timer.

use chrono::Duration;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::clock::ReferenceZone;
use crate::config::EconomyConfig;
use crate::types::{
    signed, Account, CapWindow, LedgerEntry, LedgerReason, Outcome, Parlay, ParlayError, Points,
    RecentResult, Snapshot, Timestamp, UserId, RECENT_RESULTS_LEN,
};

// ---------------------------------------------------------------------------
// Bank view
// ---------------------------------------------------------------------------

/// Everything the bank view shows for one user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSummary {
    pub user_id: UserId,
    pub balance: Points,
    pub streak: u32,
    pub daily_used: Points,
    pub daily_cap: Points,
    pub weekly_used: Points,
    pub weekly_cap: Points,
    /// Present only while the cooldown is still running.
    pub cooldown_until: Option<Timestamp>,
    pub next_daily_reset: Timestamp,
    pub recent_results: Vec<RecentResult>,
    pub recent_entries: Vec<LedgerEntry>,
}

// ---------------------------------------------------------------------------
// Accountant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Accountant {
    economy: EconomyConfig,
    zone: ReferenceZone,
}

impl Accountant {
    pub fn new(economy: EconomyConfig, zone: ReferenceZone) -> Self {
        Self { economy, zone }
    }

    pub fn economy(&self) -> &EconomyConfig {
        &self.economy
    }

    pub fn zone(&self) -> &ReferenceZone {
        &self.zone
    }

    /// A brand-new account as it would be opened at `now`.
    pub fn fresh_account(&self, now: &Timestamp) -> Account {
        Account::new(
            self.economy.start_balance,
            self.zone.day_start(now),
            self.zone.week_start(now),
        )
    }

    /// Get the user's account, opening it (with its grant entry) if needed.
    pub fn open_account<'a>(
        &self,
        users: &'a mut BTreeMap<UserId, Account>,
        ledger: &mut Vec<LedgerEntry>,
        user_id: &str,
        now: &Timestamp,
    ) -> &'a mut Account {
        if !users.contains_key(user_id) {
            info!(user_id, balance = self.economy.start_balance, "Opening account");
            self.append(
                ledger,
                LedgerEntry {
                    ts: *now,
                    user_id: user_id.to_string(),
                    delta: signed(self.economy.start_balance),
                    reason: LedgerReason::Grant,
                    parlay_id: None,
                },
            );
        }
        users
            .entry(user_id.to_string())
            .or_insert_with(|| self.fresh_account(now))
    }

    /// Zero the stake windows whose boundary has passed since the last reset.
    pub fn roll_windows(&self, account: &mut Account, now: &Timestamp) {
        let day = self.zone.day_start(now);
        if account.last_daily_reset < day {
            debug!(previous = %account.last_daily_reset, "Daily stake window rolled over");
            account.daily_used = 0;
            account.last_daily_reset = day;
        }
        let week = self.zone.week_start(now);
        if account.last_weekly_reset < week {
            debug!(previous = %account.last_weekly_reset, "Weekly stake window rolled over");
            account.weekly_used = 0;
            account.last_weekly_reset = week;
        }
    }

    /// The account as it looks at `now` after any pending rollover.
    /// Unknown users see a fresh account.
    pub fn view_account(&self, snapshot: &Snapshot, user_id: &str, now: &Timestamp) -> Account {
        let mut account = snapshot
            .users
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| self.fresh_account(now));
        self.roll_windows(&mut account, now);
        account
    }

    /// Would `amount` be accepted right now? Pure check, no mutation.
    pub fn quote_stake(
        &self,
        snapshot: &Snapshot,
        user_id: &str,
        amount: Points,
        now: &Timestamp,
    ) -> Result<(), ParlayError> {
        let account = self.view_account(snapshot, user_id, now);
        self.check(&account, amount, now)
    }

    fn check(&self, account: &Account, amount: Points, now: &Timestamp) -> Result<(), ParlayError> {
        if amount == 0 {
            return Err(ParlayError::InvalidStake);
        }
        if let Some(until) = account.cooldown_at(now) {
            return Err(ParlayError::OnCooldown { until });
        }
        let daily_cap = self.economy.daily_stake_cap;
        if account.daily_used.saturating_add(amount) > daily_cap {
            return Err(ParlayError::CapExceeded {
                window: CapWindow::Daily,
                used: account.daily_used,
                cap: daily_cap,
                requested: amount,
            });
        }
        let weekly_cap = self.economy.weekly_stake_cap;
        if account.weekly_used.saturating_add(amount) > weekly_cap {
            return Err(ParlayError::CapExceeded {
                window: CapWindow::Weekly,
                used: account.weekly_used,
                cap: weekly_cap,
                requested: amount,
            });
        }
        if amount > account.balance {
            return Err(ParlayError::InsufficientBalance {
                needed: amount,
                available: account.balance,
            });
        }
        Ok(())
    }

    /// Re-validate and take the stake: debit the balance, charge both
    /// windows and record a `stake` entry against `parlay_id`.
    ///
    /// Runs on a snapshot draft, so if anything after this fails the
    /// whole reservation is discarded with the draft.
    pub fn reserve_stake(
        &self,
        snapshot: &mut Snapshot,
        user_id: &str,
        amount: Points,
        parlay_id: &str,
        now: &Timestamp,
    ) -> Result<(), ParlayError> {
        let Snapshot { users, ledger, .. } = snapshot;
        let account = self.open_account(users, ledger, user_id, now);
        self.roll_windows(account, now);
        self.check(account, amount, now)?;

        account.balance -= amount;
        account.daily_used += amount;
        account.weekly_used += amount;
        let balance = account.balance;

        self.append(
            ledger,
            LedgerEntry {
                ts: *now,
                user_id: user_id.to_string(),
                delta: -signed(amount),
                reason: LedgerReason::Stake,
                parlay_id: Some(parlay_id.to_string()),
            },
        );

        info!(user_id, parlay_id, stake = amount, balance, "Stake reserved");
        Ok(())
    }

    /// Book a finished parlay against its owner. Returns the amount credited.
    ///
    /// Callers guarantee the parlay has just left `Active`, which is what
    /// makes settlement happen once per parlay.
    pub fn settle(
        &self,
        account: &mut Account,
        ledger: &mut Vec<LedgerEntry>,
        parlay: &Parlay,
        outcome: Outcome,
        now: &Timestamp,
    ) -> Points {
        let (payout, reason) = match outcome {
            Outcome::Won => {
                let payout = parlay.payout();
                account.balance = account.balance.saturating_add(payout);
                account.streak += 1;
                account.cooldown_until = None;
                (payout, LedgerReason::Payout)
            }
            Outcome::Lost => {
                account.streak = 0;
                account.cooldown_until = Some(*now + Duration::minutes(self.economy.cooldown_minutes));
                (0, LedgerReason::Loss)
            }
        };

        account.push_result(RecentResult {
            parlay_id: parlay.id.clone(),
            outcome,
            stake: parlay.stake,
            payout,
            ts: *now,
        });

        self.append(
            ledger,
            LedgerEntry {
                ts: *now,
                user_id: parlay.user_id.clone(),
                delta: signed(payout),
                reason,
                parlay_id: Some(parlay.id.clone()),
            },
        );

        info!(
            user_id = %parlay.user_id,
            parlay_id = %parlay.id,
            outcome = %outcome,
            stake = parlay.stake,
            payout,
            balance = account.balance,
            streak = account.streak,
            "Parlay settled"
        );
        payout
    }

    /// Bank view for `user_id` at `now`. Read-only.
    pub fn summary(&self, snapshot: &Snapshot, user_id: &str, now: &Timestamp) -> AccountSummary {
        let account = self.view_account(snapshot, user_id, now);
        AccountSummary {
            user_id: user_id.to_string(),
            balance: account.balance,
            streak: account.streak,
            daily_used: account.daily_used,
            daily_cap: self.economy.daily_stake_cap,
            weekly_used: account.weekly_used,
            weekly_cap: self.economy.weekly_stake_cap,
            cooldown_until: account.cooldown_at(now),
            next_daily_reset: self.zone.next_day_start(now),
            recent_results: account.recent_results,
            recent_entries: snapshot.recent_entries(user_id, RECENT_RESULTS_LEN),
        }
    }

    fn append(&self, ledger: &mut Vec<LedgerEntry>, entry: LedgerEntry) {
        ledger.push(entry);
        let retention = self.economy.ledger_retention.max(1);
        if ledger.len() > retention {
            let excess = ledger.len() - retention;
            ledger.drain(..excess);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
