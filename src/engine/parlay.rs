//! Parlay engine: creation, leg marking and resolution.
//!
//! A parlay is `Active` until it is settled exactly once as `Won` or
//! `Lost`:
//!
//! - marking a leg Failed loses it immediately;
//! - marking the last Open leg Completed wins it immediately;
//! - "Resolve Now" and the deadline sweep both close it through
//!   [`Parlay::final_verdict`], where any leg still Open counts as a loss.
//!
//! Each operation is one [`SharedLedger::mutate`] call, so the status
//! change, the settlement and the save either all happen or none do.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::accountant::{AccountSummary, Accountant};
use crate::storage::SharedLedger;
use crate::types::{
    multiplier_for, DisplayRef, Leg, LegOutcome, Outcome, Parlay, ParlayError, ParlayId,
    ParlayStatus, Points, Snapshot, Timestamp, MULTIPLIERS,
};

// ---------------------------------------------------------------------------
// Sweep report
// ---------------------------------------------------------------------------

/// What one pass of [`ParlayEngine::resolve_due`] did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub resolved: Vec<(ParlayId, ParlayStatus)>,
    /// Already settled by someone else between the scan and the lock.
    pub skipped: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.skipped == 0 && self.failed == 0
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ParlayEngine {
    ledger: Arc<SharedLedger>,
    accountant: Accountant,
}

impl ParlayEngine {
    pub fn new(ledger: Arc<SharedLedger>, accountant: Accountant) -> Self {
        Self { ledger, accountant }
    }

    pub fn accountant(&self) -> &Accountant {
        &self.accountant
    }

    pub fn ledger(&self) -> &Arc<SharedLedger> {
        &self.ledger
    }

    /// Largest parlay accepted: the configured limit, bounded by the
    /// multiplier table.
    pub fn max_legs(&self) -> usize {
        self.accountant.economy().max_legs.clamp(1, MULTIPLIERS.len())
    }

    fn validate_legs(&self, leg_texts: &[String]) -> Result<Vec<Leg>, ParlayError> {
        let max_legs = self.max_legs();
        let max_chars = self.accountant.economy().max_leg_chars;

        if leg_texts.is_empty() {
            return Err(ParlayError::InvalidLegs(
                "Include at least one leg in ( ... ).".to_string(),
            ));
        }
        if leg_texts.len() > max_legs {
            return Err(ParlayError::InvalidLegs(format!("Max {max_legs} legs allowed.")));
        }

        leg_texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let text = text.trim();
                if text.is_empty() {
                    Err(ParlayError::InvalidLegs(format!("Leg {} is empty.", i + 1)))
                } else if text.chars().count() > max_chars {
                    Err(ParlayError::InvalidLegs(format!(
                        "Leg {} is longer than {max_chars} characters.",
                        i + 1
                    )))
                } else {
                    Ok(Leg::open(text))
                }
            })
            .collect()
    }

    /// Place a new parlay: validate, reserve the stake, store the parlay.
    ///
    /// Input is validated before the lock is taken, so a rejected request
    /// has no side effect at all.
    pub async fn create(
        &self,
        user_id: &str,
        stake: Points,
        leg_texts: &[String],
        deadline: Timestamp,
        now: Timestamp,
    ) -> Result<Parlay, ParlayError> {
        if stake == 0 {
            return Err(ParlayError::InvalidStake);
        }
        let legs = self.validate_legs(leg_texts)?;
        if deadline <= now {
            return Err(ParlayError::InvalidDeadline);
        }
        let multiplier = multiplier_for(legs.len())
            .ok_or_else(|| ParlayError::InvalidLegs(format!("Max {} legs allowed.", self.max_legs())))?;

        let parlay = Parlay::new(
            Uuid::new_v4().to_string(),
            user_id,
            stake,
            legs,
            multiplier,
            now,
            deadline,
        );

        let created = self
            .ledger
            .mutate(|snap| {
                self.accountant
                    .reserve_stake(snap, user_id, stake, &parlay.id, &now)?;
                snap.parlays.insert(parlay.id.clone(), parlay.clone());
                Ok(parlay.clone())
            })
            .await?;

        info!(
            user_id,
            parlay_id = %created.id,
            stake,
            legs = created.legs_count,
            multiplier = %created.multiplier,
            deadline = %created.deadline_ts,
            "Parlay created"
        );
        Ok(created)
    }

    /// Mark one Open leg Completed or Failed, settling the parlay if that
    /// decides it.
    pub async fn mark_leg(
        &self,
        parlay_id: &str,
        leg_index: usize,
        outcome: LegOutcome,
        now: Timestamp,
    ) -> Result<Parlay, ParlayError> {
        let parlay = self
            .ledger
            .mutate(|snap| {
                let verdict = {
                    let parlay = snap
                        .parlays
                        .get_mut(parlay_id)
                        .ok_or_else(|| ParlayError::NotFound(parlay_id.to_string()))?;
                    parlay.ensure_active()?;
                    if parlay.deadline_ts <= now {
                        return Err(ParlayError::DeadlinePassed);
                    }
                    parlay.mark(leg_index, outcome)?;
                    parlay.leg_verdict()
                };
                match verdict {
                    Some(outcome) => self.conclude(snap, parlay_id, outcome, &now),
                    None => snap
                        .parlays
                        .get(parlay_id)
                        .cloned()
                        .ok_or_else(|| ParlayError::NotFound(parlay_id.to_string())),
                }
            })
            .await?;

        info!(
            parlay_id,
            leg = leg_index + 1,
            outcome = ?outcome,
            status = %parlay.status,
            "Leg marked"
        );
        Ok(parlay)
    }

    /// Close the parlay now. Open legs count as failures.
    pub async fn resolve_now(&self, parlay_id: &str, now: Timestamp) -> Result<Parlay, ParlayError> {
        self.ledger
            .mutate(|snap| {
                let outcome = {
                    let parlay = snap
                        .parlays
                        .get(parlay_id)
                        .ok_or_else(|| ParlayError::NotFound(parlay_id.to_string()))?;
                    parlay.ensure_active()?;
                    parlay.final_verdict()
                };
                self.conclude(snap, parlay_id, outcome, &now)
            })
            .await
    }

    /// Settle every Active parlay whose deadline is at or before `now`.
    ///
    /// Each parlay is settled in its own locked step, and a failure on one
    /// is logged and does not stop the rest. Parlays settled concurrently
    /// by someone else are skipped.
    pub async fn resolve_due(&self, now: Timestamp) -> SweepReport {
        let due: Vec<ParlayId> = self
            .ledger
            .snapshot()
            .await
            .active_parlays()
            .filter(|p| p.is_due(&now))
            .map(|p| p.id.clone())
            .collect();

        let mut report = SweepReport::default();
        if due.is_empty() {
            return report;
        }
        debug!(count = due.len(), "Parlays past deadline");

        for id in due {
            let result = self
                .ledger
                .mutate(|snap| {
                    let outcome = {
                        let parlay = snap
                            .parlays
                            .get(&id)
                            .ok_or_else(|| ParlayError::NotFound(id.clone()))?;
                        parlay.ensure_active()?;
                        parlay.final_verdict()
                    };
                    self.conclude(snap, &id, outcome, &now)
                })
                .await;

            match result {
                Ok(parlay) => {
                    info!(parlay_id = %id, status = %parlay.status, "Deadline resolution");
                    report.resolved.push((id, parlay.status));
                }
                Err(ParlayError::NotActive { status, .. }) => {
                    debug!(parlay_id = %id, status = %status, "Already settled, skipping");
                    report.skipped += 1;
                }
                Err(ParlayError::NotFound(_)) => {
                    warn!(parlay_id = %id, "Due parlay vanished, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(parlay_id = %id, error = %e, "Deadline resolution failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Remember where the chat surface rendered this parlay.
    pub async fn attach_display(
        &self,
        parlay_id: &str,
        display: DisplayRef,
    ) -> Result<Parlay, ParlayError> {
        self.ledger
            .mutate(|snap| {
                let parlay = snap
                    .parlays
                    .get_mut(parlay_id)
                    .ok_or_else(|| ParlayError::NotFound(parlay_id.to_string()))?;
                parlay.display = Some(display);
                Ok(parlay.clone())
            })
            .await
    }

    /// Active → terminal, then settle against the owner. Runs on a draft.
    fn conclude(
        &self,
        snap: &mut Snapshot,
        parlay_id: &str,
        outcome: Outcome,
        now: &Timestamp,
    ) -> Result<Parlay, ParlayError> {
        let Snapshot { users, parlays, ledger } = snap;
        let parlay = parlays
            .get_mut(parlay_id)
            .ok_or_else(|| ParlayError::NotFound(parlay_id.to_string()))?;
        parlay.finish(outcome, now)?;

        if !users.contains_key(&parlay.user_id) {
            warn!(user_id = %parlay.user_id, parlay_id, "Settling parlay for unknown account");
        }
        let account = self
            .accountant
            .open_account(users, ledger, &parlay.user_id, now);
        self.accountant.settle(account, ledger, parlay, outcome, now);
        Ok(parlay.clone())
    }

    // -- read side ---------------------------------------------------------

    pub async fn get(&self, parlay_id: &str) -> Option<Parlay> {
        self.ledger.snapshot().await.parlays.get(parlay_id).cloned()
    }

    /// The user's Active parlays, soonest deadline first.
    pub async fn list_active(&self, user_id: &str) -> Vec<Parlay> {
        let snapshot = self.ledger.snapshot().await;
        let mut parlays: Vec<Parlay> = snapshot
            .active_parlays()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        parlays.sort_by(|a, b| a.deadline_ts.cmp(&b.deadline_ts));
        parlays
    }

    pub async fn quote(&self, user_id: &str, stake: Points, now: &Timestamp) -> Result<(), ParlayError> {
        let snapshot = self.ledger.snapshot().await;
        self.accountant.quote_stake(&snapshot, user_id, stake, now)
    }

    pub async fn account_summary(&self, user_id: &str, now: &Timestamp) -> AccountSummary {
        let snapshot = self.ledger.snapshot().await;
        self.accountant.summary(&snapshot, user_id, now)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
