//! Interaction gateway: the platform-agnostic command surface.
//!
//! A chat front end (or the HTTP adapter in [`crate::server`]) turns user
//! input into these calls and renders the results. Errors come back as
//! [`ParlayError`]; [`ParlayError::user_message`] is the text to show.
//!
//! Only the owner of a parlay may mark its legs, resolve it or move its
//! card.

pub mod parse;
pub mod selection;

use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::ReferenceZone;
use crate::engine::{AccountSummary, ParlayEngine};
use crate::types::{
    DisplayRef, Leg, LegOutcome, Parlay, ParlayError, ParlayId, ParlayStatus, Points, Timestamp,
    MULTIPLIERS,
};

pub use parse::{parse_deadline, parse_legs, parse_stake, DEADLINE_FORMAT};
pub use selection::PendingSelections;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Everything a surface needs to draw one parlay card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParlayCard {
    pub id: ParlayId,
    pub short_id: String,
    pub stake: Points,
    pub legs: Vec<Leg>,
    pub multiplier: Decimal,
    pub potential_payout: Points,
    pub deadline: Timestamp,
    pub deadline_display: String,
    pub time_left: String,
    pub status: ParlayStatus,
    pub display: Option<DisplayRef>,
}

/// An Open leg offered in the first step of the leg flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenLeg {
    pub index: usize,
    pub text: String,
}

/// `3h 12m`, or `expired` once the deadline is reached.
pub fn format_time_left(deadline: &Timestamp, now: &Timestamp) -> String {
    let left = *deadline - *now;
    if left.num_seconds() <= 0 {
        return "expired".to_string();
    }
    format!("{}h {}m", left.num_hours(), left.num_minutes() % 60)
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub struct Gateway {
    engine: Arc<ParlayEngine>,
    zone: ReferenceZone,
    selections: PendingSelections,
}

impl Gateway {
    pub fn new(engine: Arc<ParlayEngine>, zone: ReferenceZone, selection_timeout: chrono::Duration) -> Self {
        Self {
            engine,
            zone,
            selections: PendingSelections::new(selection_timeout),
        }
    }

    pub fn engine(&self) -> &Arc<ParlayEngine> {
        &self.engine
    }

    pub fn zone(&self) -> &ReferenceZone {
        &self.zone
    }

    /// Current instant in the reference zone.
    pub fn now(&self) -> Timestamp {
        self.zone.now()
    }

    pub fn card(&self, parlay: &Parlay, now: &Timestamp) -> ParlayCard {
        ParlayCard {
            id: parlay.id.clone(),
            short_id: parlay.short_id().to_string(),
            stake: parlay.stake,
            legs: parlay.legs.clone(),
            multiplier: parlay.multiplier,
            potential_payout: parlay.payout(),
            deadline: parlay.deadline_ts,
            deadline_display: self.zone.display(&parlay.deadline_ts),
            time_left: format_time_left(&parlay.deadline_ts, now),
            status: parlay.status,
            display: parlay.display,
        }
    }

    /// The parlay, if it exists and belongs to `user_id`.
    async fn owned(&self, user_id: &str, parlay_id: &str) -> Result<Parlay, ParlayError> {
        let parlay = self
            .engine
            .get(parlay_id)
            .await
            .ok_or_else(|| ParlayError::NotFound(parlay_id.to_string()))?;
        if parlay.user_id != user_id {
            debug!(user_id, parlay_id, owner = %parlay.user_id, "Rejected non-owner action");
            return Err(ParlayError::NotOwner);
        }
        Ok(parlay)
    }

    // -- commands ----------------------------------------------------------

    /// Place a parlay from already-split leg texts and a typed deadline.
    pub async fn create_parlay_command(
        &self,
        user_id: &str,
        stake: i64,
        leg_texts: &[String],
        deadline_text: &str,
        now: Timestamp,
    ) -> Result<Parlay, ParlayError> {
        let stake = parse_stake(stake)?;
        let deadline = parse_deadline(&self.zone, deadline_text)?;
        self.engine.create(user_id, stake, leg_texts, deadline, now).await
    }

    /// `/bet 50 (go gym) (study 40 mins) 10/14/2025 11:59 PM`, with the legs
    /// still in parenthesised form.
    pub async fn bet_command(
        &self,
        user_id: &str,
        stake: i64,
        legs_text: &str,
        deadline_text: &str,
        now: Timestamp,
    ) -> Result<Parlay, ParlayError> {
        let legs = parse_legs(legs_text)?;
        self.create_parlay_command(user_id, stake, &legs, deadline_text, now)
            .await
    }

    /// The user's Active parlays, soonest deadline first, for re-rendering.
    pub async fn list_active_parlays_command(&self, user_id: &str) -> Vec<Parlay> {
        self.engine.list_active(user_id).await
    }

    /// Step one of the leg flow: what can still be marked.
    pub async fn open_legs(&self, user_id: &str, parlay_id: &str) -> Result<Vec<OpenLeg>, ParlayError> {
        let parlay = self.owned(user_id, parlay_id).await?;
        parlay.ensure_active()?;
        Ok(parlay
            .open_legs()
            .map(|(index, leg)| OpenLeg {
                index,
                text: leg.text.clone(),
            })
            .collect())
    }

    /// Step two: remember which leg the user picked.
    pub async fn pick_leg(
        &self,
        user_id: &str,
        parlay_id: &str,
        leg_index: usize,
        now: Timestamp,
    ) -> Result<OpenLeg, ParlayError> {
        let parlay = self.owned(user_id, parlay_id).await?;
        parlay.ensure_active()?;
        let leg = parlay.legs.get(leg_index).ok_or_else(|| ParlayError::InvalidLeg {
            index: leg_index,
            reason: "no such leg".to_string(),
        })?;
        if !leg.is_open() {
            return Err(ParlayError::InvalidLeg {
                index: leg_index,
                reason: format!("it is already {}", leg.status),
            });
        }

        self.selections.pick(user_id, parlay_id, leg_index, &now).await;
        Ok(OpenLeg {
            index: leg_index,
            text: leg.text.clone(),
        })
    }

    /// Step three: apply the outcome to the picked leg. The pick survives a
    /// failed attempt until it expires.
    pub async fn apply_outcome(
        &self,
        user_id: &str,
        parlay_id: &str,
        outcome: LegOutcome,
        now: Timestamp,
    ) -> Result<Parlay, ParlayError> {
        self.owned(user_id, parlay_id).await?;
        let leg_index = self.selections.peek(user_id, parlay_id, &now).await?;
        let parlay = self
            .select_leg_action(user_id, parlay_id, leg_index, outcome, now)
            .await?;
        self.selections.consume(user_id, parlay_id, leg_index).await;
        Ok(parlay)
    }

    /// Mark a leg directly when both choices are already known.
    pub async fn select_leg_action(
        &self,
        user_id: &str,
        parlay_id: &str,
        leg_index: usize,
        outcome: LegOutcome,
        now: Timestamp,
    ) -> Result<Parlay, ParlayError> {
        self.owned(user_id, parlay_id).await?;
        let parlay = self.engine.mark_leg(parlay_id, leg_index, outcome, now).await?;
        if !parlay.is_active() {
            self.selections.clear_parlay(parlay_id).await;
        }
        Ok(parlay)
    }

    pub async fn resolve_now_action(
        &self,
        user_id: &str,
        parlay_id: &str,
        now: Timestamp,
    ) -> Result<Parlay, ParlayError> {
        self.owned(user_id, parlay_id).await?;
        let parlay = self.engine.resolve_now(parlay_id, now).await?;
        self.selections.clear_parlay(parlay_id).await;
        info!(user_id, parlay_id, status = %parlay.status, "Resolved on request");
        Ok(parlay)
    }

    /// Record where the surface rendered the card, so later updates can
    /// edit it in place.
    pub async fn attach_display(
        &self,
        user_id: &str,
        parlay_id: &str,
        display: DisplayRef,
    ) -> Result<Parlay, ParlayError> {
        self.owned(user_id, parlay_id).await?;
        self.engine.attach_display(parlay_id, display).await
    }

    pub async fn account_summary_command(&self, user_id: &str, now: Timestamp) -> AccountSummary {
        self.engine.account_summary(user_id, &now).await
    }

    /// How the game works, with the configured numbers filled in.
    pub fn rules(&self) -> String {
        let economy = self.engine.accountant().economy();
        let mut text = String::new();
        let _ = writeln!(
            text,
            "Create a parlay of 1-{} tasks, set a deadline and mark each leg Completed or Failed. \
             If all legs are Completed by the deadline, you win.",
            self.engine.max_legs()
        );
        let _ = writeln!(
            text,
            "Example: /bet 50 (go gym) (study 40 mins) (finish 310 hw) 10/14/2025 11:59 PM"
        );
        let _ = writeln!(
            text,
            "Daily cap {} pts, weekly cap {} pts. After a loss: {} min cooldown.",
            economy.daily_stake_cap, economy.weekly_stake_cap, economy.cooldown_minutes
        );
        let table: Vec<String> = MULTIPLIERS
            .iter()
            .take(self.engine.max_legs())
            .map(|(legs, m)| format!("{legs} leg{}: {m}x", if *legs == 1 { "" } else { "s" }))
            .collect();
        let _ = writeln!(text, "Payouts: {}.", table.join(", "));
        let _ = write!(text, "All times {}. You vs. you.", self.zone.name());
        text
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
