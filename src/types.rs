//! Shared types for the self-parlay economy.
//!
//! These types form the data model used across all modules: accounts,
//! parlays and their legs, ledger entries, and the persisted snapshot
//! that holds all three. The error taxonomy lives here too so that the
//! engine, the gateway and the HTTP layer report through one enum.

use chrono::{DateTime, FixedOffset};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Instant in the fixed reference timezone (RFC 3339 on disk).
pub type Timestamp = DateTime<FixedOffset>;
pub type UserId = String;
pub type ParlayId = String;
/// Whole points. Balances and stakes are never fractional.
pub type Points = u64;

/// Number of settled parlays kept on an account for the bank view.
pub const RECENT_RESULTS_LEN: usize = 5;

/// Payout multiplier keyed by leg count.
pub const MULTIPLIERS: [(usize, Decimal); 5] = [
    (1, dec!(1.20)),
    (2, dec!(1.50)),
    (3, dec!(1.80)),
    (4, dec!(2.00)),
    (5, dec!(2.20)),
];

/// Look up the multiplier for a parlay with `legs` legs.
pub fn multiplier_for(legs: usize) -> Option<Decimal> {
    MULTIPLIERS
        .iter()
        .find(|(count, _)| *count == legs)
        .map(|(_, m)| *m)
}

/// Convert a point amount into a signed ledger delta.
pub fn signed(points: Points) -> i64 {
    i64::try_from(points).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Legs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Open,
    Completed,
    Failed,
}

impl fmt::Display for LegStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegStatus::Open => write!(f, "OPEN"),
            LegStatus::Completed => write!(f, "COMPLETED"),
            LegStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// What a user can mark an open leg as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegOutcome {
    Completed,
    Failed,
}

impl From<LegOutcome> for LegStatus {
    fn from(outcome: LegOutcome) -> Self {
        match outcome {
            LegOutcome::Completed => LegStatus::Completed,
            LegOutcome::Failed => LegStatus::Failed,
        }
    }
}

/// One task inside a parlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub text: String,
    pub status: LegStatus,
}

impl Leg {
    pub fn open(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: LegStatus::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == LegStatus::Open
    }
}

// ---------------------------------------------------------------------------
// Parlays
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParlayStatus {
    Active,
    Won,
    Lost,
}

impl ParlayStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ParlayStatus::Active)
    }
}

impl fmt::Display for ParlayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParlayStatus::Active => write!(f, "ACTIVE"),
            ParlayStatus::Won => write!(f, "WON"),
            ParlayStatus::Lost => write!(f, "LOST"),
        }
    }
}

/// Terminal result of a parlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Won,
    Lost,
}

impl From<Outcome> for ParlayStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Won => ParlayStatus::Won,
            Outcome::Lost => ParlayStatus::Lost,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ParlayStatus::from(*self).fmt(f)
    }
}

/// Where the chat surface rendered the parlay card, so it can be edited
/// in place later. Opaque to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// A bundle of legs with a single stake, deadline and all-or-nothing payout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parlay {
    pub id: ParlayId,
    pub user_id: UserId,
    pub stake: Points,
    pub legs: Vec<Leg>,
    pub legs_count: usize,
    pub multiplier: Decimal,
    pub created_ts: Timestamp,
    pub deadline_ts: Timestamp,
    pub status: ParlayStatus,
    #[serde(default)]
    pub resolved_ts: Option<Timestamp>,
    #[serde(default)]
    pub display: Option<DisplayRef>,
}

impl fmt::Display for Parlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parlay #{} [{}] stake={} legs={} x{} deadline={}",
            self.short_id(),
            self.status,
            self.stake,
            self.legs_count,
            self.multiplier,
            self.deadline_ts.format("%m/%d/%Y %I:%M %p"),
        )
    }
}

impl Parlay {
    pub fn new(
        id: ParlayId,
        user_id: &str,
        stake: Points,
        legs: Vec<Leg>,
        multiplier: Decimal,
        created_ts: Timestamp,
        deadline_ts: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id: user_id.to_string(),
            stake,
            legs_count: legs.len(),
            legs,
            multiplier,
            created_ts,
            deadline_ts,
            status: ParlayStatus::Active,
            resolved_ts: None,
            display: None,
        }
    }

    /// First segment of the id, used in user-facing text.
    pub fn short_id(&self) -> &str {
        self.id.split('-').next().unwrap_or(&self.id)
    }

    pub fn is_active(&self) -> bool {
        self.status == ParlayStatus::Active
    }

    /// Active and at or past its deadline.
    pub fn is_due(&self, now: &Timestamp) -> bool {
        self.is_active() && self.deadline_ts <= *now
    }

    pub fn open_legs(&self) -> impl Iterator<Item = (usize, &Leg)> {
        self.legs.iter().enumerate().filter(|(_, leg)| leg.is_open())
    }

    pub fn any_failed(&self) -> bool {
        self.legs.iter().any(|l| l.status == LegStatus::Failed)
    }

    pub fn all_completed(&self) -> bool {
        self.legs.iter().all(|l| l.status == LegStatus::Completed)
    }

    /// Outcome forced by the legs alone, if any: a failed leg loses the
    /// parlay, all legs completed wins it, anything else keeps it open.
    pub fn leg_verdict(&self) -> Option<Outcome> {
        if self.any_failed() {
            Some(Outcome::Lost)
        } else if self.all_completed() {
            Some(Outcome::Won)
        } else {
            None
        }
    }

    /// Outcome when the parlay must be closed now (deadline sweep or a
    /// manual resolve): open legs count as failures.
    pub fn final_verdict(&self) -> Outcome {
        self.leg_verdict().unwrap_or(Outcome::Lost)
    }

    pub fn ensure_active(&self) -> Result<(), ParlayError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ParlayError::NotActive {
                id: self.id.clone(),
                status: self.status,
            })
        }
    }

    /// Move an open leg to its marked status.
    pub fn mark(&mut self, index: usize, outcome: LegOutcome) -> Result<(), ParlayError> {
        let leg = self.legs.get_mut(index).ok_or_else(|| ParlayError::InvalidLeg {
            index,
            reason: "no such leg".to_string(),
        })?;
        if !leg.is_open() {
            return Err(ParlayError::InvalidLeg {
                index,
                reason: format!("it is already {}", leg.status),
            });
        }
        leg.status = outcome.into();
        Ok(())
    }

    /// Active → Won/Lost. Terminal states never change again.
    pub fn finish(&mut self, outcome: Outcome, now: &Timestamp) -> Result<(), ParlayError> {
        self.ensure_active()?;
        self.status = outcome.into();
        self.resolved_ts = Some(*now);
        Ok(())
    }

    /// Points credited on a win: `stake × multiplier`, rounded half up.
    pub fn payout(&self) -> Points {
        (Decimal::from(self.stake) * self.multiplier)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u64()
            .unwrap_or(Points::MAX)
    }
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// One settled parlay as shown in the bank view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentResult {
    pub parlay_id: ParlayId,
    pub outcome: Outcome,
    pub stake: Points,
    pub payout: Points,
    pub ts: Timestamp,
}

/// Per-user economy state. Created lazily, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub balance: Points,
    pub daily_used: Points,
    pub weekly_used: Points,
    pub last_daily_reset: Timestamp,
    pub last_weekly_reset: Timestamp,
    pub streak: u32,
    #[serde(default)]
    pub cooldown_until: Option<Timestamp>,
    /// Most recent first, at most [`RECENT_RESULTS_LEN`].
    #[serde(default)]
    pub recent_results: Vec<RecentResult>,
}

impl Account {
    pub fn new(balance: Points, last_daily_reset: Timestamp, last_weekly_reset: Timestamp) -> Self {
        Self {
            balance,
            daily_used: 0,
            weekly_used: 0,
            last_daily_reset,
            last_weekly_reset,
            streak: 0,
            cooldown_until: None,
            recent_results: Vec::new(),
        }
    }

    /// The cooldown instant, if it is still in the future.
    pub fn cooldown_at(&self, now: &Timestamp) -> Option<Timestamp> {
        self.cooldown_until.filter(|until| now < until)
    }

    pub fn push_result(&mut self, result: RecentResult) {
        self.recent_results.insert(0, result);
        self.recent_results.truncate(RECENT_RESULTS_LEN);
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Starting balance granted when the account is opened.
    Grant,
    Stake,
    Payout,
    Loss,
}

impl fmt::Display for LedgerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerReason::Grant => write!(f, "grant"),
            LedgerReason::Stake => write!(f, "stake"),
            LedgerReason::Payout => write!(f, "payout"),
            LedgerReason::Loss => write!(f, "loss"),
        }
    }
}

/// Immutable audit record of a balance movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub ts: Timestamp,
    pub user_id: UserId,
    pub delta: i64,
    pub reason: LedgerReason,
    #[serde(default)]
    pub parlay_id: Option<ParlayId>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything that is persisted, as one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub users: BTreeMap<UserId, Account>,
    #[serde(default)]
    pub parlays: BTreeMap<ParlayId, Parlay>,
    #[serde(default)]
    pub ledger: Vec<LedgerEntry>,
}

impl Snapshot {
    pub fn active_parlays(&self) -> impl Iterator<Item = &Parlay> {
        self.parlays.values().filter(|p| p.is_active())
    }

    /// The user's newest `limit` ledger entries, most recent first.
    pub fn recent_entries(&self, user_id: &str, limit: usize) -> Vec<LedgerEntry> {
        self.ledger
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit)
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Which rolling stake window a cap applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapWindow {
    Daily,
    Weekly,
}

impl fmt::Display for CapWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapWindow::Daily => write!(f, "Daily"),
            CapWindow::Weekly => write!(f, "Weekly"),
        }
    }
}

/// Coarse error category, used for reporting and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input, rejected before any mutation.
    Validation,
    /// Economy rule (caps, cooldown, balance), rejected before any mutation.
    Policy,
    /// Stale client view; refresh and retry.
    State,
    /// Persistence fault; nothing was applied.
    Storage,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParlayError {
    #[error("Stake must be a whole number of points, at least 1.")]
    InvalidStake,

    #[error("{0}")]
    InvalidLegs(String),

    #[error("Deadline must be in the future.")]
    InvalidDeadline,

    #[error("Use MM/DD/YYYY HH:MM AM/PM, e.g., 10/14/2025 11:59 PM (got \"{0}\").")]
    InvalidDeadlineFormat(String),

    #[error("Can't mark leg {}: {reason}.", .index + 1)]
    InvalidLeg { index: usize, reason: String },

    #[error("That selection expired. Pick the leg again.")]
    SelectionExpired,

    #[error("{window} stake cap {cap} pts reached ({used} used, {requested} requested).")]
    CapExceeded {
        window: CapWindow,
        used: Points,
        cap: Points,
        requested: Points,
    },

    #[error("Cooldown after loss. Try again after {}.", .until.format("%m/%d %I:%M %p"))]
    OnCooldown { until: Timestamp },

    #[error("Insufficient balance: need {needed} pts, have {available} pts.")]
    InsufficientBalance { needed: Points, available: Points },

    #[error("Parlay not found: {0}")]
    NotFound(ParlayId),

    #[error("Parlay already resolved ({status}).")]
    NotActive { id: ParlayId, status: ParlayStatus },

    #[error("The deadline has passed; this parlay is being settled.")]
    DeadlinePassed,

    #[error("Only the bet creator can manage this parlay.")]
    NotOwner,

    #[error("Storage failure: {0}")]
    IoFailure(String),
}

impl ParlayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParlayError::InvalidStake
            | ParlayError::InvalidLegs(_)
            | ParlayError::InvalidDeadline
            | ParlayError::InvalidDeadlineFormat(_)
            | ParlayError::InvalidLeg { .. }
            | ParlayError::SelectionExpired => ErrorKind::Validation,
            ParlayError::CapExceeded { .. }
            | ParlayError::OnCooldown { .. }
            | ParlayError::InsufficientBalance { .. } => ErrorKind::Policy,
            ParlayError::NotFound(_)
            | ParlayError::NotActive { .. }
            | ParlayError::DeadlinePassed
            | ParlayError::NotOwner => ErrorKind::State,
            ParlayError::IoFailure(_) => ErrorKind::Storage,
        }
    }

    /// Text safe to show the user. Storage details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ParlayError::IoFailure(_) => {
                "Couldn't save that right now. Nothing was changed; please try again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
