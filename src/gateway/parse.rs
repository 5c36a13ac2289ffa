//! Text input parsing for bet commands.

use chrono::NaiveDateTime;

use crate::clock::ReferenceZone;
use crate::types::{ParlayError, Points, Timestamp};

/// Accepted deadline layout, e.g. `10/14/2025 11:59 PM`.
pub const DEADLINE_FORMAT: &str = "%m/%d/%Y %I:%M %p";

/// Parse a deadline typed in the reference zone.
///
/// Wall-clock times skipped by a DST jump do not exist and are rejected
/// like malformed input.
pub fn parse_deadline(zone: &ReferenceZone, text: &str) -> Result<Timestamp, ParlayError> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, DEADLINE_FORMAT)
        .ok()
        .and_then(|naive| zone.resolve_local(naive))
        .ok_or_else(|| ParlayError::InvalidDeadlineFormat(text.to_string()))
}

/// Split `(go gym) (study 40 mins)` into leg texts.
///
/// Text outside parentheses is ignored and empty groups are dropped.
/// Nested or unbalanced parentheses are errors.
pub fn parse_legs(text: &str) -> Result<Vec<String>, ParlayError> {
    let mut legs = Vec::new();
    let mut current: Option<String> = None;

    for ch in text.chars() {
        match ch {
            '(' => {
                if current.is_some() {
                    return Err(ParlayError::InvalidLegs(
                        "Nested parentheses not allowed.".to_string(),
                    ));
                }
                current = Some(String::new());
            }
            ')' => {
                let leg = current
                    .take()
                    .ok_or_else(|| ParlayError::InvalidLegs("Unbalanced parentheses.".to_string()))?;
                let leg = leg.trim();
                if !leg.is_empty() {
                    legs.push(leg.to_string());
                }
            }
            _ => {
                if let Some(buf) = current.as_mut() {
                    buf.push(ch);
                }
            }
        }
    }

    if current.is_some() {
        return Err(ParlayError::InvalidLegs(
            "Unbalanced parentheses, missing ')'.".to_string(),
        ));
    }
    Ok(legs)
}

/// Stakes arrive signed from the outside; only positive values are stakes.
pub fn parse_stake(stake: i64) -> Result<Points, ParlayError> {
    Points::try_from(stake)
        .ok()
        .filter(|s| *s > 0)
        .ok_or(ParlayError::InvalidStake)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
