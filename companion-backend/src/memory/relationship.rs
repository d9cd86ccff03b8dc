//! Relationship phase, confidence and intimacy.
//!
//! The raw scores grow with messages and shared moments but are held under
//! day-indexed ceilings, so nothing reaches its maximum on the first day.

use chrono::{DateTime, Utc};

use super::categories;
use crate::db::Database;
use crate::models::RelationshipState;
use crate::time::now_utc;

/// `(day, ceiling)` checkpoints, interpolated linearly in between
const CONFIDENCE_CAPS: &[(i64, u8)] = &[
    (1, 35),
    (2, 52),
    (3, 65),
    (4, 75),
    (5, 83),
    (7, 88),
    (10, 92),
    (14, 95),
    (21, 98),
    (30, 100),
];

const INTIMACY_CAPS: &[(i64, u8)] = &[
    (1, 8),
    (2, 20),
    (3, 35),
    (4, 50),
    (5, 62),
    (7, 72),
    (10, 80),
    (14, 88),
    (21, 94),
    (30, 100),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseInputs {
    pub total_messages: i64,
    pub total_moments: i64,
    pub intimate_facts: i64,
    pub days_together: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipSnapshot {
    pub phase: u8,
    pub confidence: u8,
    pub intimacy: u8,
    pub days_together: i64,
}

pub fn confidence_cap(days: i64) -> u8 {
    interpolate(CONFIDENCE_CAPS, days)
}

pub fn intimacy_cap(days: i64) -> u8 {
    interpolate(INTIMACY_CAPS, days)
}

fn interpolate(table: &[(i64, u8)], days: i64) -> u8 {
    let (first_day, first_cap) = table[0];
    let (last_day, last_cap) = table[table.len() - 1];
    if days <= first_day {
        return first_cap;
    }
    if days >= last_day {
        return last_cap;
    }
    for pair in table.windows(2) {
        let (d0, c0) = pair[0];
        let (d1, c1) = pair[1];
        if days >= d0 && days <= d1 {
            let t = (days - d0) as f64 / (d1 - d0) as f64;
            return (c0 as f64 + t * (c1 as f64 - c0 as f64)) as u8;
        }
    }
    last_cap
}

/// Pure scoring. Same inputs, same snapshot.
pub fn compute_phase(inputs: PhaseInputs) -> RelationshipSnapshot {
    let days = inputs.days_together.max(1);

    let raw_confidence = (inputs.total_messages * 2 + inputs.total_moments * 5).clamp(0, 100) as u8;
    let raw_intimacy = (inputs.total_moments * 8 + inputs.intimate_facts * 10).clamp(0, 100) as u8;

    let confidence = raw_confidence.min(confidence_cap(days));
    let intimacy = raw_intimacy.min(intimacy_cap(days));

    RelationshipSnapshot {
        phase: phase_for(inputs.total_messages, intimacy),
        confidence,
        intimacy,
        days_together: days,
    }
}

fn phase_for(messages: i64, intimacy: u8) -> u8 {
    if messages < 20 || intimacy < 10 {
        1
    } else if messages < 60 || intimacy < 30 {
        2
    } else if messages < 120 || intimacy < 55 {
        3
    } else {
        4
    }
}

/// `max(1, whole days since the first message + 1)`
pub fn days_together(first_message_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    match first_message_at {
        Some(first) => ((now - first).num_days() + 1).max(1),
        None => 1,
    }
}

/// Recompute and store the relationship metrics. Returns the phase.
pub fn recompute(db: &Database) -> rusqlite::Result<u8> {
    recompute_at(db, now_utc())
}

pub fn recompute_at(db: &Database, now: DateTime<Utc>) -> rusqlite::Result<u8> {
    let stored = db.get_relationship()?;
    let inputs = PhaseInputs {
        total_messages: db.count_messages()?,
        total_moments: db.count_facts_in(&[categories::MOMENTS])?,
        intimate_facts: db.count_facts_in(categories::INTIMATE)?,
        days_together: days_together(stored.first_message_at, now),
    };
    let computed = compute_phase(inputs);

    // Scores only move up between resets; the phase follows the stored scores.
    let confidence = computed.confidence.max(stored.confidence).min(confidence_cap(computed.days_together));
    let intimacy = computed.intimacy.max(stored.intimacy).min(intimacy_cap(computed.days_together));

    let next = RelationshipState {
        phase: phase_for(inputs.total_messages, intimacy),
        confidence,
        intimacy,
        days_together: computed.days_together,
        ..stored.clone()
    };
    db.save_relationship_metrics(&next)?;

    if next.phase != stored.phase {
        log::info!("[RELATIONSHIP] Phase {} -> {}", stored.phase, next.phase);
    }
    log::debug!(
        "[RELATIONSHIP] phase={} confidence={} intimacy={} days={}",
        next.phase,
        next.confidence,
        next.intimacy,
        next.days_together
    );
    Ok(next.phase)
}

/// Wipe the relationship back to day one.
pub fn reset(db: &Database) -> rusqlite::Result<()> {
    db.reset_relationship()?;
    log::info!("[RELATIONSHIP] Reset to phase 1");
    Ok(())
}
