//! Redundancy filter
//!
//! Dropping an axis turns many real moves into no-ops; these rules find them.

use crate::config::Dimensionality;
use crate::lexer::MotionMode;
use crate::post::state::MotionFacts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Rapid to where the tool already is
    StationaryRapid,
    /// Feed move to where the tool already is
    StationaryFeed,
    /// Rapid on the dropped Z axis only
    ZOnlyRapid,
    /// Same text as the previous output line
    Duplicate,
}

/// Rules 1 to 3: degenerate moves, checked in order.
/// `baseline_mode` is the motion mode at the last emitted line.
pub fn degenerate_move(
    mode: MotionMode,
    facts: &MotionFacts,
    baseline_mode: Option<MotionMode>,
    dims: Dimensionality,
) -> Option<DiscardReason> {
    let after_motion = baseline_mode.is_some();

    match mode {
        MotionMode::Rapid if after_motion && facts.position_unchanged => {
            Some(DiscardReason::StationaryRapid)
        }
        MotionMode::Linear if after_motion && facts.position_unchanged => {
            Some(DiscardReason::StationaryFeed)
        }
        MotionMode::Rapid if dims == Dimensionality::Planar && facts.is_z_only_rapid => {
            Some(DiscardReason::ZOnlyRapid)
        }
        _ => None,
    }
}

/// Rule 4: the rebuilt line repeats the previous output line
pub fn duplicate(candidate: &str, previous: Option<&str>) -> Option<DiscardReason> {
    match previous {
        Some(previous) if previous == candidate => Some(DiscardReason::Duplicate),
        _ => None,
    }
}
