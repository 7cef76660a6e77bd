//! Motion state tracking
//!
//! Keeps the last value seen for each tracked word and derives the facts the
//! filter and the beam logic need: did the tool actually move, did the feed
//! change, is this a Z-only rapid.

use crate::config::Dimensionality;
use crate::lexer::{LineKind, MotionMode, TokenLine};

/// A tracked value: the text as written plus its number when it has one.
/// Values compare numerically when both parse, textually otherwise.
#[derive(Debug, Clone)]
pub struct Coord {
    pub raw: String,
    pub number: Option<f64>,
}

impl Coord {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            number: raw.parse().ok(),
        }
    }
}

impl PartialEq for Coord {
    fn eq(&self, other: &Self) -> bool {
        match (self.number, other.number) {
            (Some(a), Some(b)) => a == b,
            _ => self.raw == other.raw,
        }
    }
}

/// Last observed machine words. `None` means "never seen".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MachineState {
    pub x: Option<Coord>,
    pub y: Option<Coord>,
    pub z: Option<Coord>,
    /// Arc centre offsets are not modal: they only hold the latest line's words
    pub i: Option<Coord>,
    pub j: Option<Coord>,
    pub f: Option<Coord>,
    /// Active motion mode; cleared by any other G command
    pub mode: Option<MotionMode>,
}

/// Derived, per-line facts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionFacts {
    pub position_unchanged: bool,
    /// X and Y alone, whatever the dimensionality
    pub xy_unchanged: bool,
    pub feed_unchanged: bool,
    pub is_z_only_rapid: bool,
}

impl MachineState {
    /// Fold one command line into the state
    pub fn update(&mut self, line: &TokenLine) {
        self.i = None;
        self.j = None;
        for word in &line.params {
            let slot = match word.letter {
                'X' => &mut self.x,
                'Y' => &mut self.y,
                'Z' => &mut self.z,
                'I' => &mut self.i,
                'J' => &mut self.j,
                'F' => &mut self.f,
                _ => continue,
            };
            *slot = Some(Coord::new(word.value));
        }

        match line.kind {
            LineKind::Motion(mode) => self.mode = Some(mode),
            _ => {
                if line.words().any(|w| w.letter == 'G') {
                    self.mode = None;
                }
            }
        }
    }

    /// Compare this (current) state against the state at the last emitted line
    pub fn facts(&self, baseline: &MachineState, line: &TokenLine, dims: Dimensionality) -> MotionFacts {
        let xy_unchanged = self.x == baseline.x && self.y == baseline.y;
        let position_unchanged = match dims {
            Dimensionality::Planar => xy_unchanged,
            Dimensionality::Spatial => xy_unchanged && self.z == baseline.z,
        };

        MotionFacts {
            position_unchanged,
            xy_unchanged,
            feed_unchanged: self.f == baseline.f && baseline.mode != Some(MotionMode::Rapid),
            is_z_only_rapid: self.mode == Some(MotionMode::Rapid)
                && line.has('Z')
                && !line.has('X')
                && !line.has('Y'),
        }
    }
}
