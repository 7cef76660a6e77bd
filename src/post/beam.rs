//! Laser beam state machine
//!
//! The beam is a binary actuator. Cutting moves need it on, positioning moves
//! need it off; every change is announced with an explicit command line.

use crate::config::{Dimensionality, InitialBeam, POWER_FROM_SPINDLE};
use crate::lexer::MotionMode;
use crate::post::state::MotionFacts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeamState {
    On,
    Off,
}

/// Beam state the given move requires
pub fn required_beam(mode: MotionMode, facts: &MotionFacts, dims: Dimensionality) -> BeamState {
    match (mode, dims) {
        (MotionMode::Rapid, _) => BeamState::Off,
        // Arcs and planar feeds always cut
        (MotionMode::ArcCw | MotionMode::ArcCcw, _) | (MotionMode::Linear, Dimensionality::Planar) => {
            BeamState::On
        }
        // A plunge that leaves X/Y where they were cuts nothing
        (MotionMode::Linear, Dimensionality::Spatial) if facts.xy_unchanged => BeamState::Off,
        (MotionMode::Linear, Dimensionality::Spatial) => BeamState::On,
    }
}

/// Power word appended to the beam-on command
#[derive(Debug, Clone, PartialEq)]
pub struct BeamPower {
    text: String,
    /// Once locked, spindle speeds in the program no longer change the power
    locked: bool,
}

impl BeamPower {
    pub fn new(configured: &str) -> Self {
        Self {
            text: configured.to_string(),
            locked: configured != POWER_FROM_SPINDLE,
        }
    }

    /// Take the power from a spindle speed word, until a non-zero one is seen
    pub fn observe_speed(&mut self, value: &str) {
        if self.locked {
            return;
        }
        self.text = format!("S{}", value);
        self.locked = value.parse::<f64>().map(|v| v != 0.0).unwrap_or(true);
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Laser {
    /// `None` until the program has stated a beam state
    state: Option<BeamState>,
    power: BeamPower,
}

impl Laser {
    pub fn new(initial: InitialBeam, power: &str) -> Self {
        let state = match initial {
            InitialBeam::On => Some(BeamState::On),
            InitialBeam::Off => Some(BeamState::Off),
            InitialBeam::Unknown => None,
        };
        Self {
            state,
            power: BeamPower::new(power),
        }
    }

    pub fn state(&self) -> Option<BeamState> {
        self.state
    }

    pub fn power_mut(&mut self) -> &mut BeamPower {
        &mut self.power
    }

    /// The transition needed to reach `wanted`, if any. Nothing changes until
    /// the caller commits it.
    pub fn transition_to(&self, wanted: BeamState) -> Option<BeamState> {
        if self.state == Some(wanted) {
            None
        } else {
            Some(wanted)
        }
    }

    pub fn commit(&mut self, state: BeamState) {
        self.state = Some(state);
    }

    /// Text of the command lines that perform a transition
    pub fn command_text(&self, to: BeamState, on: &str, off: &str) -> String {
        match to {
            BeamState::On if self.power.text().is_empty() => on.to_string(),
            BeamState::On => format!("{} {}", on, self.power.text()),
            BeamState::Off => off.to_string(),
        }
    }
}
