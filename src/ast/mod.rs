/// Machining job as handed over by the CAM front-end
/// An ordered tree of operations, each carrying motion commands with
/// physical-unit parameters

use uom::si::f64::{Angle, Length, Velocity};

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub label: String,
    pub active: bool,
    pub coolant: CoolantMode,
    pub body: OperationBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationBody {
    /// A compound: child operations processed in order
    Group(Vec<Operation>),
    Path(Vec<Command>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CoolantMode {
    Off,   // no code
    Flood, // M08
    Mist,  // M07
}

impl CoolantMode {
    pub fn name(self) -> &'static str {
        match self {
            CoolantMode::Off => "None",
            CoolantMode::Flood => "Flood",
            CoolantMode::Mist => "Mist",
        }
    }

    pub fn on_code(self) -> Option<&'static str> {
        match self {
            CoolantMode::Off => None,
            CoolantMode::Flood => Some("M8"),
            CoolantMode::Mist => Some("M7"),
        }
    }
}

/// One motion or machine command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: String,
    pub params: Vec<(char, Quantity)>,
}

impl Command {
    pub fn get(&self, letter: char) -> Option<&Quantity> {
        self.params
            .iter()
            .find(|(l, _)| *l == letter)
            .map(|(_, q)| q)
    }

    pub fn is_comment(&self) -> bool {
        self.name.starts_with('(')
    }

    pub fn is_rapid(&self) -> bool {
        matches!(self.name.as_str(), "G0" | "G00")
    }

    pub fn is_motion(&self) -> bool {
        matches!(
            self.name.as_str(),
            "G0" | "G00" | "G1" | "G01" | "G2" | "G02" | "G3" | "G03"
        )
    }

    pub fn is_tool_change(&self) -> bool {
        matches!(self.name.as_str(), "M6" | "M06")
    }
}

/// A parameter value with its physical dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Quantity {
    Length(Length),
    Velocity(Velocity),
    Angle(Angle),
    /// Dimensionless: tool numbers, spindle speed, dwell, counts
    Number(f64),
}
