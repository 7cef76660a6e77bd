//! Job file reader
//! Converts the CAM front-end's JSON job description into a typed `Job`

use crate::ast::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;
use uom::si::angle::{degree, radian};
use uom::si::f64::{Angle, Length, Time};
use uom::si::length::{inch, millimeter};
use uom::si::time::{minute, second};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid job file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("the object {label} is not a path; select only paths and compounds")]
    UnsupportedObject { label: String },

    #[error("{label}: invalid parameter name {key:?} (expected a single letter)")]
    InvalidParameter { label: String, key: String },

    #[error("{label}: unknown unit {unit:?} on {letter}")]
    UnknownUnit { label: String, letter: char, unit: String },

    #[error("{label}: unit {unit:?} does not fit parameter {letter}")]
    UnitMismatch { label: String, letter: char, unit: String },
}

pub type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Deserialize)]
struct JobFile {
    operations: Vec<OperationFile>,
}

#[derive(Debug, Deserialize)]
struct OperationFile {
    label: String,

    #[serde(default = "default_active")]
    active: bool,

    #[serde(default)]
    coolant: CoolantFile,

    #[serde(default)]
    commands: Option<Vec<CommandFile>>,

    #[serde(default)]
    group: Option<Vec<OperationFile>>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
enum CoolantFile {
    #[default]
    #[serde(rename = "none", alias = "None", alias = "NONE")]
    None,
    #[serde(rename = "flood", alias = "Flood", alias = "FLOOD")]
    Flood,
    #[serde(rename = "mist", alias = "Mist", alias = "MIST")]
    Mist,
}

#[derive(Debug, Deserialize)]
struct CommandFile {
    name: String,

    #[serde(default)]
    params: BTreeMap<String, ParamFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParamFile {
    /// Plain number in the letter's default unit (mm, mm/min, degrees)
    Bare(f64),
    Tagged { value: f64, unit: String },
}

/// What kind of quantity a parameter letter carries
#[derive(Debug, Clone, Copy, PartialEq)]
enum Dimension {
    Length,
    Velocity,
    Angle,
    Number,
}

fn dimension_of(letter: char) -> Dimension {
    match letter {
        'X' | 'Y' | 'Z' | 'I' | 'J' | 'K' | 'R' | 'Q' => Dimension::Length,
        'F' => Dimension::Velocity,
        'A' | 'B' | 'C' => Dimension::Angle,
        _ => Dimension::Number,
    }
}

/// Parse a JSON job document
pub fn parse_job(json: &str) -> Result<Job> {
    let file: JobFile = serde_json::from_str(json)?;

    // Every top-level object must carry motion data
    for op in &file.operations {
        if op.commands.is_none() && op.group.is_none() {
            return Err(ParseError::UnsupportedObject {
                label: op.label.clone(),
            });
        }
    }

    let operations = file
        .operations
        .into_iter()
        .filter_map(|op| convert_operation(op).transpose())
        .collect::<Result<Vec<_>>>()?;

    Ok(Job { operations })
}

fn convert_operation(op: OperationFile) -> Result<Option<Operation>> {
    let coolant = match op.coolant {
        CoolantFile::None => CoolantMode::Off,
        CoolantFile::Flood => CoolantMode::Flood,
        CoolantFile::Mist => CoolantMode::Mist,
    };

    let body = match (op.group, op.commands) {
        (Some(children), _) => {
            let children = children
                .into_iter()
                .filter_map(|child| convert_operation(child).transpose())
                .collect::<Result<Vec<_>>>()?;
            OperationBody::Group(children)
        }
        (None, Some(commands)) => {
            let commands = commands
                .into_iter()
                .map(|c| convert_command(&op.label, c))
                .collect::<Result<Vec<_>>>()?;
            OperationBody::Path(commands)
        }
        (None, None) => {
            // Groups may hold non-path things like stock
            debug!(label = %op.label, "skipping object without motion data");
            return Ok(None);
        }
    };

    Ok(Some(Operation {
        label: op.label,
        active: op.active,
        coolant,
        body,
    }))
}

fn convert_command(label: &str, command: CommandFile) -> Result<Command> {
    let mut params = Vec::with_capacity(command.params.len());

    for (key, value) in command.params {
        let mut chars = key.chars();
        let letter = match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => c.to_ascii_uppercase(),
            _ => {
                return Err(ParseError::InvalidParameter {
                    label: label.to_string(),
                    key,
                })
            }
        };
        params.push((letter, convert_quantity(label, letter, value)?));
    }

    Ok(Command {
        name: command.name,
        params,
    })
}

fn convert_quantity(label: &str, letter: char, value: ParamFile) -> Result<Quantity> {
    let dimension = dimension_of(letter);

    let (value, unit) = match value {
        ParamFile::Bare(v) => {
            return Ok(match dimension {
                Dimension::Length => Quantity::Length(Length::new::<millimeter>(v)),
                Dimension::Velocity => {
                    Quantity::Velocity(Length::new::<millimeter>(v) / Time::new::<minute>(1.0))
                }
                Dimension::Angle => Quantity::Angle(Angle::new::<degree>(v)),
                Dimension::Number => Quantity::Number(v),
            })
        }
        ParamFile::Tagged { value, unit } => (value, unit),
    };

    let quantity = match unit.as_str() {
        "mm" => Quantity::Length(Length::new::<millimeter>(value)),
        "in" => Quantity::Length(Length::new::<inch>(value)),
        "mm/min" => Quantity::Velocity(Length::new::<millimeter>(value) / Time::new::<minute>(1.0)),
        "mm/s" => Quantity::Velocity(Length::new::<millimeter>(value) / Time::new::<second>(1.0)),
        "in/min" => Quantity::Velocity(Length::new::<inch>(value) / Time::new::<minute>(1.0)),
        "in/s" => Quantity::Velocity(Length::new::<inch>(value) / Time::new::<second>(1.0)),
        "deg" => Quantity::Angle(Angle::new::<degree>(value)),
        "rad" => Quantity::Angle(Angle::new::<radian>(value)),
        "" => Quantity::Number(value),
        _ => {
            return Err(ParseError::UnknownUnit {
                label: label.to_string(),
                letter,
                unit,
            })
        }
    };

    let fits = matches!(
        (dimension, &quantity),
        (Dimension::Length, Quantity::Length(_))
            | (Dimension::Velocity, Quantity::Velocity(_))
            | (Dimension::Angle, Quantity::Angle(_))
            | (Dimension::Number, Quantity::Number(_))
    );
    if !fits {
        return Err(ParseError::UnitMismatch {
            label: label.to_string(),
            letter,
            unit,
        });
    }

    Ok(quantity)
}
