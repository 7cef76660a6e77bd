use crate::config::{Config, Dimensionality, InitialBeam};
use crate::lexer::{classify, LineKind, MotionMode};
use crate::post::beam::BeamState;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("line {line}: beam switched on while already on")]
    RepeatedBeamOn { line: usize },

    #[error("line {line}: beam switched off while already off")]
    RepeatedBeamOff { line: usize },

    #[error("line {line}: rapid move while the beam may be on")]
    RapidWithBeam { line: usize },

    #[error("line {line}: cutting move while the beam may be off")]
    CutWithoutBeam { line: usize },

    #[error("line {line}: tool change in laser output")]
    ToolChange { line: usize },
}

/// Checks the beam invariants of finished laser G-code
pub struct Validator {
    laser_on: String,
    laser_off: String,
    initial: Option<BeamState>,
    dimensionality: Dimensionality,
}

fn first_word(text: &str) -> String {
    text.split_whitespace().next().unwrap_or_default().to_ascii_uppercase()
}

impl Validator {
    pub fn new(config: &Config) -> Self {
        let initial = match config.initial_beam {
            InitialBeam::On => Some(BeamState::On),
            InitialBeam::Off => Some(BeamState::Off),
            InitialBeam::Unknown => None,
        };
        Self {
            laser_on: first_word(&config.laser_on),
            laser_off: first_word(&config.laser_off),
            initial,
            dimensionality: config.dimensionality,
        }
    }

    pub fn validate_output(&self, text: &str) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut beam = self.initial;
        let mut mode: Option<MotionMode> = None;

        for (index, source) in text.lines().enumerate() {
            let line = index + 1;
            let tokens = classify(source);
            if tokens.command.is_none() && tokens.params.is_empty() {
                continue;
            }
            let word = tokens
                .command
                .as_ref()
                .map(|c| c.to_string().to_ascii_uppercase())
                .unwrap_or_default();

            if !word.is_empty() && word == self.laser_on {
                if beam == Some(BeamState::On) {
                    errors.push(ValidationError::RepeatedBeamOn { line });
                }
                beam = Some(BeamState::On);
                continue;
            }
            if !word.is_empty() && word == self.laser_off {
                if beam == Some(BeamState::Off) {
                    errors.push(ValidationError::RepeatedBeamOff { line });
                }
                beam = Some(BeamState::Off);
                continue;
            }

            match (&tokens.command, tokens.kind) {
                (_, LineKind::ToolChange) => {
                    errors.push(ValidationError::ToolChange { line });
                    continue;
                }
                (_, LineKind::Motion(m)) => mode = Some(m),
                // Modal output: a line of bare axis words continues the last motion
                (None, _) => {}
                (Some(command), _) => {
                    if command.letter == 'G' {
                        mode = None;
                    }
                    continue;
                }
            }

            match mode {
                Some(MotionMode::Rapid) if beam != Some(BeamState::Off) => {
                    errors.push(ValidationError::RapidWithBeam { line });
                }
                // 3D plunges legitimately run with the beam off
                Some(MotionMode::Linear) if self.dimensionality == Dimensionality::Spatial => {}
                Some(MotionMode::Linear | MotionMode::ArcCw | MotionMode::ArcCcw)
                    if beam != Some(BeamState::On) =>
                {
                    errors.push(ValidationError::CutWithoutBeam { line });
                }
                _ => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::GCodeOutput;
    use crate::post::PostProcessorType;
    use pretty_assertions::assert_eq;

    fn check(args: &str, text: &str) -> Result<(), Vec<ValidationError>> {
        let config = Config::from_arg_string(args).expect("config");
        Validator::new(&config).validate_output(text)
    }

    #[test]
    fn test_valid_program() {
        let text = "(start)\nG17 G90\nM5\nG0 X0 Y0\nM3 S100\nG1 X5 Y0 F100\nG2 X5 Y5 I0 J2.5\nM5\nM2\n";
        assert_eq!(check("", text), Ok(()));
    }

    #[test]
    fn test_beam_violations() {
        let text = "M3 S100\nM3 S100\nG0 X1 Y1\nM5\nM5\nG1 X2 Y2 F100\nM6 T1\n";
        assert_eq!(
            check("", text),
            Err(vec![
                ValidationError::RepeatedBeamOn { line: 2 },
                ValidationError::RapidWithBeam { line: 3 },
                ValidationError::RepeatedBeamOff { line: 5 },
                ValidationError::CutWithoutBeam { line: 6 },
                ValidationError::ToolChange { line: 7 },
            ])
        );
    }

    #[test]
    fn test_unknown_start_needs_a_beam_command() {
        assert_eq!(
            check("", "G0 X1 Y1\n"),
            Err(vec![ValidationError::RapidWithBeam { line: 1 }])
        );
        assert_eq!(check("--initial-beam off", "G0 X1 Y1\n"), Ok(()));
    }

    #[test]
    fn test_modal_and_numbered_lines() {
        let text = "N110 M5\nN120 G0 X0 Y0\nN130 X5\nN140 M3 S1\nN150 G1 X6 F10\nN160 X7\n";
        assert_eq!(check("", text), Ok(()));
        assert_eq!(
            check("", "M5\nG0 X0 Y0\nM3\nX5\n"),
            Err(vec![ValidationError::RapidWithBeam { line: 4 }])
        );
    }

    #[test]
    fn test_three_d_plunge_allowed() {
        let text = "M5\nG0 X0 Y0 Z5\nG1 X0 Y0 Z-1 F100\nM3 S1\nG1 X5 Y0 Z-1\n";
        assert!(check("", text).is_err());
        assert_eq!(check("--3d", text), Ok(()));
    }

    #[test]
    fn test_laser_pass_output_validates() {
        let input = "M3 S900\nG0 X0 Y0 Z5\nG1 X0 Y0 Z-1 F100\nG1 X9 Y0\nG3 X0 Y0 I-4.5 J0\nG0 Z5\nG0 X20 Y0\nG1 X30 Y0 F100\nM5\nM2\n";
        for args in ["", "--3d", "--modal --axis-modal", "--line-numbers", "--initial-beam on"] {
            let config = Config::from_arg_string(args).expect("config");
            let output = PostProcessorType::Laser
                .get_processor(&config)
                .process(&GCodeOutput::from_text(input))
                .output;
            assert_eq!(
                Validator::new(&config).validate_output(&output.to_string()),
                Ok(()),
                "args: {}",
                args
            );
        }
    }
}
