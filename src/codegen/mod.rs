//! G-code generator
//! Converts a job into generic (LinuxCNC-flavoured) G-code, the input of the
//! laser post-processor

use crate::assembler::{format_word, join_words, text_lines, to_units, PARAM_ORDER};
use crate::ast::*;
use crate::config::Config;
use std::collections::HashMap;
use tracing::{debug, info};
use uom::si::f64::{Length, Time};
use uom::si::length::millimeter;
use uom::si::time::minute;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GCodeOutput {
    pub lines: Vec<String>,
}

impl GCodeOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn emit(&mut self, code: &str) {
        self.lines.push(code.to_string());
    }

    pub fn emit_comment(&mut self, comment: &str) {
        self.lines.push(format!("({})", comment));
    }
}

impl std::fmt::Display for GCodeOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

pub struct CodeGenerator<'c> {
    config: &'c Config,
    output: GCodeOutput,
    /// Last value written per parameter, for axis-modal output
    location: HashMap<char, Quantity>,
    /// Name of the last command written, for modal output
    last_command: Option<String>,
}

impl<'c> CodeGenerator<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self {
            config,
            output: GCodeOutput::new(),
            location: HashMap::new(),
            last_command: None,
        }
    }

    pub fn generate(mut self, job: &Job) -> GCodeOutput {
        info!(operations = job.operations.len(), "postprocessing");

        self.emit_header();

        for op in &job.operations {
            self.emit_operation(op);
        }

        self.emit_footer();

        self.output
    }

    fn emit_header(&mut self) {
        if self.config.header {
            self.output.emit_comment("Exported by laserpost");
            self.output.emit_comment(&format!(
                "Post Processor: {}",
                self.config.upstream_name
            ));
        }

        if self.config.comments {
            self.output.emit_comment("begin preamble");
        }
        for line in text_lines(&self.config.preamble) {
            self.output.emit(line);
        }
        self.output.emit(self.config.units.gcode());
    }

    fn emit_footer(&mut self) {
        if self.config.comments {
            self.output.emit_comment("begin postamble");
        }
        for line in text_lines(&self.config.postamble) {
            self.output.emit(line);
        }
    }

    fn emit_operation(&mut self, op: &Operation) {
        if !op.active {
            debug!(label = %op.label, "skipping inactive operation");
            return;
        }

        if self.config.comments {
            self.output
                .emit_comment(&format!("begin operation: {}", op.label));
            self.output.emit_comment(&format!(
                "machine units: {}",
                self.config.units.speed_label()
            ));
        }

        let coolant = op.coolant.on_code();
        if let Some(code) = coolant {
            if self.config.comments {
                self.output
                    .emit_comment(&format!("Coolant On:{}", op.coolant.name()));
            }
            self.output.emit(code);
        }

        self.emit_body(&op.body);

        if self.config.comments {
            self.output
                .emit_comment(&format!("finish operation: {}", op.label));
        }

        if coolant.is_some() {
            if self.config.comments {
                self.output
                    .emit_comment(&format!("Coolant Off:{}", op.coolant.name()));
            }
            self.output.emit("M9");
        }
    }

    fn emit_body(&mut self, body: &OperationBody) {
        match body {
            OperationBody::Group(children) => {
                for child in children.iter().filter(|c| c.active) {
                    self.emit_body(&child.body);
                }
            }
            OperationBody::Path(commands) => {
                self.reset_location();
                for command in commands {
                    self.emit_command(command);
                }
            }
        }
    }

    /// Every path starts from a location no real move can match
    fn reset_location(&mut self) {
        self.location.clear();
        for axis in ['X', 'Y', 'Z'] {
            self.location
                .insert(axis, Quantity::Length(Length::new::<millimeter>(-1.0)));
        }
        self.location
            .insert('F', Quantity::Velocity(Length::new::<millimeter>(0.0) / Time::new::<minute>(1.0)));
    }

    fn is_repeat(&self, letter: char, quantity: &Quantity) -> bool {
        !self.config.output_doubles && self.location.get(&letter) == Some(quantity)
    }

    fn emit_command(&mut self, command: &Command) {
        if command.is_comment() {
            if self.config.comments {
                self.output.emit(&command.name);
            }
            return;
        }

        let units = self.config.units;
        let precision = self.config.precision;
        let mut words = vec![command.name.clone()];

        for letter in PARAM_ORDER {
            let quantity = match command.get(letter) {
                Some(q) => q,
                None => continue,
            };

            match letter {
                // Rapid speeds come from the machine, not the program
                'F' if command.is_rapid() => continue,
                'F' => {
                    if !self.is_repeat(letter, quantity) && to_units(quantity, units) > 0.0 {
                        words.push(format_word(letter, quantity, units, precision));
                    }
                }
                'K' if !self.config.output_k => continue,
                'T' | 'H' | 'D' | 'S' => words.push(format_word(letter, quantity, units, precision)),
                _ => {
                    if !self.is_repeat(letter, quantity) {
                        words.push(format_word(letter, quantity, units, precision));
                    }
                }
            }
        }

        for (letter, quantity) in &command.params {
            self.location.insert(*letter, *quantity);
        }

        // A motion word repeated from the previous command stays in effect
        let repeated = self.last_command.as_deref() == Some(command.name.as_str());
        if self.config.modal && repeated && command.is_motion() && words.len() > 1 {
            words.remove(0);
        }
        self.last_command = Some(command.name.clone());

        if command.is_tool_change() {
            // Stop the spindle before the change
            self.output.emit("M5");
            for line in text_lines(&self.config.tool_change) {
                self.output.emit(line);
            }
            self.output.emit(&join_words(&words));

            if self.config.tool_length_offset {
                if let Some(tool) = command.get('T') {
                    let offset = format_word('H', tool, units, precision);
                    self.output.emit(&format!("G43 {}", offset));
                }
            }
            return;
        }

        self.output.emit(&join_words(&words));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_job;
    use pretty_assertions::assert_eq;

    const JOB: &str = r#"{
        "operations": [
            {
                "label": "Profile",
                "coolant": "mist",
                "commands": [
                    { "name": "(Profile)" },
                    { "name": "M6", "params": { "T": 2 } },
                    { "name": "M3", "params": { "S": 10000 } },
                    { "name": "G0", "params": { "X": 0, "Y": 0, "Z": 5, "F": 1000 } },
                    { "name": "G1", "params": { "X": 10, "Y": 0, "Z": -1, "F": 300 } },
                    { "name": "G2", "params": { "X": 10, "Y": 10, "I": 0, "J": 5, "K": 0, "F": 300 } }
                ]
            },
            { "label": "Disabled", "active": false, "commands": [ { "name": "G0", "params": { "X": 99 } } ] }
        ]
    }"#;

    fn generate(config: &Config) -> Vec<String> {
        let job = parse_job(JOB).expect("parse failed");
        CodeGenerator::new(config).generate(&job).lines
    }

    #[test]
    fn test_generic_program() {
        let config = Config::default();
        let lines = generate(&config);

        assert_eq!(
            lines,
            vec![
                "(Exported by laserpost)",
                "(Post Processor: linuxcnc)",
                "(begin preamble)",
                "G17 G90",
                "G21",
                "(begin operation: Profile)",
                "(machine units: mm/min)",
                "(Coolant On:Mist)",
                "M7",
                "(Profile)",
                "M5",
                "M6 T2",
                "G43 H2",
                "M3 S10000",
                "G0 X0.000 Y0.000 Z5.000",
                "G1 X10.000 Y0.000 Z-1.000 F300.000",
                "G2 X10.000 Y10.000 I0.000 J5.000 F300.000",
                "(finish operation: Profile)",
                "(Coolant Off:Mist)",
                "M9",
                "(begin postamble)",
                "M5",
                "G17 G90",
                "M2",
            ]
        );
    }

    #[test]
    fn test_quiet_imperial_axis_modal() {
        let mut config = Config::from_arg_string("--no-header --no-comments --inches --axis-modal --no-tlo --output-k")
            .expect("config");
        config.tool_change = "M0".to_string();
        let lines = generate(&config);

        assert_eq!(
            lines,
            vec![
                "G17 G90",
                "G20",
                "M7",
                "M5",
                "M0",
                "M6 T2",
                "M3 S10000",
                "G0 X0.0000 Y0.0000 Z0.1969",
                "G1 X0.3937 Z-0.0394 F11.8110",
                "G2 Y0.3937 I0.0000 J0.1969 K0.0000",
                "M9",
                "M5",
                "G17 G90",
                "M2",
            ]
        );
    }

    const REPEATS: &str = r#"{
        "operations": [
            {
                "label": "Grid",
                "commands": [
                    { "name": "G0", "params": { "X": 0, "Y": 0 } },
                    { "name": "G1", "params": { "X": 10, "Y": 0, "F": 100 } },
                    { "name": "G1", "params": { "X": 10, "Y": 10, "F": 100 } },
                    { "name": "M6", "params": { "T": 1 } },
                    { "name": "M6", "params": { "T": 1 } },
                    { "name": "G0", "params": { "X": 20, "Y": 20 } },
                    { "name": "G0", "params": { "X": 30, "Y": 30 } }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_modal_drops_repeated_motion_word() {
        let config = Config::from_arg_string("--no-header --no-comments --no-tlo --modal").expect("config");
        let job = parse_job(REPEATS).expect("parse failed");
        let lines = CodeGenerator::new(&config).generate(&job).lines;

        assert_eq!(
            lines,
            vec![
                "G17 G90",
                "G21",
                "G0 X0.000 Y0.000",
                "G1 X10.000 Y0.000 F100.000",
                "X10.000 Y10.000 F100.000",
                "M5",
                "M6 T1",
                // Only motion words are modal
                "M5",
                "M6 T1",
                "G0 X20.000 Y20.000",
                "X30.000 Y30.000",
                "M5",
                "G17 G90",
                "M2",
            ]
        );

        let config = Config::from_arg_string("--no-header --no-comments --no-tlo").expect("config");
        let lines = CodeGenerator::new(&config).generate(&job).lines;
        assert!(lines.contains(&"G1 X10.000 Y10.000 F100.000".to_string()));
        assert!(lines.contains(&"G0 X30.000 Y30.000".to_string()));
    }

    #[test]
    fn test_empty_job() {
        let config = Config::from_arg_string("--no-header --no-comments").expect("config");
        let output = CodeGenerator::new(&config).generate(&Job { operations: vec![] });
        assert_eq!(output.to_string(), "G17 G90\nG21\nM5\nG17 G90\nM2\n");
    }
}
