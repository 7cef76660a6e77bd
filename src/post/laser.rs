//! Laser rewrite pass
//!
//! One forward pass over the document. Each command line is classified, folded
//! into the machine state, filtered, rebuilt, and finally preceded by a beam
//! command when the move needs the beam in the other state.

use super::beam::{required_beam, BeamState, Laser};
use super::filter::{degenerate_move, duplicate, DiscardReason};
use super::state::MachineState;
use super::{Diagnostic, PostProcessor, Processed};
use crate::assembler::{join_words, renumber, text_lines};
use crate::codegen::GCodeOutput;
use crate::config::{Config, Dimensionality, FeedPolicy};
use crate::lexer::{classify, LineKind, MotionMode, TokenLine};
use tracing::{debug, info};

/// Which rules the engine applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Beam control, command stripping and motion rebuilding
    Laser,
    /// Only the duplicate and degenerate-move filters
    Cleanup,
}

pub struct Engine<'c> {
    config: &'c Config,
    pass: Pass,
    /// State after the most recently processed command line
    current: MachineState,
    /// State when the previous line was emitted
    baseline: MachineState,
    laser: Laser,
    /// Most recent emitted command line, as rebuilt
    last_line: Option<String>,
    /// Leading word of the most recent emitted line
    last_command: Option<String>,
    lines: Vec<String>,
    diagnostics: Vec<Diagnostic>,
    discarded: usize,
    transitions: usize,
}

impl<'c> Engine<'c> {
    pub fn new(config: &'c Config, pass: Pass) -> Self {
        Self {
            config,
            pass,
            current: MachineState::default(),
            baseline: MachineState::default(),
            laser: Laser::new(config.initial_beam, &config.laser_power),
            last_line: None,
            last_command: None,
            lines: Vec::new(),
            diagnostics: Vec::new(),
            discarded: 0,
            transitions: 0,
        }
    }

    pub fn run(mut self, input: &GCodeOutput) -> Processed {
        let mut offset = 0;
        for (index, line) in input.lines.iter().enumerate() {
            self.process_line(index + 1, offset, line);
            offset += line.len() + 1;
        }

        info!(
            pass = ?self.pass,
            emitted = self.lines.len(),
            discarded = self.discarded,
            transitions = self.transitions,
            beam = ?self.laser.state(),
            "done postprocessing"
        );

        let lines = match self.config.line_numbers {
            Some(numbering) => renumber(self.lines, numbering).0,
            None => self.lines,
        };

        Processed {
            output: GCodeOutput { lines },
            diagnostics: self.diagnostics,
        }
    }

    fn process_line(&mut self, number: usize, offset: usize, text: &str) {
        let line = classify(text);

        for bad in &line.malformed {
            debug!(line = number, "{}", bad.message);
            self.diagnostics.push(Diagnostic {
                line: number,
                span: offset + bad.span.start..offset + bad.span.end,
                message: bad.message.clone(),
            });
        }

        if line.is_comment() {
            self.comment(text);
            return;
        }
        if line.command.is_none() && line.params.is_empty() {
            return;
        }

        if self.pass == Pass::Laser {
            // Spindle speed doubles as laser power
            if let Some(speed) = line.words().find(|w| w.letter == 'S') {
                self.laser.power_mut().observe_speed(speed.value);
            }

            match line.kind {
                LineKind::SpindleOn | LineKind::ToolLengthOffset => {
                    debug!(line = number, "removed {}", line.to_text());
                    return;
                }
                LineKind::ToolChange => {
                    self.tool_change(number, &line);
                    return;
                }
                LineKind::SpindleOff => {
                    self.spindle_off(number);
                    return;
                }
                _ => {}
            }
        }

        self.current.update(&line);

        let kind = match (&line.command, self.current.mode) {
            (None, Some(mode)) => LineKind::Motion(mode),
            _ => line.kind,
        };

        match kind {
            LineKind::Motion(mode) => self.motion(number, mode, &line),
            _ => {
                let text = line.to_text();
                if let Some(reason) = duplicate(&text, self.last_line.as_deref()) {
                    self.discard(number, reason);
                    return;
                }
                self.accept(text, false);
            }
        }
    }

    fn comment(&mut self, text: &str) {
        if !self.config.comments {
            return;
        }
        let text = strip_line_number(text.trim_end());
        let text = if self.config.upstream_name.is_empty() {
            text.to_string()
        } else {
            text.replace(&self.config.upstream_name, &self.config.post_name)
        };
        self.lines.push(text);
    }

    fn motion(&mut self, number: usize, mode: MotionMode, line: &TokenLine) {
        let dims = self.config.dimensionality;
        let facts = self.current.facts(&self.baseline, line, dims);

        if let Some(reason) = degenerate_move(mode, &facts, self.baseline.mode, dims) {
            self.discard(number, reason);
            return;
        }

        let text = match self.pass {
            Pass::Laser => self.rebuild_motion(mode, line, facts.feed_unchanged),
            Pass::Cleanup => line.to_text(),
        };
        if let Some(reason) = duplicate(&text, self.last_line.as_deref()) {
            self.discard(number, reason);
            return;
        }

        if self.pass == Pass::Laser {
            let wanted = required_beam(mode, &facts, dims);
            if let Some(to) = self.laser.transition_to(wanted) {
                debug!(line = number, beam = ?to, "beam transition");
                self.switch_beam(to);
            }
        }

        self.accept(text, true);
    }

    /// Rebuild a motion line as `G X Y [Z] [I J [K]] [F]` from the tracked state
    fn rebuild_motion(&self, mode: MotionMode, line: &TokenLine, feed_unchanged: bool) -> String {
        let mut words = vec![match &line.command {
            Some(command) => command.to_string(),
            None => mode.code().to_string(),
        }];

        let state = &self.current;
        let base = &self.baseline;
        let mut axes = vec![('X', &state.x, &base.x), ('Y', &state.y, &base.y)];
        if self.config.dimensionality == Dimensionality::Spatial {
            axes.push(('Z', &state.z, &base.z));
        }
        for (letter, value, previous) in axes {
            if let Some(value) = value {
                if !self.config.output_doubles && previous.as_ref() == Some(value) {
                    continue;
                }
                words.push(format!("{}{}", letter, value.raw));
            }
        }

        if mode.is_arc() {
            for (letter, value) in [('I', &state.i), ('J', &state.j)] {
                if let Some(value) = value {
                    words.push(format!("{}{}", letter, value.raw));
                }
            }
            if self.config.output_k {
                if let Some(word) = line.get('K') {
                    words.push(word.to_string());
                }
            }
        }

        if mode.is_feed() {
            let feed = match self.config.feed {
                FeedPolicy::SemiModal if feed_unchanged => None,
                _ => state.f.as_ref(),
            };
            if let Some(feed) = feed {
                words.push(format!("F{}", feed.raw));
            }
        }

        join_words(&words)
    }

    /// Input M5: becomes the configured beam-off, unless the beam is already off
    fn spindle_off(&mut self, number: usize) {
        match self.laser.transition_to(BeamState::Off) {
            Some(to) => {
                self.switch_beam(to);
                self.baseline = self.current.clone();
            }
            None => {
                debug!(line = number, "beam already off");
                self.discarded += 1;
            }
        }
    }

    /// A laser has no tools: stop the beam and leave a marker
    fn tool_change(&mut self, number: usize, line: &TokenLine) {
        if let Some(to) = self.laser.transition_to(BeamState::Off) {
            self.switch_beam(to);
        }
        if self.config.comments {
            let tool = line
                .get('T')
                .map(|t| format!(": {}", t))
                .unwrap_or_default();
            self.lines.push(format!("(tool change{})", tool));
        }
        debug!(line = number, "tool change replaced");
    }

    fn switch_beam(&mut self, to: BeamState) {
        let command = self
            .laser
            .command_text(to, &self.config.laser_on, &self.config.laser_off);
        for line in text_lines(&command) {
            self.push_command(line.to_string());
        }
        self.laser.commit(to);
        self.transitions += 1;
    }

    fn discard(&mut self, number: usize, reason: DiscardReason) {
        debug!(line = number, ?reason, "discarded");
        self.discarded += 1;
    }

    /// Emit a surviving input line
    fn accept(&mut self, text: String, modal: bool) {
        let command = text.split(' ').next().unwrap_or_default().to_string();
        let repeated = command.starts_with(|c: char| c == 'G' || c == 'M')
            && self.last_command.as_deref() == Some(command.as_str());

        let out = if modal && self.config.modal && repeated && text.len() > command.len() {
            text[command.len()..].trim_start().to_string()
        } else {
            text.clone()
        };

        self.lines.push(out);
        self.last_command = Some(command);
        self.last_line = Some(text);
        self.baseline = self.current.clone();
    }

    /// Emit an injected command line
    fn push_command(&mut self, line: String) {
        self.last_command = line.split(' ').next().map(str::to_string);
        self.last_line = Some(line.clone());
        self.lines.push(line);
    }
}

/// Drop a leading `N<n>` word so renumbered comments do not pile up numbers
fn strip_line_number(text: &str) -> &str {
    let trimmed = text.trim_start();
    match trimmed.split_once(' ') {
        Some((first, rest))
            if first.len() > 1
                && first.starts_with(|c: char| c == 'N' || c == 'n')
                && first[1..].chars().all(|c| c.is_ascii_digit()) =>
        {
            rest.trim_start()
        }
        _ => text,
    }
}

/// The laser post-processor
pub struct LaserPost<'c> {
    config: &'c Config,
}

impl<'c> LaserPost<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self { config }
    }
}

impl PostProcessor for LaserPost<'_> {
    fn process(&self, input: &GCodeOutput) -> Processed {
        Engine::new(self.config, Pass::Laser).run(input)
    }

    fn name(&self) -> &str {
        "Laser"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(args: &str, input: &str) -> String {
        let config = Config::from_arg_string(args).expect("config");
        let post = LaserPost::new(&config);
        post.process(&GCodeOutput::from_text(input)).output.to_string()
    }

    #[test]
    fn test_first_feed_move_turns_beam_on() {
        assert_eq!(run("", "G1 X10 Y10 F500\n"), "M3 S0\nG1 X10 Y10 F500\n");
    }

    #[test]
    fn test_first_feed_move_with_beam_assumed_on() {
        assert_eq!(run("--initial-beam on", "G1 X10 Y10 F500\n"), "G1 X10 Y10 F500\n");
    }

    #[test]
    fn test_first_rapid_forces_beam_off() {
        assert_eq!(run("", "G0 X1 Y1\n"), "M5\nG0 X1 Y1\n");
        assert_eq!(run("--initial-beam on", "G0 X1 Y1\n"), "M5\nG0 X1 Y1\n");
        assert_eq!(run("--initial-beam off", "G0 X1 Y1\n"), "G0 X1 Y1\n");
    }

    #[test]
    fn test_repeated_rapid_collapses() {
        assert_eq!(run("", "G0 X5 Y5\nG0 X5 Y5\n"), "M5\nG0 X5 Y5\n");
    }

    #[test]
    fn test_feed_restated_in_new_group() {
        let input = "G1 X1 Y1 F100\nG0 X3 Y3\nG1 X2 Y2 F100\nG1 X4 Y4 F100\n";
        assert_eq!(
            run("", input),
            "M3 S0\nG1 X1 Y1 F100\nM5\nG0 X3 Y3\nM3 S0\nG1 X2 Y2 F100\nG1 X4 Y4\n"
        );
    }

    #[test]
    fn test_feed_always() {
        let input = "G1 X1 Y1 F100\nG1 X2 Y2\n";
        assert_eq!(
            run("--feed-always --initial-beam on", input),
            "G1 X1 Y1 F100\nG1 X2 Y2 F100\n"
        );
    }

    #[test]
    fn test_stationary_rapid_after_feed_is_dropped() {
        // The rapid only retracts Z, so with Z dropped it goes nowhere
        let input = "G1 X1 Y1 F100\nG0 X1 Y1 Z5\nG1 X2 Y2 F100\n";
        assert_eq!(
            run("--initial-beam on", input),
            "G1 X1 Y1 F100\nG1 X2 Y2\n"
        );
    }

    #[test]
    fn test_z_only_rapids_and_plunges_are_dropped() {
        let input = "G0 X0 Y0\nG0 Z5\nG1 Z-1 F50\nG1 X10 Y0 F300\nG0 Z5\n";
        assert_eq!(
            run("--initial-beam off", input),
            "G0 X0 Y0\nM3 S0\nG1 X10 Y0 F300\n"
        );
    }

    #[test]
    fn test_tool_change_never_emitted() {
        let input = "G1 X1 Y1 F100\nM5\nM6 T2\nG43 H2\nM3 S1000\nG1 X5 Y5\n";
        let out = run("--initial-beam on", input);
        assert!(!out.contains("M6"));
        assert!(!out.contains("G43"));
        assert_eq!(
            out,
            "G1 X1 Y1 F100\nM5\n(tool change: T2)\nM3 S1000\nG1 X5 Y5\n"
        );
    }

    #[test]
    fn test_tool_change_turns_beam_off() {
        let out = run("--initial-beam on --no-comments", "G1 X1 Y1 F100\nM6 T3\nG1 X2 Y2\n");
        assert_eq!(out, "G1 X1 Y1 F100\nM5\nM3 S0\nG1 X2 Y2\n");
    }

    #[test]
    fn test_power_from_spindle_speed() {
        let input = "M3 S8000\nG0 X0 Y0\nG1 X5 Y0 F200\nM6 T2\nM3 S0\nG0 X9 Y9\nG1 X10 Y10 F200\n";
        let out = run("--no-comments", input);
        assert_eq!(
            out,
            "M5\nG0 X0 Y0\nM3 S8000\nG1 X5 Y0 F200\nM5\nG0 X9 Y9\nM3 S8000\nG1 X10 Y10 F200\n"
        );
    }

    #[test]
    fn test_custom_beam_commands() {
        let out = run(
            r#"--laser-on M4 --laser-off "M5\nG4 P0" --laser-power S255"#,
            "M3 S1000\nG0 X1 Y1\nG1 X2 Y2 F100\n",
        );
        assert_eq!(out, "M5\nG4 P0\nG0 X1 Y1\nM4 S255\nG1 X2 Y2 F100\n");

        let out = run("--laser-power NONE", "G1 X2 Y2 F100\n");
        assert_eq!(out, "M3\nG1 X2 Y2 F100\n");
    }

    #[test]
    fn test_program_m5_is_rewritten_and_deduplicated() {
        let input = "G1 X1 Y1 F100\nM5\nM5\nM2\n";
        assert_eq!(
            run("--initial-beam on --laser-off M107", input),
            "G1 X1 Y1 F100\nM107\nM2\n"
        );
    }

    #[test]
    fn test_comments_renamed_and_kept_in_place() {
        let input = "(Post Processor: linuxcnc)\nG17 G90\n(between)\nG17 G90\n";
        assert_eq!(run("", input), "(Post Processor: laser)\nG17 G90\n(between)\n");
        assert_eq!(run("--no-comments", input), "G17 G90\n");
    }

    #[test]
    fn test_arcs() {
        let input = "G0 X0 Y0\nG2 X10 Y0 I5 J0 K0 F100\nG3 X0 Y0 I-5 J0\n";
        assert_eq!(
            run("", input),
            "M5\nG0 X0 Y0\nM3 S0\nG2 X10 Y0 I5 J0 F100\nG3 X0 Y0 I-5 J0\n"
        );
        assert_eq!(
            run("--output-k --initial-beam off", "G2 X10 Y0 I5 J0 K0 F100\n"),
            "M3 S0\nG2 X10 Y0 I5 J0 K0 F100\n"
        );
    }

    #[test]
    fn test_full_circle_is_kept() {
        let input = "G1 X10 Y0 F100\nG2 X10 Y0 I-5 J0\n";
        assert_eq!(
            run("--initial-beam on", input),
            "G1 X10 Y0 F100\nG2 X10 Y0 I-5 J0\n"
        );
    }

    #[test]
    fn test_three_d_mode() {
        let input = "G0 X0 Y0 Z5\nG1 Z-1 F100\nG1 X10 Y0 F100\nG0 Z5\n";
        assert_eq!(
            run("--3d --initial-beam off", input),
            "G0 X0 Y0 Z5\nG1 X0 Y0 Z-1 F100\nM3 S0\nG1 X10 Y0 Z-1\nM5\nG0 X10 Y0 Z5\n"
        );
    }

    #[test]
    fn test_three_d_plunge_mid_group_turns_beam_off() {
        let input = "G1 X1 Y1 Z0 F100\nG1 Z-1\nG1 X2 Y2\n";
        assert_eq!(
            run("--3d --initial-beam on", input),
            "G1 X1 Y1 Z0 F100\nM5\nG1 X1 Y1 Z-1\nM3 S0\nG1 X2 Y2 Z-1\n"
        );
    }

    #[test]
    fn test_modal_and_axis_modal() {
        let input = "G1 X1 Y1 F100\nG1 X2 Y1\nG1 X3 Y2\n";
        assert_eq!(
            run("--modal --axis-modal --initial-beam on", input),
            "G1 X1 Y1 F100\nX2\nX3 Y2\n"
        );
    }

    #[test]
    fn test_bare_axis_line_continues_motion() {
        let input = "G1 X1 Y1 F100\nX5 Y5\nG1 X5 Y5\n";
        assert_eq!(
            run("--initial-beam on", input),
            "G1 X1 Y1 F100\nG1 X5 Y5\n"
        );
        assert_eq!(
            run("--initial-beam on --modal", input),
            "G1 X1 Y1 F100\nX5 Y5\n"
        );
    }

    #[test]
    fn test_bare_axis_line_under_rapid() {
        let input = "G0 X0 Y0\nX3 Y3\nZ5\nG1 X4 Y4 F100\n";
        assert_eq!(
            run("--initial-beam off", input),
            "G0 X0 Y0\nG0 X3 Y3\nM3 S0\nG1 X4 Y4 F100\n"
        );
    }

    #[test]
    fn test_bare_axis_line_without_mode_passes_through() {
        assert_eq!(run("", "G17 G90\nX5\n"), "G17 G90\nX5\n");
    }

    #[test]
    fn test_line_numbers_cover_injected_lines() {
        let input = "G0 X5 Y5\nG0 X5 Y5\nG1 X6 Y6 F10\n";
        assert_eq!(
            run("--line-numbers", input),
            "N110 M5\nN120 G0 X5 Y5\nN130 M3 S0\nN140 G1 X6 Y6 F10\n"
        );
    }

    #[test]
    fn test_malformed_words_are_reported_not_fatal() {
        let config = Config::default();
        let input = GCodeOutput::from_text("G17\nG1 X Y5 F100\n");
        let processed = LaserPost::new(&config).process(&input);

        assert_eq!(processed.output.to_string(), "G17\nM3 S0\nG1 Y5 F100\n");
        assert_eq!(processed.diagnostics.len(), 1);
        assert_eq!(processed.diagnostics[0].line, 2);
        assert_eq!(processed.diagnostics[0].span, 7..8);
    }

    #[test]
    fn test_numbered_comment_keeps_one_number() {
        assert_eq!(strip_line_number("N110 (begin preamble)"), "(begin preamble)");
        assert_eq!(strip_line_number("(N110 inside)"), "(N110 inside)");
        assert_eq!(strip_line_number("Note (free text)"), "Note (free text)");
    }

    #[test]
    fn test_deterministic() {
        let input = "G0 X0 Y0\nG1 X1 Y0 F100\nG2 X1 Y1 I0 J0.5\nG0 X3 Y3\nG1 X4 Y4\n";
        assert_eq!(run("", input), run("", input));
    }
}
