//! Run configuration
//!
//! Built once from command-line flags (or a single argument string, the way
//! CAM front-ends hand arguments to a post-processor) and never mutated while a
//! document is being processed.

use clap::Parser;
use logos::Logos;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid post-processor arguments: {0}")]
    Arguments(String),

    #[error("unterminated quote in argument string at byte {0}")]
    UnterminatedQuote(usize),

    #[error("precision {0} is out of range (max {})", MAX_PRECISION)]
    Precision(usize),
}

pub const MAX_PRECISION: usize = 10;

/// Output unit system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitSystem {
    Metric,   // G21
    Imperial, // G20
}

impl UnitSystem {
    pub fn gcode(self) -> &'static str {
        match self {
            UnitSystem::Metric => "G21",
            UnitSystem::Imperial => "G20",
        }
    }

    pub fn speed_label(self) -> &'static str {
        match self {
            UnitSystem::Metric => "mm/min",
            UnitSystem::Imperial => "in/min",
        }
    }

    pub fn default_precision(self) -> usize {
        match self {
            UnitSystem::Metric => 3,
            UnitSystem::Imperial => 4,
        }
    }
}

/// Which axes the laser cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimensionality {
    /// Z is dropped; the beam follows the motion type
    Planar,
    /// Z is kept; the beam also follows whether X/Y actually move
    Spatial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPolicy {
    /// F is stated at the start of each feed group and when it changes
    SemiModal,
    /// F is stated on every feed move
    Always,
}

/// Beam state assumed before the first motion line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialBeam {
    On,
    Off,
    /// Force an explicit beam command before the first motion
    Unknown,
}

impl FromStr for InitialBeam {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(InitialBeam::On),
            "off" => Ok(InitialBeam::Off),
            "unknown" => Ok(InitialBeam::Unknown),
            other => Err(format!("expected 'on', 'off' or 'unknown', got '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Numbering {
    pub start: u32,
    pub step: u32,
}

impl Default for Numbering {
    fn default() -> Self {
        Self { start: 110, step: 10 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub header: bool,
    pub comments: bool,
    pub line_numbers: Option<Numbering>,
    pub review: bool,
    pub precision: usize,
    pub preamble: String,
    pub postamble: String,
    pub units: UnitSystem,
    pub modal: bool,
    pub output_doubles: bool,
    pub tool_length_offset: bool,
    pub tool_change: String,
    pub laser_on: String,
    pub laser_off: String,
    pub laser_power: String,
    pub dimensionality: Dimensionality,
    pub feed: FeedPolicy,
    pub output_k: bool,
    pub initial_beam: InitialBeam,
    /// Name of the generic post whose comments get rewritten
    pub upstream_name: String,
    pub post_name: String,
}

/// Power text meaning "take the power from the program's spindle speed"
pub const POWER_FROM_SPINDLE: &str = "S0";

impl Default for Config {
    fn default() -> Self {
        Self {
            header: true,
            comments: true,
            line_numbers: None,
            review: true,
            precision: UnitSystem::Metric.default_precision(),
            preamble: "G17 G90".to_string(),
            postamble: "M5\nG17 G90\nM2".to_string(),
            units: UnitSystem::Metric,
            modal: false,
            output_doubles: true,
            tool_length_offset: true,
            tool_change: String::new(),
            laser_on: "M3".to_string(),
            laser_off: "M5".to_string(),
            laser_power: POWER_FROM_SPINDLE.to_string(),
            dimensionality: Dimensionality::Planar,
            feed: FeedPolicy::SemiModal,
            output_k: false,
            initial_beam: InitialBeam::Unknown,
            upstream_name: "linuxcnc".to_string(),
            post_name: "laser".to_string(),
        }
    }
}

impl Config {
    /// Parse a post-processor argument string such as
    /// `--line-numbers --preamble "G17 G90\nG21" --laser-power S800`
    pub fn from_arg_string(args: &str) -> Result<Self, ConfigError> {
        let mut argv = vec!["laserpost".to_string()];
        argv.extend(split_args(args)?);
        let parsed = PostArgs::try_parse_from(argv)
            .map_err(|e| ConfigError::Arguments(e.to_string().trim().to_string()))?;
        parsed.into_config()
    }
}

/// Post-processor options
#[derive(Parser, Debug, Clone)]
#[clap(name = "laserpost")]
pub struct PostArgs {
    /// Suppress header output
    #[clap(long)]
    pub no_header: bool,

    /// Suppress comment output
    #[clap(long)]
    pub no_comments: bool,

    /// Prefix every output line with a line number
    #[clap(long)]
    pub line_numbers: bool,

    /// Don't pop up an editor before writing output
    #[clap(long)]
    pub no_show_editor: bool,

    /// Number of digits of precision (default 3, or 4 with --inches)
    #[clap(long, value_parser)]
    pub precision: Option<usize>,

    /// Commands issued before the first command, use \n for newline
    #[clap(long, value_parser)]
    pub preamble: Option<String>,

    /// Commands issued after the last command, use \n for newline
    #[clap(long, value_parser)]
    pub postamble: Option<String>,

    /// Convert output for US imperial mode (G20)
    #[clap(long)]
    pub inches: bool,

    /// Omit a command word repeated from the previous line
    #[clap(long)]
    pub modal: bool,

    /// Omit axis values repeated from the previous line
    #[clap(long)]
    pub axis_modal: bool,

    /// Suppress tool length offset (G43) following tool changes
    #[clap(long)]
    pub no_tlo: bool,

    /// Commands inserted at a tool change, use \n for newline
    #[clap(long, value_parser)]
    pub tool_change: Option<String>,

    /// Command to turn the laser on, use \n for newline
    #[clap(long, value_parser)]
    pub laser_on: Option<String>,

    /// Command to turn the laser off, use \n for newline
    #[clap(long, value_parser)]
    pub laser_off: Option<String>,

    /// Laser power word; NONE or "" suppresses it. Default is the spindle speed
    #[clap(long, value_parser)]
    pub laser_power: Option<String>,

    /// Keep Z and switch the beam on X/Y motion only
    #[clap(long = "3d")]
    pub three_d: bool,

    /// State the feed rate on every feed move
    #[clap(long)]
    pub feed_always: bool,

    /// Pass K words through on arcs
    #[clap(long)]
    pub output_k: bool,

    /// Beam state assumed at program start: on, off or unknown
    #[clap(long, value_parser, default_value = "unknown")]
    pub initial_beam: InitialBeam,
}

impl PostArgs {
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let mut config = Config::default();

        config.header = !self.no_header;
        config.comments = !self.no_comments;
        config.review = !self.no_show_editor;
        if self.line_numbers {
            config.line_numbers = Some(Numbering::default());
        }

        if self.inches {
            config.units = UnitSystem::Imperial;
        }
        config.precision = self
            .precision
            .unwrap_or_else(|| config.units.default_precision());
        if config.precision > MAX_PRECISION {
            return Err(ConfigError::Precision(config.precision));
        }

        config.modal = self.modal;
        config.output_doubles = !self.axis_modal;
        config.tool_length_offset = !self.no_tlo;
        config.output_k = self.output_k;
        config.initial_beam = self.initial_beam;

        if let Some(text) = self.preamble {
            config.preamble = unescape(&text);
        }
        if let Some(text) = self.postamble {
            config.postamble = unescape(&text);
        }
        if let Some(text) = self.tool_change {
            config.tool_change = unescape(&text);
        }
        if let Some(text) = self.laser_on {
            config.laser_on = unescape(&text);
        }
        if let Some(text) = self.laser_off {
            config.laser_off = unescape(&text);
        }
        if let Some(text) = self.laser_power {
            config.laser_power = unescape(&text.replace("NONE", ""));
        }

        if self.three_d {
            config.dimensionality = Dimensionality::Spatial;
        }
        if self.feed_always {
            config.feed = FeedPolicy::Always;
        }

        Ok(config)
    }
}

/// Turn literal `\n` sequences into newlines
pub fn unescape(text: &str) -> String {
    text.replace("\\n", "\n")
}

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum ArgToken<'a> {
    #[regex(r#""[^"]*""#, |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    DoubleQuoted(&'a str),

    #[regex(r"'[^']*'", |lex| { let s = lex.slice(); &s[1..s.len() - 1] })]
    SingleQuoted(&'a str),

    #[regex(r#"[^\s"']+"#, |lex| lex.slice())]
    Bare(&'a str),
}

/// Split an argument string shell-style: whitespace separates arguments,
/// quotes group them, and adjacent pieces (`--x="a b"`) join into one.
pub fn split_args(input: &str) -> Result<Vec<String>, ConfigError> {
    let mut args: Vec<String> = Vec::new();
    let mut last_end = None;

    for (token, span) in ArgToken::lexer(input).spanned() {
        let piece = match token {
            Ok(ArgToken::DoubleQuoted(s)) | Ok(ArgToken::SingleQuoted(s)) | Ok(ArgToken::Bare(s)) => s,
            Err(_) => return Err(ConfigError::UnterminatedQuote(span.start)),
        };
        match args.last_mut() {
            Some(previous) if last_end == Some(span.start) => previous.push_str(piece),
            _ => args.push(piece.to_string()),
        }
        last_end = Some(span.end);
    }

    Ok(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_arg_string("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.precision, 3);
        assert_eq!(config.laser_on, "M3");
        assert_eq!(config.laser_off, "M5");
        assert_eq!(config.laser_power, POWER_FROM_SPINDLE);
    }

    #[test]
    fn test_inches_raise_precision() {
        let config = Config::from_arg_string("--inches").unwrap();
        assert_eq!(config.units, UnitSystem::Imperial);
        assert_eq!(config.precision, 4);

        let config = Config::from_arg_string("--inches --precision 2").unwrap();
        assert_eq!(config.precision, 2);
    }

    #[test]
    fn test_quoted_and_escaped_text() {
        let config =
            Config::from_arg_string(r#"--preamble "G17 G90\nG21" --postamble='M5\nM2'"#).unwrap();
        assert_eq!(config.preamble, "G17 G90\nG21");
        assert_eq!(config.postamble, "M5\nM2");
    }

    #[test]
    fn test_power_none() {
        let config = Config::from_arg_string("--laser-power NONE").unwrap();
        assert_eq!(config.laser_power, "");
    }

    #[test]
    fn test_policy_flags() {
        let config =
            Config::from_arg_string("--3d --feed-always --axis-modal --modal --line-numbers --initial-beam on")
                .unwrap();
        assert_eq!(config.dimensionality, Dimensionality::Spatial);
        assert_eq!(config.feed, FeedPolicy::Always);
        assert!(!config.output_doubles);
        assert!(config.modal);
        assert_eq!(config.line_numbers, Some(Numbering { start: 110, step: 10 }));
        assert_eq!(config.initial_beam, InitialBeam::On);
    }

    #[test]
    fn test_unknown_flag_is_an_error() {
        let err = Config::from_arg_string("--frobnicate").unwrap_err();
        assert!(matches!(err, ConfigError::Arguments(_)));
    }

    #[test]
    fn test_unterminated_quote() {
        let err = Config::from_arg_string(r#"--preamble "G17"#).unwrap_err();
        assert!(matches!(err, ConfigError::UnterminatedQuote(11)));
    }

    #[test]
    fn test_precision_limit() {
        let err = Config::from_arg_string("--precision 42").unwrap_err();
        assert!(matches!(err, ConfigError::Precision(42)));
    }

    #[test]
    fn test_split_args() {
        let args = split_args(r#"a "b c"  --x='d e'f"#).unwrap();
        assert_eq!(args, vec!["a", "b c", "--x=d ef"]);
    }
}
