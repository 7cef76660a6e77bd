//! Line assembly
//!
//! Rebuilds output lines from words in a fixed order, formats numbers in the
//! configured unit system, and numbers the finished program.

use crate::ast::Quantity;
use crate::config::{Numbering, UnitSystem};
use uom::si::angle::degree;
use uom::si::f64::Time;
use uom::si::length::{inch, millimeter};
use uom::si::time::minute;

/// Order in which parameters are written.
/// LinuxCNC doesn't want K on XY-plane arcs, so K only goes out when asked for.
pub const PARAM_ORDER: [char; 18] = [
    'X', 'Y', 'Z', 'A', 'B', 'C', 'I', 'J', 'K', 'F', 'S', 'T', 'Q', 'R', 'L', 'H', 'D', 'P',
];

/// Parameters that are always written as integers
pub fn is_integer_param(letter: char) -> bool {
    matches!(letter, 'T' | 'H' | 'D' | 'S')
}

/// Format a number to a fixed count of decimals. Negative zero prints as zero.
pub fn format_number(value: f64, precision: usize) -> String {
    let text = format!("{:.*}", precision, value);
    match text.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => text,
    }
}

/// Magnitude of a quantity in the output unit system.
/// Lengths become mm or inches, feeds mm/min or in/min, angles degrees.
pub fn to_units(quantity: &Quantity, units: UnitSystem) -> f64 {
    match quantity {
        Quantity::Length(l) => match units {
            UnitSystem::Metric => l.get::<millimeter>(),
            UnitSystem::Imperial => l.get::<inch>(),
        },
        Quantity::Velocity(v) => {
            let per_minute = *v * Time::new::<minute>(1.0);
            match units {
                UnitSystem::Metric => per_minute.get::<millimeter>(),
                UnitSystem::Imperial => per_minute.get::<inch>(),
            }
        }
        Quantity::Angle(a) => a.get::<degree>(),
        Quantity::Number(n) => *n,
    }
}

/// Render one parameter word
pub fn format_word(letter: char, quantity: &Quantity, units: UnitSystem, precision: usize) -> String {
    let value = to_units(quantity, units);
    if is_integer_param(letter) {
        format!("{}{}", letter, value.trunc() as i64)
    } else {
        format!("{}{}", letter, format_number(value, precision))
    }
}

/// Join words with single spaces; never leaves trailing whitespace
pub fn join_words<S: AsRef<str>>(words: &[S]) -> String {
    let mut line = String::new();
    for word in words.iter().map(|w| w.as_ref()).filter(|w| !w.is_empty()) {
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    line
}

/// Split configured text (preamble, beam commands...) into output lines
pub fn text_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim_end).filter(|l| !l.is_empty())
}

/// Prefix every line with `N<n> `. Returns the next free number.
pub fn renumber(lines: Vec<String>, numbering: Numbering) -> (Vec<String>, u32) {
    let mut renumbered = Vec::with_capacity(lines.len());
    let mut line_num = numbering.start;
    for line in lines {
        renumbered.push(format!("N{} {}", line_num, line));
        line_num += numbering.step;
    }
    (renumbered, line_num)
}
