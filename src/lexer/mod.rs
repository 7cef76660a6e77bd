use logos::Logos;
use std::ops::Range;

/// Tokens of a single G-code command line.
/// A word is a letter followed by everything up to the next whitespace.

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\f\r]+")] // Skip whitespace
#[logos(error = LexerError)]
pub enum Token<'a> {
    #[regex(r"[A-Za-z][^\s]*", |lex| lex.slice())]
    Word(&'a str),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LexerError;

impl std::fmt::Display for LexerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lexer error")
    }
}

impl std::error::Error for LexerError {}

/// Motion modes the laser cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionMode {
    Rapid,  // G0
    Linear, // G1
    ArcCw,  // G2
    ArcCcw, // G3
}

impl MotionMode {
    pub fn is_feed(self) -> bool {
        !matches!(self, MotionMode::Rapid)
    }

    pub fn is_arc(self) -> bool {
        matches!(self, MotionMode::ArcCw | MotionMode::ArcCcw)
    }

    pub fn code(self) -> &'static str {
        match self {
            MotionMode::Rapid => "G0",
            MotionMode::Linear => "G1",
            MotionMode::ArcCw => "G2",
            MotionMode::ArcCcw => "G3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Comment,
    Motion(MotionMode),
    ToolChange,
    /// M3/M4
    SpindleOn,
    /// M5
    SpindleOff,
    /// G43
    ToolLengthOffset,
    Other,
}

/// One parameter word as it appeared on the line
#[derive(Debug, Clone, PartialEq)]
pub struct Word<'a> {
    pub letter: char,
    pub value: &'a str,
    pub span: Range<usize>,
}

impl Word<'_> {
    fn code(&self) -> Option<u32> {
        self.value.parse().ok()
    }

    pub fn is(&self, letter: char, code: u32) -> bool {
        self.letter == letter && self.code() == Some(code)
    }
}

impl std::fmt::Display for Word<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.letter, self.value)
    }
}

/// A token that could not be used, with its byte span inside the line
#[derive(Debug, Clone, PartialEq)]
pub struct Malformed {
    pub span: Range<usize>,
    pub message: String,
}

/// A classified line: the leading command word plus its parameters
#[derive(Debug, Clone, PartialEq)]
pub struct TokenLine<'a> {
    pub kind: LineKind,
    /// Leading `N` word, if the line was already numbered
    pub line_number: Option<&'a str>,
    pub command: Option<Word<'a>>,
    /// Parameters after the command word, one per letter
    pub params: Vec<Word<'a>>,
    pub malformed: Vec<Malformed>,
}

impl<'a> TokenLine<'a> {
    pub fn get(&self, letter: char) -> Option<&Word<'a>> {
        self.params.iter().find(|w| w.letter == letter)
    }

    pub fn has(&self, letter: char) -> bool {
        self.get(letter).is_some()
    }

    pub fn is_comment(&self) -> bool {
        self.kind == LineKind::Comment
    }

    /// Every word on the line, command first
    pub fn words(&self) -> impl Iterator<Item = &Word<'a>> {
        self.command.iter().chain(self.params.iter())
    }

    /// Rebuild the line from its words, single-space separated
    pub fn to_text(&self) -> String {
        self.words()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Classify one line of G-code
pub fn classify(line: &str) -> TokenLine<'_> {
    if line.contains('(') || line.contains(')') {
        return TokenLine {
            kind: LineKind::Comment,
            line_number: None,
            command: None,
            params: Vec::new(),
            malformed: Vec::new(),
        };
    }

    let mut words: Vec<Word> = Vec::new();
    let mut malformed = Vec::new();

    for (result, span) in Token::lexer(line).spanned() {
        match result {
            Ok(Token::Word(text)) => {
                let mut chars = text.chars();
                let letter = chars.next().map(|c| c.to_ascii_uppercase());
                let value = chars.as_str();
                match letter {
                    Some(letter) if !value.is_empty() => words.push(Word { letter, value, span }),
                    _ => malformed.push(Malformed {
                        span,
                        message: format!("word `{}` has no value", text),
                    }),
                }
            }
            Err(_) => malformed.push(Malformed {
                message: format!("unexpected `{}`", &line[span.clone()]),
                span,
            }),
        }
    }

    let mut iter = words.into_iter().peekable();
    let line_number = match iter.peek() {
        Some(w) if w.letter == 'N' && w.code().is_some() => iter.next().map(|w| w.value),
        _ => None,
    };
    // Bare axis words continue the active motion mode and carry no command
    let command = match iter.peek() {
        Some(w) if matches!(w.letter, 'G' | 'M' | 'T') => iter.next(),
        _ => None,
    };

    let mut params: Vec<Word> = Vec::new();
    for word in iter {
        // G and M words may legitimately repeat (one per modal group).
        // Any other letter: last occurrence wins.
        let repeatable = matches!(word.letter, 'G' | 'M');
        match params
            .iter_mut()
            .find(|p| !repeatable && p.letter == word.letter)
        {
            Some(existing) => *existing = word,
            None => params.push(word),
        }
    }

    let kind = match &command {
        Some(c) if c.is('G', 0) => LineKind::Motion(MotionMode::Rapid),
        Some(c) if c.is('G', 1) => LineKind::Motion(MotionMode::Linear),
        Some(c) if c.is('G', 2) => LineKind::Motion(MotionMode::ArcCw),
        Some(c) if c.is('G', 3) => LineKind::Motion(MotionMode::ArcCcw),
        Some(c) if c.is('M', 6) => LineKind::ToolChange,
        Some(c) if c.is('M', 3) || c.is('M', 4) => LineKind::SpindleOn,
        Some(c) if c.is('M', 5) => LineKind::SpindleOff,
        Some(c) if c.is('G', 43) => LineKind::ToolLengthOffset,
        _ => LineKind::Other,
    };

    TokenLine {
        kind,
        line_number,
        command,
        params,
        malformed,
    }
}
