//! Post-processors for laser G-code output
//!
//! The generic generator knows nothing about lasers. These passes rewrite its
//! output so that a binary beam follows the motion type.

use crate::codegen::GCodeOutput;
use crate::config::Config;
use std::ops::Range;

pub mod beam;
pub mod cleanup;
pub mod filter;
pub mod laser;
pub mod state;

/// Post-processor trait - implemented for each pass
pub trait PostProcessor {
    /// Rewrite a whole G-code document
    fn process(&self, input: &GCodeOutput) -> Processed;

    /// Pass name
    fn name(&self) -> &str;
}

/// Result of a pass: the document plus warnings about its input
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    pub output: GCodeOutput,
    pub diagnostics: Vec<Diagnostic>,
}

/// A malformed token. The line is still processed without it.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// 1-based input line
    pub line: usize,
    /// Byte range within the whole input document
    pub span: Range<usize>,
    pub message: String,
}

/// Available post-processors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PostProcessorType {
    Laser,   // Full beam rewrite (default)
    Cleanup, // Filters only, for text that is already laser G-code
}

impl PostProcessorType {
    /// Get the post-processor implementation
    pub fn get_processor<'c>(&self, config: &'c Config) -> Box<dyn PostProcessor + 'c> {
        match self {
            PostProcessorType::Laser => Box::new(laser::LaserPost::new(config)),
            PostProcessorType::Cleanup => Box::new(cleanup::CleanupPost::new(config)),
        }
    }
}
