//! Cleanup post-processor
//!
//! For text that is already laser G-code: drops repeated lines and moves that
//! go nowhere, but leaves beam commands and tool handling alone.

use crate::codegen::GCodeOutput;
use crate::config::Config;
use crate::post::laser::{Engine, Pass};
use crate::post::{PostProcessor, Processed};

pub struct CleanupPost<'c> {
    config: &'c Config,
}

impl<'c> CleanupPost<'c> {
    pub fn new(config: &'c Config) -> Self {
        Self { config }
    }
}

impl PostProcessor for CleanupPost<'_> {
    fn process(&self, input: &GCodeOutput) -> Processed {
        Engine::new(self.config, Pass::Cleanup).run(input)
    }

    fn name(&self) -> &str {
        "Cleanup"
    }
}
