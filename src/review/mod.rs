//! Review hand-off and output persistence

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Buffers larger than this skip the editor
pub const MAX_REVIEW_BYTES: usize = 100_000;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("could not stage review file: {0}")]
    Io(#[from] std::io::Error),

    #[error("editor `{editor}` exited with {status}")]
    Editor { editor: String, status: String },
}

/// Gives a person the chance to edit the program before it is written
pub trait Reviewer {
    fn review(&self, buffer: String) -> Result<String, ReviewError>;
}

/// Hands the buffer back untouched
pub struct NoReview;

impl Reviewer for NoReview {
    fn review(&self, buffer: String) -> Result<String, ReviewError> {
        Ok(buffer)
    }
}

/// Opens the buffer in `$VISUAL` or `$EDITOR`
pub struct EditorReview {
    editor: String,
}

impl EditorReview {
    /// `None` when no editor is configured
    pub fn from_env() -> Option<Self> {
        std::env::var("VISUAL")
            .or_else(|_| std::env::var("EDITOR"))
            .ok()
            .filter(|e| !e.trim().is_empty())
            .map(|editor| Self { editor })
    }

    fn staging_path() -> PathBuf {
        std::env::temp_dir().join(format!("laserpost-{}.ngc", std::process::id()))
    }
}

impl Reviewer for EditorReview {
    fn review(&self, buffer: String) -> Result<String, ReviewError> {
        if buffer.len() > MAX_REVIEW_BYTES {
            info!(bytes = buffer.len(), "skipping editor review, program too large");
            return Ok(buffer);
        }

        let path = Self::staging_path();
        fs::write(&path, &buffer)?;
        debug!(editor = %self.editor, path = %path.display(), "opening editor");

        let mut words = self.editor.split_whitespace();
        let program = words.next().unwrap_or_default();
        let status = Command::new(program).args(words).arg(&path).status();

        let result = match status {
            Ok(status) if status.success() => fs::read_to_string(&path).map_err(ReviewError::from),
            Ok(status) => Err(ReviewError::Editor {
                editor: self.editor.clone(),
                status: status.to_string(),
            }),
            Err(e) => Err(ReviewError::Io(e)),
        };
        let _ = fs::remove_file(&path);
        result
    }
}

/// Write the final program. `-` means "no file"; the caller prints instead.
pub fn persist(buffer: &str, destination: &Path) -> Result<bool, ReviewError> {
    if destination == Path::new("-") {
        return Ok(false);
    }
    fs::write(destination, buffer)?;
    info!(path = %destination.display(), bytes = buffer.len(), "wrote program");
    Ok(true)
}
