//! Front-end friendly summaries of operation results.

use std::fmt;

use crate::RepoResult;

/// Structured result handed to front ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    /// `(succeeded, failed)` for operations over several entries.
    pub counts: Option<(usize, usize)>,
}

impl Outcome {
    /// A successful single-item outcome.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            counts: None,
        }
    }

    /// A failed single-item outcome.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            counts: None,
        }
    }

    /// Converts any operation result, using `describe` for the success text.
    pub fn from_result<T>(result: &RepoResult<T>, describe: impl FnOnce(&T) -> String) -> Self {
        match result {
            Ok(value) => Self::ok(describe(value)),
            Err(e) => Self::failed(e.to_string()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some((succeeded, failed)) = self.counts {
            write!(f, " ({succeeded} succeeded, {failed} failed)")?;
        }
        Ok(())
    }
}
