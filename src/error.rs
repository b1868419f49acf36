use std::{error::Error, fmt::Display};

/// File, line, and column a diagnostic or AST node points at. Lines and
/// columns are 1-based; a default location has an empty file name and is
/// rendered without position info.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}:{}:{}", self.file, self.line, self.column))
    }
}

/// A terminal diagnostic. Every pass reports failures through this type;
/// there is no recovery after resolution has started.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub message: String,
    pub location: SourceLocation,
}

impl CompileError {
    pub fn new(message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }

    /// Format for stderr: `Error at file:line:col: message`, dropping the
    /// position when the location is unknown.
    pub fn report(&self) -> String {
        if self.location.file.is_empty() {
            format!("Error: {}", self.message)
        } else {
            format!("Error at {}: {}", self.location, self.message)
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.location.file.is_empty() {
            f.write_str(&self.message)
        } else {
            f.write_fmt(format_args!("{} ({})", self.message, self.location))
        }
    }
}

impl Error for CompileError {}

pub type CompileResult<T> = Result<T, CompileError>;
