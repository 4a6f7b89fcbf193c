use serde::{Deserialize, Serialize};

/// A lexing or parsing failure, located by source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ScriptError {
    pub line: u32,
    pub message: String,
}

impl ScriptError {
    pub fn lex(line: u32, message: impl Into<String>) -> Self {
        ScriptError {
            line,
            message: message.into(),
        }
    }

    pub fn parse(line: u32, message: impl Into<String>) -> Self {
        ScriptError {
            line,
            message: message.into(),
        }
    }
}
