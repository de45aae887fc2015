//! Error types for compilation and execution.
//!
//! Three stages can fail, and each gets its own shape:
//!
//! - **Lexing** is fatal on the first bad character or unterminated string;
//!   a [`Error::Lex`] carries the line it happened on.
//! - **Parsing** is sticky: the compiler records a [`Diagnostic`] per error,
//!   recovers, and keeps going so one run surfaces as many problems as
//!   possible. If any were recorded the whole script is rejected with
//!   [`Error::Compile`].
//! - **Runtime** faults terminate execution immediately with a
//!   [`RuntimeError`] describing the failure.

use std::fmt;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A single compile-time diagnostic, tied to the token that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based source line of the offending token.
    pub line: usize,
    /// The offending token's text; empty for end of input.
    pub lexeme: String,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lexeme.is_empty() {
            write!(f, "[line {}] Error at end: {}", self.line, self.message)
        } else {
            write!(
                f,
                "[line {}] Error at '{}': {}",
                self.line, self.lexeme, self.message
            )
        }
    }
}

/// Everything the parser collected before giving up on the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileErrors(pub Vec<Diagnostic>);

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}

/// Top-level error type returned by the public entry points.
#[derive(Debug, Error, PartialEq)]
pub enum Error {
    /// The lexer hit input it cannot tokenize. Always fatal.
    #[error("[line {line}] Error: {message}")]
    Lex { line: usize, message: String },

    /// One or more parse errors; the script compiles to no program.
    #[error("{0}")]
    Compile(CompileErrors),

    /// Execution aborted.
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

/// Faults that terminate bytecode execution.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    #[error("pop from empty stack")]
    StackUnderflow,

    #[error("call stack overflow")]
    FrameOverflow,

    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("expected {expected}, found {got}")]
    Type {
        expected: &'static str,
        got: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("undefined global '{0}'")]
    UndefinedGlobal(String),

    #[error("undefined field '{0}'")]
    UndefinedField(String),

    #[error("undefined method '{0}'")]
    UndefinedMethod(String),

    #[error("can only call functions, builtins, and struct templates")]
    NotCallable,

    #[error("expected {expected} arguments but got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("output error: {0}")]
    Io(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_formats_with_lexeme_and_at_end() {
        let with_lexeme = Diagnostic {
            line: 3,
            lexeme: "=".to_string(),
            message: "Invalid assignment target.".to_string(),
        };
        assert_eq!(
            with_lexeme.to_string(),
            "[line 3] Error at '=': Invalid assignment target."
        );

        let at_end = Diagnostic {
            line: 7,
            lexeme: String::new(),
            message: "Expected '}' after block.".to_string(),
        };
        assert_eq!(
            at_end.to_string(),
            "[line 7] Error at end: Expected '}' after block."
        );
    }

    #[test]
    fn compile_errors_join_one_per_line() {
        let errors = CompileErrors(vec![
            Diagnostic {
                line: 1,
                lexeme: "a".to_string(),
                message: "Undefined variable 'a'.".to_string(),
            },
            Diagnostic {
                line: 2,
                lexeme: "b".to_string(),
                message: "Undefined variable 'b'.".to_string(),
            },
        ]);
        let text = errors.to_string();
        assert_eq!(text.lines().count(), 2);
    }
}
