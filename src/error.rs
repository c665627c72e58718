use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Subset of the XPath error vocabulary raised by this engine.
///
/// `XPST` codes are static, `XPDY` dynamic, `XPTY` type errors, `FO` codes
/// come from the functions-and-operators namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Syntax error while lexing or parsing.
    XPST0003,
    /// Reference to an undefined variable.
    XPST0008,
    /// Unsupported axis.
    XPST0010,
    /// Unknown function name, or no signature with the given arity.
    XPST0017,
    /// Operand type or cardinality mismatch.
    XPTY0004,
    /// Axis step evaluated against a non-node context item.
    XPTY0020,
    /// A required dynamic context component is absent.
    XPDY0002,
    /// Integer or decimal division by zero.
    FOAR0001,
    /// Numeric operation overflow or out of range.
    FOAR0002,
    /// Invalid lexical value in a cast.
    FOCA0002,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Structured query error: a code from the XPath vocabulary, a human
/// message, and (for lex/parse errors) the source offset. Every error
/// aborts the whole query.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("{code}: {message} (at offset {offset})")]
    Syntax {
        code: ErrorCode,
        message: String,
        offset: usize,
    },

    #[error("{code}: {message}")]
    Eval { code: ErrorCode, message: String },
}

impl Error {
    pub(crate) fn lex(offset: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            code: ErrorCode::XPST0003,
            message: message.into(),
            offset,
        }
    }

    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            code: ErrorCode::XPST0003,
            message: message.into(),
            offset,
        }
    }

    pub(crate) fn eval(code: ErrorCode, message: impl Into<String>) -> Self {
        Error::Eval {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Syntax { code, .. } | Error::Eval { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Syntax { message, .. } | Error::Eval { message, .. } => message,
        }
    }

    /// Source offset of the offending input, for lex and parse errors.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::Syntax { offset, .. } => Some(*offset),
            Error::Eval { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code_message_and_offset() {
        let err = Error::lex(3, "unterminated string literal");
        assert_eq!(
            err.to_string(),
            "XPST0003: unterminated string literal (at offset 3)"
        );

        let err = Error::eval(ErrorCode::FOAR0001, "division by zero");
        assert_eq!(err.to_string(), "FOAR0001: division by zero");
    }
}
