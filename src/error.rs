use thiserror::Error;

use crate::lexer::{Token, TokenType};

/// A malformed template. Compilation stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", describe(.token, .value, .reason))]
pub struct ParseError {
    /// Offending token; `Eof` when the input ran out.
    pub token: Token,
    /// Source text of `token`.
    pub value: String,
    pub reason: String,
}

impl ParseError {
    pub fn new(token: Token, source: &str, reason: impl Into<String>) -> Self {
        Self {
            token,
            value: token.text(source).to_string(),
            reason: reason.into(),
        }
    }

    pub fn line(&self) -> usize {
        self.token.start.line
    }

    pub fn column(&self) -> usize {
        self.token.start.column
    }

    pub fn is_at_eof(&self) -> bool {
        self.token.kind == TokenType::Eof
    }
}

fn describe(token: &Token, value: &str, reason: &str) -> String {
    if token.kind == TokenType::Eof {
        return format!("Parse error at end of file: {reason}");
    }
    format!(
        "Parse error at {}:{} ({}): {} (value: '{}')",
        token.start.line, token.start.column, token.kind, reason, value
    )
}

/// Failure reported by an [`Evaluator`](crate::runtime::Evaluator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct EvalError(pub String);

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to evaluate '{expression}': {source}")]
    Eval {
        expression: String,
        #[source]
        source: EvalError,
    },

    #[error("template '{0}' is not defined")]
    UnknownTemplate(String),

    #[error("template '{name}' takes {expected} parameters but {found} were given")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("malformed {keyword} header '{header}'")]
    LoopHeader {
        keyword: &'static str,
        header: String,
    },

    #[error("loop exceeded {limit} iterations")]
    LoopLimit { limit: usize },

    #[error("'{0}' used outside of a loop")]
    StrayControl(&'static str),

    #[error("template calls nested deeper than {limit}")]
    CallDepth { limit: usize },
}

/// Any failure of the one-shot [`render`](crate::render) helper.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}
