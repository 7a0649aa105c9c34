use std::fmt;

use crate::lexer::Token;

/// Half-open byte range into the template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Span from the first byte of `first` to the last byte of `last`.
    pub fn covering(first: &Token, last: &Token, source: &str) -> Self {
        let start = first.byte_range(source).start;
        let end = last.byte_range(source).end.max(start);
        Self { start, end }
    }

    pub fn text(self, source: &str) -> &str {
        source.get(self.start..self.end).unwrap_or("")
    }

    pub fn is_empty(self) -> bool {
        self.start >= self.end
    }

    /// Narrows the span to exclude surrounding whitespace.
    pub fn trim(self, source: &str) -> Self {
        let text = self.text(source);
        let leading = text.len() - text.trim_start().len();
        let trailing = text.len() - text.trim_end().len();
        if leading == text.len() {
            return Self::new(self.start, self.start);
        }
        Self::new(self.start + leading, self.end - trailing)
    }
}

/// Directive keywords recognised as the first identifier of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Var,
    Call,
    If,
    ElseIf,
    Else,
    For,
    Foreach,
    While,
    Break,
    Continue,
    Return,
    End,
}

impl Keyword {
    pub fn lookup(identifier: &str) -> Option<Self> {
        Some(match identifier {
            "var" => Self::Var,
            "call" => Self::Call,
            "if" => Self::If,
            "elseif" => Self::ElseIf,
            "else" => Self::Else,
            "for" => Self::For,
            "foreach" => Self::Foreach,
            "while" => Self::While,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "return" => Self::Return,
            "end" => Self::End,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Var => "var",
            Self::Call => "call",
            Self::If => "if",
            Self::ElseIf => "elseif",
            Self::Else => "else",
            Self::For => "for",
            Self::Foreach => "foreach",
            Self::While => "while",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Return => "return",
            Self::End => "end",
        }
    }

    /// Keywords that close or continue an open body.
    pub fn is_terminator(self) -> bool {
        matches!(self, Self::ElseIf | Self::Else | Self::End)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatement {
    pub name: Span,
    pub parameters: Vec<Span>,
    /// Indentation of the line the call sits on, if nothing else precedes it.
    pub leading_whitespace: Option<Span>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalStatement {
    pub condition: Span,
    pub body: Vec<Syntax>,
}

pub type ElseIfStatement = ConditionalStatement;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElseStatement {
    pub body: Vec<Syntax>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfStatement {
    pub condition: Span,
    pub body: Vec<Syntax>,
    pub else_ifs: Vec<ElseIfStatement>,
    pub else_branch: Option<ElseStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Syntax {
    RawText(Span),
    RenderableExpression(Span),
    VarStatement(Span),
    CallStatement(CallStatement),
    IfStatement(IfStatement),
    ForStatement(ConditionalStatement),
    ForeachStatement(ConditionalStatement),
    WhileStatement(ConditionalStatement),
    BreakStatement,
    ContinueStatement,
    ReturnStatement,
    NoOp,
}

pub type SyntaxList = Vec<Syntax>;
