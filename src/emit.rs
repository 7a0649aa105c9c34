//! Lowers a syntax tree into a [`Procedure`].
//!
//! Text is materialized here, once. The two emission variants share one walk;
//! everything that differs between them lives in the [`Mode`] methods.

use crate::ast::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Plain,
    /// Threads the caller's indentation through every emitted line break.
    WhitespaceAware,
}

impl Mode {
    fn text(self, text: &str) -> Op {
        Op::Text {
            indent: self == Mode::WhitespaceAware && text.contains('\n'),
            text: text.to_string(),
        }
    }

    fn expression(self, expression: &str) -> Op {
        Op::Render {
            indent: self == Mode::WhitespaceAware,
            expression: expression.to_string(),
        }
    }

    fn call_indent(self, leading: Option<&str>) -> CallIndent {
        CallIndent {
            ambient: self == Mode::WhitespaceAware,
            extra: leading.unwrap_or_default().to_string(),
        }
    }
}

/// Indentation handed to a called template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallIndent {
    /// Prefix with the caller's own ambient indentation.
    pub ambient: bool,
    /// Whitespace captured in front of the call.
    pub extra: String,
}

impl CallIndent {
    pub fn is_none(&self) -> bool {
        !self.ambient && self.extra.is_empty()
    }

    pub fn resolve(&self, ambient: &str) -> String {
        if self.ambient {
            format!("{ambient}{}", self.extra)
        } else {
            self.extra.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub condition: String,
    pub body: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Literal output; `indent` re-indents after each line break.
    Text { text: String, indent: bool },
    Render { expression: String, indent: bool },
    Declare(String),
    Call {
        name: String,
        arguments: Vec<String>,
        indent: CallIndent,
    },
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Op>>,
    },
    For { header: String, body: Vec<Op> },
    Foreach { header: String, body: Vec<Op> },
    While { condition: String, body: Vec<Op> },
    Break,
    Continue,
    Return,
}

/// A compiled rendering procedure. Immutable and freely shareable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procedure {
    pub mode: Mode,
    pub ops: Vec<Op>,
}

pub fn emit(syntax: &[Syntax], source: &str, mode: Mode) -> Procedure {
    let emitter = Emitter { source, mode };
    Procedure {
        mode,
        ops: emitter.block(syntax),
    }
}

struct Emitter<'s> {
    source: &'s str,
    mode: Mode,
}

impl Emitter<'_> {
    fn text(&self, span: Span) -> String {
        span.text(self.source).to_string()
    }

    fn block(&self, nodes: &[Syntax]) -> Vec<Op> {
        nodes.iter().filter_map(|node| self.node(node)).collect()
    }

    fn node(&self, node: &Syntax) -> Option<Op> {
        let op = match node {
            Syntax::RawText(span) => self.mode.text(span.text(self.source)),
            Syntax::RenderableExpression(span) => self.mode.expression(span.text(self.source)),
            Syntax::VarStatement(span) => Op::Declare(self.text(*span)),
            Syntax::CallStatement(call) => Op::Call {
                name: self.text(call.name),
                arguments: call.parameters.iter().map(|p| self.text(*p)).collect(),
                indent: self
                    .mode
                    .call_indent(call.leading_whitespace.map(|s| s.text(self.source))),
            },
            Syntax::IfStatement(statement) => {
                let mut branches = vec![Branch {
                    condition: self.text(statement.condition),
                    body: self.block(&statement.body),
                }];
                branches.extend(statement.else_ifs.iter().map(|else_if| Branch {
                    condition: self.text(else_if.condition),
                    body: self.block(&else_if.body),
                }));
                Op::If {
                    branches,
                    otherwise: statement
                        .else_branch
                        .as_ref()
                        .map(|else_branch| self.block(&else_branch.body)),
                }
            }
            Syntax::ForStatement(statement) => Op::For {
                header: self.text(statement.condition),
                body: self.block(&statement.body),
            },
            Syntax::ForeachStatement(statement) => Op::Foreach {
                header: self.text(statement.condition),
                body: self.block(&statement.body),
            },
            Syntax::WhileStatement(statement) => Op::While {
                condition: self.text(statement.condition),
                body: self.block(&statement.body),
            },
            Syntax::BreakStatement => Op::Break,
            Syntax::ContinueStatement => Op::Continue,
            Syntax::ReturnStatement => Op::Return,
            Syntax::NoOp => return None,
        };
        Some(op)
    }
}
