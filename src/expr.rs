//! Expression and statement syntax understood by [`Bindings`](crate::eval::Bindings).

use std::collections::VecDeque;

use crate::error::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Mut,

    // Symbols
    EqEq,       // ==
    NotEq,      // !=
    Lt,         // <
    Le,         // <=
    Gt,         // >
    Ge,         // >=
    Assign,     // =
    PlusAssign, // +=
    MinusAssign,
    PlusPlus, // ++
    MinusMinus,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    AndAnd, // &&
    OrOr,   // ||
    Dot,
    Comma,
    LBracket,
    RBracket,
    LParen,
    RParen,

    // Data
    Ident(String),
    Int(i64),
    StringLit(String),
}

const SYMBOLS: &[(&str, Token)] = &[
    ("==", Token::EqEq),
    ("!=", Token::NotEq),
    ("<=", Token::Le),
    (">=", Token::Ge),
    ("+=", Token::PlusAssign),
    ("-=", Token::MinusAssign),
    ("++", Token::PlusPlus),
    ("--", Token::MinusMinus),
    ("&&", Token::AndAnd),
    ("||", Token::OrOr),
    ("<", Token::Lt),
    (">", Token::Gt),
    ("=", Token::Assign),
    ("+", Token::Plus),
    ("-", Token::Minus),
    ("*", Token::Star),
    ("/", Token::Slash),
    ("%", Token::Percent),
    ("!", Token::Bang),
    (".", Token::Dot),
    (",", Token::Comma),
    ("[", Token::LBracket),
    ("]", Token::RBracket),
    ("(", Token::LParen),
    (")", Token::RParen),
];

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, cursor: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn advance(&mut self, n: usize) {
        self.cursor += n;
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, EvalError> {
        let rest = self.remaining();
        let trimmed = rest.trim_start();
        self.advance(rest.len() - trimmed.len());

        let rest = self.remaining();
        let Some(first) = rest.chars().next() else {
            return Ok(None);
        };

        if first == '\'' || first == '"' {
            return self.string(first).map(Some);
        }

        if first.is_ascii_digit() {
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            let digits = &rest[..end];
            self.advance(digits.len());
            return digits
                .parse()
                .map(|n| Some(Token::Int(n)))
                .map_err(|_| EvalError::new(format!("integer literal {digits} is out of range")));
        }

        if first.is_alphabetic() || first == '_' {
            let ident: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            self.advance(ident.len());
            return Ok(Some(match ident.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "mut" => Token::Mut,
                _ => Token::Ident(ident),
            }));
        }

        for (symbol, token) in SYMBOLS {
            if rest.starts_with(symbol) {
                self.advance(symbol.len());
                return Ok(Some(token.clone()));
            }
        }

        Err(EvalError::new(format!("unexpected character '{first}'")))
    }

    fn string(&mut self, quote: char) -> Result<Token, EvalError> {
        let mut value = String::new();
        let mut chars = self.remaining()[1..].char_indices();
        while let Some((index, c)) = chars.next() {
            if c == quote {
                self.advance(index + 2);
                return Ok(Token::StringLit(value));
            }
            if c == '\\' {
                match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, escaped)) => value.push(escaped),
                    None => break,
                }
            } else {
                value.push(c);
            }
        }
        Err(EvalError::new("unterminated string literal"))
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokenizer = Tokenizer::new(input);
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    StringLit(String),
    IntLit(i64),
    BoolLit(bool),
    Null,
    Var(String),
    Array(Vec<Expr>),
    Attribute(Box<Expr>, String), // foo.bar
    Index(Box<Expr>, Box<Expr>),  // foo[0], foo['bar']
    Unary(UnaryOp, Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `[mut] name = value`, bound in the innermost scope.
    Declare { name: String, value: Expr },
    /// `name += value`, `name++` and friends; rewrites the nearest binding.
    Update { name: String, value: Expr },
}

pub fn parse_expression(input: &str) -> Result<Expr, EvalError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_expr()?;
    parser.finish()?;
    Ok(expr)
}

pub fn parse_statement(input: &str) -> Result<Statement, EvalError> {
    let mut parser = Parser::new(input)?;
    let statement = parser.parse_statement()?;
    parser.finish()?;
    Ok(statement)
}

/// Deepest nesting of parentheses, brackets and prefix operators accepted.
pub const MAX_NESTING: usize = 64;

pub struct Parser {
    buffer: VecDeque<Token>,
    depth: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, EvalError> {
        Ok(Self {
            buffer: tokenize(input)?.into(),
            depth: 0,
        })
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EvalError>,
    ) -> Result<T, EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::new(format!(
                "expression nests deeper than {MAX_NESTING} levels"
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn peek(&self, n: usize) -> Option<&Token> {
        self.buffer.get(n)
    }

    fn consume(&mut self) -> Option<Token> {
        self.buffer.pop_front()
    }

    fn expect(&mut self, token: Token) -> Result<(), EvalError> {
        match self.consume() {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(EvalError::new(format!("expected {token:?}, got {t:?}"))),
            None => Err(EvalError::new(format!("expected {token:?}, got end of input"))),
        }
    }

    fn finish(&self) -> Result<(), EvalError> {
        match self.peek(0) {
            None => Ok(()),
            Some(t) => Err(EvalError::new(format!("unexpected {t:?} after expression"))),
        }
    }

    pub fn parse_statement(&mut self) -> Result<Statement, EvalError> {
        if self.peek(0) == Some(&Token::Mut) {
            self.consume();
        }
        let name = match self.consume() {
            Some(Token::Ident(name)) => name,
            t => return Err(EvalError::new(format!("expected a variable name, got {t:?}"))),
        };
        let var = || Box::new(Expr::Var(name.clone()));
        let one = || Box::new(Expr::IntLit(1));
        let statement = match self.consume() {
            Some(Token::Assign) => Statement::Declare {
                value: self.parse_expr()?,
                name: name.clone(),
            },
            Some(Token::PlusAssign) => Statement::Update {
                value: Expr::BinOp(var(), BinOp::Add, Box::new(self.parse_expr()?)),
                name: name.clone(),
            },
            Some(Token::MinusAssign) => Statement::Update {
                value: Expr::BinOp(var(), BinOp::Sub, Box::new(self.parse_expr()?)),
                name: name.clone(),
            },
            Some(Token::PlusPlus) => Statement::Update {
                value: Expr::BinOp(var(), BinOp::Add, one()),
                name: name.clone(),
            },
            Some(Token::MinusMinus) => Statement::Update {
                value: Expr::BinOp(var(), BinOp::Sub, one()),
                name: name.clone(),
            },
            t => return Err(EvalError::new(format!("expected an assignment, got {t:?}"))),
        };
        Ok(statement)
    }

    pub fn parse_expr(&mut self) -> Result<Expr, EvalError> {
        self.nested(Self::parse_or)
    }

    fn binary(
        &mut self,
        operand: fn(&mut Self) -> Result<Expr, EvalError>,
        operator: fn(&Token) -> Option<BinOp>,
    ) -> Result<Expr, EvalError> {
        let mut lhs = operand(self)?;
        while let Some(op) = self.peek(0).and_then(operator) {
            self.consume();
            let rhs = operand(self)?;
            lhs = Expr::BinOp(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        self.binary(Self::parse_and, |t| match t {
            Token::Or | Token::OrOr => Some(BinOp::Or),
            _ => None,
        })
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        self.binary(Self::parse_eq, |t| match t {
            Token::And | Token::AndAnd => Some(BinOp::And),
            _ => None,
        })
    }

    fn parse_eq(&mut self) -> Result<Expr, EvalError> {
        self.binary(Self::parse_cmp, |t| match t {
            Token::EqEq => Some(BinOp::Eq),
            Token::NotEq => Some(BinOp::Ne),
            _ => None,
        })
    }

    fn parse_cmp(&mut self) -> Result<Expr, EvalError> {
        self.binary(Self::parse_add, |t| match t {
            Token::Lt => Some(BinOp::Lt),
            Token::Le => Some(BinOp::Le),
            Token::Gt => Some(BinOp::Gt),
            Token::Ge => Some(BinOp::Ge),
            _ => None,
        })
    }

    fn parse_add(&mut self) -> Result<Expr, EvalError> {
        self.binary(Self::parse_mul, |t| match t {
            Token::Plus => Some(BinOp::Add),
            Token::Minus => Some(BinOp::Sub),
            _ => None,
        })
    }

    fn parse_mul(&mut self) -> Result<Expr, EvalError> {
        self.binary(Self::parse_unary, |t| match t {
            Token::Star => Some(BinOp::Mul),
            Token::Slash => Some(BinOp::Div),
            Token::Percent => Some(BinOp::Rem),
            _ => None,
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        let op = match self.peek(0) {
            Some(Token::Bang | Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.parse_primary(),
        };
        self.consume();
        let operand = self.nested(Self::parse_unary)?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        let mut expr = match self.consume() {
            Some(Token::StringLit(s)) => Expr::StringLit(s),
            Some(Token::Int(n)) => Expr::IntLit(n),
            Some(Token::True) => Expr::BoolLit(true),
            Some(Token::False) => Expr::BoolLit(false),
            Some(Token::Null) => Expr::Null,
            Some(Token::Ident(s)) => Expr::Var(s),
            Some(Token::LParen) => {
                let e = self.parse_expr()?;
                self.expect(Token::RParen)?;
                e
            }
            Some(Token::LBracket) => Expr::Array(self.parse_elements()?),
            t => return Err(EvalError::new(format!("expected expression, got {t:?}"))),
        };

        // Suffixes: .attr, [index]
        loop {
            match self.peek(0) {
                Some(Token::Dot) => {
                    self.consume();
                    match self.consume() {
                        Some(Token::Ident(attr)) => {
                            expr = Expr::Attribute(Box::new(expr), attr);
                        }
                        t => {
                            return Err(EvalError::new(format!(
                                "expected identifier after dot, got {t:?}"
                            )))
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.consume();
                    let idx = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(idx));
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_elements(&mut self) -> Result<Vec<Expr>, EvalError> {
        let mut elements = Vec::new();
        loop {
            if self.peek(0) == Some(&Token::RBracket) {
                self.consume();
                return Ok(elements);
            }
            elements.push(self.parse_expr()?);
            match self.consume() {
                Some(Token::Comma) => {}
                Some(Token::RBracket) => return Ok(elements),
                t => return Err(EvalError::new(format!("expected ',' or ']', got {t:?}"))),
            }
        }
    }
}
