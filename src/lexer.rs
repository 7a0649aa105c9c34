use std::fmt;
use std::ops::Range;

/// A location in the template source.
///
/// `line` and `column` are 1-based and count characters; `offset` is the
/// 0-based byte offset. [`CharPosition::EMPTY`] marks end of file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharPosition {
    pub line: usize,
    pub column: usize,
    pub offset: isize,
}

impl CharPosition {
    pub const EMPTY: CharPosition = CharPosition {
        line: 0,
        column: 0,
        offset: -1,
    };

    pub fn new(line: usize, column: usize, offset: isize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

/// Delimiter family of a block token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// `{{ ... }}`
    Output,
    /// `{% ... %}`
    Directive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Eof,
    Whitespace,
    Newline,
    Raw,
    OutputEnter,        // {{
    OutputExit,         // }}
    OutputTrimEnter,    // {{-
    OutputTrimExit,     // -}}
    DirectiveEnter,     // {%
    DirectiveExit,      // %}
    DirectiveTrimEnter, // {%-
    DirectiveTrimExit,  // -%}
}

impl TokenType {
    /// Tokens that make up literal text between blocks.
    pub fn is_text(self) -> bool {
        matches!(self, Self::Raw | Self::Whitespace | Self::Newline)
    }

    pub fn is_enter(self) -> bool {
        matches!(
            self,
            Self::OutputEnter
                | Self::OutputTrimEnter
                | Self::DirectiveEnter
                | Self::DirectiveTrimEnter
        )
    }

    pub fn is_exit(self) -> bool {
        matches!(
            self,
            Self::OutputExit | Self::OutputTrimExit | Self::DirectiveExit | Self::DirectiveTrimExit
        )
    }

    pub fn is_trim(self) -> bool {
        matches!(
            self,
            Self::OutputTrimEnter
                | Self::OutputTrimExit
                | Self::DirectiveTrimEnter
                | Self::DirectiveTrimExit
        )
    }

    pub fn family(self) -> Option<Family> {
        match self {
            Self::OutputEnter | Self::OutputExit | Self::OutputTrimEnter | Self::OutputTrimExit => {
                Some(Family::Output)
            }
            Self::DirectiveEnter
            | Self::DirectiveExit
            | Self::DirectiveTrimEnter
            | Self::DirectiveTrimExit => Some(Family::Directive),
            _ => None,
        }
    }

    /// The plain delimiter of the same family and direction.
    pub fn untrimmed(self) -> Self {
        match self {
            Self::OutputTrimEnter => Self::OutputEnter,
            Self::OutputTrimExit => Self::OutputExit,
            Self::DirectiveTrimEnter => Self::DirectiveEnter,
            Self::DirectiveTrimExit => Self::DirectiveExit,
            other => other,
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A lexed token covering the inclusive character range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    pub start: CharPosition,
    pub end: CharPosition,
    pub kind: TokenType,
}

impl Token {
    pub const EOF: Token = Token {
        start: CharPosition::EMPTY,
        end: CharPosition::EMPTY,
        kind: TokenType::Eof,
    };

    pub fn new(start: CharPosition, end: CharPosition, kind: TokenType) -> Self {
        Self { start, end, kind }
    }

    /// Byte range of this token in `source`. Empty for `Eof`.
    pub fn byte_range(&self, source: &str) -> Range<usize> {
        if self.kind == TokenType::Eof || self.start.offset < 0 || self.end.offset < 0 {
            return 0..0;
        }
        let start = self.start.offset as usize;
        let last = self.end.offset as usize;
        let width = source
            .get(last..)
            .and_then(|tail| tail.chars().next())
            .map_or(0, char::len_utf8);
        start..last + width
    }

    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.byte_range(source)).unwrap_or("")
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}:{}-{}:{})",
            self.kind, self.start.line, self.start.column, self.end.line, self.end.column
        )
    }
}

// Longest literal first within each family.
const DELIMITERS: [(&str, TokenType); 8] = [
    ("{{-", TokenType::OutputTrimEnter),
    ("{{", TokenType::OutputEnter),
    ("-}}", TokenType::OutputTrimExit),
    ("}}", TokenType::OutputExit),
    ("{%-", TokenType::DirectiveTrimEnter),
    ("{%", TokenType::DirectiveEnter),
    ("-%}", TokenType::DirectiveTrimExit),
    ("%}", TokenType::DirectiveExit),
];

fn delimiter_at(rest: &str) -> Option<(&'static str, TokenType)> {
    DELIMITERS
        .iter()
        .copied()
        .find(|(literal, _)| rest.starts_with(literal))
}

fn newline_at(rest: &str) -> Option<usize> {
    if rest.starts_with("\r\n") {
        Some(2)
    } else if rest.starts_with('\n') {
        Some(1)
    } else {
        None
    }
}

/// Splits a template into a flat token stream terminated by one `Eof`.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokenizer = Tokenizer::new(text);
    let mut tokens = Vec::new();
    while let Some(token) = tokenizer.next_token() {
        tokens.push(token);
    }
    tokens.push(Token::EOF);
    tokens
}

#[derive(Clone)]
pub struct Tokenizer<'a> {
    input: &'a str,
    cursor: usize,
    line: usize,
    column: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            cursor: 0,
            line: 1,
            column: 1,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.cursor..]
    }

    fn position(&self) -> CharPosition {
        CharPosition::new(self.line, self.column, self.cursor as isize)
    }

    /// Consumes `len` bytes as one token on the current line.
    fn advance(&mut self, len: usize, kind: TokenType) -> Token {
        let text = &self.input[self.cursor..self.cursor + len];
        let (last, count) = text
            .char_indices()
            .fold((0usize, 0usize), |(_, count), (index, _)| (index, count + 1));
        let start = self.position();
        let end = CharPosition::new(
            self.line,
            self.column + count.saturating_sub(1),
            (self.cursor + last) as isize,
        );
        self.cursor += len;
        self.column += count;
        Token::new(start, end, kind)
    }

    pub fn next_token(&mut self) -> Option<Token> {
        let rest = self.remaining();
        if rest.is_empty() {
            return None;
        }

        if let Some(len) = newline_at(rest) {
            let token = self.advance(len, TokenType::Newline);
            self.line += 1;
            self.column = 1;
            return Some(token);
        }

        if let Some((literal, kind)) = delimiter_at(rest) {
            return Some(self.advance(literal.len(), kind));
        }

        // Whitespace run, stopping before a newline sequence.
        let mut len = 0;
        for (index, c) in rest.char_indices() {
            if !c.is_whitespace() || newline_at(&rest[index..]).is_some() {
                break;
            }
            len = index + c.len_utf8();
        }
        if len > 0 {
            return Some(self.advance(len, TokenType::Whitespace));
        }

        // Raw run, stopping before whitespace or any delimiter literal.
        for (index, c) in rest.char_indices() {
            if c.is_whitespace() || delimiter_at(&rest[index..]).is_some() {
                break;
            }
            len = index + c.len_utf8();
        }
        Some(self.advance(len, TokenType::Raw))
    }
}
