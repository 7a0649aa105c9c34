use std::ops::Range;

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Family, Token, TokenType};

pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Parses a (suppressed) token stream into a syntax tree.
pub fn parse(tokens: &[Token], source: &str) -> Result<SyntaxList, ParseError> {
    Parser::new(tokens, source).parse()
}

/// One `{{ ... }}` or `{% ... %}` block, as token indices.
#[derive(Debug, Clone, Copy)]
struct Block {
    enter: usize,
    exit: usize,
    identifier: usize,
    raw_count: usize,
    keyword: Option<Keyword>,
}

impl Block {
    fn is_only_identifier(&self) -> bool {
        self.raw_count == 1
    }
}

struct Body {
    nodes: SyntaxList,
    terminator: Option<Block>,
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    source: &'a str,
    index: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], source: &'a str) -> Self {
        Self {
            tokens,
            source,
            index: 0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn parse(mut self) -> Result<SyntaxList, ParseError> {
        self.index = 0;
        let body = self.parse_body(0, false)?;
        Ok(body.nodes)
    }

    fn peek(&self) -> Token {
        self.token(self.index)
    }

    fn token(&self, index: usize) -> Token {
        self.tokens.get(index).copied().unwrap_or(Token::EOF)
    }

    fn consume(&mut self) -> Token {
        let token = self.peek();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn error(&self, index: usize, reason: impl Into<String>) -> ParseError {
        ParseError::new(self.token(index), self.source, reason)
    }

    fn parse_body(&mut self, depth: usize, open: bool) -> Result<Body, ParseError> {
        let mut nodes = SyntaxList::new();
        loop {
            let token = self.peek();
            match token.kind {
                TokenType::Eof => {
                    if open {
                        return Err(self.error(
                            self.index,
                            "unexpected end of file, expected an end block",
                        ));
                    }
                    return Ok(Body {
                        nodes,
                        terminator: None,
                    });
                }
                kind if kind.is_text() => nodes.push(self.parse_raw_text()),
                kind if kind.is_exit() => {
                    return Err(self.error(
                        self.index,
                        "block exit token found without a matching block entry",
                    ));
                }
                _ => {
                    let block = self.scan_block()?;
                    log::trace!(
                        "block {:?} at {}",
                        block.keyword,
                        self.token(block.identifier)
                    );
                    match block.keyword {
                        Some(keyword) if keyword.is_terminator() && open => {
                            if keyword != Keyword::ElseIf {
                                self.ensure_only_identifier(&block, keyword)?;
                            }
                            return Ok(Body {
                                nodes,
                                terminator: Some(block),
                            });
                        }
                        keyword => {
                            let node = self.statement(&block, keyword, depth, nodes.last())?;
                            nodes.push(node);
                        }
                    }
                }
            }
        }
    }

    fn parse_raw_text(&mut self) -> Syntax {
        let first = self.consume();
        let mut last = first;
        while self.peek().kind.is_text() {
            last = self.consume();
        }
        Syntax::RawText(Span::covering(&first, &last, self.source))
    }

    /// Consumes one block up to and including its exit token.
    fn scan_block(&mut self) -> Result<Block, ParseError> {
        let enter = self.index;
        let family = self.consume().kind.family();
        let mut identifier = None;
        let mut raw_count = 0;
        let mut exit = None;

        loop {
            let token = self.peek();
            if token.kind == TokenType::Eof {
                break;
            }
            if token.kind.is_exit() {
                if token.kind.family() != family {
                    let reason = match family {
                        Some(Family::Directive) => {
                            "output block exit token cannot close a directive block"
                        }
                        _ => "directive block exit token cannot close an output block",
                    };
                    return Err(self.error(self.index, reason));
                }
                exit = Some(self.index);
                self.consume();
                break;
            }
            if token.kind.is_enter() {
                return Err(self.error(self.index, "nested blocks are not allowed"));
            }
            if token.kind == TokenType::Raw {
                raw_count += 1;
                identifier.get_or_insert(self.index);
            }
            self.consume();
        }

        let Some(identifier) = identifier else {
            return Err(self.error(enter + 1, "block is empty"));
        };
        let Some(exit) = exit else {
            return Err(self.error(identifier, "exit token not found"));
        };

        let keyword = Keyword::lookup(self.token(identifier).text(self.source));
        Ok(Block {
            enter,
            exit,
            identifier,
            raw_count,
            keyword,
        })
    }

    fn span(&self, tokens: Range<usize>) -> Span {
        if tokens.is_empty() {
            let at = self.token(tokens.start).byte_range(self.source).start;
            return Span::new(at, at);
        }
        Span::covering(
            &self.token(tokens.start),
            &self.token(tokens.end - 1),
            self.source,
        )
        .trim(self.source)
    }

    fn content(&self, block: &Block) -> Span {
        self.span(block.enter + 1..block.exit)
    }

    fn remainder(&self, block: &Block) -> Span {
        self.span(block.identifier + 1..block.exit)
    }

    fn ensure_only_identifier(&self, block: &Block, keyword: Keyword) -> Result<(), ParseError> {
        if block.is_only_identifier() {
            return Ok(());
        }
        let extra = (block.identifier + 1..block.exit)
            .find(|&i| self.token(i).kind == TokenType::Raw)
            .unwrap_or(block.identifier);
        Err(self.error(
            extra,
            format!("{keyword} statement should only contain the identifier"),
        ))
    }

    fn condition(&self, block: &Block, keyword: Keyword) -> Result<Span, ParseError> {
        if block.is_only_identifier() {
            return Err(self.error(
                block.identifier,
                format!("{keyword} statement requires a condition"),
            ));
        }
        Ok(self.remainder(block))
    }

    fn statement(
        &mut self,
        block: &Block,
        keyword: Option<Keyword>,
        depth: usize,
        previous: Option<&Syntax>,
    ) -> Result<Syntax, ParseError> {
        let Some(keyword) = keyword else {
            return Ok(Syntax::RenderableExpression(self.content(block)));
        };

        match keyword {
            Keyword::Break => {
                self.ensure_only_identifier(block, keyword)?;
                Ok(Syntax::BreakStatement)
            }
            Keyword::Continue => {
                self.ensure_only_identifier(block, keyword)?;
                Ok(Syntax::ContinueStatement)
            }
            Keyword::Return => {
                self.ensure_only_identifier(block, keyword)?;
                Ok(Syntax::ReturnStatement)
            }
            Keyword::Var => {
                if block.is_only_identifier() {
                    return Err(self.error(
                        block.identifier,
                        "var statement requires an assignment expression",
                    ));
                }
                Ok(Syntax::VarStatement(self.remainder(block)))
            }
            Keyword::Call => self.parse_call(block, previous).map(Syntax::CallStatement),
            Keyword::If => self.parse_if(block, depth).map(Syntax::IfStatement),
            Keyword::For => self.parse_loop(block, keyword, depth).map(Syntax::ForStatement),
            Keyword::Foreach => self
                .parse_loop(block, keyword, depth)
                .map(Syntax::ForeachStatement),
            Keyword::While => self
                .parse_loop(block, keyword, depth)
                .map(Syntax::WhileStatement),
            Keyword::End | Keyword::ElseIf | Keyword::Else => Err(self.error(
                block.identifier,
                format!("{keyword} found but not expected"),
            )),
        }
    }

    /// Parses the body opened by `opener` up to its terminator block.
    fn parse_nested(
        &mut self,
        depth: usize,
        opener: &Block,
    ) -> Result<(SyntaxList, Block), ParseError> {
        if depth >= self.max_depth {
            return Err(self.error(
                opener.identifier,
                format!("maximum nesting depth of {} exceeded", self.max_depth),
            ));
        }
        let body = self.parse_body(depth + 1, true)?;
        match body.terminator {
            Some(terminator) => Ok((body.nodes, terminator)),
            None => Err(self.error(
                self.index,
                "unexpected end of file, expected an end block",
            )),
        }
    }

    fn parse_loop(
        &mut self,
        block: &Block,
        keyword: Keyword,
        depth: usize,
    ) -> Result<ConditionalStatement, ParseError> {
        let condition = self.condition(block, keyword)?;
        let (body, terminator) = self.parse_nested(depth, block)?;
        match terminator.keyword {
            Some(Keyword::End) => Ok(ConditionalStatement { condition, body }),
            other => Err(self.error(
                terminator.identifier,
                format!(
                    "{} found but not expected",
                    other.map_or("block", Keyword::as_str)
                ),
            )),
        }
    }

    fn parse_if(&mut self, block: &Block, depth: usize) -> Result<IfStatement, ParseError> {
        let condition = self.condition(block, Keyword::If)?;
        let (body, mut terminator) = self.parse_nested(depth, block)?;
        let mut else_ifs = Vec::new();
        let mut else_branch: Option<ElseStatement> = None;

        loop {
            match terminator.keyword {
                Some(Keyword::ElseIf) => {
                    if else_branch.is_some() {
                        return Err(self.error(
                            terminator.identifier,
                            "cannot have elseif after else in an if statement",
                        ));
                    }
                    let condition = self.condition(&terminator, Keyword::ElseIf)?;
                    let (body, next) = self.parse_nested(depth, &terminator)?;
                    else_ifs.push(ElseIfStatement { condition, body });
                    terminator = next;
                }
                Some(Keyword::Else) => {
                    if else_branch.is_some() {
                        return Err(self.error(
                            terminator.identifier,
                            "only one else is allowed within an if statement",
                        ));
                    }
                    let (body, next) = self.parse_nested(depth, &terminator)?;
                    else_branch = Some(ElseStatement { body });
                    terminator = next;
                }
                _ => break,
            }
        }

        Ok(IfStatement {
            condition,
            body,
            else_ifs,
            else_branch,
        })
    }

    fn parse_call(
        &self,
        block: &Block,
        previous: Option<&Syntax>,
    ) -> Result<CallStatement, ParseError> {
        if block.is_only_identifier() {
            return Err(self.error(block.identifier, "call statement requires parameters"));
        }
        let text = self.remainder(block);
        let Some((name, parameters)) = split_call(self.source, text) else {
            return Err(self.error(
                block.identifier,
                "call statement requires a function name and () with optional parameters",
            ));
        };
        let leading_whitespace = match previous {
            Some(Syntax::RawText(span)) => leading_whitespace(self.source, *span),
            _ => None,
        };
        Ok(CallStatement {
            name,
            parameters,
            leading_whitespace,
        })
    }
}

/// Pure indentation between the last line start inside `raw` and its end.
fn leading_whitespace(source: &str, raw: Span) -> Option<Span> {
    let before = source.get(..raw.end)?;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    if line_start < raw.start || line_start >= raw.end {
        return None;
    }
    let indent = Span::new(line_start, raw.end);
    indent
        .text(source)
        .chars()
        .all(|c| c.is_whitespace())
        .then_some(indent)
}

/// Splits `Name(arg, ...)` into the name and argument spans.
fn split_call(source: &str, call: Span) -> Option<(Span, Vec<Span>)> {
    let text = call.text(source);
    let open = text.find('(')?;
    let name = Span::new(call.start, call.start + open).trim(source);
    if name.is_empty() {
        return None;
    }
    let close = matching_paren(text, open)?;
    if close + 1 != text.len() {
        return None;
    }
    let inner_start = call.start + open + 1;
    let parameters = split_parameters(&text[open + 1..close], ',')
        .into_iter()
        .map(|range| Span::new(inner_start + range.start, inner_start + range.end).trim(source))
        .filter(|span| !span.is_empty())
        .collect();
    Some((name, parameters))
}

/// Tracks bracket depth and quoted strings while walking expression text.
#[derive(Default)]
struct Nesting {
    depth: usize,
    quote: Option<char>,
    escaped: bool,
}

impl Nesting {
    /// Feeds one character; returns true if it sits at the top level
    /// outside any string.
    fn step(&mut self, c: char) -> bool {
        if let Some(quote) = self.quote {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == quote {
                self.quote = None;
            }
            return false;
        }
        match c {
            '"' | '\'' => {
                self.quote = Some(c);
                false
            }
            '(' | '[' | '{' => {
                self.depth += 1;
                false
            }
            ')' | ']' | '}' => {
                self.depth = self.depth.saturating_sub(1);
                false
            }
            _ => self.depth == 0,
        }
    }
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut nesting = Nesting::default();
    for (index, c) in text[open..].char_indices() {
        nesting.step(c);
        if c == ')' && nesting.quote.is_none() && nesting.depth == 0 {
            return Some(open + index);
        }
    }
    None
}

/// Byte ranges of `text` separated by `separator` at the top level.
///
/// Separators inside `()`, `[]`, `{}` or quoted strings do not split; a
/// backslash escapes the next character inside quotes. Angle brackets are
/// not tracked, so `Map<K, V>` splits at its comma.
pub fn split_parameters(text: &str, separator: char) -> Vec<Range<usize>> {
    let mut parts = Vec::new();
    let mut nesting = Nesting::default();
    let mut start = 0;
    for (index, c) in text.char_indices() {
        if nesting.step(c) && c == separator {
            parts.push(start..index);
            start = index + c.len_utf8();
        }
    }
    parts.push(start..text.len());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_str(source: &str) -> Result<SyntaxList, ParseError> {
        parse(&tokenize(source), source)
    }

    fn error(source: &str) -> String {
        parse_str(source).unwrap_err().to_string()
    }

    #[test]
    fn raw_text_runs_coalesce() {
        let source = "raw string\nsecond line";
        let nodes = parse_str(source).unwrap();
        assert_eq!(nodes, vec![Syntax::RawText(Span::new(0, source.len()))]);
    }

    #[test]
    fn raw_and_expression() {
        let source = "raw {{ code }} string";
        let nodes = parse_str(source).unwrap();
        assert_eq!(nodes.len(), 3);
        match &nodes[1] {
            Syntax::RenderableExpression(span) => assert_eq!(span.text(source), "code"),
            other => panic!("unexpected {other:?}"),
        }
        match &nodes[2] {
            Syntax::RawText(span) => assert_eq!(span.text(source), " string"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_template() {
        assert_eq!(parse_str("").unwrap(), vec![]);
    }

    #[test]
    fn keyword_only_statements() {
        assert_eq!(parse_str("{{ break }}").unwrap(), vec![Syntax::BreakStatement]);
        assert_eq!(parse_str("{% continue %}").unwrap(), vec![Syntax::ContinueStatement]);
        assert_eq!(parse_str("{{ return }}").unwrap(), vec![Syntax::ReturnStatement]);
        assert_eq!(
            error("{{ break x }}"),
            "Parse error at 1:10 (Raw): break statement should only contain the identifier (value: 'x')"
        );
    }

    #[test]
    fn var_statement() {
        let source = "{% var x = 42 %}";
        match &parse_str(source).unwrap()[0] {
            Syntax::VarStatement(span) => assert_eq!(span.text(source), "x = 42"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            error("{{ var }}"),
            "Parse error at 1:4 (Raw): var statement requires an assignment expression (value: 'var')"
        );
    }

    #[test]
    fn unbalanced_and_empty_blocks() {
        assert_eq!(
            error("{{ code"),
            "Parse error at 1:4 (Raw): exit token not found (value: 'code')"
        );
        assert_eq!(
            error("{{ if x"),
            "Parse error at 1:4 (Raw): exit token not found (value: 'if')"
        );
        assert_eq!(
            error("{{ }}"),
            "Parse error at 1:3 (Whitespace): block is empty (value: ' ')"
        );
        assert_eq!(
            error("{{"),
            "Parse error at end of file: block is empty"
        );
    }

    #[test]
    fn nested_and_mismatched_delimiters() {
        assert_eq!(
            error("{{ {{ y }} }}"),
            "Parse error at 1:4 (OutputEnter): nested blocks are not allowed (value: '{{')"
        );
        assert_eq!(
            error("{% x }}"),
            "Parse error at 1:6 (OutputExit): output block exit token cannot close a directive block (value: '}}')"
        );
        assert_eq!(
            error("{{ x %}"),
            "Parse error at 1:6 (DirectiveExit): directive block exit token cannot close an output block (value: '%}')"
        );
        assert_eq!(
            error("a }} b"),
            "Parse error at 1:3 (OutputExit): block exit token found without a matching block entry (value: '}}')"
        );
    }

    #[test]
    fn if_chain() {
        let source = "{% if a %}A{% elseif b %}B{% elseif c %}C{% else %}D{% end %}";
        let nodes = parse_str(source).unwrap();
        let Syntax::IfStatement(statement) = &nodes[0] else {
            panic!("expected if");
        };
        assert_eq!(statement.condition.text(source), "a");
        assert_eq!(statement.else_ifs.len(), 2);
        assert_eq!(statement.else_ifs[1].condition.text(source), "c");
        let else_branch = statement.else_branch.as_ref().unwrap();
        assert!(matches!(else_branch.body[0], Syntax::RawText(span) if span.text(source) == "D"));
    }

    #[test]
    fn if_chain_errors() {
        assert_eq!(
            error("{% if a %}{% else %}{% else %}{% end %}"),
            "Parse error at 1:24 (Raw): only one else is allowed within an if statement (value: 'else')"
        );
        assert_eq!(
            error("{% if a %}{% else %}{% elseif b %}{% end %}"),
            "Parse error at 1:24 (Raw): cannot have elseif after else in an if statement (value: 'elseif')"
        );
        assert_eq!(
            error("{% if %}{% end %}"),
            "Parse error at 1:4 (Raw): if statement requires a condition (value: 'if')"
        );
        assert_eq!(
            error("{% if a %}{% elseif %}{% end %}"),
            "Parse error at 1:14 (Raw): elseif statement requires a condition (value: 'elseif')"
        );
        assert_eq!(
            error("{% if a %}{% end b %}"),
            "Parse error at 1:18 (Raw): end statement should only contain the identifier (value: 'b')"
        );
        assert_eq!(
            error("{% if a %}x"),
            "Parse error at end of file: unexpected end of file, expected an end block"
        );
    }

    #[test]
    fn stray_terminators() {
        assert_eq!(
            error("x{% end %}"),
            "Parse error at 1:5 (Raw): end found but not expected (value: 'end')"
        );
        assert_eq!(
            error("{% else %}"),
            "Parse error at 1:4 (Raw): else found but not expected (value: 'else')"
        );
        assert_eq!(
            error("{% for x in y %}{% else %}{% end %}"),
            "Parse error at 1:20 (Raw): else found but not expected (value: 'else')"
        );
    }

    #[test]
    fn loops() {
        let source = concat!(
            "{% for i = 0; i < 3; i++ %}{% foreach x in xs %}{{ x }}{% end %}{% end %}",
            "{% while go %}{% end %}"
        );
        let nodes = parse_str(source).unwrap();
        let Syntax::ForStatement(outer) = &nodes[0] else {
            panic!("expected for");
        };
        assert_eq!(outer.condition.text(source), "i = 0; i < 3; i++");
        assert!(matches!(
            &outer.body[0],
            Syntax::ForeachStatement(inner) if inner.condition.text(source) == "x in xs"
        ));
        assert!(matches!(&nodes[1], Syntax::WhileStatement(w) if w.condition.text(source) == "go"));
        assert_eq!(
            error("{% while %}{% end %}"),
            "Parse error at 1:4 (Raw): while statement requires a condition (value: 'while')"
        );
    }

    #[test]
    fn nesting_limit() {
        let source = "{% if a %}{% if b %}{% if c %}x{% end %}{% end %}{% end %}";
        let tokens = tokenize(source);
        assert!(Parser::new(&tokens, source).with_max_depth(3).parse().is_ok());
        let err = Parser::new(&tokens, source)
            .with_max_depth(2)
            .parse()
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Parse error at 1:24 (Raw): maximum nesting depth of 2 exceeded (value: 'if')"
        );
    }

    #[test]
    fn call_statement() {
        let source = "{% call Render(a, f(b, c), \"x, y\") %}";
        let Syntax::CallStatement(call) = &parse_str(source).unwrap()[0] else {
            panic!("expected call");
        };
        assert_eq!(call.name.text(source), "Render");
        let parameters: Vec<_> = call.parameters.iter().map(|p| p.text(source)).collect();
        assert_eq!(parameters, vec!["a", "f(b, c)", "\"x, y\""]);
        assert_eq!(call.leading_whitespace, None);
    }

    #[test]
    fn call_without_arguments() {
        let source = "{% call Footer() %}";
        let Syntax::CallStatement(call) = &parse_str(source).unwrap()[0] else {
            panic!("expected call");
        };
        assert!(call.parameters.is_empty());
    }

    #[test]
    fn call_errors() {
        assert_eq!(
            error("{% call %}"),
            "Parse error at 1:4 (Raw): call statement requires parameters (value: 'call')"
        );
        assert_eq!(
            error("{% call (x) %}"),
            "Parse error at 1:4 (Raw): call statement requires a function name and () with optional parameters (value: 'call')"
        );
        assert_eq!(
            error("{% call Name(x %}"),
            "Parse error at 1:4 (Raw): call statement requires a function name and () with optional parameters (value: 'call')"
        );
    }

    #[test]
    fn call_captures_line_indentation() {
        let source = "list:\n    {% call Item(x) %}\n";
        let nodes = parse_str(source).unwrap();
        let Syntax::CallStatement(call) = &nodes[1] else {
            panic!("expected call");
        };
        assert_eq!(call.leading_whitespace.map(|s| s.text(source)), Some("    "));

        let source = "text {% call Item(x) %}";
        let nodes = parse_str(source).unwrap();
        let Syntax::CallStatement(call) = &nodes[1] else {
            panic!("expected call");
        };
        assert_eq!(call.leading_whitespace, None);
    }

    #[test]
    fn parameter_splitting() {
        let text = r#"a, "b, \" c", [1, 2], {k: v}, 'd,e'"#;
        let parts: Vec<_> = split_parameters(text, ',')
            .into_iter()
            .map(|r| text[r].trim())
            .collect();
        assert_eq!(parts, vec!["a", r#""b, \" c""#, "[1, 2]", "{k: v}", "'d,e'"]);

        let generic = "Map<K, V>";
        assert_eq!(split_parameters(generic, ',').len(), 2);
    }
}
