//! Trim-marker handling.
//!
//! `{{-` / `{%-` eat the whitespace and line break before them, `-}}` / `-%}`
//! eat the whitespace and line break after them. Only token kinds are
//! inspected; block semantics are the parser's business.

use crate::lexer::{Token, TokenType};

/// Rewrites `tokens` to honor trim markers.
///
/// A trim-enter drops, from the output tail, a `Whitespace` token, then a
/// `Newline`, then one more `Whitespace` (each only if present). A trim-exit
/// skips the same sequence in the input. Trim tokens come out as the plain
/// delimiter of their family with their span unchanged, so running the pass
/// again changes nothing.
pub fn suppress(tokens: &[Token]) -> Vec<Token> {
    let mut result: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut index = 0;
    while index < tokens.len() {
        let token = tokens[index];
        index += 1;

        if !token.kind.is_trim() {
            result.push(token);
            continue;
        }

        let plain = Token {
            kind: token.kind.untrimmed(),
            ..token
        };

        if token.kind.is_enter() {
            let removed = trim_tail(&mut result);
            log::trace!("{token}: dropped {removed} preceding tokens");
            result.push(plain);
        } else {
            result.push(plain);
            let skipped = skip_head(&tokens[index..]);
            log::trace!("{token}: skipped {skipped} following tokens");
            index += skipped;
        }
    }
    result
}

const TRIMMED: [TokenType; 3] = [TokenType::Whitespace, TokenType::Newline, TokenType::Whitespace];

fn trim_tail(result: &mut Vec<Token>) -> usize {
    let mut removed = 0;
    for kind in TRIMMED {
        if result.last().is_some_and(|t| t.kind == kind) {
            result.pop();
            removed += 1;
        }
    }
    removed
}

fn skip_head(rest: &[Token]) -> usize {
    let mut skipped = 0;
    for kind in TRIMMED {
        if rest.get(skipped).is_some_and(|t| t.kind == kind) {
            skipped += 1;
        }
    }
    skipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn render(text: &str) -> String {
        suppress(&tokenize(text))
            .iter()
            .map(|t| t.text(text))
            .collect()
    }

    #[test]
    fn trim_enter_eats_indentation_and_line_break() {
        assert_eq!(render("a\n   {%- x %}"), "a{%- x %}");
        assert_eq!(render("a \n{{- x }}"), "a{{- x }}");
    }

    #[test]
    fn trim_exit_eats_line_break_and_indentation() {
        assert_eq!(render("{% x -%}\n b"), "{% x -%}b");
        assert_eq!(render("{{ x -}}  \n  b"), "{{ x -}}b");
    }

    #[test]
    fn only_one_line_break_is_removed() {
        assert_eq!(render("a\n\n{%- x -%}\n\nb"), "a\n{%- x -%}\nb");
    }

    #[test]
    fn plain_delimiters_are_untouched() {
        let text = "a \n{% x %}\n b";
        assert_eq!(render(text), text);
    }

    #[test]
    fn trim_tokens_become_plain() {
        let tokens = suppress(&tokenize("{{- x -}}"));
        assert_eq!(tokens[0].kind, TokenType::OutputEnter);
        assert_eq!(tokens[tokens.len() - 2].kind, TokenType::OutputExit);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let text = " \n \n {%- if a -%} \n \n x \n {{- y -}} \n";
        let once = suppress(&tokenize(text));
        assert_eq!(suppress(&once), once);
    }
}
