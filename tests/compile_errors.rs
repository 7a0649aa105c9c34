use cutwork::{compile, compile_with, Config, ParseError};

fn error(source: &str) -> ParseError {
    compile(source).unwrap_err()
}

// ── Balanced blocks ──

#[test]
fn unterminated_block_points_at_identifier() {
    let err = error("{{ if x");
    assert_eq!(err.to_string(), "Parse error at 1:4 (Raw): exit token not found (value: 'if')");
    assert_eq!((err.line(), err.column()), (1, 4));
}

#[test]
fn nested_enter_is_rejected_at_inner_token() {
    assert_eq!(
        error("{{ {{ y }} }}").to_string(),
        "Parse error at 1:4 (OutputEnter): nested blocks are not allowed (value: '{{')"
    );
}

#[test]
fn missing_end_reports_end_of_file() {
    let err = error("{% foreach x in xs %}\n  {{ x }}\n");
    assert!(err.is_at_eof());
    assert_eq!(
        err.to_string(),
        "Parse error at end of file: unexpected end of file, expected an end block"
    );
}

// ── Positions ──

#[test]
fn positions_count_lines_and_characters() {
    assert_eq!(
        error("line one\n  {% if %}").to_string(),
        "Parse error at 2:6 (Raw): if statement requires a condition (value: 'if')"
    );
    assert_eq!(
        error("é {{ }}").to_string(),
        "Parse error at 1:5 (Whitespace): block is empty (value: ' ')"
    );
}

#[test]
fn trimmed_delimiters_keep_their_positions() {
    assert_eq!(
        error("x\n  {%- var -%}").to_string(),
        "Parse error at 2:7 (Raw): var statement requires an assignment expression (value: 'var')"
    );
}

// ── Keywords ──

#[test]
fn keyword_only_statements_reject_extras() {
    for keyword in ["break", "continue", "return"] {
        assert!(compile(&format!("{{{{ {keyword} }}}}")).is_ok());
        let err = error(&format!("{{% {keyword} now %}}"));
        assert_eq!(
            err.reason,
            format!("{keyword} statement should only contain the identifier")
        );
        assert_eq!(err.value, "now");
    }
}

#[test]
fn stray_terminators() {
    assert_eq!(error("{% end %}").reason, "end found but not expected");
    assert_eq!(error("{% elseif a %}").reason, "elseif found but not expected");
    assert_eq!(
        error("{% while a %}{% else %}{% end %}").reason,
        "else found but not expected"
    );
}

#[test]
fn if_chain_ordering() {
    assert_eq!(
        error("{% if a %}{% else %}{% elseif b %}{% end %}").reason,
        "cannot have elseif after else in an if statement"
    );
    assert_eq!(
        error("{% if a %}{% else %}{% else %}{% end %}").reason,
        "only one else is allowed within an if statement"
    );
}

#[test]
fn call_shapes() {
    assert!(compile("{% call Item() %}").is_ok());
    assert_eq!(
        error("{% call (a) %}").reason,
        "call statement requires a function name and () with optional parameters"
    );
    assert_eq!(
        error("{% call Item(a %}").reason,
        "call statement requires a function name and () with optional parameters"
    );
    assert_eq!(error("{% call %}").reason, "call statement requires parameters");
}

// ── Limits ──

#[test]
fn nesting_depth_is_configurable() {
    let deep = "{% if a %}".repeat(5) + &"{% end %}".repeat(5);
    assert!(compile(&deep).is_ok());

    let config = Config {
        max_depth: 4,
        ..Config::default()
    };
    let err = compile_with(&deep, &config).unwrap_err();
    assert_eq!(err.reason, "maximum nesting depth of 4 exceeded");
    assert_eq!(err.value, "if");
}

#[test]
fn pathological_nesting_fails_cleanly() {
    let deep = "{% while a %}".repeat(10_000);
    let err = compile(&deep).unwrap_err();
    assert_eq!(err.reason, "maximum nesting depth of 64 exceeded");
}
